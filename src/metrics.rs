// Metric derivation: one normalised snapshot in, one ServerMetrics out.
// Pure of I/O; the poller supplies the wall clock.

use chrono::{DateTime, Duration, Utc};

use crate::config::ServerConfig;
use crate::models::{PeakEvent, ServerMetrics};
use crate::vnstat::{Bucket, Snapshot};

const FIVE_MINUTE_SECS: u64 = 300;
const HOUR_SECS: u64 = 3600;
const PEAK_EVENT_LIMIT: usize = 3;

/// Derives live rate, daily totals, windowed averages, and peaks. Never
/// fails; a snapshot without data yields all-zero metrics with
/// `online = true` (offline is decided by the poller, not here).
pub fn derive(server: &ServerConfig, snapshot: &Snapshot, now: DateTime<Utc>) -> ServerMetrics {
    let mut metrics = ServerMetrics::online(&server.name, &server.ip, now);

    // Live rate from the newest five-minute bucket.
    if let Some(latest) = latest_bucket(&snapshot.five_minute) {
        metrics.rx = latest.rx / FIVE_MINUTE_SECS;
        metrics.tx = latest.tx / FIVE_MINUTE_SECS;
    }

    // Today's totals from the newest day bucket.
    if let Some(today) = latest_bucket(&snapshot.day) {
        metrics.total_rx = today.rx;
        metrics.total_tx = today.tx;
    }

    // Legacy calendar ids are host-local wall time with no zone tag, so
    // comparing them against the monitor's UTC clock is unsound. Anchoring
    // age to the host-reported update instant keeps both sides in the same
    // clock domain.
    let reference = if snapshot.needs_relative_age {
        snapshot.updated_at
    } else {
        now
    };

    let mut sum_rx_12 = 0u64;
    let mut sum_tx_12 = 0u64;
    let mut sum_rx_24 = 0u64;
    let mut sum_tx_24 = 0u64;
    let mut count_12 = 0u64;
    let mut count_24 = 0u64;
    let mut admitted: Vec<PeakEvent> = Vec::new();

    for bucket in &snapshot.hour {
        let age = reference - bucket.start;
        // The small negative tolerance absorbs clock skew between hosts.
        if age <= Duration::hours(-1) || age > Duration::hours(24) {
            continue;
        }

        sum_rx_24 += bucket.rx;
        sum_tx_24 += bucket.tx;
        count_24 += 1;

        let rate_rx = bucket.rx / HOUR_SECS;
        let rate_tx = bucket.tx / HOUR_SECS;
        metrics.peak_rx = metrics.peak_rx.max(rate_rx);
        metrics.peak_tx = metrics.peak_tx.max(rate_tx);
        admitted.push(PeakEvent {
            time: bucket.start,
            rx: rate_rx,
            tx: rate_tx,
        });

        if age <= Duration::hours(12) {
            sum_rx_12 += bucket.rx;
            sum_tx_12 += bucket.tx;
            count_12 += 1;
        }
    }

    if count_12 > 0 {
        metrics.avg_rx_12h = sum_rx_12 / (count_12 * HOUR_SECS);
        metrics.avg_tx_12h = sum_tx_12 / (count_12 * HOUR_SECS);
    }
    if count_24 > 0 {
        metrics.avg_rx_24h = sum_rx_24 / (count_24 * HOUR_SECS);
        metrics.avg_tx_24h = sum_tx_24 / (count_24 * HOUR_SECS);
    }

    // Top hours by combined rate; stable sort keeps arrival order on ties.
    admitted.sort_by(|a, b| (b.rx + b.tx).cmp(&(a.rx + a.tx)));
    admitted.truncate(PEAK_EVENT_LIMIT);
    metrics.peak_events = admitted;

    metrics
}

/// Newest bucket by start instant; on ties the first-encountered wins.
fn latest_bucket(buckets: &[Bucket]) -> Option<&Bucket> {
    buckets.iter().fold(None, |best, b| match best {
        Some(cur) if b.start <= cur.start => Some(cur),
        _ => Some(b),
    })
}
