// Deriver tests: live rate, daily totals, windowed averages, peaks

mod common;

use bandwidth_monitor::metrics::derive;
use bandwidth_monitor::vnstat::{Bucket, Snapshot};
use chrono::{DateTime, Duration, TimeZone, Utc};

fn empty_snapshot() -> Snapshot {
    let json = br#"{"interfaces": []}"#;
    bandwidth_monitor::vnstat::parse(json).unwrap()
}

fn bucket(start: DateTime<Utc>, rx: u64, tx: u64) -> Bucket {
    Bucket { start, rx, tx }
}

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2023, 10, 27, 16, 0, 0).unwrap()
}

#[test]
fn test_live_rate_from_latest_five_minute_bucket() {
    let now = now();
    let mut snapshot = empty_snapshot();
    snapshot.five_minute = vec![
        bucket(now - Duration::minutes(10), 60_000, 60_000),
        bucket(now - Duration::minutes(5), 1500, 3000),
    ];

    let m = derive(&common::server_config("a", "10.0.0.1"), &snapshot, now);
    assert_eq!(m.rx, 5);
    assert_eq!(m.tx, 10);
    assert!(m.online);
    assert!(m.error.is_empty());
}

#[test]
fn test_live_rate_zero_without_five_minute_data() {
    let m = derive(
        &common::server_config("a", "10.0.0.1"),
        &empty_snapshot(),
        now(),
    );
    assert_eq!(m.rx, 0);
    assert_eq!(m.tx, 0);
    assert!(m.online);
}

#[test]
fn test_today_totals_use_latest_day_bucket() {
    let now = now();
    let mut snapshot = empty_snapshot();
    // Out of order on purpose; the latest bucket must win.
    snapshot.day = vec![
        bucket(now - Duration::hours(6), 500, 600),
        bucket(now - Duration::days(1), 100, 200),
    ];

    let m = derive(&common::server_config("a", "10.0.0.1"), &snapshot, now);
    assert_eq!(m.total_rx, 500);
    assert_eq!(m.total_tx, 600);
}

#[test]
fn test_peak_selection_and_24h_average() {
    // 24 ordinary hours plus one spike at age 2h:
    // peak = 36000/3600 = 10 rx, 72000/3600 = 20 tx;
    // avg24 = (24*3600 + 36000) / (25*3600) = 1 (truncated).
    let now = now();
    let mut snapshot = empty_snapshot();
    let mut hours = Vec::new();
    for i in 1..=24 {
        if i == 2 {
            hours.push(bucket(now - Duration::hours(2), 36_000, 72_000));
        } else {
            hours.push(bucket(now - Duration::hours(i), 3600, 7200));
        }
    }
    hours.push(bucket(now - Duration::minutes(30), 3600, 7200));
    snapshot.hour = hours;

    let m = derive(&common::server_config("a", "10.0.0.1"), &snapshot, now);
    assert_eq!(m.peak_rx, 10);
    assert_eq!(m.peak_tx, 20);
    assert_eq!(m.avg_rx_24h, (24 * 3600 + 36_000) / (25 * 3600));
    assert_eq!(m.avg_rx_24h, 1);
}

#[test]
fn test_window_admission_boundaries() {
    let now = now();
    let server = common::server_config("a", "10.0.0.1");

    // age in (-1h, 12h]: counts toward both windows.
    let mut snapshot = empty_snapshot();
    snapshot.hour = vec![bucket(now - Duration::hours(6), 7200, 0)];
    let m = derive(&server, &snapshot, now);
    assert_eq!(m.avg_rx_12h, 2);
    assert_eq!(m.avg_rx_24h, 2);

    // age in (12h, 24h]: 24h only.
    let mut snapshot = empty_snapshot();
    snapshot.hour = vec![bucket(now - Duration::hours(18), 7200, 0)];
    let m = derive(&server, &snapshot, now);
    assert_eq!(m.avg_rx_12h, 0);
    assert_eq!(m.avg_rx_24h, 2);

    // age beyond 24h: ignored entirely.
    let mut snapshot = empty_snapshot();
    snapshot.hour = vec![bucket(now - Duration::hours(25), 7200, 0)];
    let m = derive(&server, &snapshot, now);
    assert_eq!(m.avg_rx_24h, 0);
    assert_eq!(m.peak_rx, 0);

    // Slightly in the future (clock skew): admitted.
    let mut snapshot = empty_snapshot();
    snapshot.hour = vec![bucket(now + Duration::minutes(30), 7200, 0)];
    let m = derive(&server, &snapshot, now);
    assert_eq!(m.avg_rx_24h, 2);

    // A full hour in the future: rejected.
    let mut snapshot = empty_snapshot();
    snapshot.hour = vec![bucket(now + Duration::hours(1), 7200, 0)];
    let m = derive(&server, &snapshot, now);
    assert_eq!(m.avg_rx_24h, 0);
}

#[test]
fn test_peak_events_cardinality_and_order() {
    let now = now();
    let server = common::server_config("a", "10.0.0.1");

    let mut snapshot = empty_snapshot();
    snapshot.hour = vec![
        bucket(now - Duration::hours(1), 3600, 3600),
        bucket(now - Duration::hours(2), 36_000, 36_000),
        bucket(now - Duration::hours(3), 7200, 7200),
        bucket(now - Duration::hours(4), 18_000, 18_000),
        bucket(now - Duration::hours(5), 10_800, 10_800),
    ];
    let m = derive(&server, &snapshot, now);
    assert_eq!(m.peak_events.len(), 3);
    let combined: Vec<u64> = m.peak_events.iter().map(|p| p.rx + p.tx).collect();
    assert_eq!(combined, vec![20, 10, 6]);
    assert_eq!(m.peak_events[0].time, now - Duration::hours(2));

    // Fewer admitted hours than the limit.
    let mut snapshot = empty_snapshot();
    snapshot.hour = vec![bucket(now - Duration::hours(1), 3600, 3600)];
    let m = derive(&server, &snapshot, now);
    assert_eq!(m.peak_events.len(), 1);

    let m = derive(&server, &empty_snapshot(), now);
    assert!(m.peak_events.is_empty());
}

#[test]
fn test_legacy_snapshot_ages_anchor_to_host_clock() {
    // Host reports wall time 3h ahead of the monitor. With legacy calendar
    // ids, ages must be computed against the host's updated_at; otherwise
    // every bucket would look like it is from the future and be rejected.
    let monitor_now = now();
    let host_now = monitor_now + Duration::hours(3);

    let json = common::legacy_vnstat_json(
        host_now,
        &[(host_now - Duration::minutes(5), 1500, 3000)],
        &[(host_now - Duration::hours(1), 360_000, 360_000)],
    );
    let snapshot = bandwidth_monitor::vnstat::parse(json.as_bytes()).expect("parse");
    assert!(snapshot.needs_relative_age);

    let m = derive(
        &common::server_config("a", "10.0.0.1"),
        &snapshot,
        monitor_now,
    );
    assert_eq!(m.rx, 5);
    assert_eq!(m.tx, 10);
    assert_eq!(m.avg_rx_24h, 100);
}

#[test]
fn test_modern_snapshot_ages_anchor_to_monitor_clock() {
    // Same 3h-skew data in the modern dialect carries real epoch instants,
    // so the monitor clock applies and future buckets are rejected.
    let monitor_now = now();
    let host_now = monitor_now + Duration::hours(3);

    let json = common::modern_vnstat_json(
        host_now.timestamp(),
        &[],
        &[((host_now - Duration::hours(1)).timestamp(), 360_000, 360_000)],
        &[],
    );
    let snapshot = bandwidth_monitor::vnstat::parse(json.as_bytes()).expect("parse");
    assert!(!snapshot.needs_relative_age);

    let m = derive(
        &common::server_config("a", "10.0.0.1"),
        &snapshot,
        monitor_now,
    );
    assert_eq!(m.avg_rx_24h, 0);
}
