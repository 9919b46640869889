// Domain models: per-host metrics and the fleet aggregate

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;

/// One of the top traffic hours in the last 24h. `rx`/`tx` are rates in
/// bytes per second; `time` is the hour's start instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeakEvent {
    pub time: DateTime<Utc>,
    pub rx: u64,
    pub tx: u64,
}

/// Metrics for a single monitored host, rebuilt on every poll cycle.
/// All rates are whole bytes per second.
#[derive(Debug, Clone)]
pub struct ServerMetrics {
    pub name: String,
    pub ip: String,
    pub online: bool,
    /// Current receive rate, from the most recent five-minute bucket.
    pub rx: u64,
    /// Current transmit rate, from the most recent five-minute bucket.
    pub tx: u64,
    /// Total bytes received today.
    pub total_rx: u64,
    /// Total bytes transmitted today.
    pub total_tx: u64,
    pub avg_rx_12h: u64,
    pub avg_tx_12h: u64,
    pub avg_rx_24h: u64,
    pub avg_tx_24h: u64,
    /// Max observed hourly rate in the last 24h.
    pub peak_rx: u64,
    pub peak_tx: u64,
    /// Up to 3 highest hours by combined rate.
    pub peak_events: Vec<PeakEvent>,
    pub updated_at: DateTime<Utc>,
    /// Empty when `online` is true; the verbatim failure otherwise.
    pub error: String,
}

impl ServerMetrics {
    /// Zeroed metrics for a reachable host; the deriver fills in the rest.
    pub fn online(name: &str, ip: &str, now: DateTime<Utc>) -> Self {
        Self {
            name: name.to_string(),
            ip: ip.to_string(),
            online: true,
            rx: 0,
            tx: 0,
            total_rx: 0,
            total_tx: 0,
            avg_rx_12h: 0,
            avg_tx_12h: 0,
            avg_rx_24h: 0,
            avg_tx_24h: 0,
            peak_rx: 0,
            peak_tx: 0,
            peak_events: Vec::new(),
            updated_at: now,
            error: String::new(),
        }
    }

    /// Metrics for a host whose poll cycle failed. All counters stay zero.
    pub fn offline(name: &str, ip: &str, error: String, now: DateTime<Utc>) -> Self {
        let mut metrics = Self::online(name, ip, now);
        metrics.online = false;
        metrics.error = error;
        metrics
    }
}

/// Fleet totals sampled at one aggregation tick.
#[derive(Debug, Clone, Copy)]
pub struct HistoryEntry {
    pub timestamp: DateTime<Utc>,
    pub total_rx: u64,
    pub total_tx: u64,
}

/// Aggregated view over all hosts. Per-host entries are shared pointers;
/// they are never mutated after publication, so cloning the aggregate is a
/// cheap self-consistent snapshot.
#[derive(Debug, Clone)]
pub struct AggregateMetrics {
    /// Sum of current receive rates across online hosts.
    pub total_rx: u64,
    pub total_tx: u64,
    /// Sum of all online hosts' (avg_rx_24h + avg_tx_24h).
    pub grand_total_avg: u64,
    /// Sum of all online hosts' max(peak_rx, peak_tx).
    pub grand_total_peak: u64,
    /// Host with the highest 24h average usage; empty when none online.
    pub dominant_server: String,
    pub servers: HashMap<String, Arc<ServerMetrics>>,
    pub history: Vec<HistoryEntry>,
    pub updated_at: DateTime<Utc>,
}

impl AggregateMetrics {
    pub fn new() -> Self {
        Self {
            total_rx: 0,
            total_tx: 0,
            grand_total_avg: 0,
            grand_total_peak: 0,
            dominant_server: String::new(),
            servers: HashMap::new(),
            history: Vec::new(),
            updated_at: DateTime::UNIX_EPOCH,
        }
    }
}

impl Default for AggregateMetrics {
    fn default() -> Self {
        Self::new()
    }
}
