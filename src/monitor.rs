// Poll scheduling, fleet aggregation, and the shared metrics store.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::warn;

use crate::config::ServerConfig;
use crate::metrics;
use crate::models::{AggregateMetrics, HistoryEntry, ServerMetrics};
use crate::shell::{self, RemoteShell};
use crate::vnstat;

/// Wall-time span the history ring covers.
const HISTORY_WINDOW: Duration = Duration::from_secs(5 * 60);
const HISTORY_TRIM_INTERVAL: Duration = Duration::from_secs(60);

/// Thread-safe holder of the fleet aggregate. Writers mutate under the lock;
/// readers get a snapshot copy whose per-host entries are shared immutable
/// pointers.
pub struct MetricsStore {
    inner: Mutex<AggregateMetrics>,
    history_limit: usize,
}

impl MetricsStore {
    pub fn new(poll_interval: Duration) -> Self {
        let ticks = HISTORY_WINDOW.as_secs() / poll_interval.as_secs().max(1);
        Self {
            inner: Mutex::new(AggregateMetrics::new()),
            history_limit: ticks.max(1) as usize,
        }
    }

    pub fn history_limit(&self) -> usize {
        self.history_limit
    }

    /// Publishes one host's metrics, replacing the previous cycle's entry.
    pub fn publish(&self, metrics: ServerMetrics) {
        let mut inner = self.lock();
        inner.servers.insert(metrics.name.clone(), Arc::new(metrics));
    }

    /// Folds per-host metrics into fleet totals and appends a history entry.
    /// Offline hosts contribute nothing and cannot be dominant.
    pub fn aggregate_tick(&self) {
        let now = Utc::now();
        let mut inner = self.lock();

        let mut total_rx = 0u64;
        let mut total_tx = 0u64;
        let mut grand_total_avg = 0u64;
        let mut grand_total_peak = 0u64;
        let mut dominant_server = String::new();
        let mut max_usage = 0u64;

        for metrics in inner.servers.values() {
            if !metrics.online {
                continue;
            }
            total_rx += metrics.rx;
            total_tx += metrics.tx;

            let server_avg = metrics.avg_rx_24h + metrics.avg_tx_24h;
            grand_total_avg += server_avg;
            grand_total_peak += metrics.peak_rx.max(metrics.peak_tx);

            if server_avg > max_usage {
                max_usage = server_avg;
                dominant_server = metrics.name.clone();
            }
        }

        inner.total_rx = total_rx;
        inner.total_tx = total_tx;
        inner.grand_total_avg = grand_total_avg;
        inner.grand_total_peak = grand_total_peak;
        inner.dominant_server = dominant_server;
        inner.history.push(HistoryEntry {
            timestamp: now,
            total_rx,
            total_tx,
        });
        inner.updated_at = now;
    }

    /// Drops history beyond the retention limit, oldest first.
    pub fn trim_history(&self) {
        let mut inner = self.lock();
        let len = inner.history.len();
        if len > self.history_limit {
            inner.history.drain(..len - self.history_limit);
        }
    }

    /// Returns a self-consistent copy of the aggregate. Subsequent writer
    /// activity does not affect it.
    pub fn snapshot(&self) -> AggregateMetrics {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, AggregateMetrics> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Owns the polling, aggregation, and history-trim tasks. Tasks stop on a
/// shared broadcast signal; each returns within one cadence interval.
pub struct Monitor {
    store: Arc<MetricsStore>,
    shutdown: broadcast::Sender<()>,
    handles: Vec<JoinHandle<()>>,
}

impl Monitor {
    /// Spawns one poller per configured server plus the aggregator and the
    /// history trimmer.
    pub fn start(
        servers: Vec<ServerConfig>,
        shell: Arc<dyn RemoteShell>,
        poll_interval: Duration,
    ) -> Self {
        let store = Arc::new(MetricsStore::new(poll_interval));
        let (shutdown, _) = broadcast::channel(1);
        let mut handles = Vec::with_capacity(servers.len() + 2);

        for server in servers {
            handles.push(tokio::spawn(poll_server(
                server,
                shell.clone(),
                store.clone(),
                poll_interval,
                shutdown.subscribe(),
            )));
        }
        handles.push(tokio::spawn(aggregate(
            store.clone(),
            poll_interval,
            shutdown.subscribe(),
        )));
        handles.push(tokio::spawn(trim_history(
            store.clone(),
            shutdown.subscribe(),
        )));

        Self {
            store,
            shutdown,
            handles,
        }
    }

    pub fn store(&self) -> Arc<MetricsStore> {
        self.store.clone()
    }

    /// Signals all tasks and waits for them to drain. In-flight sessions are
    /// allowed to finish; their handles are released with the task.
    pub async fn stop(self) {
        let _ = self.shutdown.send(());
        for handle in self.handles {
            let _ = handle.await;
        }
    }
}

async fn poll_server(
    server: ServerConfig,
    shell: Arc<dyn RemoteShell>,
    store: Arc<MetricsStore>,
    poll_interval: Duration,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut tick = tokio::time::interval(poll_interval);
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = tick.tick() => {}
            _ = shutdown.recv() => break,
        }

        // The blocking SSH round-trip runs off the async runtime. Awaiting it
        // here keeps at most one fetch in flight for this host; Skip drops
        // ticks that elapse during an overrun instead of queueing them.
        let shell = shell.clone();
        let target = server.clone();
        let result =
            tokio::task::spawn_blocking(move || collect_once(shell.as_ref(), &target)).await;

        let metrics = match result {
            Ok(metrics) => metrics,
            Err(e) => ServerMetrics::offline(
                &server.name,
                &server.ip,
                format!("poll task failed: {}", e),
                Utc::now(),
            ),
        };
        if !metrics.online {
            warn!(server = %server.name, error = %metrics.error, "poll failed");
        }
        store.publish(metrics);
    }
}

/// One poll cycle: connect, run the vnStat dump, parse, derive. Every
/// failure path yields an offline record carrying the error verbatim.
pub fn collect_once(shell: &dyn RemoteShell, server: &ServerConfig) -> ServerMetrics {
    let now = Utc::now();

    let mut session = match shell.connect(server) {
        Ok(session) => session,
        Err(e) => return ServerMetrics::offline(&server.name, &server.ip, e.to_string(), now),
    };

    let output = match session.run(&shell::vnstat_command(&server.interface)) {
        Ok(output) => output,
        Err(e) => return ServerMetrics::offline(&server.name, &server.ip, e.to_string(), now),
    };

    let snapshot = match vnstat::parse(&output) {
        Ok(snapshot) => snapshot,
        Err(e) => {
            return ServerMetrics::offline(
                &server.name,
                &server.ip,
                format!("failed to parse: {}", e),
                now,
            );
        }
    };

    metrics::derive(server, &snapshot, Utc::now())
}

async fn aggregate(
    store: Arc<MetricsStore>,
    poll_interval: Duration,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut tick = tokio::time::interval(poll_interval);
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = tick.tick() => {}
            _ = shutdown.recv() => break,
        }
        store.aggregate_tick();
    }
}

async fn trim_history(store: Arc<MetricsStore>, mut shutdown: broadcast::Receiver<()>) {
    let mut tick = tokio::time::interval(HISTORY_TRIM_INTERVAL);
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = tick.tick() => {}
            _ = shutdown.recv() => break,
        }
        store.trim_history();
    }
}
