// Shared test helpers: a scriptable RemoteShell and vnStat JSON builders

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::anyhow;
use bandwidth_monitor::config::ServerConfig;
use bandwidth_monitor::shell::{RemoteSession, RemoteShell};

pub fn server_config(name: &str, ip: &str) -> ServerConfig {
    ServerConfig {
        name: name.to_string(),
        ip: ip.to_string(),
        user: "root".to_string(),
        port: 22,
        interface: "eth0".to_string(),
    }
}

/// Per-host scripted behavior for the mock shell.
#[derive(Clone)]
pub enum MockBehavior {
    /// Connect succeeds; `run` returns these bytes.
    Payload(Vec<u8>),
    /// Connect fails with this message.
    ConnectError(String),
    /// Connect succeeds; `run` fails with this message.
    CommandError(String),
}

/// RemoteShell stand-in keyed by server name. Hosts without a scripted
/// behavior fail to connect.
pub struct MockShell {
    behaviors: HashMap<String, MockBehavior>,
}

impl MockShell {
    pub fn new() -> Self {
        Self {
            behaviors: HashMap::new(),
        }
    }

    pub fn with(mut self, name: &str, behavior: MockBehavior) -> Self {
        self.behaviors.insert(name.to_string(), behavior);
        self
    }

    pub fn into_arc(self) -> Arc<dyn RemoteShell> {
        Arc::new(self)
    }
}

impl RemoteShell for MockShell {
    fn connect(&self, server: &ServerConfig) -> anyhow::Result<Box<dyn RemoteSession>> {
        match self.behaviors.get(&server.name) {
            None => Err(anyhow!("no route to host {}", server.ip)),
            Some(MockBehavior::ConnectError(msg)) => Err(anyhow!("{}", msg.clone())),
            Some(MockBehavior::CommandError(msg)) => Ok(Box::new(MockSession {
                result: Err(msg.clone()),
            })),
            Some(MockBehavior::Payload(bytes)) => Ok(Box::new(MockSession {
                result: Ok(bytes.clone()),
            })),
        }
    }
}

struct MockSession {
    result: Result<Vec<u8>, String>,
}

impl RemoteSession for MockSession {
    fn run(&mut self, _command: &str) -> anyhow::Result<Vec<u8>> {
        self.result
            .clone()
            .map_err(|msg| anyhow!("{}", msg))
    }
}

/// Modern-dialect vnStat JSON: bucket ids and the envelope update marker are
/// epoch seconds. Buckets are `(start_epoch, rx, tx)`.
pub fn modern_vnstat_json(
    updated_ts: i64,
    fiveminute: &[(i64, u64, u64)],
    hour: &[(i64, u64, u64)],
    day: &[(i64, u64, u64)],
) -> String {
    let bucket = |&(ts, rx, tx): &(i64, u64, u64)| {
        serde_json::json!({"id": ts, "rx": rx, "tx": tx})
    };
    serde_json::json!({
        "vnstatversion": "2.12",
        "interfaces": [{
            "name": "eth0",
            "updated": {"timestamp": updated_ts},
            "traffic": {
                "total": {"rx": 0, "tx": 0},
                "fiveminute": fiveminute.iter().map(bucket).collect::<Vec<_>>(),
                "hour": hour.iter().map(bucket).collect::<Vec<_>>(),
                "day": day.iter().map(bucket).collect::<Vec<_>>(),
                "month": []
            }
        }]
    })
    .to_string()
}

/// Legacy-dialect vnStat JSON: calendar-object ids, `date`/`time` update
/// marker, interface keyed by `id`. Instants are rendered in whatever zone
/// the supplied DateTimes carry (the host's local wall time).
pub fn legacy_vnstat_json(
    updated: chrono::DateTime<chrono::Utc>,
    fiveminute: &[(chrono::DateTime<chrono::Utc>, u64, u64)],
    hour: &[(chrono::DateTime<chrono::Utc>, u64, u64)],
) -> String {
    use chrono::{Datelike, Timelike};
    let calendar_bucket = |&(t, rx, tx): &(chrono::DateTime<chrono::Utc>, u64, u64)| {
        serde_json::json!({
            "id": {
                "year": t.year(), "month": t.month(), "day": t.day(),
                "hour": t.hour(), "minute": t.minute()
            },
            "rx": rx, "tx": tx
        })
    };
    serde_json::json!({
        "vnstatversion": "1.18",
        "interfaces": [{
            "id": "eth0",
            "updated": {
                "date": {"year": updated.year(), "month": updated.month(), "day": updated.day()},
                "time": {"hour": updated.hour(), "minute": updated.minute()}
            },
            "traffic": {
                "total": {"rx": 0, "tx": 0},
                "fiveminute": fiveminute.iter().map(calendar_bucket).collect::<Vec<_>>(),
                "hour": hour.iter().map(calendar_bucket).collect::<Vec<_>>(),
                "day": [],
                "month": []
            }
        }]
    })
    .to_string()
}
