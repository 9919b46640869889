// vnStat JSON decoding. Accepts both dialects the utility has shipped:
// modern exports identify buckets by epoch-seconds ids, legacy exports by
// calendar objects in host-local time.

use anyhow::anyhow;
use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;

/// One normalised traffic bucket. `rx`/`tx` are the byte volumes accumulated
/// during the bucket's window, not running counters. `start` is the bucket's
/// identifying instant, UTC-normalised.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bucket {
    pub start: DateTime<Utc>,
    pub rx: u64,
    pub tx: u64,
}

/// One host's counters for one poll cycle. Series ordering is as received;
/// the source does not guarantee any order.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub interface: String,
    /// Last update instant as reported by the host.
    pub updated_at: DateTime<Utc>,
    pub total_rx: u64,
    pub total_tx: u64,
    pub five_minute: Vec<Bucket>,
    pub hour: Vec<Bucket>,
    pub day: Vec<Bucket>,
    pub month: Vec<Bucket>,
    /// True when any bucket id used the legacy calendar form. Those instants
    /// carry the host's local wall time with no zone tag, so age arithmetic
    /// must be anchored to `updated_at` instead of the monitor's clock.
    pub needs_relative_age: bool,
}

impl Snapshot {
    fn empty() -> Self {
        Self {
            interface: String::new(),
            updated_at: DateTime::UNIX_EPOCH,
            total_rx: 0,
            total_tx: 0,
            five_minute: Vec::new(),
            hour: Vec::new(),
            day: Vec::new(),
            month: Vec::new(),
            needs_relative_age: false,
        }
    }
}

/// Decodes a vnStat `--json` dump into a [`Snapshot`] for the first
/// reported interface. An empty `interfaces` list is not an error; it yields
/// an empty snapshot.
pub fn parse(data: &[u8]) -> anyhow::Result<Snapshot> {
    let report: RawReport =
        serde_json::from_slice(data).map_err(|e| anyhow!("invalid JSON: {}", e))?;

    let Some(iface) = report.interfaces.into_iter().next() else {
        return Ok(Snapshot::empty());
    };

    let mut legacy_seen = false;
    let five_minute = convert_series(iface.traffic.fiveminute, &mut legacy_seen)?;
    let hour = convert_series(iface.traffic.hour, &mut legacy_seen)?;
    let day = convert_series(iface.traffic.day, &mut legacy_seen)?;
    let month = convert_series(iface.traffic.month, &mut legacy_seen)?;

    Ok(Snapshot {
        interface: iface.name,
        updated_at: iface
            .updated
            .map(|u| u.instant())
            .transpose()?
            .unwrap_or(DateTime::UNIX_EPOCH),
        total_rx: iface.traffic.total.rx,
        total_tx: iface.traffic.total.tx,
        five_minute,
        hour,
        day,
        month,
        needs_relative_age: legacy_seen,
    })
}

fn convert_series(buckets: Vec<RawBucket>, legacy_seen: &mut bool) -> anyhow::Result<Vec<Bucket>> {
    buckets
        .into_iter()
        .map(|b| {
            let start = match b.id {
                BucketId::Timestamp(ts) => epoch_utc(ts)?,
                BucketId::Calendar(c) => {
                    *legacy_seen = true;
                    c.instant()?
                }
            };
            Ok(Bucket {
                start,
                rx: b.rx,
                tx: b.tx,
            })
        })
        .collect()
}

fn epoch_utc(ts: i64) -> anyhow::Result<DateTime<Utc>> {
    Utc.timestamp_opt(ts, 0)
        .single()
        .ok_or_else(|| anyhow!("timestamp {} out of range", ts))
}

#[derive(Debug, Deserialize)]
struct RawReport {
    #[serde(default)]
    interfaces: Vec<RawInterface>,
}

#[derive(Debug, Deserialize)]
struct RawInterface {
    /// Modern exports name the interface under `name`, legacy under `id`.
    #[serde(alias = "id")]
    name: String,
    updated: Option<RawUpdated>,
    #[serde(default)]
    traffic: RawTraffic,
}

/// Envelope update marker: a numeric `timestamp` in modern exports, or
/// `date`/`time` calendar subobjects in legacy ones.
#[derive(Debug, Deserialize)]
struct RawUpdated {
    timestamp: Option<i64>,
    date: Option<RawDate>,
    time: Option<RawTime>,
}

impl RawUpdated {
    fn instant(self) -> anyhow::Result<DateTime<Utc>> {
        if let Some(ts) = self.timestamp {
            return epoch_utc(ts);
        }
        let Some(date) = self.date else {
            return Ok(DateTime::UNIX_EPOCH);
        };
        let time = self.time.unwrap_or_default();
        calendar_utc(date.year, date.month, date.day, time.hour, time.minute)
    }
}

#[derive(Debug, Deserialize)]
struct RawDate {
    year: i32,
    #[serde(default = "default_one")]
    month: u32,
    #[serde(default = "default_one")]
    day: u32,
}

#[derive(Debug, Default, Deserialize)]
struct RawTime {
    #[serde(default)]
    hour: u32,
    #[serde(default)]
    minute: u32,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawTraffic {
    total: RawTotal,
    fiveminute: Vec<RawBucket>,
    hour: Vec<RawBucket>,
    day: Vec<RawBucket>,
    month: Vec<RawBucket>,
}

#[derive(Debug, Default, Deserialize)]
struct RawTotal {
    #[serde(default)]
    rx: u64,
    #[serde(default)]
    tx: u64,
}

#[derive(Debug, Deserialize)]
struct RawBucket {
    id: BucketId,
    #[serde(default)]
    rx: u64,
    #[serde(default)]
    tx: u64,
}

/// Bucket identifier: tried as an epoch-seconds integer first, then as the
/// legacy calendar object.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum BucketId {
    Timestamp(i64),
    Calendar(CalendarId),
}

/// Legacy calendar id. Finer fields than the series resolution are absent in
/// the wire format and default downward (first month/day, midnight).
#[derive(Debug, Deserialize)]
struct CalendarId {
    year: i32,
    #[serde(default = "default_one")]
    month: u32,
    #[serde(default = "default_one")]
    day: u32,
    #[serde(default)]
    hour: u32,
    #[serde(default)]
    minute: u32,
}

impl CalendarId {
    fn instant(&self) -> anyhow::Result<DateTime<Utc>> {
        calendar_utc(self.year, self.month, self.day, self.hour, self.minute)
    }
}

fn calendar_utc(
    year: i32,
    month: u32,
    day: u32,
    hour: u32,
    minute: u32,
) -> anyhow::Result<DateTime<Utc>> {
    Utc.with_ymd_and_hms(year, month, day, hour, minute, 0)
        .single()
        .ok_or_else(|| {
            anyhow!(
                "invalid calendar instant {:04}-{:02}-{:02} {:02}:{:02}",
                year,
                month,
                day,
                hour,
                minute
            )
        })
}

fn default_one() -> u32 {
    1
}
