use serde::de::Error as _;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Replication status reported by a MongoShake collector on its `/repl` endpoint.
///
/// Only the fields the exporter republishes are modeled; anything else in the
/// payload (`lsn.ts`, `lsn.time`, `who`, `tag`, ...) is ignored.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ReplicationSnapshot {
    pub replset: String,
    pub lsn: LsnPosition,
    pub lsn_ack: LsnPosition,
    pub logs_get: f64,
    pub logs_repl: f64,
    pub logs_success: f64,
    pub tps: f64,
}

/// A log sequence number position, as exposed by the collector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct LsnPosition {
    /// Unix time in seconds.
    #[serde(deserialize_with = "unix_seconds")]
    pub unix: i64,
}

/// Accepts integers, and floats truncated toward zero (`1000.0` is `1000`).
fn unix_seconds<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Seconds {
        Int(i64),
        Float(f64),
    }

    match Seconds::deserialize(deserializer)? {
        Seconds::Int(secs) => Ok(secs),
        Seconds::Float(secs) if secs.is_finite() => Ok(secs.trunc() as i64),
        Seconds::Float(secs) => Err(D::Error::custom(format!("invalid unix time {}", secs))),
    }
}

impl ReplicationSnapshot {
    /// Validates a parsed status document. Fails if a field is missing or has the wrong type.
    pub fn from_value(value: &Value) -> Result<Self, serde_json::Error> {
        Self::deserialize(value)
    }

    pub fn lsn_unix(&self) -> i64 {
        self.lsn.unix
    }

    pub fn lsn_ack_unix(&self) -> i64 {
        self.lsn_ack.unix
    }

    /// The collector does not report a separate checkpoint position here,
    /// so the acked position is published for it.
    pub fn lsn_ckpt_unix(&self) -> i64 {
        self.lsn_ack.unix
    }

    /// Seconds between the current and the acked LSN. Negative when the ack is ahead.
    pub fn replication_latency(&self) -> i64 {
        self.lsn.unix.saturating_sub(self.lsn_ack.unix)
    }
}
