use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Replay session whose bounds the trace view must cover
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReplayRecord {
    pub id: String,
    #[serde(with = "time::serde::rfc3339")]
    pub started_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub finished_at: OffsetDateTime,
}

impl ReplayRecord {
    /// Replay start in seconds since UNIX epoch
    pub fn start_secs(&self) -> f64 {
        unix_secs(self.started_at)
    }

    /// Replay end in seconds since UNIX epoch
    pub fn end_secs(&self) -> f64 {
        unix_secs(self.finished_at)
    }
}

/// Another trace linked to the same replay
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReplayTrace {
    #[serde(rename = "traceSlug")]
    pub trace_slug: String,
    /// Seconds since UNIX epoch, used to narrow the trace query
    #[serde(default)]
    pub timestamp: Option<i64>,
}

fn unix_secs(at: OffsetDateTime) -> f64 {
    at.unix_timestamp_nanos() as f64 / 1e9
}
