use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Event identifier (32 hex chars, but treated as opaque)
pub type EventId = String;

/// Span identifier (16 hex chars, but treated as opaque)
pub type SpanId = String;

/// A single measurement attached to a transaction (web or mobile vital)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    /// Non-numeric values deserialize to `None` and are skipped by the collector
    #[serde(default, deserialize_with = "number_or_none")]
    pub value: Option<f64>,
    #[serde(default)]
    pub unit: Option<String>,
}

impl Measurement {
    pub fn new(value: f64, unit: impl Into<String>) -> Self {
        Self {
            value: Some(value),
            unit: Some(unit.into()),
        }
    }
}

fn number_or_none<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Lenient {
        Number(f64),
        Other(serde::de::IgnoredAny),
    }

    Ok(match Lenient::deserialize(deserializer)? {
        Lenient::Number(value) => Some(value),
        Lenient::Other(_) => None,
    })
}

/// Error event that happened inside a trace
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TraceError {
    pub event_id: EventId,
    #[serde(default)]
    pub issue_id: Option<u64>,
    /// Span the error was captured in, if any
    #[serde(default)]
    pub span: Option<SpanId>,
    #[serde(default)]
    pub project_id: u64,
    #[serde(default)]
    pub project_slug: Option<String>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub level: String,
    #[serde(default)]
    pub message: Option<String>,
    /// Seconds since UNIX epoch
    #[serde(default)]
    pub timestamp: Option<f64>,
    #[serde(default)]
    pub generation: Option<u32>,
}

/// Performance issue detected on a transaction
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TracePerformanceIssue {
    pub event_id: EventId,
    #[serde(default)]
    pub issue_id: Option<u64>,
    /// Offender spans
    #[serde(default)]
    pub span: Vec<SpanId>,
    #[serde(default)]
    pub suspect_spans: Vec<SpanId>,
    #[serde(default)]
    pub project_id: u64,
    #[serde(default)]
    pub project_slug: Option<String>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub level: String,
    #[serde(default)]
    pub culprit: String,
    #[serde(default)]
    pub start: f64,
    #[serde(default)]
    pub end: f64,
}

/// A transaction as returned by the trace endpoint, with nested child transactions
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub event_id: EventId,
    #[serde(default)]
    pub project_id: u64,
    #[serde(default)]
    pub project_slug: Option<String>,
    /// Transaction name
    #[serde(default)]
    pub transaction: String,
    #[serde(rename = "transaction.op", default)]
    pub op: String,
    #[serde(rename = "transaction.duration", default)]
    pub duration: f64,
    #[serde(rename = "transaction.status", default)]
    pub status: Option<String>,
    /// Span id of the transaction's own root span
    #[serde(default)]
    pub span_id: SpanId,
    #[serde(default)]
    pub parent_event_id: Option<EventId>,
    #[serde(default)]
    pub parent_span_id: Option<SpanId>,
    #[serde(default)]
    pub generation: Option<u32>,
    /// Seconds since UNIX epoch
    pub start_timestamp: f64,
    /// Seconds since UNIX epoch
    pub timestamp: f64,
    #[serde(default)]
    pub errors: Vec<TraceError>,
    #[serde(default)]
    pub performance_issues: Vec<TracePerformanceIssue>,
    #[serde(default)]
    pub children: Vec<Transaction>,
    #[serde(default)]
    pub measurements: BTreeMap<String, Measurement>,
    #[serde(default)]
    pub sdk_name: String,
    #[serde(default)]
    pub profile_id: Option<String>,
    #[serde(default)]
    pub profiler_id: Option<String>,
}

impl Transaction {
    /// Transaction duration in seconds
    pub fn duration_secs(&self) -> f64 {
        self.timestamp - self.start_timestamp
    }
}

/// Trace payload split into transactions and errors that have no transaction
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TraceSplitResult {
    #[serde(default)]
    pub transactions: Vec<Transaction>,
    #[serde(default)]
    pub orphan_errors: Vec<TraceError>,
}

impl TraceSplitResult {
    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty() && self.orphan_errors.is_empty()
    }

    /// Concatenate another payload onto this one, keeping arrival order
    pub fn extend(&mut self, other: TraceSplitResult) {
        self.transactions.extend(other.transactions);
        self.orphan_errors.extend(other.orphan_errors);
    }
}

/// Trace metadata query results
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TraceMeta {
    #[serde(default)]
    pub errors: u64,
    #[serde(default)]
    pub performance_issues: u64,
    #[serde(default)]
    pub projects: u64,
    #[serde(default)]
    pub transactions: u64,
    /// Number of spans (including the transaction's own) per transaction event
    #[serde(rename = "transactiontoSpanChildrenCount", default)]
    pub transaction_to_span_children_count: HashMap<EventId, u64>,
}
