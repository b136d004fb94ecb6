use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::trace::{EventId, Measurement, SpanId};

/// Entry type carrying the span list of a transaction event
pub const SPANS_ENTRY: &str = "spans";

/// Raw span as stored on a transaction event
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RawSpan {
    pub span_id: SpanId,
    #[serde(default)]
    pub parent_span_id: Option<SpanId>,
    #[serde(default)]
    pub trace_id: String,
    #[serde(default)]
    pub op: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    /// Seconds since UNIX epoch
    pub start_timestamp: f64,
    /// Seconds since UNIX epoch
    pub timestamp: f64,
    #[serde(default)]
    pub exclusive_time: Option<f64>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub origin: Option<String>,
    #[serde(default)]
    pub hash: Option<String>,
    #[serde(default)]
    pub data: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub measurements: BTreeMap<String, Measurement>,
}

impl RawSpan {
    /// Span duration in seconds
    pub fn duration_secs(&self) -> f64 {
        self.timestamp - self.start_timestamp
    }
}

/// SDK that produced an event
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SdkInfo {
    pub name: String,
    #[serde(default)]
    pub version: Option<String>,
}

/// An entry of an event; only `spans` entries are decoded by the tree
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EventEntry {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

/// Full transaction event as returned by the event details endpoint
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EventDetail {
    #[serde(rename = "eventID", alias = "event_id")]
    pub event_id: EventId,
    #[serde(default)]
    pub entries: Vec<EventEntry>,
    #[serde(default)]
    pub sdk: Option<SdkInfo>,
    #[serde(rename = "startTimestamp", alias = "start_timestamp", default)]
    pub start_timestamp: Option<f64>,
    #[serde(rename = "endTimestamp", alias = "end_timestamp", default)]
    pub end_timestamp: Option<f64>,
}

impl EventDetail {
    /// Build an event whose only entry is the given span list
    pub fn with_spans(
        event_id: impl Into<EventId>,
        spans: &[RawSpan],
    ) -> Result<Self, PayloadError> {
        Ok(Self {
            event_id: event_id.into(),
            entries: vec![EventEntry {
                kind: SPANS_ENTRY.to_string(),
                data: serde_json::to_value(spans)?,
            }],
            sdk: None,
            start_timestamp: None,
            end_timestamp: None,
        })
    }

    /// Name of the SDK that sent the event, if known
    pub fn sdk_name(&self) -> Option<&str> {
        self.sdk.as_ref().map(|sdk| sdk.name.as_str())
    }

    /// Decode the spans entry. Events without one have no spans.
    pub fn spans(&self) -> Result<Vec<RawSpan>, PayloadError> {
        match self.entries.iter().find(|entry| entry.kind == SPANS_ENTRY) {
            Some(entry) if !entry.data.is_null() => {
                Ok(serde_json::from_value(entry.data.clone())?)
            }
            _ => Ok(Vec::new()),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PayloadError {
    #[error("malformed payload: {0}")]
    Decode(#[from] serde_json::Error),
}
