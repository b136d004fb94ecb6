use futures::future::BoxFuture;
use std::sync::Arc;

use trace_tree_protocol::{EventDetail, TraceSplitResult};

/// Backend the tree fetches span details and linked traces from
pub trait TraceApi: Send + Sync {
    /// Fetch the full event of a transaction, including its spans entry
    fn fetch_transaction_spans(
        &self,
        organization: &str,
        project_slug: &str,
        event_id: &str,
    ) -> BoxFuture<'static, Result<EventDetail, FetchError>>;

    /// Fetch a whole trace, already split into transactions and orphan errors
    fn fetch_trace(
        &self,
        organization: &str,
        trace_id: &str,
        query: &str,
    ) -> BoxFuture<'static, Result<TraceSplitResult, FetchError>>;
}

/// A failed fetch. Cloneable so one result can be handed to every waiter.
#[derive(Clone, Debug, thiserror::Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Request(String),

    #[error("malformed response: {0}")]
    Decode(String),

    #[error("not found: {0}")]
    NotFound(String),
}

impl From<trace_tree_protocol::PayloadError> for FetchError {
    fn from(error: trace_tree_protocol::PayloadError) -> Self {
        FetchError::Decode(error.to_string())
    }
}

/// Everything a tree needs to issue requests on behalf of a user
#[derive(Clone)]
pub struct FetchContext {
    pub api: Arc<dyn TraceApi>,
    pub organization: String,
}

impl FetchContext {
    pub fn new(api: Arc<dyn TraceApi>, organization: impl Into<String>) -> Self {
        Self {
            api,
            organization: organization.into(),
        }
    }
}

impl std::fmt::Debug for FetchContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchContext")
            .field("organization", &self.organization)
            .finish_non_exhaustive()
    }
}

/// Query parameters of a trace fetch
#[derive(Clone, Debug)]
pub struct TraceQueryParams {
    pub limit: usize,
    /// Seconds since UNIX epoch; lets the backend narrow the lookup window
    pub timestamp: Option<i64>,
    pub extra: Vec<(String, String)>,
}

impl Default for TraceQueryParams {
    fn default() -> Self {
        Self {
            limit: 10_000,
            timestamp: None,
            extra: Vec::new(),
        }
    }
}

impl TraceQueryParams {
    pub fn with_timestamp(&self, timestamp: Option<i64>) -> Self {
        Self {
            timestamp: timestamp.or(self.timestamp),
            ..self.clone()
        }
    }

    pub fn to_query_string(&self) -> String {
        let mut pairs = vec![format!("limit={}", self.limit)];
        if let Some(timestamp) = self.timestamp {
            pairs.push(format!("timestamp={timestamp}"));
        }
        pairs.extend(self.extra.iter().map(|(key, value)| {
            format!("{}={}", urlencoding::encode(key), urlencoding::encode(value))
        }));
        pairs.join("&")
    }
}
