#![allow(dead_code)]

use futures::future::{self, BoxFuture, FutureExt};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use trace_tree::*;

pub const ORG: &str = "acme";
pub const PROJECT: &str = "backend";
pub const BROWSER_SDK: &str = "sentry.javascript.browser";
pub const PYTHON_SDK: &str = "sentry.python";

pub fn txn(event_id: &str, start: f64, end: f64) -> Transaction {
    Transaction {
        event_id: event_id.to_string(),
        project_id: 1,
        project_slug: Some(PROJECT.to_string()),
        transaction: format!("/{event_id}"),
        op: "task".to_string(),
        duration: (end - start) * 1e3,
        status: None,
        span_id: format!("{event_id}-root"),
        parent_event_id: None,
        parent_span_id: None,
        generation: None,
        start_timestamp: start,
        timestamp: end,
        errors: Vec::new(),
        performance_issues: Vec::new(),
        children: Vec::new(),
        measurements: BTreeMap::new(),
        sdk_name: PYTHON_SDK.to_string(),
        profile_id: None,
        profiler_id: None,
    }
}

/// A transaction started from span `parent_span_id` of another one
pub fn child_txn(event_id: &str, parent_span_id: &str, start: f64, end: f64) -> Transaction {
    Transaction {
        parent_span_id: Some(parent_span_id.to_string()),
        ..txn(event_id, start, end)
    }
}

pub fn span(
    span_id: &str,
    parent_span_id: &str,
    op: &str,
    description: &str,
    start: f64,
    end: f64,
) -> RawSpan {
    RawSpan {
        span_id: span_id.to_string(),
        parent_span_id: Some(parent_span_id.to_string()),
        trace_id: "trace".to_string(),
        op: Some(op.to_string()),
        description: Some(description.to_string()),
        start_timestamp: start,
        timestamp: end,
        exclusive_time: None,
        status: None,
        origin: None,
        hash: None,
        data: BTreeMap::new(),
        measurements: BTreeMap::new(),
    }
}

pub fn error(event_id: &str, timestamp: f64) -> TraceError {
    TraceError {
        event_id: event_id.to_string(),
        issue_id: None,
        span: None,
        project_id: 2,
        project_slug: Some(PROJECT.to_string()),
        title: format!("error {event_id}"),
        level: "error".to_string(),
        message: None,
        timestamp: Some(timestamp),
        generation: None,
    }
}

pub fn trace(transactions: Vec<Transaction>, orphan_errors: Vec<TraceError>) -> TraceSplitResult {
    TraceSplitResult {
        transactions,
        orphan_errors,
    }
}

pub fn build(transactions: Vec<Transaction>) -> TraceTree {
    TraceTree::build_from_trace(trace(transactions, Vec::new()), None, None).unwrap()
}

/// Event ids (or span ids) of the visible nodes, in list order
pub fn visible_ids(tree: &TraceTree) -> Vec<String> {
    tree.list()
        .iter()
        .map(|&id| match tree.node(id).value() {
            NodeValue::Transaction(txn) => txn.event_id.clone(),
            NodeValue::Span(span) => span.span.span_id.clone(),
            NodeValue::TraceError(error) => error.event_id.clone(),
            NodeValue::Trace(_) => "trace".to_string(),
            NodeValue::Root => "root".to_string(),
            NodeValue::MissingInstrumentation(_) => "ms".to_string(),
            NodeValue::ParentAutogroup(_) => "parent-ag".to_string(),
            NodeValue::SiblingAutogroup(_) => "sibling-ag".to_string(),
        })
        .collect()
}

pub fn find_txn(tree: &TraceTree, event_id: &str) -> NodeId {
    tree.find(tree.root(), |_, node| {
        matches!(node.value(), NodeValue::Transaction(txn) if txn.event_id == event_id)
    })
    .unwrap_or_else(|| panic!("no transaction {event_id}"))
}

pub fn find_span(tree: &TraceTree, span_id: &str) -> NodeId {
    tree.find(tree.root(), |_, node| {
        matches!(node.value(), NodeValue::Span(span) if span.span.span_id == span_id)
    })
    .unwrap_or_else(|| panic!("no span {span_id}"))
}

pub fn assert_list_consistent(tree: &TraceTree) {
    assert_eq!(tree.list(), tree.to_list().as_slice(), "\n{}", tree.print());
    for (row, &id) in tree.list().iter().enumerate() {
        assert_eq!(tree.list_index(id), Some(row), "row of {id:?}");
    }
}

/// Canned backend that records every call it receives
#[derive(Default)]
pub struct StubApi {
    events: Mutex<HashMap<String, EventDetail>>,
    traces: Mutex<HashMap<String, TraceSplitResult>>,
    span_calls: Mutex<Vec<String>>,
    trace_calls: Mutex<Vec<String>>,
}

impl StubApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_spans(self, event_id: &str, sdk: &str, spans: &[RawSpan]) -> Self {
        let mut detail = EventDetail::with_spans(event_id, spans).unwrap();
        detail.sdk = Some(SdkInfo {
            name: sdk.to_string(),
            version: None,
        });
        self.events
            .lock()
            .insert(format!("{PROJECT}:{event_id}"), detail);
        self
    }

    pub fn with_trace(self, trace_id: &str, payload: TraceSplitResult) -> Self {
        self.traces.lock().insert(trace_id.to_string(), payload);
        self
    }

    pub fn span_calls(&self) -> Vec<String> {
        self.span_calls.lock().clone()
    }

    pub fn trace_calls(&self) -> Vec<String> {
        self.trace_calls.lock().clone()
    }

    pub fn into_context(self) -> (Arc<StubApi>, FetchContext) {
        let api = Arc::new(self);
        let ctx = FetchContext::new(api.clone(), ORG);
        (api, ctx)
    }
}

impl TraceApi for StubApi {
    fn fetch_transaction_spans(
        &self,
        organization: &str,
        project_slug: &str,
        event_id: &str,
    ) -> BoxFuture<'static, Result<EventDetail, FetchError>> {
        assert_eq!(organization, ORG);
        let key = format!("{project_slug}:{event_id}");
        self.span_calls.lock().push(key.clone());
        let result = self
            .events
            .lock()
            .get(&key)
            .cloned()
            .ok_or(FetchError::NotFound(key));
        future::ready(result).boxed()
    }

    fn fetch_trace(
        &self,
        organization: &str,
        trace_id: &str,
        query: &str,
    ) -> BoxFuture<'static, Result<TraceSplitResult, FetchError>> {
        assert_eq!(organization, ORG);
        assert!(query.starts_with("limit="), "unexpected query {query}");
        self.trace_calls.lock().push(trace_id.to_string());
        let result = self
            .traces
            .lock()
            .get(trace_id)
            .cloned()
            .ok_or_else(|| FetchError::NotFound(trace_id.to_string()));
        future::ready(result).boxed()
    }
}
