//! Predicates over node kinds.

use trace_tree_protocol::{RawSpan, Transaction};

use crate::node::{Node, NodeValue};

pub const PAGELOAD_OP: &str = "pageload";
pub const SERVER_REQUEST_HANDLER_OP: &str = "http.server";

const JAVASCRIPT_SDK_PREFIX: &str = "sentry.javascript.";

const BROWSER_JAVASCRIPT_SDKS: &[&str] = &[
    "sentry.javascript.browser",
    "sentry.javascript.react",
    "sentry.javascript.gatsby",
    "sentry.javascript.ember",
    "sentry.javascript.vue",
    "sentry.javascript.angular",
    "sentry.javascript.angular-ivy",
    "sentry.javascript.nextjs",
    "sentry.javascript.electron",
    "sentry.javascript.remix",
    "sentry.javascript.svelte",
    "sentry.javascript.sveltekit",
    "sentry.javascript.react-native",
    "sentry.javascript.astro",
];

const JAVASCRIPT_SDK_MARKERS: &[&str] = &[
    "javascript", "angular", "astro", "backbone", "ember", "gatsby", "nextjs", "react", "remix",
    "svelte", "vue",
];

pub fn is_root(node: &Node) -> bool {
    matches!(node.value, NodeValue::Root)
}

pub fn is_trace(node: &Node) -> bool {
    matches!(node.value, NodeValue::Trace(_))
}

pub fn is_transaction(node: &Node) -> bool {
    matches!(node.value, NodeValue::Transaction(_))
}

pub fn is_span(node: &Node) -> bool {
    matches!(node.value, NodeValue::Span(_))
}

pub fn is_trace_error(node: &Node) -> bool {
    matches!(node.value, NodeValue::TraceError(_))
}

pub fn is_missing_instrumentation(node: &Node) -> bool {
    matches!(node.value, NodeValue::MissingInstrumentation(_))
}

pub fn is_parent_autogroup(node: &Node) -> bool {
    matches!(node.value, NodeValue::ParentAutogroup(_))
}

pub fn is_sibling_autogroup(node: &Node) -> bool {
    matches!(node.value, NodeValue::SiblingAutogroup(_))
}

pub fn is_autogroup(node: &Node) -> bool {
    is_parent_autogroup(node) || is_sibling_autogroup(node)
}

pub fn is_pageload_transaction(node: &Node) -> bool {
    matches!(&node.value, NodeValue::Transaction(txn) if txn.op == PAGELOAD_OP)
}

pub fn is_server_request_handler_transaction(node: &Node) -> bool {
    matches!(&node.value, NodeValue::Transaction(txn) if txn.op == SERVER_REQUEST_HANDLER_OP)
}

/// A transaction without a parent span started the trace
pub fn is_root_transaction(txn: &Transaction) -> bool {
    txn.parent_span_id.is_none()
}

pub fn is_javascript_sdk_transaction(txn: &Transaction) -> bool {
    let sdk = txn.sdk_name.to_lowercase();
    JAVASCRIPT_SDK_MARKERS.iter().any(|marker| sdk.contains(marker))
}

pub fn is_browser_request_span(span: &RawSpan) -> bool {
    span.op.as_deref() == Some("browser") && span.description.as_deref() == Some("request")
}

/// Number of pageload transactions directly under a transaction payload
pub fn pageload_child_count(txn: &Transaction) -> usize {
    txn.children
        .iter()
        .filter(|child| child.op == PAGELOAD_OP)
        .count()
}

/// Whether events from this SDK may lack spans for stretches of their duration.
///
/// Browser JavaScript SDKs instrument the whole page lifecycle; everything
/// else, including SDKs we can't identify, may not.
pub fn platform_may_have_missing_spans(sdk_name: Option<&str>) -> bool {
    let Some(sdk_name) = sdk_name else {
        return true;
    };
    if sdk_name.len() < JAVASCRIPT_SDK_PREFIX.len() {
        return true;
    }
    let sdk_name = sdk_name.to_lowercase();
    !BROWSER_JAVASCRIPT_SDKS.contains(&sdk_name.as_str())
}
