//! Zooming into transactions: fetching their spans and splicing them in.

use futures::future::FutureExt;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, warn};

use trace_tree_protocol::{EventDetail, RawSpan, SpanId, TraceError, TracePerformanceIssue};

use crate::api::{FetchContext, FetchError};
use crate::error::TreeError;
use crate::guards::*;
use crate::missing_instrumentation::should_insert_missing_instrumentation;
use crate::node::*;
use crate::tree::{SpanFetch, TraceTree};

/// A registered span fetch for one node.
///
/// Await [`SpanRequest::fetch`] and hand the result to
/// [`TraceTree::resolve_spans`].
#[derive(Clone)]
pub struct SpanRequest {
    node: NodeId,
    key: String,
    fetch: SpanFetch,
}

impl SpanRequest {
    pub fn node(&self) -> NodeId {
        self.node
    }

    /// `organization:project:event`
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn fetch(&self) -> SpanFetch {
        self.fetch.clone()
    }
}

impl std::fmt::Debug for SpanRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpanRequest")
            .field("node", &self.node)
            .field("key", &self.key)
            .finish()
    }
}

impl TraceTree {
    fn span_request_key(
        &self,
        node: NodeId,
        ctx: &FetchContext,
    ) -> Result<(String, String, String), TreeError> {
        let metadata = &self.nodes[node.0].metadata;
        match (&metadata.project_slug, &metadata.event_id) {
            (Some(project), Some(event)) => Ok((
                format!("{}:{}:{}", ctx.organization, project, event),
                project.clone(),
                event.clone(),
            )),
            _ => Err(TreeError::MissingMetadata(node)),
        }
    }

    /// Register (or reuse) the span fetch for a node and mark it loading.
    ///
    /// Requests are shared by `organization:project:event`: asking twice,
    /// even before the first one settles, issues a single network call.
    pub fn request_spans(
        &mut self,
        node: NodeId,
        ctx: &FetchContext,
    ) -> Result<SpanRequest, TreeError> {
        let (key, project, event) = self.span_request_key(node, ctx)?;

        let fetch = match self.span_requests.get(&key) {
            Some(fetch) => fetch.clone(),
            None => {
                debug!(%key, "fetching transaction spans");
                let request = ctx
                    .api
                    .fetch_transaction_spans(&ctx.organization, &project, &event);
                let fetch = async move { request.await.map(Arc::new) }.boxed().shared();
                self.span_requests.insert(key.clone(), fetch.clone());
                fetch
            }
        };

        self.nodes[node.0].fetch_status = FetchStatus::Loading;
        Ok(SpanRequest { node, key, fetch })
    }

    /// The node a settled request should be applied to: the node itself if
    /// it is visible, otherwise its clone if that one is.
    pub(crate) fn zoom_target(&self, node: NodeId) -> NodeId {
        if self.list_index(node).is_some() {
            return node;
        }
        match self.nodes[node.0].clone_reference {
            Some(clone) if self.list_index(clone).is_some() => clone,
            _ => node,
        }
    }

    /// Apply the outcome of a span request.
    ///
    /// A failed fetch or an unparseable payload marks the node as errored
    /// and leaves the tree untouched; it resolves to `Ok(None)`.
    pub fn resolve_spans(
        &mut self,
        request: &SpanRequest,
        result: Result<Arc<EventDetail>, FetchError>,
    ) -> Result<Option<Arc<EventDetail>>, TreeError> {
        let target = self.zoom_target(request.node);

        let detail = match result {
            Ok(detail) => detail,
            Err(error) => {
                warn!(key = %request.key, %error, "failed to fetch transaction spans");
                self.nodes[request.node.0].fetch_status = FetchStatus::Error;
                self.nodes[target.0].fetch_status = FetchStatus::Error;
                return Ok(None);
            }
        };

        let mut spans = match detail.spans() {
            Ok(spans) => spans,
            Err(error) => {
                warn!(key = %request.key, %error, "failed to decode transaction spans");
                self.nodes[request.node.0].fetch_status = FetchStatus::Error;
                self.nodes[target.0].fetch_status = FetchStatus::Error;
                return Ok(None);
            }
        };
        spans.sort_by(|a, b| a.start_timestamp.total_cmp(&b.start_timestamp));

        self.nodes[request.node.0].fetch_status = FetchStatus::Resolved;
        self.nodes[target.0].fetch_status = FetchStatus::Resolved;

        let node = &self.nodes[target.0];
        if node.zoomed_in || !node.expanded {
            return Ok(Some(detail));
        }

        let index = self.list_index(target);
        if let Some(index) = index {
            let visible = self.visible_children(target).len();
            self.hide_after(index, visible);
        }

        let span_count = spans.len();
        let bounds = self.from_spans(target, &detail, spans)?;

        if let Some((start, end)) = bounds {
            if let Some([own_start, own_duration]) = self.nodes[target.0].space {
                let new_start = own_start.min(start);
                let new_end = (own_start + own_duration).max(end);
                self.nodes[target.0].space = Some([new_start, new_end - new_start]);
            }
            self.widen_trace_space(start, end);
        }

        if let Some(index) = index {
            let visible = self.visible_children(target);
            self.show_after(index, visible);
        }

        debug!(key = %request.key, spans = span_count, "zoomed into transaction");
        Ok(Some(detail))
    }

    /// Zoom into (fetch spans for) or out of a node.
    ///
    /// Zooming into an already zoomed node returns the cached event.
    pub async fn zoom_in(
        &mut self,
        node: NodeId,
        zoomed_in: bool,
        ctx: &FetchContext,
    ) -> Result<Option<Arc<EventDetail>>, TreeError> {
        if !zoomed_in {
            self.zoom_out(node);
            return Ok(None);
        }

        if self.nodes[node.0].zoomed_in {
            let cached = self
                .span_request_key(node, ctx)
                .ok()
                .and_then(|(key, _, _)| self.span_requests.get(&key).cloned());
            return Ok(match cached {
                Some(fetch) => fetch.await.ok(),
                None => None,
            });
        }

        let request = self.request_spans(node, ctx)?;
        let result = request.fetch().await;
        self.resolve_spans(&request, result)
    }

    fn zoom_out(&mut self, node: NodeId) {
        if !self.nodes[node.0].zoomed_in {
            return;
        }

        let index = self.list_index(node);
        if let Some(index) = index {
            let visible = self.visible_children(node).len();
            self.hide_after(index, visible);
        }

        self.nodes[node.0].zoomed_in = false;
        self.invalidate(node, true);

        if let Some(index) = index {
            let visible = self.visible_children(node);
            self.show_after(index, visible);
        }
    }

    /// Build the span forest of `parent` from its fetched spans.
    ///
    /// Returns the fetched spans' `(min start, max end)`, or `None` when
    /// the node already had spans.
    pub(crate) fn from_spans(
        &mut self,
        parent: NodeId,
        detail: &EventDetail,
        spans: Vec<RawSpan>,
    ) -> Result<Option<(f64, f64)>, TreeError> {
        self.invalidate(parent, true);

        if !self.nodes[parent.0].span_children.is_empty() {
            self.nodes[parent.0].zoomed_in = true;
            return Ok(None);
        }

        let platform_has_missing_spans =
            (self.config.platform_may_have_missing_spans)(detail.sdk_name());
        let metadata = self.nodes[parent.0].metadata.clone();

        let mut lookup: HashMap<SpanId, NodeId> = HashMap::new();
        if let NodeValue::Span(span) = &self.nodes[parent.0].value {
            lookup.insert(span.span.span_id.clone(), parent);
        }

        let (related_errors, related_issues): (Vec<TraceError>, Vec<TracePerformanceIssue>) =
            match &self.nodes[parent.0].value {
                NodeValue::Transaction(txn) => {
                    (txn.errors.clone(), txn.performance_issues.clone())
                }
                _ => (Vec::new(), Vec::new()),
            };

        let mut transactions_by_span: HashMap<SpanId, Vec<NodeId>> = HashMap::new();
        let mut transactions = Vec::new();
        let mut first_transaction = None;
        for &child in &self.nodes[parent.0].children {
            if let NodeValue::Transaction(txn) = &self.nodes[child.0].value {
                first_transaction.get_or_insert(child);
                if let Some(parent_span_id) = &txn.parent_span_id {
                    transactions_by_span
                        .entry(parent_span_id.clone())
                        .or_default()
                        .push(child);
                }
                transactions.push(child);
            }
        }

        let mut placed: HashSet<NodeId> = HashSet::new();
        let mut remapped = Vec::new();
        let mut min_start = f64::INFINITY;
        let mut max_end = f64::NEG_INFINITY;

        for span in spans {
            let mut child_transactions =
                transactions_by_span.remove(&span.span_id).unwrap_or_default();
            child_transactions.retain(|txn| !placed.contains(txn));

            if child_transactions.is_empty() && is_browser_request_span(&span) {
                if let Some(first) = first_transaction {
                    let first_node = &self.nodes[first.0];
                    if !placed.contains(&first)
                        && first_node.reparent_reason == Some(ReparentReason::PageloadServerHandler)
                        && is_server_request_handler_transaction(first_node)
                    {
                        child_transactions.push(first);
                    }
                }
            }

            min_start = min_start.min(span.start_timestamp);
            max_end = max_end.max(span.timestamp);

            let span_id = span.span_id.clone();
            let parent_span_id = span.parent_span_id.clone();

            let mut node = Node::new(
                NodeValue::Span(SpanValue {
                    span,
                    event_id: Some(detail.event_id.clone()),
                    child_transactions: child_transactions.clone(),
                }),
                metadata.clone(),
            );
            for error in related_errors
                .iter()
                .filter(|error| error.span.as_deref() == Some(span_id.as_str()))
            {
                node.errors.insert(error.clone());
            }
            for issue in related_issues.iter().filter(|issue| {
                issue.span.contains(&span_id) || issue.suspect_spans.contains(&span_id)
            }) {
                node.performance_issues.insert(issue.clone());
            }
            let id = self.alloc(node);

            if !child_transactions.is_empty() {
                for txn in child_transactions {
                    let clone = self.clone_subtree(txn);
                    self.nodes[id.0].children.push(clone);
                    self.set_parent(clone, Some(id));
                    placed.insert(txn);
                }
                remapped.push(id);
            }

            let owner = parent_span_id
                .as_ref()
                .and_then(|parent_span_id| lookup.get(parent_span_id))
                .copied()
                .unwrap_or(parent);
            lookup.insert(span_id, id);

            self.attach_span(parent, owner, id, platform_has_missing_spans, &metadata);
        }

        for txn in transactions {
            if placed.contains(&txn) {
                continue;
            }
            if let NodeValue::Transaction(value) = &self.nodes[txn.0].value {
                if let Some(parent_span_id) = &value.parent_span_id {
                    warn!(
                        fingerprint = "trace-view-reparenting",
                        event_id = %value.event_id,
                        %parent_span_id,
                        "transaction parent span not found in fetched spans"
                    );
                }
            }
            let clone = self.clone_subtree(txn);
            self.nodes[parent.0].span_children.push(clone);
            self.set_parent(clone, Some(parent));
        }

        for node in remapped {
            let mut children = std::mem::take(&mut self.nodes[node.0].children);
            children.sort_by(|a, b| self.nodes[a.0].start().total_cmp(&self.nodes[b.0].start()));
            self.nodes[node.0].children = children;
        }

        self.nodes[parent.0].zoomed_in = true;
        self.autogroup_siblings(parent);
        self.autogroup_chains(parent)?;

        Ok(Some((min_start, max_end)))
    }

    /// Append a span to its owner, inserting a gap placeholder before it when needed
    fn attach_span(
        &mut self,
        zoom_root: NodeId,
        owner: NodeId,
        span: NodeId,
        platform_has_missing_spans: bool,
        metadata: &Metadata,
    ) {
        let previous = self.forest_siblings(zoom_root, owner).last().copied();
        if let Some(previous) = previous {
            if platform_has_missing_spans
                && should_insert_missing_instrumentation(
                    &self.nodes[previous.0],
                    &self.nodes[span.0],
                )
            {
                let gap = self.missing_instrumentation_node(previous, span, metadata.clone());
                self.forest_siblings(zoom_root, owner).push(gap);
                self.set_parent(gap, Some(owner));
            }
        }

        self.forest_siblings(zoom_root, owner).push(span);
        self.set_parent(span, Some(owner));
    }

    /// The zoomed node collects spans in `span_children`, spans in `children`
    fn forest_siblings(&mut self, zoom_root: NodeId, owner: NodeId) -> &mut Vec<NodeId> {
        let node = &mut self.nodes[owner.0];
        if owner == zoom_root {
            &mut node.span_children
        } else {
            &mut node.children
        }
    }
}
