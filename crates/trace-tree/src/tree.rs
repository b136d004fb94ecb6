use futures::future::{BoxFuture, Shared};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tracing::debug;

use trace_tree_protocol::*;

use crate::api::FetchError;
use crate::config::TreeConfig;
use crate::error::TreeError;
use crate::events::{EventDispatcher, ListenerId, TraceTreeEvent};
use crate::guards::*;
use crate::measurements::{collect_measurements, CollectedVital, Indicator, VitalType};
use crate::node::*;
use crate::shape::TraceShape;

/// Shared, de-duplicated span fetch
pub type SpanFetch = Shared<BoxFuture<'static, Result<Arc<EventDetail>, FetchError>>>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TreeKind {
    Trace,
    Empty,
}

/// A trace, incrementally revealed.
///
/// `list` is the flattened projection the renderer reads: the pre-order
/// traversal of every node reachable from the root through open nodes.
/// Every mutation keeps it in sync; [`TraceTree::build`] is only needed
/// after constructing a tree from scratch.
pub struct TraceTree {
    pub(crate) nodes: Vec<Node>,
    pub(crate) root: NodeId,
    pub(crate) list: Vec<NodeId>,
    /// Position of every visible node in `list`
    pub(crate) positions: HashMap<NodeId, usize>,
    pub(crate) kind: TreeKind,
    pub(crate) config: TreeConfig,
    pub(crate) vitals: BTreeMap<NodeId, Vec<CollectedVital>>,
    pub(crate) vital_types: BTreeSet<VitalType>,
    pub(crate) indicators: Vec<Indicator>,
    pub(crate) profiled_events: BTreeSet<NodeId>,
    pub(crate) project_ids: BTreeSet<u64>,
    pub(crate) events_count: usize,
    pub(crate) span_requests: HashMap<String, SpanFetch>,
    pub(crate) events: EventDispatcher,
}

/// Running bounds while visiting a trace payload
struct BuildState<'a> {
    meta: Option<&'a TraceMeta>,
    start: f64,
    end: f64,
}

enum TraceEntry {
    Transaction(Transaction),
    Error(TraceError),
}

impl TraceTree {
    fn with_config(config: TreeConfig) -> Self {
        Self {
            nodes: vec![Node::new(NodeValue::Root, Metadata::default())],
            root: NodeId(0),
            list: Vec::new(),
            positions: HashMap::new(),
            kind: TreeKind::Empty,
            config,
            vitals: BTreeMap::new(),
            vital_types: BTreeSet::new(),
            indicators: Vec::new(),
            profiled_events: BTreeSet::new(),
            project_ids: BTreeSet::new(),
            events_count: 0,
            span_requests: HashMap::new(),
            events: EventDispatcher::default(),
        }
    }

    /// A tree with a root but no trace
    pub fn empty() -> Self {
        Self::with_config(TreeConfig::default())
    }

    pub fn build_from_trace(
        trace: TraceSplitResult,
        meta: Option<&TraceMeta>,
        replay: Option<&ReplayRecord>,
    ) -> Result<Self, TreeError> {
        Self::build_from_trace_with_config(trace, meta, replay, TreeConfig::default())
    }

    pub fn build_from_trace_with_config(
        trace: TraceSplitResult,
        meta: Option<&TraceMeta>,
        replay: Option<&ReplayRecord>,
        config: TreeConfig,
    ) -> Result<Self, TreeError> {
        let mut tree = Self::with_config(config);
        tree.kind = TreeKind::Trace;

        let TraceSplitResult {
            mut transactions,
            orphan_errors,
        } = trace;

        // The trace node keeps the top level for classification; nesting lives in the tree.
        let top_level = transactions
            .iter_mut()
            .map(|txn| {
                let children = std::mem::take(&mut txn.children);
                let copy = txn.clone();
                txn.children = children;
                copy
            })
            .collect();
        let summary = TraceSplitResult {
            transactions: top_level,
            orphan_errors: orphan_errors.clone(),
        };

        let root = tree.root;
        let trace_node = tree.alloc(Node::new(NodeValue::Trace(summary), Metadata::default()));
        tree.nodes[root.0].children.push(trace_node);
        tree.set_parent(trace_node, Some(root));

        let mut state = BuildState {
            meta,
            start: f64::INFINITY,
            end: f64::NEG_INFINITY,
        };

        let mut transactions = transactions.into_iter().peekable();
        let mut errors = orphan_errors.into_iter().peekable();
        loop {
            let take_transaction = match (transactions.peek(), errors.peek()) {
                (Some(txn), Some(error)) => error
                    .timestamp
                    .is_some_and(|timestamp| txn.start_timestamp <= timestamp),
                (Some(_), None) => true,
                (None, Some(_)) => false,
                (None, None) => break,
            };

            let entry = if take_transaction {
                transactions.next().map(TraceEntry::Transaction)
            } else {
                errors.next().map(TraceEntry::Error)
            };
            if let Some(entry) = entry {
                tree.visit(&mut state, trace_node, trace_node, entry, 0)?;
            }
        }

        tree.indicators.sort_by(|a, b| a.start.total_cmp(&b.start));
        if let Some(last) = tree.indicators.last() {
            state.end = state.end.max(last.start);
        }

        if let Some(replay) = replay {
            state.start = state.start.min(replay.start_secs());
            state.end = state.end.max(replay.end_secs());
        }

        if state.start.is_finite() && state.end.is_finite() {
            let space = [state.start, state.end - state.start];
            tree.nodes[trace_node.0].space = Some(space);
            tree.nodes[root.0].space = Some(space);
        }

        tree.build();

        debug!(
            events = tree.events_count,
            nodes = tree.nodes.len(),
            visible = tree.list.len(),
            "built trace tree"
        );

        Ok(tree)
    }

    fn visit(
        &mut self,
        state: &mut BuildState<'_>,
        trace_node: NodeId,
        parent: NodeId,
        entry: TraceEntry,
        parent_pageload_children: usize,
    ) -> Result<NodeId, TreeError> {
        let parent_metadata = self.nodes[parent.0].metadata.clone();

        match entry {
            TraceEntry::Error(error) => {
                let metadata = Metadata {
                    project_slug: error
                        .project_slug
                        .clone()
                        .filter(|slug| !slug.is_empty())
                        .or(parent_metadata.project_slug),
                    event_id: Some(error.event_id.clone()),
                };

                if let Some(timestamp) = error.timestamp {
                    state.start = state.start.min(timestamp);
                    state.end = state.end.max(timestamp);
                }
                self.events_count += 1;
                self.project_ids.insert(error.project_id);
                self.nodes[trace_node.0].errors.insert(error.clone());

                let node = self.alloc(Node::new(NodeValue::TraceError(error), metadata));
                self.children_mut(parent).push(node);
                self.set_parent(node, Some(parent));
                Ok(node)
            }
            TraceEntry::Transaction(mut txn) => {
                let pageload_children = pageload_child_count(&txn);
                let children = std::mem::take(&mut txn.children);

                let metadata = Metadata {
                    project_slug: txn
                        .project_slug
                        .clone()
                        .filter(|slug| !slug.is_empty())
                        .or(parent_metadata.project_slug),
                    event_id: Some(txn.event_id.clone())
                        .filter(|id| !id.is_empty())
                        .or(parent_metadata.event_id),
                };
                let can_fetch = state
                    .meta
                    .and_then(|meta| meta.transaction_to_span_children_count.get(&txn.event_id))
                    .map_or(true, |&count| count >= 2);

                state.start = state.start.min(txn.start_timestamp);
                state.end = state.end.max(txn.timestamp);
                self.events_count += 1;
                self.project_ids.insert(txn.project_id);

                let trace = &mut self.nodes[trace_node.0];
                for error in &txn.errors {
                    trace.errors.insert(error.clone());
                }
                for issue in &txn.performance_issues {
                    trace.performance_issues.insert(issue.clone());
                }

                let collected = collect_measurements(txn.start_timestamp, &txn.measurements)?;
                let has_profile = txn.profile_id.as_deref().is_some_and(|id| !id.is_empty());

                let mut node = Node::new(NodeValue::Transaction(txn), metadata);
                node.can_fetch = can_fetch;
                let node = self.alloc(node);
                self.children_mut(parent).push(node);
                self.set_parent(node, Some(parent));

                if has_profile {
                    self.profiled_events.insert(node);
                }
                if !collected.vitals.is_empty() {
                    self.vitals.insert(node, collected.vitals);
                }
                self.vital_types.extend(collected.vital_types);
                self.indicators.extend(collected.indicators);

                if is_pageload_transaction(&self.nodes[node.0])
                    && is_server_request_handler_transaction(&self.nodes[parent.0])
                    && parent_pageload_children == 1
                {
                    self.swap(parent, node, ReparentReason::PageloadServerHandler)?;
                }

                for child in children {
                    self.visit(
                        state,
                        trace_node,
                        node,
                        TraceEntry::Transaction(child),
                        pageload_children,
                    )?;
                }

                Ok(node)
            }
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn kind(&self) -> TreeKind {
        self.kind
    }

    /// The single trace node under the root
    pub fn trace_node(&self) -> Option<NodeId> {
        self.nodes[self.root.0]
            .children
            .iter()
            .copied()
            .find(|&id| is_trace(&self.nodes[id.0]))
    }

    /// # Panics
    ///
    /// If `id` was not produced by this tree.
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    /// Number of nodes ever allocated, including ones that were grouped away
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn list(&self) -> &[NodeId] {
        &self.list
    }

    pub fn config(&self) -> &TreeConfig {
        &self.config
    }

    pub fn shape(&self) -> TraceShape {
        match self.trace_node().map(|id| &self.nodes[id.0].value) {
            Some(NodeValue::Trace(trace)) => TraceShape::classify(trace),
            _ => TraceShape::EmptyTrace,
        }
    }

    pub fn vitals(&self) -> &BTreeMap<NodeId, Vec<CollectedVital>> {
        &self.vitals
    }

    pub fn vital_types(&self) -> &BTreeSet<VitalType> {
        &self.vital_types
    }

    /// Timeline indicators, sorted by start
    pub fn indicators(&self) -> &[Indicator] {
        &self.indicators
    }

    pub fn profiled_events(&self) -> &BTreeSet<NodeId> {
        &self.profiled_events
    }

    pub fn project_ids(&self) -> &BTreeSet<u64> {
        &self.project_ids
    }

    /// Transactions and errors the trace was built from
    pub fn events_count(&self) -> usize {
        self.events_count
    }

    pub fn on(&mut self, listener: impl FnMut(&TraceTreeEvent) + Send + 'static) -> ListenerId {
        self.events.on(listener)
    }

    pub fn off(&mut self, id: ListenerId) -> bool {
        self.events.off(id)
    }

    pub(crate) fn alloc(&mut self, node: Node) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(node);
        id
    }

    /// Active children of a node.
    ///
    /// A chain autogroup shows its head while expanded and its tail's
    /// children while collapsed.
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        let node = &self.nodes[id.0];
        match &node.value {
            NodeValue::ParentAutogroup(group) if node.expanded => std::slice::from_ref(&group.head),
            NodeValue::ParentAutogroup(group) => self.children(group.tail),
            _ if node.zoomed_in => &node.span_children,
            _ => &node.children,
        }
    }

    /// Stored list backing `children(id)`; chain autogroups resolve to their tail
    pub(crate) fn children_mut(&mut self, id: NodeId) -> &mut Vec<NodeId> {
        let mut owner = id;
        while let NodeValue::ParentAutogroup(group) = &self.nodes[owner.0].value {
            owner = group.tail;
        }
        let node = &mut self.nodes[owner.0];
        if node.zoomed_in {
            &mut node.span_children
        } else {
            &mut node.children
        }
    }

    /// Every stored edge out of a node, whatever its zoom or expansion state
    pub(crate) fn stored_children(&self, id: NodeId) -> Vec<NodeId> {
        let node = &self.nodes[id.0];
        let mut children = Vec::with_capacity(node.children.len() + node.span_children.len());
        if let NodeValue::ParentAutogroup(group) = &node.value {
            children.push(group.head);
        }
        children.extend_from_slice(&node.children);
        children.extend_from_slice(&node.span_children);
        children
    }

    pub(crate) fn set_parent(&mut self, child: NodeId, parent: Option<NodeId>) {
        self.nodes[child.0].parent = parent;
        self.invalidate(child, true);
    }

    /// Clear cached depth and connector state, optionally for the whole stored subtree
    pub fn invalidate(&mut self, id: NodeId, recurse: bool) {
        if !recurse {
            self.nodes[id.0].invalidate();
            return;
        }
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            self.nodes[next.0].invalidate();
            stack.extend(self.stored_children(next));
        }
    }

    /// Number of ancestors below the virtual root
    pub fn depth(&self, id: NodeId) -> usize {
        let node = &self.nodes[id.0];
        if let Some(depth) = node.depth.get() {
            return depth;
        }
        let mut ancestors = 0usize;
        let mut current = node.parent;
        while let Some(parent) = current {
            ancestors += 1;
            current = self.nodes[parent.0].parent;
        }
        let depth = ancestors.saturating_sub(1);
        node.depth.set(Some(depth));
        depth
    }

    pub fn is_last_child(&self, id: NodeId) -> bool {
        let node = &self.nodes[id.0];
        if let Some(last) = node.is_last_child.get() {
            return last;
        }
        let last = node
            .parent
            .is_some_and(|parent| self.children(parent).last() == Some(&id));
        node.is_last_child.set(Some(last));
        last
    }

    /// Whether a node's children are part of the visible projection
    pub(crate) fn is_open(&self, id: NodeId) -> bool {
        let node = &self.nodes[id.0];
        node.expanded || is_parent_autogroup(node)
    }

    /// Descendants of a node that are currently visible, in list order
    pub fn visible_children(&self, id: NodeId) -> Vec<NodeId> {
        let mut visible = Vec::new();
        let node = &self.nodes[id.0];
        if !(self.is_open(id) || is_missing_instrumentation(node)) {
            return visible;
        }

        let mut stack: Vec<NodeId> = self.children(id).iter().rev().copied().collect();
        while let Some(next) = stack.pop() {
            visible.push(next);
            if self.is_open(next) {
                stack.extend(self.children(next).iter().rev());
            }
        }
        visible
    }

    /// Flattened visible projection computed from scratch
    pub fn to_list(&self) -> Vec<NodeId> {
        let mut list = Vec::new();
        let mut stack: Vec<NodeId> = self.children(self.root).iter().rev().copied().collect();
        while let Some(next) = stack.pop() {
            list.push(next);
            if self.is_open(next) {
                stack.extend(self.children(next).iter().rev());
            }
        }
        list
    }

    /// Recompute `list` from the tree
    pub fn build(&mut self) -> &mut Self {
        self.list = self.to_list();
        self.positions.clear();
        self.reindex_from(0);
        self
    }

    /// Row of a visible node in [`TraceTree::list`]
    pub fn list_index(&self, id: NodeId) -> Option<usize> {
        self.positions.get(&id).copied()
    }

    /// Remove the `count` list entries that follow `index`
    pub(crate) fn hide_after(&mut self, index: usize, count: usize) {
        for id in self.list.drain(index + 1..index + 1 + count) {
            self.positions.remove(&id);
        }
        self.reindex_from(index + 1);
    }

    /// Insert `visible` into the list right after `index`
    pub(crate) fn show_after(&mut self, index: usize, visible: Vec<NodeId>) {
        self.list.splice(index + 1..index + 1, visible);
        self.reindex_from(index + 1);
    }

    /// Append `visible` to the end of the list
    pub(crate) fn show_at_end(&mut self, visible: impl IntoIterator<Item = NodeId>) {
        let from = self.list.len();
        self.list.extend(visible);
        self.reindex_from(from);
    }

    fn reindex_from(&mut self, from: usize) {
        for (index, &id) in self.list.iter().enumerate().skip(from) {
            self.positions.insert(id, index);
        }
    }

    /// Expand or collapse a node. Returns whether anything changed.
    ///
    /// Zoomed-in nodes keep their state.
    pub fn expand(&mut self, id: NodeId, expanded: bool) -> bool {
        let node = &self.nodes[id.0];
        if node.expanded == expanded || node.zoomed_in {
            return false;
        }

        let index = self.list_index(id);
        if let Some(index) = index {
            let visible = self.visible_children(id).len();
            self.hide_after(index, visible);
        }

        if let NodeValue::ParentAutogroup(group) = &self.nodes[id.0].value {
            let (head, tail) = (group.head, group.tail);
            let downstream = self.children(tail).to_vec();
            if expanded {
                self.set_parent(head, Some(id));
                for child in downstream {
                    self.set_parent(child, Some(tail));
                }
            } else {
                for child in downstream {
                    self.set_parent(child, Some(id));
                }
            }
        }

        self.nodes[id.0].expanded = expanded;
        self.invalidate(id, true);

        if let Some(index) = index {
            let visible = self.visible_children(id);
            self.show_after(index, visible);
        }

        true
    }

    /// Promote `child` into `parent`'s slot; `parent` becomes `child`'s first child
    pub(crate) fn swap(
        &mut self,
        parent: NodeId,
        child: NodeId,
        reason: ReparentReason,
    ) -> Result<(), TreeError> {
        let grandparent = self.nodes[parent.0]
            .parent
            .ok_or(TreeError::MissingParent(parent))?;

        let siblings = self.children_mut(grandparent);
        let slot = siblings
            .iter()
            .position(|&id| id == parent)
            .ok_or(TreeError::NotAChild {
                parent: grandparent,
                child: parent,
            })?;
        siblings[slot] = child;
        self.set_parent(child, Some(grandparent));

        self.children_mut(parent).retain(|&id| id != child);
        self.children_mut(child).insert(0, parent);
        self.set_parent(parent, Some(child));

        self.nodes[parent.0].reparent_reason = Some(reason);
        self.nodes[child.0].reparent_reason = Some(reason);
        Ok(())
    }

    /// Deep-copy a node's stored subtree. The copy has the same parent as
    /// the source until the caller attaches it elsewhere.
    pub(crate) fn clone_subtree(&mut self, source: NodeId) -> NodeId {
        let mut order = Vec::new();
        let mut stack = vec![source];
        while let Some(next) = stack.pop() {
            order.push(next);
            stack.extend(self.stored_children(next));
        }

        let mut mapping = HashMap::with_capacity(order.len());
        for &original in &order {
            let copy = self.nodes[original.0].clone();
            let id = self.alloc(copy);
            mapping.insert(original, id);
        }

        let remap = |id: NodeId| mapping.get(&id).copied().unwrap_or(id);
        for &original in &order {
            let node = &mut self.nodes[remap(original).0];
            for child in node.children.iter_mut().chain(node.span_children.iter_mut()) {
                *child = remap(*child);
            }
            node.parent = node.parent.map(remap);
            node.value.remap_ids(remap);
            node.clone_reference = None;
            node.invalidate();
        }

        let clone = remap(source);
        self.nodes[source.0].clone_reference = Some(clone);
        clone
    }

    /// Widen the trace bounds to cover `[start, end]`, notifying listeners on change
    pub(crate) fn widen_trace_space(&mut self, start: f64, end: f64) -> bool {
        if !(start.is_finite() && end.is_finite()) {
            return false;
        }

        let previous = self.nodes[self.root.0].space;
        let space = match previous {
            Some([previous_start, previous_duration]) => {
                let new_start = previous_start.min(start);
                let new_end = (previous_start + previous_duration).max(end);
                [new_start, new_end - new_start]
            }
            None => [start, end - start],
        };

        if previous == Some(space) {
            return false;
        }

        self.nodes[self.root.0].space = Some(space);
        if let Some(trace) = self.trace_node() {
            self.nodes[trace.0].space = Some(space);
        }
        self.events.dispatch(&TraceTreeEvent::TimelineChange(space));
        true
    }

    /// Human readable dump of the visible nodes, one per line
    pub fn print(&self) -> String {
        self.list
            .iter()
            .map(|&id| format!("{}{}", "  ".repeat(self.depth(id)), self.label(id)))
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn label(&self, id: NodeId) -> String {
        match &self.nodes[id.0].value {
            NodeValue::Root => "Root".to_string(),
            NodeValue::Trace(_) => "Trace".to_string(),
            NodeValue::Transaction(txn) if txn.transaction.is_empty() => {
                "unknown transaction".to_string()
            }
            NodeValue::Transaction(txn) => txn.transaction.clone(),
            NodeValue::Span(span) => {
                let op = span.span.op.as_deref().unwrap_or(&span.span.span_id);
                match &span.span.description {
                    Some(description) => format!("{op} {description}"),
                    None => op.to_string(),
                }
            }
            NodeValue::TraceError(error) if error.event_id.is_empty() => error.level.clone(),
            NodeValue::TraceError(error) => error.event_id.clone(),
            NodeValue::MissingInstrumentation(_) => "missing_instrumentation".to_string(),
            NodeValue::ParentAutogroup(group) => {
                format!("parent autogroup ({})", group.group_count)
            }
            NodeValue::SiblingAutogroup(group) => {
                format!("sibling autogroup ({})", group.group_count)
            }
        }
    }
}

impl std::fmt::Debug for TraceTree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TraceTree")
            .field("kind", &self.kind)
            .field("nodes", &self.nodes.len())
            .field("visible", &self.list.len())
            .finish()
    }
}
