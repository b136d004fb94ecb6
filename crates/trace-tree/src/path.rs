//! Stable, serializable node addresses used in deep links.

use std::fmt;
use std::str::FromStr;

use crate::api::FetchContext;
use crate::error::TreeError;
use crate::guards::*;
use crate::node::*;
use crate::tree::TraceTree;

/// One segment of a node path, e.g. `txn-<event id>` or `span-<span id>`
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum NodePath {
    Transaction(String),
    Span(String),
    Autogroup(String),
    MissingInstrumentation(String),
    Error(String),
    Empty(String),
    TraceRoot,
}

impl NodePath {
    /// Segments that only resolve once the enclosing transaction is zoomed in
    pub fn requires_spans(&self) -> bool {
        matches!(
            self,
            NodePath::Span(_)
                | NodePath::Empty(_)
                | NodePath::Autogroup(_)
                | NodePath::MissingInstrumentation(_)
        )
    }
}

impl fmt::Display for NodePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodePath::Transaction(id) => write!(f, "txn-{id}"),
            NodePath::Span(id) => write!(f, "span-{id}"),
            NodePath::Autogroup(id) => write!(f, "ag-{id}"),
            NodePath::MissingInstrumentation(id) => write!(f, "ms-{id}"),
            NodePath::Error(id) => write!(f, "error-{id}"),
            NodePath::Empty(id) => write!(f, "empty-{id}"),
            NodePath::TraceRoot => f.write_str("trace-root"),
        }
    }
}

impl FromStr for NodePath {
    type Err = TreeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "trace-root" {
            return Ok(NodePath::TraceRoot);
        }

        let (kind, id) = s
            .split_once('-')
            .ok_or_else(|| TreeError::InvalidPath(s.to_string()))?;
        if id.is_empty() {
            return Err(TreeError::InvalidPath(s.to_string()));
        }

        let id = id.to_string();
        match kind {
            "txn" => Ok(NodePath::Transaction(id)),
            "span" => Ok(NodePath::Span(id)),
            "ag" => Ok(NodePath::Autogroup(id)),
            "ms" => Ok(NodePath::MissingInstrumentation(id)),
            "error" => Ok(NodePath::Error(id)),
            "empty" => Ok(NodePath::Empty(id)),
            _ => Err(TreeError::InvalidPath(s.to_string())),
        }
    }
}

impl TraceTree {
    /// Address of a single node
    pub fn node_to_path(&self, id: NodeId) -> Result<NodePath, TreeError> {
        let node = &self.nodes[id.0];
        let span_id = |id: NodeId| {
            self.span_id_of(id)
                .map(str::to_string)
                .ok_or(TreeError::Unaddressable(id))
        };

        match &node.value {
            NodeValue::ParentAutogroup(group) => span_id(group.head).map(NodePath::Autogroup),
            NodeValue::SiblingAutogroup(_) => span_id(id).map(NodePath::Autogroup),
            NodeValue::Transaction(txn) => Ok(NodePath::Transaction(txn.event_id.clone())),
            NodeValue::Span(span) => Ok(NodePath::Span(span.span.span_id.clone())),
            NodeValue::Trace(_) => Ok(NodePath::TraceRoot),
            NodeValue::TraceError(error) => Ok(NodePath::Error(error.event_id.clone())),
            NodeValue::Root => Err(TreeError::RootHasNoPath),
            NodeValue::MissingInstrumentation(gap) => span_id(gap.previous)
                .or_else(|_| span_id(gap.next))
                .map(NodePath::MissingInstrumentation),
        }
    }

    /// Minimal sequence of segments that reveals `id` from a cold tree.
    ///
    /// Segments run from the node itself up to its outermost transaction;
    /// collapsed spans in between are skipped.
    pub fn path_to_node(&self, id: NodeId) -> Result<Vec<NodePath>, TreeError> {
        let node = &self.nodes[id.0];
        let mut nodes = vec![id];
        let mut current = node.parent;

        if is_span(node) || is_autogroup(node) {
            while let Some(next) = current {
                let next_node = &self.nodes[next.0];
                if is_span(next_node) || (is_autogroup(next_node) && !next_node.expanded) {
                    current = next_node.parent;
                } else {
                    break;
                }
            }
        }

        while let Some(mut next) = current {
            if is_transaction(&self.nodes[next.0]) {
                nodes.push(next);
            }
            if is_span(&self.nodes[next.0]) {
                nodes.push(next);
                while let Some(parent) = self.nodes[next.0].parent {
                    let parent_node = &self.nodes[parent.0];
                    if is_transaction(parent_node)
                        || (is_autogroup(parent_node) && parent_node.expanded)
                    {
                        break;
                    }
                    next = parent;
                }
            }
            if is_autogroup(&self.nodes[next.0]) {
                nodes.push(next);
            }
            current = self.nodes[next.0].parent;
        }

        nodes.into_iter().map(|id| self.node_to_path(id)).collect()
    }

    /// First node below `start` addressed by `segment`
    pub fn find_in_tree_from_segment(
        &self,
        start: NodeId,
        segment: &NodePath,
    ) -> Option<NodeId> {
        self.find(start, |id, node| match (segment, &node.value) {
            (NodePath::Transaction(event_id), NodeValue::Transaction(txn)) => {
                &txn.event_id == event_id
            }
            (NodePath::Span(span_id), NodeValue::Span(span)) => &span.span.span_id == span_id,
            (NodePath::Autogroup(span_id), NodeValue::ParentAutogroup(group)) => {
                self.span_id_of(group.head) == Some(span_id.as_str())
                    || self.span_id_of(group.tail) == Some(span_id.as_str())
            }
            (NodePath::Autogroup(span_id), NodeValue::SiblingAutogroup(_)) => {
                self.span_id_of(id) == Some(span_id.as_str())
            }
            (NodePath::MissingInstrumentation(span_id), NodeValue::MissingInstrumentation(gap)) => {
                self.span_id_of(gap.previous) == Some(span_id.as_str())
                    || self.span_id_of(gap.next) == Some(span_id.as_str())
            }
            (NodePath::Error(event_id), NodeValue::TraceError(error)) => {
                &error.event_id == event_id
            }
            (NodePath::TraceRoot, NodeValue::Trace(_)) => true,
            _ => false,
        })
    }

    /// Resolve a path without fetching or expanding anything
    pub fn find_by_path(&self, start: NodeId, path: &[NodePath]) -> Option<NodeId> {
        let mut scope = start;
        for segment in path.iter().rev() {
            scope = self.find_in_tree_from_segment(scope, segment)?;
        }
        Some(scope)
    }

    /// Replay a path produced by [`TraceTree::path_to_node`], zooming into
    /// transactions and expanding autogroups on the way, then reveal the
    /// node it resolves to.
    ///
    /// Returns `Ok(None)` when a zoom the path depends on could not fetch
    /// its spans.
    pub async fn expand_to_path(
        &mut self,
        path: &[NodePath],
        ctx: &FetchContext,
    ) -> Result<Option<NodeId>, TreeError> {
        if let [NodePath::TraceRoot] = path {
            return Ok(self.trace_node());
        }

        let mut segments = path.to_vec();
        let mut scope = self.root;

        while let Some(segment) = segments.pop() {
            let current = match self.find_in_tree_from_segment(scope, &segment) {
                Some(found) => found,
                None => match (&segment, &self.nodes[scope.0].value) {
                    // Links may address a transaction by its own span id
                    (NodePath::Span(span_id), NodeValue::Transaction(txn))
                        if &txn.span_id == span_id =>
                    {
                        scope
                    }
                    _ => return Err(TreeError::PathSegmentNotFound(segment.clone())),
                },
            };
            scope = current;

            let next_requires_spans = segments.last().is_some_and(NodePath::requires_spans);
            if is_transaction(&self.nodes[current.0]) && next_requires_spans {
                self.zoom_in(current, true, ctx).await?;
                scope = self.zoom_target(current);
                if !self.nodes[scope.0].zoomed_in {
                    return Ok(None);
                }
                continue;
            }

            if is_autogroup(&self.nodes[current.0]) && !segments.is_empty() {
                self.expand(current, true);
            }
        }

        self.reveal(scope);
        Ok(Some(scope))
    }

    /// Reveal the transaction, span or error with the given id
    pub async fn expand_to_event_id(
        &mut self,
        event_id: &str,
        ctx: &FetchContext,
    ) -> Result<Option<NodeId>, TreeError> {
        let Some(node) = self.find_by_event_id(self.root, event_id) else {
            return Ok(None);
        };
        let path = self.path_to_node(node)?;
        self.expand_to_path(&path, ctx).await
    }

    /// Open every ancestor that hides a node, outermost first
    pub fn reveal(&mut self, id: NodeId) {
        let mut edges = Vec::new();
        let mut current = id;
        while let Some(parent) = self.nodes[current.0].parent {
            edges.push((parent, current));
            current = parent;
        }

        for (parent, child) in edges.into_iter().rev() {
            // A collapsed chain autogroup is open but shows its tail's children, not its run
            let shown = self.is_open(parent) && self.children(parent).contains(&child);
            if !shown {
                self.expand(parent, true);
            }
        }
    }
}
