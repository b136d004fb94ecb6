use crate::guards::*;
use crate::node::*;
use crate::tree::TraceTree;

impl TraceTree {
    /// Pre-order search below (and including) `start`.
    ///
    /// Chain autogroups are searched through their head, so results do not
    /// depend on whether the group is expanded.
    pub fn find(
        &self,
        start: NodeId,
        mut predicate: impl FnMut(NodeId, &Node) -> bool,
    ) -> Option<NodeId> {
        let mut stack = vec![start];
        while let Some(next) = stack.pop() {
            let node = &self.nodes[next.0];
            if predicate(next, node) {
                return Some(next);
            }
            match &node.value {
                NodeValue::ParentAutogroup(group) => stack.push(group.head),
                _ => stack.extend(self.children(next).iter().rev()),
            }
        }
        None
    }

    /// Visit `start` and everything below it, in the same order as [`TraceTree::find`]
    pub fn for_each_child(&self, start: NodeId, mut visit: impl FnMut(NodeId, &Node)) {
        self.find(start, |id, node| {
            visit(id, node);
            false
        });
    }

    /// Transaction, span or error with the given id; failing that, the
    /// first node carrying an error or performance issue with that id
    pub fn find_by_event_id(&self, start: NodeId, event_id: &str) -> Option<NodeId> {
        self.find(start, |_, node| match &node.value {
            NodeValue::Transaction(txn) => txn.event_id == event_id,
            NodeValue::Span(span) => span.span.span_id == event_id,
            NodeValue::TraceError(error) => error.event_id == event_id,
            _ => false,
        })
        .or_else(|| {
            self.find(start, |_, node| {
                !is_trace(node)
                    && (node.errors.contains_key(event_id)
                        || node.performance_issues.contains_key(event_id))
            })
        })
    }

    /// Span or transaction with the given span id; failing that, the first
    /// node carrying an issue raised in that span
    pub fn find_by_span_id(&self, start: NodeId, span_id: &str) -> Option<NodeId> {
        self.find(start, |_, node| match &node.value {
            NodeValue::Transaction(txn) => txn.span_id == span_id,
            NodeValue::Span(span) => span.span.span_id == span_id,
            _ => false,
        })
        .or_else(|| {
            self.find(start, |_, node| {
                !is_trace(node)
                    && (node.errors.iter().any(|error| error.span.as_deref() == Some(span_id))
                        || node.performance_issues.iter().any(|issue| {
                            issue.span.iter().any(|id| id == span_id)
                                || issue.suspect_spans.iter().any(|id| id == span_id)
                        }))
            })
        })
    }

    /// Closest transaction at or above a node
    pub fn parent_transaction(&self, id: NodeId) -> Option<NodeId> {
        let mut current = Some(id);
        while let Some(next) = current {
            if is_transaction(&self.nodes[next.0]) {
                return Some(next);
            }
            current = self.nodes[next.0].parent;
        }
        None
    }

    /// Span id of a span, chain autogroup head or first sibling-group member
    pub(crate) fn span_id_of(&self, id: NodeId) -> Option<&str> {
        match &self.nodes[id.0].value {
            NodeValue::Span(span) => Some(&span.span.span_id),
            NodeValue::ParentAutogroup(group) => self.span_id_of(group.head),
            NodeValue::SiblingAutogroup(_) => self.nodes[id.0]
                .children
                .first()
                .and_then(|&first| match &self.nodes[first.0].value {
                    NodeValue::Span(span) => Some(span.span.span_id.as_str()),
                    _ => None,
                }),
            _ => None,
        }
    }
}
