//! Autogrouping passes run over freshly fetched span subtrees.
//!
//! Chain autogroups wrap a run of single-child spans that share an
//! operation; the run's downstream children hang off the tail. Sibling
//! autogroups wrap runs of identical adjacent leaf spans.

use crate::error::TreeError;
use crate::guards::{is_autogroup, is_span};
use crate::node::*;
use crate::tree::TraceTree;

/// Siblings needed to form a sibling autogroup
pub const MIN_SIBLING_GROUP: usize = 5;

impl TraceTree {
    fn span_value(&self, id: NodeId) -> Option<&SpanValue> {
        match &self.nodes[id.0].value {
            NodeValue::Span(span) => Some(span),
            _ => None,
        }
    }

    fn is_matching_sibling(&self, current: NodeId, next: NodeId) -> bool {
        let (Some(a), Some(b)) = (self.span_value(current), self.span_value(next)) else {
            return false;
        };
        self.children(current).is_empty()
            && self.children(next).is_empty()
            && a.span.op == b.span.op
            && a.span.description == b.span.description
    }

    /// Wrap every run of at least five identical adjacent leaf spans, below `root`
    pub fn autogroup_siblings(&mut self, root: NodeId) {
        let mut stack = vec![root];

        while let Some(node) = stack.pop() {
            // Groups carried in from cloned, already zoomed transactions are final
            if is_autogroup(&self.nodes[node.0]) {
                continue;
            }
            stack.extend(self.children(node).iter());

            if self.children(node).len() < MIN_SIBLING_GROUP {
                continue;
            }

            let mut index = 0;
            let mut match_count = 0;
            while index < self.children(node).len() {
                let children = self.children(node);
                let current = children[index];
                if !is_span(&self.nodes[current.0]) {
                    index += 1;
                    match_count = 0;
                    continue;
                }

                if let Some(&next) = children.get(index + 1) {
                    if self.is_matching_sibling(current, next) {
                        match_count += 1;
                        index += 1;
                        continue;
                    }
                }

                if match_count >= MIN_SIBLING_GROUP - 1 {
                    let start = index - match_count;
                    self.group_siblings(node, start, match_count + 1);
                    index = start + 1;
                } else {
                    index += 1;
                }
                match_count = 0;
            }
        }
    }

    fn group_siblings(&mut self, parent: NodeId, start: usize, count: usize) -> NodeId {
        let members: Vec<NodeId> = self.children_mut(parent).drain(start..start + count).collect();

        let mut first_span = None;
        let mut start_timestamp = f64::INFINITY;
        let mut timestamp = f64::NEG_INFINITY;
        let mut errors = IssueSet::default();
        let mut performance_issues = IssueSet::default();
        for &member in &members {
            let node = &self.nodes[member.0];
            if let NodeValue::Span(span) = &node.value {
                first_span.get_or_insert_with(|| span.span.clone());
                start_timestamp = start_timestamp.min(span.span.start_timestamp);
                timestamp = timestamp.max(span.span.timestamp);
            }
            errors.union(&node.errors);
            performance_issues.union(&node.performance_issues);
        }

        let mut span = first_span.unwrap_or_else(|| empty_span(start_timestamp, timestamp));
        span.start_timestamp = start_timestamp;
        span.timestamp = timestamp;
        let value = SiblingAutogroup {
            op: span.op.clone(),
            description: span.description.clone(),
            span,
            group_count: count,
        };

        let mut node = Node::new(NodeValue::SiblingAutogroup(value), Metadata::default());
        node.space = Some([start_timestamp, timestamp - start_timestamp]);
        node.errors = errors;
        node.performance_issues = performance_issues;
        node.children = members.clone();
        let group = self.alloc(node);

        for member in members {
            self.set_parent(member, Some(group));
        }
        self.children_mut(parent).insert(start, group);
        self.set_parent(group, Some(parent));
        group
    }

    /// Wrap every chain of single-child spans sharing an operation, below `root`
    pub fn autogroup_chains(&mut self, root: NodeId) -> Result<(), TreeError> {
        let mut stack = vec![root];

        while let Some(node) = stack.pop() {
            if is_autogroup(&self.nodes[node.0]) {
                continue;
            }
            let Some(head_span) = self.span_value(node) else {
                stack.extend(self.children(node).iter());
                continue;
            };
            if node == root || self.children(node).len() > 1 {
                stack.extend(self.children(node).iter());
                continue;
            }

            let op = head_span.span.op.clone();
            let mut run = vec![node];
            let mut tail = node;
            loop {
                let children = self.children(tail);
                if children.len() != 1 {
                    break;
                }
                let next = children[0];
                match self.span_value(next) {
                    Some(span) if span.span.op == op => {
                        run.push(next);
                        tail = next;
                    }
                    _ => break,
                }
            }

            if run.len() < 2 {
                stack.extend(self.children(node).iter());
                continue;
            }

            let head = node;
            let parent = self.nodes[head.0]
                .parent
                .ok_or(TreeError::MissingParent(head))?;

            let mut start_timestamp = f64::INFINITY;
            let mut timestamp = f64::NEG_INFINITY;
            let mut errors = IssueSet::default();
            let mut performance_issues = IssueSet::default();
            for &member in &run {
                let member = &self.nodes[member.0];
                if let NodeValue::Span(span) = &member.value {
                    start_timestamp = start_timestamp.min(span.span.start_timestamp);
                    timestamp = timestamp.max(span.span.timestamp);
                }
                errors.union(&member.errors);
                performance_issues.union(&member.performance_issues);
            }

            let mut span = self
                .span_value(head)
                .map(|value| value.span.clone())
                .unwrap_or_else(|| empty_span(start_timestamp, timestamp));
            span.start_timestamp = start_timestamp;
            span.timestamp = timestamp;

            let mut group_node = Node::new(
                NodeValue::ParentAutogroup(ParentAutogroup {
                    span,
                    op,
                    head,
                    tail,
                    group_count: run.len(),
                }),
                Metadata::default(),
            );
            group_node.space = Some([start_timestamp, timestamp - start_timestamp]);
            group_node.errors = errors;
            group_node.performance_issues = performance_issues;
            let group = self.alloc(group_node);

            let siblings = self.children_mut(parent);
            let slot = siblings
                .iter()
                .position(|&id| id == head)
                .ok_or(TreeError::NotAChild { parent, child: head })?;
            siblings[slot] = group;
            self.set_parent(group, Some(parent));
            self.set_parent(head, Some(group));

            for &member in &run {
                self.nodes[member.0].expanded = true;
            }

            for child in self.children(tail).to_vec() {
                self.set_parent(child, Some(group));
                stack.push(child);
            }
        }

        Ok(())
    }
}

fn empty_span(start_timestamp: f64, timestamp: f64) -> trace_tree_protocol::RawSpan {
    trace_tree_protocol::RawSpan {
        span_id: String::new(),
        parent_span_id: None,
        trace_id: String::new(),
        op: None,
        description: None,
        start_timestamp,
        timestamp,
        exclusive_time: None,
        status: None,
        origin: None,
        hash: None,
        data: Default::default(),
        measurements: Default::default(),
    }
}
