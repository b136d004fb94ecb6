use std::cell::Cell;
use std::collections::HashSet;
use std::fmt;

use trace_tree_protocol::*;

/// Handle to a node stored in a [`TraceTree`](crate::TraceTree) arena.
///
/// Ids are only meaningful for the tree that produced them.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    /// Position of the node in its tree's arena
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self.0)
    }
}

/// Absolute time bounds as `[start, duration]`, in seconds
pub type Space = [f64; 2];

/// Progress of a zoom-in request
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FetchStatus {
    #[default]
    Idle,
    Loading,
    Resolved,
    Error,
}

/// Project and event a node's spans are fetched from
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Metadata {
    pub project_slug: Option<String>,
    pub event_id: Option<EventId>,
}

/// Why two transactions traded places in the tree
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReparentReason {
    /// A pageload was the only pageload child of a server request handler
    PageloadServerHandler,
}

/// Fetched span, with the transactions that were reparented under it
#[derive(Clone, Debug, PartialEq)]
pub struct SpanValue {
    pub span: RawSpan,
    /// Event the span was fetched from
    pub event_id: Option<EventId>,
    pub child_transactions: Vec<NodeId>,
}

/// Synthetic placeholder covering an uninstrumented gap between two spans
#[derive(Clone, Debug, PartialEq)]
pub struct MissingInstrumentationSpan {
    pub start_timestamp: f64,
    pub timestamp: f64,
    pub previous: NodeId,
    pub next: NodeId,
}

/// Collapsed run of single-child spans sharing one operation
#[derive(Clone, Debug, PartialEq)]
pub struct ParentAutogroup {
    /// Head span with its bounds widened to the whole run
    pub span: RawSpan,
    pub op: Option<String>,
    pub head: NodeId,
    pub tail: NodeId,
    pub group_count: usize,
}

/// Collapsed run of identical adjacent leaf spans
#[derive(Clone, Debug, PartialEq)]
pub struct SiblingAutogroup {
    pub span: RawSpan,
    pub op: Option<String>,
    pub description: Option<String>,
    pub group_count: usize,
}

/// Value held by a node
#[derive(Clone, Debug, PartialEq)]
pub enum NodeValue {
    /// Virtual sentinel above the trace node
    Root,
    /// Top-level payload; nested transaction children live in the tree, not here
    Trace(TraceSplitResult),
    /// Transaction; its nested `children` are moved into the tree at build time
    Transaction(Transaction),
    Span(SpanValue),
    TraceError(TraceError),
    MissingInstrumentation(MissingInstrumentationSpan),
    ParentAutogroup(ParentAutogroup),
    SiblingAutogroup(SiblingAutogroup),
}

impl NodeValue {
    pub fn start_timestamp(&self) -> Option<f64> {
        match self {
            NodeValue::Transaction(txn) => Some(txn.start_timestamp),
            NodeValue::Span(span) => Some(span.span.start_timestamp),
            NodeValue::TraceError(error) => error.timestamp,
            NodeValue::MissingInstrumentation(gap) => Some(gap.start_timestamp),
            NodeValue::ParentAutogroup(group) => Some(group.span.start_timestamp),
            NodeValue::SiblingAutogroup(group) => Some(group.span.start_timestamp),
            NodeValue::Root | NodeValue::Trace(_) => None,
        }
    }

    pub fn end_timestamp(&self) -> Option<f64> {
        match self {
            NodeValue::Transaction(txn) => Some(txn.timestamp),
            NodeValue::Span(span) => Some(span.span.timestamp),
            NodeValue::TraceError(error) => error.timestamp,
            NodeValue::MissingInstrumentation(gap) => Some(gap.timestamp),
            NodeValue::ParentAutogroup(group) => Some(group.span.timestamp),
            NodeValue::SiblingAutogroup(group) => Some(group.span.timestamp),
            NodeValue::Root | NodeValue::Trace(_) => None,
        }
    }

    /// Rewrite every node reference held inside the value
    pub(crate) fn remap_ids(&mut self, remap: impl Fn(NodeId) -> NodeId) {
        match self {
            NodeValue::Span(span) => {
                for id in &mut span.child_transactions {
                    *id = remap(*id);
                }
            }
            NodeValue::MissingInstrumentation(gap) => {
                gap.previous = remap(gap.previous);
                gap.next = remap(gap.next);
            }
            NodeValue::ParentAutogroup(group) => {
                group.head = remap(group.head);
                group.tail = remap(group.tail);
            }
            _ => {}
        }
    }
}

/// Identifier used to deduplicate issues attached to nodes
pub trait IssueKey {
    fn issue_key(&self) -> &str;
}

impl IssueKey for TraceError {
    fn issue_key(&self) -> &str {
        &self.event_id
    }
}

impl IssueKey for TracePerformanceIssue {
    fn issue_key(&self) -> &str {
        &self.event_id
    }
}

/// Insertion-ordered set of issues, keyed by the issue's own event id
#[derive(Clone, Debug)]
pub struct IssueSet<T> {
    items: Vec<T>,
    keys: HashSet<String>,
}

impl<T> Default for IssueSet<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            keys: HashSet::new(),
        }
    }
}

impl<T: IssueKey> IssueSet<T> {
    /// Returns false when an issue with the same key is already present
    pub fn insert(&mut self, item: T) -> bool {
        if !self.keys.insert(item.issue_key().to_string()) {
            return false;
        }
        self.items.push(item);
        true
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.keys.contains(key)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<T: IssueKey + Clone> IssueSet<T> {
    pub fn union(&mut self, other: &IssueSet<T>) {
        for item in other.iter() {
            self.insert(item.clone());
        }
    }
}

impl<'a, T> IntoIterator for &'a IssueSet<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

/// A node of the trace tree.
///
/// Structure (`parent`, child lists) is owned by the tree; nodes expose it
/// read-only. The active child list is `span_children` once the node is
/// zoomed in, `children` otherwise. Chain autogroups derive theirs from
/// `head`/`tail`, see [`TraceTree::children`](crate::TraceTree::children).
#[derive(Clone, Debug)]
pub struct Node {
    pub(crate) value: NodeValue,
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
    pub(crate) span_children: Vec<NodeId>,
    pub(crate) metadata: Metadata,
    pub(crate) expanded: bool,
    pub(crate) zoomed_in: bool,
    pub(crate) can_fetch: bool,
    pub(crate) fetch_status: FetchStatus,
    pub(crate) errors: IssueSet<TraceError>,
    pub(crate) performance_issues: IssueSet<TracePerformanceIssue>,
    pub(crate) profiles: Vec<String>,
    pub(crate) space: Option<Space>,
    pub(crate) reparent_reason: Option<ReparentReason>,
    pub(crate) clone_reference: Option<NodeId>,
    pub(crate) depth: Cell<Option<usize>>,
    pub(crate) is_last_child: Cell<Option<bool>>,
}

impl Node {
    pub(crate) fn new(value: NodeValue, metadata: Metadata) -> Self {
        let expanded = matches!(
            value,
            NodeValue::Root | NodeValue::Trace(_) | NodeValue::Transaction(_)
        );

        let space = match (value.start_timestamp(), value.end_timestamp()) {
            (Some(start), Some(end)) => Some([start, end - start]),
            _ => None,
        };

        let mut node = Self {
            value,
            parent: None,
            children: Vec::new(),
            span_children: Vec::new(),
            metadata,
            expanded,
            zoomed_in: false,
            can_fetch: false,
            fetch_status: FetchStatus::Idle,
            errors: IssueSet::default(),
            performance_issues: IssueSet::default(),
            profiles: Vec::new(),
            space,
            reparent_reason: None,
            clone_reference: None,
            depth: Cell::new(None),
            is_last_child: Cell::new(None),
        };

        if let NodeValue::Transaction(txn) = &node.value {
            let errors = txn.errors.clone();
            let issues = txn.performance_issues.clone();
            let profile = txn.profile_id.clone().filter(|id| !id.is_empty());

            for error in errors {
                node.errors.insert(error);
            }
            for issue in issues {
                node.performance_issues.insert(issue);
            }
            node.profiles.extend(profile);
        }

        node
    }

    pub fn value(&self) -> &NodeValue {
        &self.value
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn expanded(&self) -> bool {
        self.expanded
    }

    pub fn zoomed_in(&self) -> bool {
        self.zoomed_in
    }

    /// Whether the transaction has at least two spans worth fetching
    pub fn can_fetch(&self) -> bool {
        self.can_fetch
    }

    pub fn fetch_status(&self) -> FetchStatus {
        self.fetch_status
    }

    pub fn errors(&self) -> &IssueSet<TraceError> {
        &self.errors
    }

    pub fn performance_issues(&self) -> &IssueSet<TracePerformanceIssue> {
        &self.performance_issues
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty() || !self.performance_issues.is_empty()
    }

    pub fn profiles(&self) -> &[String] {
        &self.profiles
    }

    pub fn space(&self) -> Option<Space> {
        self.space
    }

    pub fn reparent_reason(&self) -> Option<ReparentReason> {
        self.reparent_reason
    }

    /// Copy of this node made when it was reparented under a fetched span
    pub fn clone_reference(&self) -> Option<NodeId> {
        self.clone_reference
    }

    /// Transaction-level children, regardless of zoom state
    pub fn transaction_children(&self) -> &[NodeId] {
        &self.children
    }

    /// Fetched span children, regardless of zoom state
    pub fn span_children(&self) -> &[NodeId] {
        &self.span_children
    }

    /// Start of the node in seconds, preferring computed bounds
    pub fn start(&self) -> f64 {
        match self.space {
            Some([start, _]) => start,
            None => self.value.start_timestamp().unwrap_or(0.0),
        }
    }

    /// Clear cached render-derived state
    pub fn invalidate(&self) {
        self.depth.set(None);
        self.is_last_child.set(None);
    }
}
