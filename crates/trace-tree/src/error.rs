use crate::node::NodeId;
use crate::path::NodePath;

#[derive(Debug, thiserror::Error)]
pub enum TreeError {
    #[error("node {0:?} has no parent")]
    MissingParent(NodeId),

    #[error("node {child:?} is not a child of {parent:?}")]
    NotAChild { parent: NodeId, child: NodeId },

    #[error("tree has no trace node")]
    MissingTraceNode,

    #[error("unsupported measurement unit: {0}")]
    UnsupportedMeasurementUnit(String),

    #[error("invalid path segment: {0}")]
    InvalidPath(String),

    #[error("no node matches path segment {0}")]
    PathSegmentNotFound(NodePath),

    #[error("the root node has no path")]
    RootHasNoPath,

    #[error("node {0:?} cannot be addressed by a path")]
    Unaddressable(NodeId),

    #[error("node {0:?} has no project or event to fetch spans from")]
    MissingMetadata(NodeId),
}
