//! Incrementally revealed trace tree for interactive trace views.
//!
//! A [`TraceTree`] is built from a trace payload, then grows as the user
//! zooms into transactions (fetching their spans) and expands or collapses
//! nodes. The tree keeps a flattened list of visible nodes in sync with
//! every mutation, ready for a virtualized renderer.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use trace_tree::{FetchContext, TraceApi, TraceSplitResult, TraceTree};
//!
//! async fn reveal(api: Arc<dyn TraceApi>, trace: TraceSplitResult) -> Result<(), Box<dyn std::error::Error>> {
//!     let ctx = FetchContext::new(api, "acme");
//!     let mut tree = TraceTree::build_from_trace(trace, None, None)?;
//!
//!     tree.on(|event| println!("{event:?}"));
//!
//!     if let Some(txn) = tree.list().get(1).copied() {
//!         tree.zoom_in(txn, true, &ctx).await?;
//!     }
//!
//!     println!("{}", tree.print());
//!     Ok(())
//! }
//! ```

mod api;
mod append;
mod autogroup;
mod config;
mod error;
mod events;
pub mod guards;
mod measurements;
mod missing_instrumentation;
mod node;
mod path;
mod search;
mod shape;
mod tree;
mod zoom;

pub use trace_tree_protocol::*;

pub use api::{FetchContext, FetchError, TraceApi, TraceQueryParams};
pub use autogroup::MIN_SIBLING_GROUP;
pub use config::TreeConfig;
pub use error::TreeError;
pub use events::{EventDispatcher, ListenerId, TraceTreeEvent};
pub use measurements::{
    collect_measurements, measurement_to_timestamp, CollectedMeasurements, CollectedVital,
    Indicator, VitalType, MOBILE_VITALS, WEB_VITALS,
};
pub use missing_instrumentation::{
    should_insert_missing_instrumentation, MISSING_INSTRUMENTATION_THRESHOLD,
};
pub use node::{
    FetchStatus, IssueKey, IssueSet, Metadata, MissingInstrumentationSpan, Node, NodeId,
    NodeValue, ParentAutogroup, ReparentReason, SiblingAutogroup, Space, SpanValue,
};
pub use path::NodePath;
pub use shape::TraceShape;
pub use tree::{SpanFetch, TraceTree, TreeKind};
pub use zoom::SpanRequest;
