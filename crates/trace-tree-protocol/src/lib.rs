//! Payload definitions for the trace tree.
//!
//! This crate defines the transaction, span, error and event shapes returned by
//! the trace and event endpoints, plus the replay metadata used to widen trace bounds.

pub mod event;
pub mod replay;
pub mod trace;

pub use event::*;
pub use replay::*;
pub use trace::*;
