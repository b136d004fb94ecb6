use std::fmt;

use trace_tree_protocol::TraceSplitResult;

use crate::guards::{is_javascript_sdk_transaction, is_root_transaction};

/// How the top level of a trace is put together
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TraceShape {
    OneRoot,
    NoRoot,
    BrowserMultipleRoots,
    MultipleRoots,
    BrokenSubtraces,
    OnlyErrors,
    EmptyTrace,
}

impl TraceShape {
    /// Classify a trace payload by its top-level transactions
    pub fn classify(trace: &TraceSplitResult) -> Self {
        let mut roots = 0;
        let mut orphans = 0;
        let mut javascript_roots = 0;

        for txn in &trace.transactions {
            if is_root_transaction(txn) {
                roots += 1;
                if is_javascript_sdk_transaction(txn) {
                    javascript_roots += 1;
                }
            } else {
                orphans += 1;
            }
        }

        match roots {
            0 if orphans > 0 => TraceShape::NoRoot,
            0 if !trace.orphan_errors.is_empty() => TraceShape::OnlyErrors,
            0 => TraceShape::EmptyTrace,
            1 if orphans > 0 => TraceShape::BrokenSubtraces,
            1 => TraceShape::OneRoot,
            _ if javascript_roots > 0 => TraceShape::BrowserMultipleRoots,
            _ => TraceShape::MultipleRoots,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TraceShape::OneRoot => "one_root",
            TraceShape::NoRoot => "no_root",
            TraceShape::BrowserMultipleRoots => "browser_multiple_roots",
            TraceShape::MultipleRoots => "multiple_roots",
            TraceShape::BrokenSubtraces => "broken_subtraces",
            TraceShape::OnlyErrors => "only_errors",
            TraceShape::EmptyTrace => "empty_trace",
        }
    }
}

impl fmt::Display for TraceShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
