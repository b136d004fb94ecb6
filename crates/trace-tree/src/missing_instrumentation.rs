use crate::node::*;
use crate::tree::TraceTree;

/// Gap between two sibling spans, in seconds, above which a placeholder is inserted
pub const MISSING_INSTRUMENTATION_THRESHOLD: f64 = 0.1;

/// Whether the time between two adjacent real spans looks uninstrumented
pub fn should_insert_missing_instrumentation(previous: &Node, current: &Node) -> bool {
    match (&previous.value, &current.value) {
        (NodeValue::Span(previous), NodeValue::Span(current)) => {
            current.span.start_timestamp - previous.span.timestamp
                > MISSING_INSTRUMENTATION_THRESHOLD
        }
        _ => false,
    }
}

impl TraceTree {
    /// Allocate a placeholder spanning the gap between `previous` and `next`
    pub(crate) fn missing_instrumentation_node(
        &mut self,
        previous: NodeId,
        next: NodeId,
        metadata: Metadata,
    ) -> NodeId {
        let start_timestamp = self.nodes[previous.0].value.end_timestamp().unwrap_or_default();
        let timestamp = self.nodes[next.0].value.start_timestamp().unwrap_or_default();
        self.alloc(Node::new(
            NodeValue::MissingInstrumentation(MissingInstrumentationSpan {
                start_timestamp,
                timestamp,
                previous,
                next,
            }),
            metadata,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trace_tree_protocol::RawSpan;

    fn span(start: f64, end: f64) -> Node {
        let span: RawSpan = serde_json::from_value(serde_json::json!({
            "span_id": format!("{start}"),
            "start_timestamp": start,
            "timestamp": end,
        }))
        .unwrap();
        Node::new(
            NodeValue::Span(SpanValue {
                span,
                event_id: None,
                child_transactions: Vec::new(),
            }),
            Metadata::default(),
        )
    }

    #[test]
    fn gap_must_exceed_threshold() {
        assert!(!should_insert_missing_instrumentation(&span(0.0, 1.0), &span(1.05, 2.0)));
        assert!(should_insert_missing_instrumentation(&span(0.0, 1.0), &span(1.2, 2.0)));
        assert!(!should_insert_missing_instrumentation(&span(0.0, 1.0), &span(0.5, 2.0)));
    }
}
