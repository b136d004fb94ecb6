use futures::future::join_all;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use trace_tree_protocol::{ReplayTrace, TraceMeta, TraceSplitResult};

use crate::api::{FetchContext, TraceQueryParams};
use crate::error::TreeError;
use crate::node::*;
use crate::tree::TraceTree;

impl TraceTree {
    /// Merge another tree's trace into this one.
    ///
    /// The other trace's children are appended after ours in their own
    /// order; issue sets, vitals and indicators are unioned.
    pub fn append_tree(&mut self, other: TraceTree) -> Result<(), TreeError> {
        let base = self.trace_node().ok_or(TreeError::MissingTraceNode)?;
        let other_trace = other.trace_node().ok_or(TreeError::MissingTraceNode)?;

        let offset = self.nodes.len();
        let shift = |id: NodeId| NodeId(id.0 + offset);

        let TraceTree {
            nodes,
            vitals,
            vital_types,
            indicators,
            profiled_events,
            project_ids,
            events_count,
            ..
        } = other;

        for mut node in nodes {
            node.parent = node.parent.map(shift);
            for child in node.children.iter_mut().chain(node.span_children.iter_mut()) {
                *child = shift(*child);
            }
            node.clone_reference = node.clone_reference.map(shift);
            node.value.remap_ids(shift);
            node.invalidate();
            self.nodes.push(node);
        }
        let other_trace = shift(other_trace);

        let previous_last = self.children(base).last().copied();
        let appended = std::mem::take(&mut self.nodes[other_trace.0].children);
        for &child in &appended {
            self.children_mut(base).push(child);
            self.set_parent(child, Some(base));
        }
        if let Some(last) = previous_last {
            self.invalidate(last, true);
        }

        let (errors, performance_issues, profiles) = {
            let trace = &self.nodes[other_trace.0];
            (
                trace.errors.clone(),
                trace.performance_issues.clone(),
                trace.profiles.clone(),
            )
        };
        let trace = &mut self.nodes[base.0];
        trace.errors.union(&errors);
        trace.performance_issues.union(&performance_issues);
        trace.profiles.extend(profiles);

        for (id, collected) in vitals {
            self.vitals.insert(shift(id), collected);
        }
        self.vital_types.extend(vital_types);
        self.indicators.extend(indicators);
        self.indicators.sort_by(|a, b| a.start.total_cmp(&b.start));
        self.profiled_events
            .extend(profiled_events.into_iter().map(shift));
        self.project_ids.extend(project_ids);
        self.events_count += events_count;

        if self.nodes[base.0].expanded && self.list_index(base).is_some() {
            for child in appended {
                let visible = self.visible_children(child);
                self.show_at_end(std::iter::once(child).chain(visible));
            }
        }

        if let Some([start, duration]) = self.nodes[other_trace.0].space {
            self.widen_trace_space(start, start + duration);
        }

        Ok(())
    }

    /// Fetch the other traces linked to the same replay and append them,
    /// a few at a time.
    ///
    /// A failed trace does not stop the others in its batch. Cancelling
    /// `cancel` stops scheduling further batches; a batch already in flight
    /// is discarded once it settles.
    pub async fn fetch_additional_traces(
        &mut self,
        ctx: &FetchContext,
        replay_traces: &[ReplayTrace],
        params: &TraceQueryParams,
        meta: Option<&TraceMeta>,
        cancel: &CancellationToken,
        mut rerender: impl FnMut(&TraceTree),
    ) -> Result<(), TreeError> {
        let trace = self.trace_node().ok_or(TreeError::MissingTraceNode)?;
        self.nodes[trace.0].fetch_status = FetchStatus::Loading;
        rerender(self);

        let batch_size = self.config.additional_traces_batch_size.max(1);
        for batch in replay_traces.chunks(batch_size) {
            if cancel.is_cancelled() {
                break;
            }

            let requests = batch.iter().map(|linked| {
                let query = params.with_timestamp(linked.timestamp).to_query_string();
                ctx.api
                    .fetch_trace(&ctx.organization, &linked.trace_slug, &query)
            });
            let results = join_all(requests).await;

            if cancel.is_cancelled() {
                break;
            }

            let mut merged = TraceSplitResult::default();
            for (linked, result) in batch.iter().zip(results) {
                match result {
                    Ok(payload) => merged.extend(payload),
                    Err(error) => {
                        warn!(trace_id = %linked.trace_slug, %error, "failed to fetch linked trace")
                    }
                }
            }

            info!(
                traces = batch.len(),
                transactions = merged.transactions.len(),
                "appending linked traces"
            );

            let tree =
                TraceTree::build_from_trace_with_config(merged, meta, None, self.config.clone())?;
            self.append_tree(tree)?;
            rerender(self);
        }

        self.nodes[trace.0].fetch_status = FetchStatus::Idle;
        rerender(self);
        Ok(())
    }
}
