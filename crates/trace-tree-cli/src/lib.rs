mod file_api;

use anyhow::Context;
use serde::de::DeserializeOwned;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use trace_tree::guards::is_transaction;
use trace_tree::*;

pub use file_api::FileApi;

/// Where a trace and everything it may fetch comes from
#[derive(Clone, Debug)]
pub struct Source {
    /// `TraceSplitResult` JSON
    pub trace: PathBuf,
    /// `TraceMeta` JSON
    pub meta: Option<PathBuf>,
    /// `ReplayRecord` JSON
    pub replay: Option<PathBuf>,
    /// JSON list of `ReplayTrace`s to fetch and append
    pub linked: Option<PathBuf>,
    /// Directory served by [`FileApi`]
    pub events_dir: PathBuf,
    pub organization: String,
}

#[derive(Clone, Debug, Default)]
pub struct ShowOptions {
    /// Zoom into every transaction that can fetch spans
    pub zoom_all: bool,
    /// Event or span id to reveal before printing
    pub reveal: Option<String>,
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_slice(&bytes).with_context(|| format!("decoding {}", path.display()))
}

/// Build the tree described by `source`, appending linked traces if any
pub async fn load(source: &Source) -> anyhow::Result<(TraceTree, FetchContext)> {
    let trace: TraceSplitResult = read_json(&source.trace).await?;
    let meta: Option<TraceMeta> = match &source.meta {
        Some(path) => Some(read_json(path).await?),
        None => None,
    };
    let replay: Option<ReplayRecord> = match &source.replay {
        Some(path) => Some(read_json(path).await?),
        None => None,
    };

    let mut tree = TraceTree::build_from_trace(trace, meta.as_ref(), replay.as_ref())
        .context("building trace tree")?;
    let ctx = FetchContext::new(Arc::new(FileApi::new(&source.events_dir)), &source.organization);

    if let Some(path) = &source.linked {
        let linked: Vec<ReplayTrace> = read_json(path).await?;
        tree.fetch_additional_traces(
            &ctx,
            &linked,
            &TraceQueryParams::default(),
            meta.as_ref(),
            &CancellationToken::new(),
            |tree| tracing::debug!(visible = tree.list().len(), "linked traces appended"),
        )
        .await
        .context("appending linked traces")?;
    }

    tracing::info!(
        events = tree.events_count(),
        shape = %tree.shape(),
        "loaded trace"
    );
    Ok((tree, ctx))
}

/// Zoom into visible transactions until none is left to fetch.
///
/// Spans can bring cloned transactions into view, so this runs to a fixed
/// point; failed fetches are not retried.
pub async fn zoom_all(tree: &mut TraceTree, ctx: &FetchContext) -> anyhow::Result<usize> {
    let mut zoomed = 0;
    loop {
        let next = tree.list().iter().copied().find(|&id| {
            let node = tree.node(id);
            is_transaction(node)
                && node.can_fetch()
                && !node.zoomed_in()
                && node.fetch_status() == FetchStatus::Idle
        });
        let Some(id) = next else {
            return Ok(zoomed);
        };
        if tree.zoom_in(id, true, ctx).await?.is_some() {
            zoomed += 1;
        }
    }
}

/// Tree dump followed by the trace's shape, vitals and indicators
pub async fn show(source: &Source, options: &ShowOptions) -> anyhow::Result<String> {
    let (mut tree, ctx) = load(source).await?;

    if options.zoom_all {
        let zoomed = zoom_all(&mut tree, &ctx).await?;
        tracing::info!(zoomed, "zoomed into transactions");
    }

    if let Some(event_id) = &options.reveal {
        let revealed = tree.expand_to_event_id(event_id, &ctx).await?;
        if revealed.is_none() {
            anyhow::bail!("no node with id {event_id}");
        }
    }

    Ok(render(&tree))
}

pub fn render(tree: &TraceTree) -> String {
    let mut out = tree.print();
    out.push_str("\n\n");
    let _ = writeln!(out, "shape: {}", tree.shape());

    for (&id, vitals) in tree.vitals() {
        let name = match tree.node(id).value() {
            NodeValue::Transaction(txn) => txn.transaction.as_str(),
            _ => "?",
        };
        for vital in vitals {
            let value = vital.measurement.value.unwrap_or_default();
            let unit = vital.measurement.unit.as_deref().unwrap_or("millisecond");
            let _ = writeln!(out, "vital: {name} {} = {value} {unit}", vital.key);
        }
    }

    for indicator in tree.indicators() {
        let poor = if indicator.poor { " (poor)" } else { "" };
        let _ = writeln!(out, "indicator: {} @ {:.3}{poor}", indicator.label, indicator.start);
    }

    out.trim_end().to_string()
}

/// Path of every visible node, one per line, innermost segment first
pub fn paths(tree: &TraceTree) -> Result<String, TreeError> {
    let mut lines = Vec::with_capacity(tree.list().len());
    for &id in tree.list() {
        let path = tree.path_to_node(id)?;
        let segments: Vec<String> = path.iter().map(NodePath::to_string).collect();
        lines.push(segments.join(" "));
    }
    Ok(lines.join("\n"))
}
