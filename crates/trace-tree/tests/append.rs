mod common;

use common::*;
use tokio_util::sync::CancellationToken;
use trace_tree::*;

fn linked(trace_slug: &str) -> ReplayTrace {
    ReplayTrace {
        trace_slug: trace_slug.to_string(),
        timestamp: Some(1_700_000_000),
    }
}

fn single(event_id: &str, start: f64) -> TraceSplitResult {
    trace(vec![txn(event_id, start, start + 1.0)], Vec::new())
}

#[test]
fn appended_trace_follows_the_existing_children() {
    let mut tree = build(vec![txn("t1", 0.0, 10.0)]);
    let mut other_txn = txn("t2", 20.0, 30.0);
    other_txn.profile_id = Some("profile-2".to_string());
    let other =
        TraceTree::build_from_trace(trace(vec![other_txn], vec![error("e1", 25.0)]), None, None)
            .unwrap();

    tree.append_tree(other).unwrap();

    assert_eq!(visible_ids(&tree), ["trace", "t1", "t2", "e1"]);
    assert_list_consistent(&tree);
    assert_eq!(tree.events_count(), 3);
    assert_eq!(tree.project_ids().iter().copied().collect::<Vec<_>>(), [1, 2]);
    assert_eq!(tree.node(tree.root()).space(), Some([0.0, 30.0]));

    let trace = tree.trace_node().unwrap();
    assert!(tree.node(trace).errors().contains_key("e1"));
    assert!(!tree.is_last_child(find_txn(&tree, "t1")));

    let t2 = find_txn(&tree, "t2");
    assert_eq!(tree.node(t2).parent(), Some(trace));
    assert_eq!(tree.depth(t2), 1);
    assert!(tree.profiled_events().contains(&t2));
}

#[tokio::test]
async fn linked_traces_are_fetched_in_batches() {
    let (api, ctx) = StubApi::new()
        .with_trace("a", single("ta", 20.0))
        .with_trace("c", single("tc", 30.0))
        .with_trace("d", single("td", 40.0))
        .into_context();
    let mut tree = build(vec![txn("t1", 0.0, 10.0)]);
    let trace = tree.trace_node().unwrap();

    let mut statuses = Vec::new();
    let mut sizes = Vec::new();
    tree.fetch_additional_traces(
        &ctx,
        &[linked("a"), linked("b"), linked("c"), linked("d")],
        &TraceQueryParams::default(),
        None,
        &CancellationToken::new(),
        |tree| {
            statuses.push(tree.node(trace).fetch_status());
            sizes.push(tree.list().len());
        },
    )
    .await
    .unwrap();

    assert_eq!(api.trace_calls(), ["a", "b", "c", "d"]);
    assert_eq!(
        statuses,
        [FetchStatus::Loading, FetchStatus::Loading, FetchStatus::Loading, FetchStatus::Idle]
    );
    assert_eq!(sizes, [2, 4, 5, 5]);
    assert_eq!(visible_ids(&tree), ["trace", "t1", "ta", "tc", "td"]);
    assert_eq!(tree.node(trace).space(), Some([0.0, 41.0]));
    assert_list_consistent(&tree);
}

#[tokio::test]
async fn cancelling_stops_further_batches() {
    let (api, ctx) = StubApi::new()
        .with_trace("a", single("ta", 20.0))
        .with_trace("d", single("td", 40.0))
        .into_context();
    let mut tree = TraceTree::build_from_trace_with_config(
        single("t1", 0.0),
        None,
        None,
        TreeConfig {
            additional_traces_batch_size: 1,
            ..TreeConfig::default()
        },
    )
    .unwrap();
    let trace = tree.trace_node().unwrap();

    let cancel = CancellationToken::new();
    let mut renders = 0;
    tree.fetch_additional_traces(
        &ctx,
        &[linked("a"), linked("d")],
        &TraceQueryParams::default(),
        None,
        &cancel,
        |_| {
            renders += 1;
            if renders == 2 {
                cancel.cancel();
            }
        },
    )
    .await
    .unwrap();

    assert_eq!(api.trace_calls(), ["a"]);
    assert_eq!(visible_ids(&tree), ["trace", "t1", "ta"]);
    assert_eq!(tree.node(trace).fetch_status(), FetchStatus::Idle);
}
