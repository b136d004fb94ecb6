mod common;

use common::*;
use trace_tree::*;

fn nested_spans() -> Vec<RawSpan> {
    vec![
        span("s1", "t1-root", "db", "select", 1.0, 2.0),
        span("s2", "s1", "http", "get", 1.2, 1.8),
        span("s3", "t1-root", "cache", "hit", 2.0, 3.0),
    ]
}

fn sibling_spans() -> Vec<RawSpan> {
    (0..5)
        .map(|i| {
            let start = 1.0 + i as f64 * 0.1;
            span(&format!("a{i}"), "t1-root", "db", "select", start, start + 0.1)
        })
        .collect()
}

fn chain_spans() -> Vec<RawSpan> {
    vec![
        span("c0", "t1-root", "db", "query", 1.0, 5.0),
        span("c1", "c0", "db", "query", 1.1, 5.0),
        span("c2", "c1", "db", "query", 1.2, 5.0),
        span("leaf", "c2", "http", "get", 2.0, 3.0),
    ]
}

fn cold_tree() -> TraceTree {
    let mut parent = txn("t1", 0.0, 10.0);
    parent.children.push(child_txn("c1", "s1", 1.5, 1.9));
    build(vec![parent])
}

#[tokio::test]
async fn span_path_reveals_the_span_in_a_fresh_tree() {
    let (_api, ctx) = StubApi::new().with_spans("t1", BROWSER_SDK, &nested_spans()).into_context();

    let mut warm = cold_tree();
    let t1 = find_txn(&warm, "t1");
    warm.zoom_in(t1, true, &ctx).await.unwrap();
    let path = warm.path_to_node(find_span(&warm, "s2")).unwrap();
    assert_eq!(
        path,
        [NodePath::Span("s2".into()), NodePath::Transaction("t1".into())]
    );

    let mut cold = cold_tree();
    let revealed = cold.expand_to_path(&path, &ctx).await.unwrap().unwrap();

    assert_eq!(revealed, find_span(&cold, "s2"));
    assert!(cold.list().contains(&revealed));
    assert!(cold.node(find_span(&cold, "s1")).expanded());
    assert_list_consistent(&cold);
}

#[tokio::test]
async fn nested_transaction_paths_include_every_transaction() {
    let (_api, ctx) = StubApi::new().with_spans("t1", BROWSER_SDK, &nested_spans()).into_context();
    let mut tree = cold_tree();

    let c1 = find_txn(&tree, "c1");
    assert_eq!(
        tree.path_to_node(c1).unwrap(),
        [NodePath::Transaction("c1".into()), NodePath::Transaction("t1".into())]
    );

    let t1 = find_txn(&tree, "t1");
    tree.zoom_in(t1, true, &ctx).await.unwrap();
    let clone = find_txn(&tree, "c1");
    assert_eq!(
        tree.path_to_node(clone).unwrap(),
        [
            NodePath::Transaction("c1".into()),
            NodePath::Span("s1".into()),
            NodePath::Transaction("t1".into()),
        ]
    );
}

#[tokio::test]
async fn members_of_a_collapsed_sibling_group_are_reachable() {
    let (_api, ctx) = StubApi::new().with_spans("t1", BROWSER_SDK, &sibling_spans()).into_context();
    let mut tree = build(vec![txn("t1", 0.0, 10.0)]);

    let path: Vec<NodePath> = ["span-a3", "txn-t1"].iter().map(|s| s.parse().unwrap()).collect();
    let revealed = tree.expand_to_path(&path, &ctx).await.unwrap().unwrap();

    assert_eq!(revealed, find_span(&tree, "a3"));
    assert!(tree.list().contains(&revealed));
    let group = tree.node(revealed).parent().unwrap();
    assert!(guards::is_sibling_autogroup(tree.node(group)));
    assert_eq!(tree.node_to_path(group).unwrap(), NodePath::Autogroup("a0".into()));
    assert_list_consistent(&tree);
}

#[tokio::test]
async fn members_of_a_collapsed_chain_are_reachable() {
    let (_api, ctx) = StubApi::new().with_spans("t1", BROWSER_SDK, &chain_spans()).into_context();

    let mut warm = build(vec![txn("t1", 0.0, 10.0)]);
    let t1 = find_txn(&warm, "t1");
    warm.zoom_in(t1, true, &ctx).await.unwrap();
    let group = warm.list()[2];
    assert_eq!(warm.node_to_path(group).unwrap(), NodePath::Autogroup("c0".into()));
    assert_eq!(
        warm.find_by_path(
            warm.root(),
            &[NodePath::Autogroup("c2".into()), NodePath::Transaction("t1".into())]
        ),
        Some(group)
    );
    let path = warm.path_to_node(find_span(&warm, "c1")).unwrap();
    assert_eq!(path, [NodePath::Span("c1".into()), NodePath::Transaction("t1".into())]);

    let mut cold = build(vec![txn("t1", 0.0, 10.0)]);
    let revealed = cold.expand_to_path(&path, &ctx).await.unwrap().unwrap();

    assert!(cold.list().contains(&revealed));
    assert_eq!(
        visible_ids(&cold),
        ["trace", "t1", "parent-ag", "c0", "c1", "c2", "leaf"]
    );
    assert_list_consistent(&cold);
}

#[tokio::test]
async fn event_ids_reveal_collapsed_transactions() {
    let (_api, ctx) = StubApi::new().into_context();
    let mut tree = cold_tree();
    let t1 = find_txn(&tree, "t1");
    tree.expand(t1, false);
    assert_eq!(visible_ids(&tree), ["trace", "t1"]);

    let revealed = tree.expand_to_event_id("c1", &ctx).await.unwrap();

    assert_eq!(revealed, Some(find_txn(&tree, "c1")));
    assert_eq!(visible_ids(&tree), ["trace", "t1", "c1"]);
    assert!(tree.expand_to_event_id("missing", &ctx).await.unwrap().is_none());
}

#[tokio::test]
async fn a_transaction_can_be_addressed_by_its_own_span_id() {
    let (_api, ctx) = StubApi::new().with_spans("t1", BROWSER_SDK, &nested_spans()).into_context();
    let mut tree = cold_tree();

    let path = [NodePath::Span("t1-root".into()), NodePath::Transaction("t1".into())];
    let revealed = tree.expand_to_path(&path, &ctx).await.unwrap();

    assert_eq!(revealed, Some(find_txn(&tree, "t1")));
    assert!(tree.node(find_txn(&tree, "t1")).zoomed_in());
}

#[tokio::test]
async fn unknown_segments_are_reported() {
    let (_api, ctx) = StubApi::new().into_context();
    let mut tree = cold_tree();

    let result = tree.expand_to_path(&[NodePath::Transaction("nope".into())], &ctx).await;

    assert!(matches!(
        result,
        Err(TreeError::PathSegmentNotFound(NodePath::Transaction(id))) if id == "nope"
    ));
}

#[tokio::test]
async fn failed_zoom_stops_path_expansion() {
    let (_api, ctx) = StubApi::new().into_context();
    let mut tree = cold_tree();
    let before = tree.list().to_vec();

    let path = [NodePath::Span("s2".into()), NodePath::Transaction("t1".into())];
    let revealed = tree.expand_to_path(&path, &ctx).await.unwrap();

    assert!(revealed.is_none());
    assert_eq!(tree.list(), before.as_slice());
}

#[test]
fn trace_root_and_root_paths() {
    let tree = cold_tree();
    let trace = tree.trace_node().unwrap();

    assert_eq!(tree.node_to_path(trace).unwrap(), NodePath::TraceRoot);
    assert!(matches!(tree.node_to_path(tree.root()), Err(TreeError::RootHasNoPath)));
    assert_eq!(tree.find_by_path(tree.root(), &[NodePath::TraceRoot]), Some(trace));
}
