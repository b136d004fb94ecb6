mod common;

use common::*;
use std::collections::{BTreeMap, HashMap};
use time::OffsetDateTime;
use trace_tree::*;

#[test]
fn transactions_and_orphan_errors_merge_by_time() {
    let tree = TraceTree::build_from_trace(
        trace(
            vec![txn("t1", 1.0, 2.0), txn("t3", 3.0, 4.0), txn("t5", 5.0, 6.0)],
            vec![error("e2", 2.0), error("e4", 4.0)],
        ),
        None,
        None,
    )
    .unwrap();

    assert_eq!(visible_ids(&tree), ["trace", "t1", "e2", "t3", "e4", "t5"]);
    assert_eq!(tree.kind(), TreeKind::Trace);
    assert_eq!(tree.events_count(), 5);
    assert_eq!(tree.project_ids().iter().copied().collect::<Vec<_>>(), [1, 2]);
}

#[test]
fn print_indents_by_depth() {
    let mut parent = txn("t1", 0.0, 10.0);
    parent.children.push(child_txn("t2", "s1", 1.0, 2.0));
    let tree =
        TraceTree::build_from_trace(trace(vec![parent], vec![error("e1", 11.0)]), None, None)
            .unwrap();

    assert_eq!(tree.print(), "Trace\n  /t1\n    /t2\n  e1");
}

#[test]
fn nested_transactions_inherit_project_metadata() {
    let mut parent = txn("t1", 0.0, 10.0);
    let mut child = child_txn("t2", "s1", 1.0, 2.0);
    child.project_slug = None;
    parent.children.push(child);

    let tree = build(vec![parent]);
    let child = find_txn(&tree, "t2");

    assert_eq!(tree.node(child).metadata().project_slug.as_deref(), Some(PROJECT));
    assert_eq!(tree.node(child).metadata().event_id.as_deref(), Some("t2"));
    assert_eq!(tree.depth(child), 2);
    assert!(tree.is_last_child(child));
}

#[test]
fn lone_pageload_is_promoted_above_its_server_handler() {
    let mut server = txn("server", 0.0, 5.0);
    server.op = "http.server".to_string();
    let mut pageload = child_txn("pageload", "server-root", 1.0, 4.0);
    pageload.op = "pageload".to_string();
    server.children.push(pageload);

    let tree = build(vec![server]);

    assert_eq!(visible_ids(&tree), ["trace", "pageload", "server"]);
    let server = find_txn(&tree, "server");
    let pageload = find_txn(&tree, "pageload");
    assert_eq!(tree.node(server).parent(), Some(pageload));
    assert_eq!(tree.node(server).reparent_reason(), Some(ReparentReason::PageloadServerHandler));
    assert_eq!(tree.node(pageload).reparent_reason(), Some(ReparentReason::PageloadServerHandler));
    assert_list_consistent(&tree);
}

#[test]
fn server_handler_with_two_pageloads_keeps_its_place() {
    let mut server = txn("server", 0.0, 5.0);
    server.op = "http.server".to_string();
    for id in ["p1", "p2"] {
        let mut pageload = child_txn(id, "server-root", 1.0, 4.0);
        pageload.op = "pageload".to_string();
        server.children.push(pageload);
    }

    let tree = build(vec![server]);

    assert_eq!(visible_ids(&tree), ["trace", "server", "p1", "p2"]);
    assert_eq!(tree.node(find_txn(&tree, "p1")).reparent_reason(), None);
}

#[test]
fn span_counts_decide_whether_a_transaction_can_fetch() {
    let meta = TraceMeta {
        transaction_to_span_children_count: HashMap::from([
            ("lonely".to_string(), 1),
            ("busy".to_string(), 12),
        ]),
        ..TraceMeta::default()
    };
    let tree = TraceTree::build_from_trace(
        trace(
            vec![txn("lonely", 0.0, 1.0), txn("busy", 1.0, 2.0), txn("unknown", 2.0, 3.0)],
            Vec::new(),
        ),
        Some(&meta),
        None,
    )
    .unwrap();

    assert!(!tree.node(find_txn(&tree, "lonely")).can_fetch());
    assert!(tree.node(find_txn(&tree, "busy")).can_fetch());
    assert!(tree.node(find_txn(&tree, "unknown")).can_fetch());
}

#[test]
fn errors_roll_up_to_the_trace_node() {
    let mut failing = txn("t1", 0.0, 10.0);
    failing.errors.push(TraceError {
        span: Some("s1".to_string()),
        ..error("inner", 3.0)
    });
    let tree =
        TraceTree::build_from_trace(trace(vec![failing], vec![error("orphan", 12.0)]), None, None)
            .unwrap();

    let trace = tree.trace_node().unwrap();
    assert_eq!(tree.node(trace).errors().len(), 2);
    assert!(tree.node(trace).errors().contains_key("inner"));
    assert!(tree.node(trace).errors().contains_key("orphan"));
    assert!(tree.node(find_txn(&tree, "t1")).has_errors());
    assert_eq!(tree.node(trace).space(), Some([0.0, 12.0]));
}

#[test]
fn vitals_and_replay_widen_the_trace_bounds() {
    let mut pageload = txn("t1", 100.0, 101.0);
    pageload.measurements =
        BTreeMap::from([("lcp".to_string(), Measurement::new(4500.0, "millisecond"))]);
    pageload.profile_id = Some("profile-1".to_string());

    let tree = build(vec![pageload.clone()]);
    let txn_id = find_txn(&tree, "t1");
    assert_eq!(tree.node(tree.root()).space(), Some([100.0, 4.5]));
    assert_eq!(tree.indicators().len(), 1);
    assert_eq!(tree.indicators()[0].label, "LCP");
    assert!(tree.vitals().contains_key(&txn_id));
    assert!(tree.vital_types().contains(&VitalType::Web));
    assert!(tree.profiled_events().contains(&txn_id));
    assert_eq!(tree.node(txn_id).profiles(), ["profile-1"]);

    let replay = ReplayRecord {
        id: "replay".to_string(),
        started_at: OffsetDateTime::from_unix_timestamp(50).unwrap(),
        finished_at: OffsetDateTime::from_unix_timestamp(200).unwrap(),
    };
    let tree =
        TraceTree::build_from_trace(trace(vec![pageload], Vec::new()), None, Some(&replay))
            .unwrap();
    assert_eq!(tree.node(tree.trace_node().unwrap()).space(), Some([50.0, 150.0]));
}

#[test]
fn unknown_measurement_unit_fails_the_build() {
    let mut pageload = txn("t1", 100.0, 101.0);
    pageload.measurements =
        BTreeMap::from([("fcp".to_string(), Measurement::new(1.0, "fortnight"))]);

    let result = TraceTree::build_from_trace(trace(vec![pageload], Vec::new()), None, None);

    assert!(matches!(
        result,
        Err(TreeError::UnsupportedMeasurementUnit(unit)) if unit == "fortnight"
    ));
}

#[test]
fn empty_tree_has_nothing_to_show() {
    let tree = TraceTree::empty();

    assert_eq!(tree.kind(), TreeKind::Empty);
    assert!(tree.list().is_empty());
    assert!(tree.trace_node().is_none());
    assert_eq!(tree.shape(), TraceShape::EmptyTrace);
    assert_eq!(tree.print(), "");
}

#[test]
fn expand_and_collapse_splice_the_list() {
    let mut parent = txn("t1", 0.0, 10.0);
    let mut middle = child_txn("t2", "s1", 1.0, 5.0);
    middle.children.push(child_txn("t3", "s2", 2.0, 3.0));
    parent.children.push(middle);
    parent.children.push(child_txn("t4", "s3", 6.0, 7.0));
    let mut tree = build(vec![parent, txn("t5", 11.0, 12.0)]);

    assert_eq!(visible_ids(&tree), ["trace", "t1", "t2", "t3", "t4", "t5"]);

    let t2 = find_txn(&tree, "t2");
    assert!(tree.expand(t2, false));
    assert!(!tree.expand(t2, false));
    assert_eq!(visible_ids(&tree), ["trace", "t1", "t2", "t4", "t5"]);
    assert_list_consistent(&tree);

    let t1 = find_txn(&tree, "t1");
    assert!(tree.expand(t1, false));
    assert_eq!(visible_ids(&tree), ["trace", "t1", "t5"]);
    assert_list_consistent(&tree);

    assert!(tree.expand(t1, true));
    assert_eq!(visible_ids(&tree), ["trace", "t1", "t2", "t4", "t5"]);
    assert_list_consistent(&tree);
}
