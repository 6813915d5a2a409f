//! Output schemas, collusion-set resets and stored_with propagation.


use conclave_core::prelude::*;
use conclave_planner::builder::{self, ColumnDef, OperandSpec};
use conclave_planner::verify::assert_consistent;
use test_fixtures::{input, two_party_join};

fn col_names(dag: &OpDag, id: NodeId) -> Vec<String> {
    dag[id]
        .out_rel()
        .columns()
        .iter()
        .map(|c| c.name.clone())
        .collect()
}

#[test]
fn test_create_registers_root() {
    let mut dag = OpDag::new();
    let id = input(&mut dag, "in", &["a", "b"], 3);
    assert!(dag.roots().contains(&id));
    assert_eq!(dag[id].out_rel().stored_with(), &parties([3]));
    assert_eq!(dag[id].out_rel().columns()[1].idx, 1);
    assert_eq!(dag[id].out_rel().columns()[1].coll_set, parties([3]));
}

#[test]
fn test_create_rejects_duplicate_columns() {
    let mut dag = OpDag::new();
    let cols = [
        ColumnDef::new("a", ScalarType::Integer),
        ColumnDef::new("a", ScalarType::Float),
    ];
    assert!(matches!(
        builder::create(&mut dag, "in", &cols, parties([1])),
        Err(Error::Schema(_))
    ));
    assert!(dag.is_empty());
}

#[test]
fn test_missing_column_is_a_hard_error() {
    let mut dag = OpDag::new();
    let src = input(&mut dag, "in", &["a"], 1);
    let before = dag.len();
    match builder::sort_by(&mut dag, src, "s", "nope") {
        Err(Error::ColumnNotFound { relation, column }) => {
            assert_eq!(relation, "in");
            assert_eq!(column, "nope");
        }
        other => panic!("unexpected: {other:?}"),
    }
    assert_eq!(dag.len(), before);
    assert!(dag[src].is_leaf());
}

#[test]
fn test_aggregate_schema() {
    let mut dag = OpDag::new();
    let src = input(&mut dag, "in", &["k", "v", "w"], 1);
    let agg = builder::aggregate(&mut dag, src, "agg", &["k"], "v", Aggregator::Sum, "total").unwrap();
    assert_eq!(col_names(&dag, agg), vec!["k", "total"]);
    assert!(dag[agg].out_rel().columns().iter().all(|c| c.coll_set.is_empty()));
    assert_eq!(dag[agg].out_rel().stored_with(), &parties([1]));
    let Operator::Aggregate(payload) = dag[agg].op() else {
        panic!("not an aggregation");
    };
    assert_eq!(payload.agg_col.name, "v");
    assert_eq!(payload.aggregator, Aggregator::Sum);
}

#[test]
fn test_project_and_distinct_clear_selected() {
    let mut dag = OpDag::new();
    let src = input(&mut dag, "in", &["a", "b", "c"], 1);
    let p = builder::project(&mut dag, src, "p", &["c", "a"]).unwrap();
    assert_eq!(col_names(&dag, p), vec!["c", "a"]);
    assert_eq!(dag[p].out_rel().columns()[0].idx, 0);
    assert!(dag[p].out_rel().columns().iter().all(|c| c.coll_set.is_empty()));

    let d = builder::distinct(&mut dag, src, "d", &["b"]).unwrap();
    assert_eq!(col_names(&dag, d), vec!["b"]);
    assert!(dag[d].out_rel().columns()[0].coll_set.is_empty());
    // the source keeps its metadata
    assert_eq!(dag[src].out_rel().columns()[1].coll_set, parties([1]));
}

#[test]
fn test_sort_by_and_filter() {
    let mut dag = OpDag::new();
    let src = input(&mut dag, "in", &["a", "b"], 1);
    let s = builder::sort_by(&mut dag, src, "s", "b").unwrap();
    assert!(dag[s].out_rel().columns().iter().all(|c| c.coll_set.is_empty()));

    let f = builder::filter(&mut dag, src, "f", "a", FilterOp::Gt, "5").unwrap();
    let cols = dag[f].out_rel().columns();
    assert!(cols[0].coll_set.is_empty());
    assert_eq!(cols[1].coll_set, parties([1]));
    assert!(dag[f].is_local);
}

#[test]
fn test_divide_appends_target() {
    let mut dag = OpDag::new();
    let src = input(&mut dag, "in", &["a", "b"], 1);
    let d = builder::divide(&mut dag, src, "d", "ratio", &["a".into(), OperandSpec::Float(2.0)]).unwrap();
    assert_eq!(col_names(&dag, d), vec!["a", "b", "ratio"]);
    assert_eq!(dag[d].out_rel().columns()[2].type_tag, ScalarType::Float);
    let Operator::Divide(arith) = dag[d].op() else {
        panic!("not a divide");
    };
    assert_eq!(arith.target_col.idx, 2);
    assert_eq!(arith.target_col.rel_name, "d");
}

#[test]
fn test_join_rejects_mismatched_keys() {
    let g = two_party_join();
    let mut dag = g.dag;
    assert!(matches!(
        builder::join(&mut dag, g.proj1, g.proj2, "bad", &["a", "b"], &["a"]),
        Err(Error::InvalidArgument(_))
    ));
}

#[test]
fn test_self_join_fills_both_slots() {
    let mut dag = OpDag::new();
    let src = input(&mut dag, "in", &["a", "b"], 1);
    let j = builder::join(&mut dag, src, src, "self", &["a"], &["a"]).unwrap();
    assert_eq!(dag[j].left_parent(), Some(src));
    assert_eq!(dag[j].right_parent(), Some(src));
    assert_eq!(col_names(&dag, j), vec!["a", "b", "b"]);
    assert_consistent(&dag);
}

#[test]
fn test_concat_unions_parties() {
    let mut dag = OpDag::new();
    let x = input(&mut dag, "x", &["a", "b"], 1);
    let y = input(&mut dag, "y", &["c", "d"], 2);
    let z = input(&mut dag, "z", &["e", "f"], 3);
    let cat = builder::concat(&mut dag, &[x, y, z], "cat", Some(&["k", "v"])).unwrap();
    assert_eq!(col_names(&dag, cat), vec!["k", "v"]);
    assert_eq!(dag[cat].out_rel().stored_with(), &parties([1, 2, 3]));
    assert_eq!(dag[cat].inputs().ids(), vec![x, y, z]);
    assert_consistent(&dag);
}

#[test]
fn test_concat_failures() {
    let mut dag = OpDag::new();
    let x = input(&mut dag, "x", &["a", "b"], 1);
    let y = input(&mut dag, "y", &["a"], 2);
    assert!(matches!(
        builder::concat(&mut dag, &[x, x], "dup", None),
        Err(Error::InvalidArgument(_))
    ));
    assert!(matches!(
        builder::concat(&mut dag, &[x, y], "width", None),
        Err(Error::Schema(_))
    ));
    assert!(matches!(
        builder::concat(&mut dag, &[x], "single", None),
        Err(Error::InvalidArgument(_))
    ));
    assert!(dag[x].is_leaf());
}

#[test]
fn test_shuffle_and_comp_neighs() {
    let mut dag = OpDag::new();
    let src = input(&mut dag, "in", &["a", "b"], 1);
    let sh = builder::shuffle(&mut dag, src, "sh").unwrap();
    assert_eq!(dag[sh].out_rel().columns()[0].coll_set, parties([1]));
    assert_eq!(dag[sh].out_rel().columns()[0].rel_name, "sh");

    let cn = builder::comp_neighs(&mut dag, src, "cn", "b").unwrap();
    assert_eq!(col_names(&dag, cn), vec!["b"]);
}

#[test]
fn test_collect_open_close_send() {
    let mut g = two_party_join();
    builder::collect(&mut g.dag, g.join, PartyId::new(1)).unwrap();
    assert_eq!(g.dag[g.join].out_rel().stored_with(), &parties([1]));

    let closed = builder::close(&mut g.dag, g.proj1, "closed", parties([1, 2, 3])).unwrap();
    assert_eq!(g.dag[closed].out_rel().stored_with(), &parties([1, 2, 3]));
    assert!(g.dag[closed].is_mpc);

    let opened = builder::open(&mut g.dag, closed, "opened", PartyId::new(2)).unwrap();
    assert_eq!(g.dag[opened].out_rel().stored_with(), &parties([2]));

    let sent = builder::send(&mut g.dag, g.proj2, "sent", parties([1])).unwrap();
    assert_eq!(g.dag[sent].out_rel().stored_with(), &parties([1]));

    let kept = builder::persist(&mut g.dag, opened, "kept").unwrap();
    let stored = builder::store(&mut g.dag, kept, "stored").unwrap();
    assert_eq!(g.dag[stored].out_rel().stored_with(), &parties([2]));
    assert_consistent(&g.dag);
}

#[test]
fn test_index_join_and_index_aggregate_builders() {
    let mut g = two_party_join();
    let idx = builder::index(&mut g.dag, g.proj1, "idx", "row").unwrap();
    let ij = builder::index_join(&mut g.dag, g.proj1, g.proj2, "ij", &["a"], &["a"], idx).unwrap();
    assert_eq!(g.dag[ij].kind(), OpKind::IndexJoin);
    assert_eq!(g.dag[ij].parents().len(), 3);
    assert_eq!(g.dag[ij].left_parent(), Some(g.proj1));

    let src = g.in1;
    let eq = builder::comp_neighs(&mut g.dag, src, "eq", "a").unwrap();
    let keys = builder::sort_by(&mut g.dag, src, "keys", "a").unwrap();
    let ia = builder::index_aggregate(
        &mut g.dag,
        src,
        "ia",
        &["a"],
        "b",
        Aggregator::Count,
        "n",
        eq,
        keys,
    )
    .unwrap();
    assert_eq!(g.dag[ia].kind(), OpKind::IndexAggregate);
    assert_eq!(g.dag[ia].parent(), Some(src));
    assert!(g.dag[ia].parents().contains(&eq) && g.dag[ia].parents().contains(&keys));
    assert_consistent(&g.dag);
}
