//! requires_mpc, reversibility and boundary predicates.


use conclave_core::prelude::*;
use conclave_planner::builder::{self, OperandSpec};
use conclave_planner::rules;
use test_fixtures::{input, two_party_join};

#[test]
fn test_join_across_parties_requires_mpc() {
    let g = two_party_join();
    assert!(g.dag.requires_mpc(g.join));
    assert!(!g.dag.requires_mpc(g.in1));
    assert!(!g.dag.requires_mpc(g.proj1));
}

#[test]
fn test_join_within_one_party_is_plain() {
    let mut dag = OpDag::new();
    let x = input(&mut dag, "x", &["a"], 1);
    let y = input(&mut dag, "y", &["a"], 1);
    let j = builder::join(&mut dag, x, y, "j", &["a"], &["a"]).unwrap();
    assert!(!dag.requires_mpc(j));
}

#[test]
fn test_local_node_never_requires_mpc() {
    let mut g = two_party_join();
    g.dag.node_mut(g.join).unwrap().is_local = true;
    assert!(!g.dag.requires_mpc(g.join));
}

#[test]
fn test_unary_over_shared_input() {
    let mut dag = OpDag::new();
    let x = input(&mut dag, "x", &["k", "v"], 1);
    let y = input(&mut dag, "y", &["k", "v"], 2);
    let cat = builder::concat(&mut dag, &[x, y], "cat", None).unwrap();
    assert!(dag.requires_mpc(cat));

    let agg = builder::aggregate(&mut dag, cat, "agg", &["k"], "v", Aggregator::Sum, "s").unwrap();
    assert!(dag.requires_mpc(agg));

    // projections are computed locally on each share
    let p = builder::project(&mut dag, cat, "p", &["k"]).unwrap();
    assert!(!dag.requires_mpc(p));
}

#[test]
fn test_project_reversibility() {
    let mut dag = OpDag::new();
    let src = input(&mut dag, "in", &["a", "b", "c"], 1);
    let all = builder::project(&mut dag, src, "all", &["a", "b", "c"]).unwrap();
    let some = builder::project(&mut dag, src, "some", &["a", "c"]).unwrap();
    assert!(dag.is_reversible(all));
    assert!(!dag.is_reversible(some));
}

#[test]
fn test_multiply_reversibility() {
    let mut dag = OpDag::new();
    let src = input(&mut dag, "in", &["a"], 1);
    let nonzero = builder::multiply(
        &mut dag,
        src,
        "m1",
        "x",
        &[OperandSpec::Int(2), OperandSpec::Int(3)],
    )
    .unwrap();
    let zero = builder::multiply(
        &mut dag,
        src,
        "m2",
        "x",
        &[OperandSpec::Int(0), OperandSpec::Int(5)],
    )
    .unwrap();
    assert!(dag.is_reversible(nonzero));
    assert!(!dag.is_reversible(zero));
}

#[test]
fn test_reversibility_table() {
    let mut g = two_party_join();
    let dag = &mut g.dag;
    let src = g.in1;

    let always = [
        builder::store(dag, src, "store").unwrap(),
        builder::persist(dag, src, "persist").unwrap(),
        builder::open(dag, src, "open", PartyId::new(1)).unwrap(),
        builder::close(dag, src, "close", parties([1, 2])).unwrap(),
        builder::send(dag, src, "send", parties([2])).unwrap(),
        builder::concat(dag, &[g.proj1, g.proj2], "concat", None).unwrap(),
        builder::index(dag, src, "index", "row").unwrap(),
        builder::shuffle(dag, src, "shuffle").unwrap(),
        builder::divide(dag, src, "divide", "q", &["a".into(), OperandSpec::Int(0)]).unwrap(),
    ];
    for id in always {
        assert!(dag.is_reversible(id), "{} should be reversible", dag.describe(id));
    }

    let never = [
        g.in1,
        g.join,
        builder::aggregate(dag, src, "agg", &["a"], "b", Aggregator::Max, "m").unwrap(),
        builder::filter(dag, src, "filter", "a", FilterOp::Eq, "1").unwrap(),
        builder::sort_by(dag, src, "sort", "a").unwrap(),
        builder::distinct(dag, src, "distinct", &["a"]).unwrap(),
        builder::comp_neighs(dag, src, "neighs", "a").unwrap(),
    ];
    for id in never {
        assert!(!dag.is_reversible(id), "{} should not be reversible", dag.describe(id));
    }
}

#[test]
fn test_boundaries_around_secure_join() {
    let mut dag = OpDag::new();
    let in1 = input(&mut dag, "in1", &["a", "b"], 1);
    let in2 = input(&mut dag, "in2", &["a", "c"], 2);
    let c1 = builder::close(&mut dag, in1, "c1", parties([1, 2])).unwrap();
    let c2 = builder::close(&mut dag, in2, "c2", parties([1, 2])).unwrap();
    let join = builder::join(&mut dag, c1, c2, "join", &["a"], &["a"]).unwrap();
    let out = builder::open(&mut dag, join, "out", PartyId::new(1)).unwrap();

    assert!(!dag[join].is_mpc);
    assert_eq!(rules::mark_mpc(&mut dag).unwrap(), 1);
    assert!(dag[join].is_mpc);
    assert!(!dag[in1].is_mpc);

    assert!(dag.is_upper_boundary(c1));
    assert!(!dag.is_lower_boundary(c1));
    // Close parents and Open children do not count as secure neighbours
    assert!(dag.is_upper_boundary(join));
    assert!(dag.is_lower_boundary(join));
    assert!(dag.is_boundary(join));
    assert!(dag.is_lower_boundary(out));
    assert!(!dag.is_upper_boundary(out));
    assert!(!dag.is_boundary(in1));

    assert_eq!(rules::mark_mpc(&mut dag).unwrap(), 0);
}

#[test]
#[should_panic]
fn test_predicates_panic_on_foreign_id() {
    let g = two_party_join();
    let foreign = NodeId::new(999);
    assert!(g.dag.node(foreign).is_err());
    g.dag.requires_mpc(foreign);
}
