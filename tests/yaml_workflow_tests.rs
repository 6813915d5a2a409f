//! YAML workflow front end.

use conclave_core::prelude::*;
use conclave_planner::{parse_yaml_workflow, PlanError};

const TWO_PARTY: &str = r#"
steps:
  - op: create
    name: in1
    stored_with: [1]
    columns:
      - { name: a, type: INTEGER, coll_set: [1] }
      - { name: b, type: INTEGER, coll_set: [1] }
  - op: create
    name: in2
    stored_with: [2]
    columns:
      - { name: a, type: INTEGER, coll_set: [2] }
      - { name: c, type: float }
  - op: project
    name: proj1
    input: in1
    columns: [a, b]
  - op: project
    name: proj2
    input: in2
    columns: [a, c]
  - op: join
    name: joined
    left: proj1
    right: proj2
    left_on: [a]
    right_on: [a]
  - op: aggregate
    name: totals
    input: joined
    group: [a]
    over: b
    aggregator: "+"
    as: total
  - op: multiply
    name: scaled
    input: totals
    target: total
    operands: [total, 10]
  - op: collect
    input: scaled
    party: 1
"#;

#[test]
fn test_parse_two_party_workflow() {
    let wf = parse_yaml_workflow(TWO_PARTY).unwrap();
    let dag = &wf.dag;
    assert_eq!(dag.len(), 7);
    assert_eq!(dag.roots().len(), 2);

    let joined = wf.node("joined").unwrap();
    assert!(dag.requires_mpc(joined));
    assert_eq!(dag[joined].out_rel().stored_with(), &parties([1, 2]));

    let in2 = wf.node("in2").unwrap();
    assert_eq!(dag[in2].out_rel().columns()[1].type_tag, ScalarType::Float);

    let scaled = wf.node("scaled").unwrap();
    assert_eq!(dag[scaled].out_rel().stored_with(), &parties([1]));
    let Operator::Multiply(arith) = dag[scaled].op() else {
        panic!("not a multiply");
    };
    assert_eq!(arith.target_col.name, "total");
    assert_eq!(arith.operands[1], Operand::Int(10));

    let order = dag.top_sort(wf.config.deterministic).unwrap();
    assert_eq!(order.last(), Some(&scaled));
    dag.validate().unwrap();
}

#[test]
fn test_config_block_overrides_defaults() {
    let src = r#"
config:
  hybrid_joins: false
  default_index_col: rowid
steps:
  - op: create
    name: t
    stored_with: [1]
    columns:
      - { name: a, type: INTEGER }
  - op: index
    name: ix
    input: t
"#;
    let wf = parse_yaml_workflow(src).unwrap();
    assert!(!wf.config.hybrid_joins);
    assert!(wf.config.reveal_joins);
    let ix = wf.node("ix").unwrap();
    assert_eq!(wf.dag[ix].out_rel().columns()[0].name, "rowid");
}

#[test]
fn test_duplicate_names_are_rejected() {
    let src = r#"
steps:
  - op: create
    name: t
    stored_with: [1]
    columns: [ { name: a, type: INTEGER } ]
  - op: shuffle
    name: t
    input: t
"#;
    assert!(matches!(
        parse_yaml_workflow(src),
        Err(PlanError::DuplicateName(name)) if name == "t"
    ));
}

#[test]
fn test_builder_errors_surface() {
    let src = r#"
steps:
  - op: create
    name: t
    stored_with: [1]
    columns: [ { name: a, type: INTEGER } ]
  - op: filter
    name: f
    input: t
    column: missing
    operator: "<"
    expr: "3"
"#;
    assert!(matches!(
        parse_yaml_workflow(src),
        Err(PlanError::Core(Error::ColumnNotFound { .. }))
    ));
}

#[test]
fn test_bad_type_and_bad_yaml() {
    let bad_type = r#"
steps:
  - op: create
    name: t
    stored_with: [1]
    columns: [ { name: a, type: BLOB } ]
"#;
    assert!(matches!(
        parse_yaml_workflow(bad_type),
        Err(PlanError::Core(Error::InvalidArgument(_)))
    ));
    assert!(matches!(
        parse_yaml_workflow("steps: [ { op: teleport } ]"),
        Err(PlanError::Yaml(_))
    ));
    assert!(matches!(
        parse_yaml_workflow("steps: []"),
        Err(PlanError::Workflow(_))
    ));
}

#[test]
fn test_concat_with_renamed_columns() {
    let src = r#"
steps:
  - op: create
    name: x
    stored_with: [1]
    columns: [ { name: a, type: INTEGER }, { name: b, type: INTEGER } ]
  - op: create
    name: y
    stored_with: [3]
    columns: [ { name: c, type: INTEGER }, { name: d, type: INTEGER } ]
  - op: concat
    name: both
    inputs: [x, y]
    columns: [k, v]
  - op: sort_by
    name: sorted
    input: both
    column: k
  - op: distinct
    name: keys
    input: sorted
    columns: [k]
"#;
    let wf = parse_yaml_workflow(src).unwrap();
    let both = wf.node("both").unwrap();
    assert_eq!(wf.dag[both].out_rel().stored_with(), &parties([1, 3]));
    let keys = wf.node("keys").unwrap();
    assert!(wf.dag.requires_mpc(keys));
}
