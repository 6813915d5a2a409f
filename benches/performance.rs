use criterion::{criterion_group, criterion_main, Criterion};
use conclave_codegen::{generate, Explain};
use conclave_core::prelude::*;
use conclave_planner::builder::{self, ColumnDef};
use conclave_planner::rules;

/// One input per party, each projected and folded into a chain of joins.
fn make_join_chain(party_count: u64) -> OpDag {
    let mut dag = OpDag::new();
    let cols = |p: u64| {
        vec![
            ColumnDef::new("key", ScalarType::Integer).with_coll_set(parties([p])),
            ColumnDef::new("value", ScalarType::Integer).with_coll_set(parties([p])),
        ]
    };
    let mut acc = None;
    for p in 1..=party_count {
        let src = builder::create(&mut dag, &format!("in{p}"), &cols(p), parties([p])).unwrap();
        let proj = builder::project(&mut dag, src, &format!("proj{p}"), &["key", "value"]).unwrap();
        acc = Some(match acc {
            None => proj,
            Some(prev) => {
                let joined = builder::join(&mut dag, prev, proj, &format!("join{p}"), &["key"], &["key"]).unwrap();
                builder::project(&mut dag, joined, &format!("narrow{p}"), &["key", "value"]).unwrap()
            }
        });
    }
    dag
}

fn bench_top_sort(c: &mut Criterion) {
    let dag = make_join_chain(64);
    c.bench_function("top_sort_64_parties", |b| {
        b.iter(|| {
            let _ = dag.top_sort(true).unwrap();
        })
    });
}

fn bench_build_and_optimize(c: &mut Criterion) {
    let cfg = CompilerConfig::default();
    c.bench_function("build_optimize_16_parties", |b| {
        b.iter(|| {
            let mut dag = make_join_chain(16);
            let _ = rules::optimize(&mut dag, &cfg).unwrap();
        })
    });
}

fn bench_explain(c: &mut Criterion) {
    let dag = make_join_chain(32);
    c.bench_function("explain_32_parties", |b| {
        b.iter(|| {
            let _ = generate(&mut Explain::new(), &dag, "bench", true).unwrap();
        })
    });
}

criterion_group!(planner, bench_top_sort, bench_build_and_optimize, bench_explain);
criterion_main!(planner);
