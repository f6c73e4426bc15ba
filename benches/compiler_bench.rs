use criterion::{black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use dfc::*;
use std::collections::BTreeSet;

// KPI-aligned benchmark scenarios.
// Every scenario compiles cleanly with the default latency table.

const MAC_GRAPH: &str = r#"{
    "name": "mac",
    "nodes": [
        {"name": "a", "kind": "variable", "width": 16},
        {"name": "b", "kind": "variable", "width": 16},
        {"name": "prod", "kind": "operation", "op": "mul", "operands": ["a", "b"]},
        {"name": "total", "kind": "accumulator", "op": "add", "data": "prod", "width": 32}
    ],
    "outputs": ["total"]
}"#;

/// Linear chain `x -> op -> op -> ...` cycling through add, mul, xor.
/// Each mul adds two stages, so stage copies of `x` pile up along the chain.
fn generate_chain(n_ops: usize) -> (Dataflow, Vec<NodeId>) {
    let mut df = Dataflow::with_datawidth(16).unwrap();
    let x = df.variable("x", VariableOpts::default()).unwrap();
    let mut tail = x;
    for i in 0..n_ops {
        let op = match i % 3 {
            0 => Operator::Add,
            1 => Operator::Mul,
            _ => Operator::Xor,
        };
        tail = df.binary(op, tail, x).unwrap();
    }
    (df, vec![tail])
}

/// Balanced reduction tree over `n_inputs` variables, with every partial
/// sum also declared as an output so balancing has work to do.
fn generate_tree(n_inputs: usize) -> (Dataflow, Vec<NodeId>) {
    let mut df = Dataflow::with_datawidth(16).unwrap();
    let mut level: Vec<NodeId> = (0..n_inputs)
        .map(|i| df.variable(&format!("in{i}"), VariableOpts::default()).unwrap())
        .collect();
    let mut outputs = Vec::new();
    let mut depth = 0;
    while level.len() > 1 {
        let op = if depth % 2 == 0 { Operator::Mul } else { Operator::Add };
        level = level
            .chunks(2)
            .map(|pair| match pair {
                [a, b] => df.binary(op, *a, *b).unwrap(),
                [a] => *a,
                _ => unreachable!(),
            })
            .collect();
        outputs.push(level[0]);
        depth += 1;
    }
    (df, outputs)
}

fn scenarios() -> Vec<(&'static str, Dataflow, Vec<NodeId>)> {
    let loaded = load::parse_graph(MAC_GRAPH).expect("benchmark scenario must load");
    let (chain_df, chain_out) = generate_chain(32);
    let (tree_df, tree_out) = generate_tree(32);
    vec![
        ("mac", loaded.dataflow, loaded.outputs),
        ("chain32", chain_df, chain_out),
        ("tree32", tree_df, tree_out),
    ]
}

// ── KPI: end-to-end compile latency ─────────────────────────────────────────

fn bench_kpi_full_compile_latency(c: &mut Criterion) {
    let mut group = c.benchmark_group("kpi/full_compile_latency");
    let opts = CompileOptions::default();
    for (name, df, outputs) in scenarios() {
        group.bench_with_input(BenchmarkId::from_parameter(name), &df, |b, df| {
            b.iter(|| {
                let design = compile(black_box(df), &outputs, &opts).unwrap();
                black_box(design.verilog());
            });
        });
    }
    group.finish();
}

// ── KPI: per-phase latency ──────────────────────────────────────────────────

fn bench_kpi_phase_latency(c: &mut Criterion) {
    let (df, outputs) = generate_tree(64);
    let declared: BTreeSet<NodeId> = outputs.iter().copied().collect();
    let latency = LatencyTable::new();

    {
        let mut group = c.benchmark_group("kpi/phase_latency/load");
        group.bench_function("mac", |b| {
            b.iter(|| black_box(load::parse_graph(black_box(MAC_GRAPH)).unwrap()));
        });
        group.finish();
    }

    {
        let mut group = c.benchmark_group("kpi/phase_latency/schedule");
        group.bench_function("tree64", |b| {
            b.iter_batched(
                || df.clone(),
                |mut graph| {
                    let sched = schedule::schedule(&mut graph, &declared, &latency).unwrap();
                    black_box(
                        schedule::balance_outputs(&mut graph, &declared, sched.max_stage).unwrap(),
                    );
                },
                BatchSize::SmallInput,
            );
        });
        group.finish();
    }

    {
        let design = compile(&df, &outputs, &CompileOptions::default()).unwrap();
        let mut group = c.benchmark_group("kpi/phase_latency/codegen");
        group.bench_function("tree64", |b| {
            b.iter(|| black_box(codegen::emit_verilog(black_box(&design.module))));
        });
        group.finish();
    }
}

// ── KPI: compile scaling ────────────────────────────────────────────────────

fn bench_kpi_compile_scaling(c: &mut Criterion) {
    let mut group = c.benchmark_group("kpi/compile_scaling");
    let opts = CompileOptions::default();
    for n in [16, 64, 256] {
        let (df, outputs) = generate_chain(n);
        group.bench_with_input(BenchmarkId::new("chain", n), &df, |b, df| {
            b.iter(|| black_box(compile(df, &outputs, &opts).unwrap()));
        });
        let (df, outputs) = generate_tree(n);
        group.bench_with_input(BenchmarkId::new("tree", n), &df, |b, df| {
            b.iter(|| black_box(compile(df, &outputs, &opts).unwrap()));
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_kpi_full_compile_latency,
    bench_kpi_phase_latency,
    bench_kpi_compile_scaling
);
criterion_main!(benches);
