// Snapshot tests: lock generated Verilog to detect unintended behavior changes.
//
// Builds small dataflows through the library API and compiles them end to
// end. Snapshots are managed by `insta` and stored under
// `compiler/tests/snapshots/`.
//
// Run `cargo insta review` after intentional output changes to update baselines.

use dfc::{AccumOpts, CompileOptions, Dataflow, VariableOpts};

fn compile_snapshot(df: &Dataflow, outputs: &[dfc::NodeId], name: &str) -> String {
    df.compile(outputs, &CompileOptions::named(name))
        .unwrap_or_else(|e| panic!("{name}: {e}"))
        .verilog()
}

#[test]
fn snapshot_accumulator() {
    let mut df = Dataflow::new();
    let x = df.variable("x", VariableOpts::width(8)).unwrap();
    let acc = df.accumulate_add(x, AccumOpts::width(8)).unwrap();
    df.set_name(acc, "out").unwrap();
    let verilog = compile_snapshot(&df, &[acc], "acc8");
    insta::assert_snapshot!("acc8", verilog);
}

#[test]
fn snapshot_pipelined_multiply_add() {
    let mut df = Dataflow::new();
    let a = df.variable("a", VariableOpts::width(8)).unwrap();
    let b = df.variable("b", VariableOpts::width(8)).unwrap();
    let p = df.mul(a, b).unwrap();
    let y = df.add(p, a).unwrap();
    df.set_name(y, "y").unwrap();
    let verilog = compile_snapshot(&df, &[y], "mac");
    insta::assert_snapshot!("mac", verilog);
}

#[test]
fn snapshot_accumulator_with_clear() {
    let mut df = Dataflow::new();
    let clr = df.variable("clr", VariableOpts::width(1)).unwrap();
    let d = df.constant(3);
    let opts = AccumOpts {
        reset: Some(clr),
        ..AccumOpts::width(8)
    };
    let acc = df.accumulate_add(d, opts).unwrap();
    df.set_name(acc, "acc").unwrap();
    let verilog = compile_snapshot(&df, &[acc], "clear_acc");
    insta::assert_snapshot!("clear_acc", verilog);
}
