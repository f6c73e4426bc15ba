// Cycle-level behavior of compiled designs.
//
// Compiles dataflows and drives the generated module through the built-in
// simulator, checking values stream out with the expected pipeline latency.

use dfc::sim::Simulator;
use dfc::{AccumOpts, CompileOptions, Dataflow, Operator, VariableOpts};

#[test]
fn accumulator_sums_a_constant_after_reset() {
    let mut df = Dataflow::new();
    let clr = df.variable("clr", VariableOpts::width(1)).unwrap();
    let d = df.constant(3);
    let acc = df
        .accumulate_add(
            d,
            AccumOpts {
                initval: Some(0),
                reset: Some(clr),
                ..AccumOpts::width(8)
            },
        )
        .unwrap();
    df.set_name(acc, "acc").unwrap();
    let design = df.compile(&[acc], &CompileOptions::default()).unwrap();

    let mut sim = Simulator::new(&design.module).unwrap();
    sim.poke("clr", 1).unwrap();
    sim.tick();
    sim.poke("clr", 0).unwrap();

    let mut seen = Vec::new();
    for _ in 0..4 {
        seen.push(sim.peek("acc").unwrap());
        sim.tick();
    }
    assert_eq!(seen, vec![0, 3, 6, 9]);
}

#[test]
fn accumulator_wraps_at_its_width() {
    let mut df = Dataflow::new();
    let x = df.variable("x", VariableOpts::width(4)).unwrap();
    let acc = df.accumulate_add(x, AccumOpts::width(4)).unwrap();
    df.set_name(acc, "sum").unwrap();
    let design = df.compile(&[acc], &CompileOptions::default()).unwrap();

    let mut sim = Simulator::new(&design.module).unwrap();
    sim.poke("x", 7).unwrap();
    sim.tick();
    sim.tick();
    sim.tick();
    // 21 mod 16
    assert_eq!(sim.peek("sum").unwrap(), 5);

    sim.poke("RST", 1).unwrap();
    sim.tick();
    assert_eq!(sim.peek("sum").unwrap(), 0);
}

#[test]
fn multiply_add_streams_one_result_per_cycle() {
    let mut df = Dataflow::new();
    let a = df.variable("a", VariableOpts::width(8)).unwrap();
    let b = df.variable("b", VariableOpts::width(8)).unwrap();
    let p = df.mul(a, b).unwrap();
    let y = df.add(p, a).unwrap();
    df.set_name(y, "y").unwrap();
    let design = df.compile(&[y], &CompileOptions::named("mac")).unwrap();
    assert_eq!(design.max_stage, 2);

    let inputs = [(1, 2), (3, 4), (5, 6), (7, 8), (9, 10)];
    let mut sim = Simulator::new(&design.module).unwrap();
    for (i, &(va, vb)) in inputs.iter().enumerate() {
        sim.poke("a", va).unwrap();
        sim.poke("b", vb).unwrap();
        sim.tick();
        if i >= 1 {
            let (pa, pb) = inputs[i - 1];
            assert_eq!(sim.peek("y").unwrap(), (pa * pb + pa) & 0xff, "cycle {i}");
        }
    }
}

#[test]
fn balanced_outputs_change_on_the_same_edge() {
    let mut df = Dataflow::new();
    let a = df.variable("a", VariableOpts::width(8)).unwrap();
    let b = df.variable("b", VariableOpts::width(8)).unwrap();
    let fast = df.binary(Operator::Xor, a, b).unwrap();
    let slow = df.mul(a, b).unwrap();
    df.set_name(fast, "fast").unwrap();
    df.set_name(slow, "slow").unwrap();
    let design = df.compile(&[fast, slow], &CompileOptions::default()).unwrap();

    let mut sim = Simulator::new(&design.module).unwrap();
    sim.poke("a", 6).unwrap();
    sim.poke("b", 3).unwrap();
    sim.tick();
    // Stage 1: neither output has seen the inputs yet.
    assert_eq!(sim.peek("fast").unwrap(), 0);
    assert_eq!(sim.peek("slow").unwrap(), 0);
    sim.tick();
    assert_eq!(sim.peek("fast").unwrap(), 6 ^ 3);
    assert_eq!(sim.peek("slow").unwrap(), 18);
}

#[test]
fn signed_subtraction_sign_extends() {
    let mut df = Dataflow::new();
    let opts = VariableOpts {
        signed: true,
        ..VariableOpts::width(8)
    };
    let a = df.variable("a", opts.clone()).unwrap();
    let b = df.variable("b", opts).unwrap();
    let d = df.sub(a, b).unwrap();
    df.set_name(d, "d").unwrap();
    let design = df.compile(&[d], &CompileOptions::default()).unwrap();

    let mut sim = Simulator::new(&design.module).unwrap();
    sim.poke("a", 2).unwrap();
    sim.poke("b", 5).unwrap();
    assert_eq!(sim.peek("d").unwrap(), -3);
}
