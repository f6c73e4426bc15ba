// dot.rs — Graphviz DOT output for compiled dataflow designs
//
// Renders the scheduled dataflow of a `Design` with one cluster per pipeline
// stage (by end stage), operand edges, dashed accumulator feedback loops,
// and output port nodes.
//
// Preconditions: `design` came out of a successful compile.
// Postconditions: returns a valid DOT string; output is deterministic.
// Failure modes: none (pure string formatting).
// Side effects: none.

use std::collections::BTreeMap;
use std::fmt::Write;

use crate::graph::{Node, NodeKind};
use crate::id::NodeId;
use crate::pipeline::Design;
use crate::visit::collect_all;

/// Emit the design's scheduled graph as a Graphviz DOT string.
pub fn emit_dot(design: &Design) -> String {
    let graph = &design.graph;
    let roots: Vec<NodeId> = design.balanced.iter().map(|o| o.balanced).collect();
    let all = collect_all(graph, &roots);

    let mut buf = String::new();
    writeln!(buf, "digraph {} {{", sanitize(&design.module.name)).unwrap();
    writeln!(buf, "    rankdir=LR;").unwrap();
    writeln!(buf, "    node [fontname=\"Helvetica\", fontsize=10];").unwrap();
    writeln!(buf, "    edge [fontname=\"Helvetica\", fontsize=9];").unwrap();

    let mut by_stage: BTreeMap<u32, Vec<&Node>> = BTreeMap::new();
    for &id in &all {
        let node = graph.node(id);
        by_stage
            .entry(node.end_stage.unwrap_or(0))
            .or_default()
            .push(node);
    }

    for (stage, nodes) in &by_stage {
        writeln!(buf).unwrap();
        writeln!(buf, "    subgraph cluster_stage_{stage} {{").unwrap();
        writeln!(buf, "        label=\"stage {stage}\";").unwrap();
        writeln!(buf, "        style=rounded;").unwrap();
        writeln!(buf, "        color=gray50;").unwrap();
        for node in nodes {
            writeln!(
                buf,
                "        n{} [label=\"{}\", shape={}];",
                node.id.0,
                node_label(design, node),
                node_shape(node)
            )
            .unwrap();
        }
        writeln!(buf, "    }}").unwrap();
    }

    writeln!(buf).unwrap();
    for &id in &all {
        let node = graph.node(id);
        for operand in node.forward_operands() {
            writeln!(buf, "    n{} -> n{};", operand.0, id.0).unwrap();
        }
        if matches!(node.kind, NodeKind::Accumulator { .. }) {
            writeln!(buf, "    n{0} -> n{0} [style=dashed, color=blue];", id.0).unwrap();
        }
    }

    for port in &design.outputs {
        writeln!(
            buf,
            "    out_{} [label=\"{}\", shape=house];",
            sanitize(&port.name),
            port.name
        )
        .unwrap();
        writeln!(
            buf,
            "    n{} -> out_{};",
            port.output.balanced.0,
            sanitize(&port.name)
        )
        .unwrap();
    }

    writeln!(buf, "}}").unwrap();
    buf
}

// ── Helpers ─────────────────────────────────────────────────────────────────

/// Sanitize a name to valid DOT identifier characters.
fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn node_label(design: &Design, node: &Node) -> String {
    let body = match &node.kind {
        NodeKind::Constant { value } => return value.to_string(),
        NodeKind::Variable { .. } => node.label(),
        NodeKind::Operation { op, .. } => format!("{} ({})", node.label(), op.symbol()),
        NodeKind::Accumulator { initval, .. } => format!("{} init={}", node.label(), initval),
        NodeKind::Delay { .. } => node.label(),
    };
    let signal = design
        .allocation
        .binding(node.id)
        .and_then(|b| b.signal())
        .unwrap_or("");
    let (start, end) = node.stages().unwrap_or((0, 0));
    format!("{body}\\n{signal} [{start},{end}]").replace('"', "\\\"")
}

fn node_shape(node: &Node) -> &'static str {
    match node.kind {
        NodeKind::Constant { .. } => "plaintext",
        NodeKind::Variable { .. } => "invhouse",
        NodeKind::Operation { .. } => "ellipse",
        NodeKind::Accumulator { .. } => "doublecircle",
        NodeKind::Delay { .. } => "box",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{AccumOpts, Dataflow, VariableOpts};
    use crate::pipeline::CompileOptions;

    #[test]
    fn stages_become_clusters() {
        let mut df = Dataflow::new();
        let a = df.variable("a", VariableOpts::width(8)).unwrap();
        let b = df.variable("b", VariableOpts::width(8)).unwrap();
        let s = df.add(a, b).unwrap();
        let p = df.mul(a, b).unwrap();
        let acc = df.accumulate_add(p, AccumOpts::width(8)).unwrap();
        df.set_name(s, "sum").unwrap();
        df.set_name(acc, "total").unwrap();
        let design = df.compile(&[s, acc], &CompileOptions::named("mac")).unwrap();
        let dot = emit_dot(&design);

        assert!(dot.starts_with("digraph mac {\n"));
        for stage in 0..=3 {
            assert!(dot.contains(&format!("subgraph cluster_stage_{stage} {{")));
        }
        assert!(dot.contains("    n0 -> n2;\n"));
        assert!(dot.contains("    n4 -> n4 [style=dashed, color=blue];\n"));
        assert!(dot.contains("    out_total [label=\"total\", shape=house];\n"));
        assert!(dot.contains("    n4 -> out_total;\n"));
        assert!(dot.ends_with("}\n"));
    }

    #[test]
    fn sanitize_replaces_invalid_chars() {
        assert_eq!(sanitize("a-b.c"), "a_b_c");
    }
}
