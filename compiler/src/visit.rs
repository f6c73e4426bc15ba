// visit.rs — Read-only graph walks over a dataflow
//
// Three collectors share one traversal: starting from a set of roots, walk
// forward operands (Operation operands, Accumulator data/reset, Delay
// source) with an identity-keyed visited set. The accumulator feedback edge
// is implicit and therefore never followed. Results are `BTreeSet`s so that
// every consumer iterates in NodeId order.
//
// Preconditions: every root and operand id belongs to `graph`.
// Postconditions: each collector returns a deterministic set of node ids.
// Failure modes: none (unknown ids are skipped).
// Side effects: none.

use std::collections::{BTreeSet, HashSet};

use crate::graph::{Dataflow, Node};
use crate::id::NodeId;

/// A graph walk that keeps the nodes matching `keep`.
pub trait Collector {
    /// Whether to descend into the operands of visited nodes.
    const DESCEND: bool = true;

    fn keep(&self, node: &Node) -> bool;

    fn collect<'r>(
        &self,
        graph: &Dataflow,
        roots: impl IntoIterator<Item = &'r NodeId>,
    ) -> BTreeSet<NodeId> {
        let mut visited: HashSet<NodeId> = HashSet::new();
        let mut found = BTreeSet::new();
        let mut stack: Vec<NodeId> = roots.into_iter().copied().collect();
        // Pop smallest-first for a reproducible visit order.
        stack.sort_by(|a, b| b.cmp(a));

        while let Some(id) = stack.pop() {
            if !visited.insert(id) {
                continue;
            }
            let Ok(node) = graph.get(id) else {
                continue;
            };
            if self.keep(node) {
                found.insert(id);
            }
            if Self::DESCEND {
                let mut operands = node.forward_operands();
                operands.sort_by(|a, b| b.cmp(a));
                stack.extend(operands.into_iter().filter(|o| !visited.contains(o)));
            }
        }
        found
    }
}

/// Every Variable reachable from the roots; these become input ports.
#[derive(Debug, Default, Clone, Copy)]
pub struct InputCollector;

impl Collector for InputCollector {
    fn keep(&self, node: &Node) -> bool {
        node.is_variable()
    }
}

/// The roots themselves, materialized as an ordered set.
#[derive(Debug, Default, Clone, Copy)]
pub struct OutputCollector;

impl Collector for OutputCollector {
    const DESCEND: bool = false;

    fn keep(&self, _node: &Node) -> bool {
        true
    }
}

/// Every node reachable from the roots, roots included.
#[derive(Debug, Default, Clone, Copy)]
pub struct AllCollector;

impl Collector for AllCollector {
    fn keep(&self, _node: &Node) -> bool {
        true
    }
}

pub fn collect_inputs<'r>(
    graph: &Dataflow,
    roots: impl IntoIterator<Item = &'r NodeId>,
) -> BTreeSet<NodeId> {
    InputCollector.collect(graph, roots)
}

pub fn collect_outputs<'r>(
    graph: &Dataflow,
    roots: impl IntoIterator<Item = &'r NodeId>,
) -> BTreeSet<NodeId> {
    OutputCollector.collect(graph, roots)
}

pub fn collect_all<'r>(
    graph: &Dataflow,
    roots: impl IntoIterator<Item = &'r NodeId>,
) -> BTreeSet<NodeId> {
    AllCollector.collect(graph, roots)
}
