// schedule.rs — ASAP pipeline stage assignment and output balancing
//
// Assigns every node reachable from the declared outputs a start/end stage:
// nodes are processed in dependency order (Kahn's algorithm over forward
// edges, ready queue ordered by NodeId) and each starts as soon as all of its
// forward operands have finished. Accumulator feedback is implicit and never
// gates scheduling. Balancing then appends delay stages so every output
// finishes at the same stage.
//
// Preconditions: `graph` was built through the `Dataflow` API; `outputs` are
//                ids of that graph.
// Postconditions: every node reachable from `outputs` has both stages set;
//                 after `balance_outputs`, every balanced output ends at
//                 `max_stage`.
// Failure modes: a cycle among forward edges → `CyclicDependency` naming the
//                nodes of the cycle.
// Side effects: mutates stage attributes of `graph`; balancing appends
//               Delay nodes.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt;

use crate::diag::CompileError;
use crate::graph::{Dataflow, NodeKind};
use crate::id::NodeId;
use crate::op::LatencyTable;
use crate::pass::StageCert;
use crate::visit::{AllCollector, Collector};

// ── Public types ────────────────────────────────────────────────────────────

/// A declared output and the node that carries its value at `max_stage`.
///
/// `balanced == declared` when no delay stages were needed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BalancedOutput {
    pub declared: NodeId,
    pub balanced: NodeId,
}

/// Stage assignment summary produced by `schedule`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schedule {
    /// Nodes in the order they were scheduled.
    pub order: Vec<NodeId>,
    /// `max(end_stage)` over the declared outputs.
    pub max_stage: u32,
}

// ── Public entry points ─────────────────────────────────────────────────────

/// Assign ASAP stages to every node reachable from `outputs`.
pub fn schedule(
    graph: &mut Dataflow,
    outputs: &BTreeSet<NodeId>,
    latency: &LatencyTable,
) -> Result<Schedule, CompileError> {
    let reachable = AllCollector.collect(graph, outputs);
    let order = topological_order(graph, &reachable)?;

    for &id in &order {
        let (start, end) = {
            let node = graph.node(id);
            let ready = node
                .forward_operands()
                .iter()
                .map(|&o| graph.node(o).end_stage.unwrap_or(0))
                .max()
                .unwrap_or(0);
            match &node.kind {
                NodeKind::Constant { .. } | NodeKind::Variable { .. } => (0, 0),
                NodeKind::Operation { op, .. } => (ready, ready + latency.latency(*op)),
                NodeKind::Accumulator { .. } | NodeKind::Delay { .. } => (ready, ready + 1),
            }
        };
        log::trace!("schedule: {} -> [{}, {}]", graph.label(id), start, end);
        let node = graph.get_mut(id)?;
        node.start_stage = Some(start);
        node.end_stage = Some(end);
    }

    let mut max_stage = 0;
    for &o in outputs {
        max_stage = max_stage.max(graph.get(o)?.end_stage.unwrap_or(0));
    }
    log::debug!(
        "schedule: {} node(s) staged, max stage {}",
        order.len(),
        max_stage
    );

    Ok(Schedule { order, max_stage })
}

/// Append delay stages so that every output ends at `max_stage`.
///
/// Returns one `BalancedOutput` per declared output, in declared-id order.
pub fn balance_outputs(
    graph: &mut Dataflow,
    outputs: &BTreeSet<NodeId>,
    max_stage: u32,
) -> Result<Vec<BalancedOutput>, CompileError> {
    let mut balanced = Vec::with_capacity(outputs.len());
    for &declared in outputs {
        let mut tail = declared;
        let mut end = graph.get(declared)?.end_stage.unwrap_or(0);
        while end < max_stage {
            let delay = graph.delay(tail)?;
            let node = graph.get_mut(delay)?;
            node.start_stage = Some(end);
            node.end_stage = Some(end + 1);
            tail = delay;
            end += 1;
        }
        if tail != declared {
            log::debug!(
                "balance: {} padded to stage {} via {}",
                graph.label(declared),
                max_stage,
                graph.label(tail)
            );
        }
        balanced.push(BalancedOutput {
            declared,
            balanced: tail,
        });
    }
    Ok(balanced)
}

// ── Topological sort (Kahn's algorithm) ─────────────────────────────────────

fn topological_order(
    graph: &Dataflow,
    reachable: &BTreeSet<NodeId>,
) -> Result<Vec<NodeId>, CompileError> {
    let mut in_degree: BTreeMap<NodeId, u32> = BTreeMap::new();
    let mut users: HashMap<NodeId, Vec<NodeId>> = HashMap::new();

    for &id in reachable {
        in_degree.entry(id).or_insert(0);
        // A node using the same operand twice counts both edges.
        for operand in graph.node(id).forward_operands() {
            *in_degree.entry(id).or_insert(0) += 1;
            users.entry(operand).or_default().push(id);
        }
    }

    // Ready set ordered by NodeId for deterministic tie-breaking.
    let mut ready: BTreeSet<NodeId> = in_degree
        .iter()
        .filter(|(_, &deg)| deg == 0)
        .map(|(&id, _)| id)
        .collect();
    let mut order = Vec::with_capacity(reachable.len());

    while let Some(id) = ready.pop_first() {
        order.push(id);
        if let Some(next) = users.get(&id) {
            for user in next {
                if let Some(deg) = in_degree.get_mut(user) {
                    *deg -= 1;
                    if *deg == 0 {
                        ready.insert(*user);
                    }
                }
            }
        }
    }

    if order.len() < reachable.len() {
        let scheduled: HashSet<NodeId> = order.iter().copied().collect();
        let stuck: Vec<NodeId> = reachable
            .iter()
            .copied()
            .filter(|id| !scheduled.contains(id))
            .collect();
        let cycle = find_cycle(graph, &stuck).unwrap_or(stuck);
        return Err(CompileError::CyclicDependency {
            nodes: cycle.iter().map(|&id| graph.label(id)).collect(),
            cycle,
        });
    }

    Ok(order)
}

/// Extract one cycle among `stuck` nodes (DFS over operand edges).
///
/// The cycle is rotated to start at its smallest id and listed in dataflow
/// direction (producer before consumer).
fn find_cycle(graph: &Dataflow, stuck: &[NodeId]) -> Option<Vec<NodeId>> {
    let members: HashSet<NodeId> = stuck.iter().copied().collect();
    let mut state: HashMap<NodeId, u8> = HashMap::new(); // 1 = on path, 2 = done
    let mut path = Vec::new();

    fn dfs(
        graph: &Dataflow,
        node: NodeId,
        members: &HashSet<NodeId>,
        state: &mut HashMap<NodeId, u8>,
        path: &mut Vec<NodeId>,
    ) -> Option<Vec<NodeId>> {
        state.insert(node, 1);
        path.push(node);
        for operand in graph.node(node).forward_operands() {
            if !members.contains(&operand) {
                continue;
            }
            match state.get(&operand).copied().unwrap_or(0) {
                0 => {
                    if let Some(cycle) = dfs(graph, operand, members, state, path) {
                        return Some(cycle);
                    }
                }
                1 => {
                    let pos = path.iter().position(|&n| n == operand)?;
                    return Some(path[pos..].to_vec());
                }
                _ => {}
            }
        }
        path.pop();
        state.insert(node, 2);
        None
    }

    for &start in stuck {
        if state.get(&start).copied().unwrap_or(0) == 0 {
            if let Some(mut cycle) = dfs(graph, start, &members, &mut state, &mut path) {
                // Path follows consumer → operand; flip to dataflow order.
                cycle.reverse();
                let min_pos = cycle
                    .iter()
                    .enumerate()
                    .min_by_key(|(_, id)| **id)
                    .map(|(i, _)| i)
                    .unwrap_or(0);
                cycle.rotate_left(min_pos);
                return Some(cycle);
            }
        }
    }
    None
}

// ── Verification ────────────────────────────────────────────────────────────

/// Machine-checkable evidence for schedule postconditions (S1-S4).
#[derive(Debug, Clone)]
pub struct ScheduleCert {
    /// S1: every node reachable from the balanced outputs has both stages.
    pub s1_all_nodes_staged: bool,
    /// S2: every node starts no earlier than each forward operand ends.
    pub s2_operands_ready: bool,
    /// S3: `end - start` matches the latency of each node.
    pub s3_latency_accounted: bool,
    /// S4: every balanced output ends at `max_stage`.
    pub s4_outputs_balanced: bool,
}

impl StageCert for ScheduleCert {
    fn all_pass(&self) -> bool {
        self.s1_all_nodes_staged
            && self.s2_operands_ready
            && self.s3_latency_accounted
            && self.s4_outputs_balanced
    }

    fn obligations(&self) -> Vec<(&'static str, bool)> {
        vec![
            ("S1_all_nodes_staged", self.s1_all_nodes_staged),
            ("S2_operands_ready", self.s2_operands_ready),
            ("S3_latency_accounted", self.s3_latency_accounted),
            ("S4_outputs_balanced", self.s4_outputs_balanced),
        ]
    }
}

/// Verify schedule postconditions over the balanced graph.
pub fn verify_schedule(
    graph: &Dataflow,
    outputs: &[BalancedOutput],
    max_stage: u32,
    latency: &LatencyTable,
) -> ScheduleCert {
    let roots: Vec<NodeId> = outputs.iter().map(|o| o.balanced).collect();
    let all = AllCollector.collect(graph, &roots);

    let s1 = all.iter().all(|&id| graph.node(id).stages().is_some());
    let s2 = all.iter().all(|&id| {
        let node = graph.node(id);
        let start = node.start_stage.unwrap_or(0);
        node.forward_operands()
            .iter()
            .all(|&o| graph.node(o).end_stage.unwrap_or(u32::MAX) <= start)
    });
    let s3 = all.iter().all(|&id| {
        let node = graph.node(id);
        let Some((start, end)) = node.stages() else {
            return false;
        };
        let expected = match &node.kind {
            NodeKind::Constant { .. } | NodeKind::Variable { .. } => 0,
            NodeKind::Operation { op, .. } => latency.latency(*op),
            NodeKind::Accumulator { .. } | NodeKind::Delay { .. } => 1,
        };
        end - start == expected
    });
    let s4 = outputs
        .iter()
        .all(|o| graph.node(o.balanced).end_stage == Some(max_stage));

    ScheduleCert {
        s1_all_nodes_staged: s1,
        s2_operands_ready: s2,
        s3_latency_accounted: s3,
        s4_outputs_balanced: s4,
    }
}

// ── Display ─────────────────────────────────────────────────────────────────

/// Stage report for `--emit schedule`.
pub struct StageReport<'a> {
    pub graph: &'a Dataflow,
    pub outputs: &'a [BalancedOutput],
    pub max_stage: u32,
}

impl fmt::Display for StageReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let roots: Vec<NodeId> = self.outputs.iter().map(|o| o.balanced).collect();
        let all = AllCollector.collect(self.graph, &roots);
        writeln!(
            f,
            "Schedule ({} nodes, max stage {})",
            all.len(),
            self.max_stage
        )?;
        let mut by_stage: BTreeMap<u32, Vec<NodeId>> = BTreeMap::new();
        for &id in &all {
            let end = self.graph.node(id).end_stage.unwrap_or(0);
            by_stage.entry(end).or_default().push(id);
        }
        for (stage, ids) in &by_stage {
            writeln!(f, "  stage {stage}:")?;
            for &id in ids {
                let node = self.graph.node(id);
                let start = node.start_stage.unwrap_or(0);
                writeln!(f, "    {} (start {})", node.label(), start)?;
            }
        }
        writeln!(f, "  outputs:")?;
        for out in self.outputs {
            if out.balanced == out.declared {
                writeln!(f, "    {}", self.graph.label(out.declared))?;
            } else {
                writeln!(
                    f,
                    "    {} via {}",
                    self.graph.label(out.declared),
                    self.graph.label(out.balanced)
                )?;
            }
        }
        Ok(())
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{AccumOpts, VariableOpts};
    use crate::op::Operator;

    fn var(df: &mut Dataflow, name: &str) -> NodeId {
        df.variable(name, VariableOpts::width(8)).unwrap()
    }

    fn set(ids: &[NodeId]) -> BTreeSet<NodeId> {
        ids.iter().copied().collect()
    }

    #[test]
    fn unknown_output_is_an_error() {
        let mut df = Dataflow::new();
        let a = var(&mut df, "a");
        let err = schedule(&mut df, &set(&[a, NodeId(7)]), &LatencyTable::new()).unwrap_err();
        assert_eq!(err, CompileError::UnknownNode(NodeId(7)));
    }

    #[test]
    fn combinational_chain_stays_at_stage_zero() {
        let mut df = Dataflow::new();
        let a = var(&mut df, "a");
        let b = var(&mut df, "b");
        let s = df.add(a, b).unwrap();
        let x = df.binary(Operator::Xor, s, a).unwrap();
        let sched = schedule(&mut df, &set(&[x]), &LatencyTable::new()).unwrap();
        assert_eq!(sched.max_stage, 0);
        assert_eq!(df.node(s).stages(), Some((0, 0)));
        assert_eq!(df.node(x).stages(), Some((0, 0)));
        assert_eq!(sched.order, vec![a, b, s, x]);
    }

    #[test]
    fn multiply_latency_is_accounted() {
        let mut df = Dataflow::new();
        let a = var(&mut df, "a");
        let b = var(&mut df, "b");
        let p = df.mul(a, b).unwrap();
        let q = df.add(p, a).unwrap();
        let mut table = LatencyTable::new();
        table.set(Operator::Mul, 3);
        let sched = schedule(&mut df, &set(&[q]), &table).unwrap();
        assert_eq!(df.node(p).stages(), Some((0, 3)));
        assert_eq!(df.node(q).stages(), Some((3, 3)));
        assert_eq!(sched.max_stage, 3);
    }

    #[test]
    fn accumulator_takes_one_stage_after_data() {
        let mut df = Dataflow::new();
        let a = var(&mut df, "a");
        let b = var(&mut df, "b");
        let p = df.mul(a, b).unwrap();
        let acc = df.accumulate_add(p, AccumOpts::width(8)).unwrap();
        let sched = schedule(&mut df, &set(&[acc]), &LatencyTable::new()).unwrap();
        assert_eq!(df.node(acc).stages(), Some((2, 3)));
        assert_eq!(sched.max_stage, 3);
    }

    #[test]
    fn balancing_pads_shorter_outputs() {
        let mut df = Dataflow::new();
        let a = var(&mut df, "a");
        let b = var(&mut df, "b");
        let fast = df.add(a, b).unwrap();
        let slow = df.mul(a, b).unwrap();
        let outputs = set(&[fast, slow]);
        let sched = schedule(&mut df, &outputs, &LatencyTable::new()).unwrap();
        assert_eq!(sched.max_stage, 2);

        let balanced = balance_outputs(&mut df, &outputs, sched.max_stage).unwrap();
        assert_eq!(balanced.len(), 2);
        assert_eq!(balanced[0].declared, fast);
        assert_ne!(balanced[0].balanced, fast);
        assert_eq!(balanced[1], BalancedOutput { declared: slow, balanced: slow });
        for out in &balanced {
            assert_eq!(df.node(out.balanced).end_stage, Some(2));
        }
        // Two delay stages hang off `fast`.
        let tail = df.node(balanced[0].balanced);
        let NodeKind::Delay { source } = tail.kind else {
            panic!("expected delay");
        };
        assert!(matches!(df.node(source).kind, NodeKind::Delay { source: s } if s == fast));

        let cert = verify_schedule(&df, &balanced, sched.max_stage, &LatencyTable::new());
        assert!(cert.all_pass(), "{:?}", cert.obligations());
    }

    #[test]
    fn shared_node_is_scheduled_once() {
        let mut df = Dataflow::new();
        let a = var(&mut df, "a");
        let shared = df.mul(a, a).unwrap();
        let left = df.add(shared, a).unwrap();
        let right = df.sub(shared, a).unwrap();
        let sched = schedule(&mut df, &set(&[left, right]), &LatencyTable::new()).unwrap();
        assert_eq!(sched.order.iter().filter(|&&id| id == shared).count(), 1);
    }

    #[test]
    fn operation_cycle_is_rejected() {
        let mut df = Dataflow::new();
        let a = var(&mut df, "a");
        let s = df.add(a, a).unwrap();
        let t = df.sub(s, a).unwrap();
        df.set_operand(s, 1, t).unwrap();
        let err = schedule(&mut df, &set(&[t]), &LatencyTable::new()).unwrap_err();
        assert_eq!(
            err,
            CompileError::CyclicDependency {
                nodes: vec!["plus#1".to_string(), "minus#2".to_string()],
                cycle: vec![NodeId(1), NodeId(2)],
            }
        );
    }

    #[test]
    fn cycle_report_excludes_downstream_nodes() {
        let mut df = Dataflow::new();
        let a = var(&mut df, "a");
        let s = df.add(a, a).unwrap();
        let t = df.sub(s, a).unwrap();
        let downstream = df.binary(Operator::Xor, t, a).unwrap();
        df.set_operand(s, 1, t).unwrap();
        let err = schedule(&mut df, &set(&[downstream]), &LatencyTable::new()).unwrap_err();
        let CompileError::CyclicDependency { nodes, cycle } = err else {
            panic!("expected cycle");
        };
        assert_eq!(nodes.len(), 2);
        assert!(!nodes.contains(&df.label(downstream)));
        assert!(!cycle.contains(&downstream));
    }

    #[test]
    fn stage_report_lists_stages_and_outputs() {
        let mut df = Dataflow::new();
        let a = var(&mut df, "a");
        let b = var(&mut df, "b");
        let fast = df.add(a, b).unwrap();
        let slow = df.mul(a, b).unwrap();
        let outputs = set(&[fast, slow]);
        let sched = schedule(&mut df, &outputs, &LatencyTable::new()).unwrap();
        let balanced = balance_outputs(&mut df, &outputs, sched.max_stage).unwrap();
        let report = StageReport {
            graph: &df,
            outputs: &balanced,
            max_stage: sched.max_stage,
        }
        .to_string();
        assert!(report.starts_with("Schedule (6 nodes, max stage 2)"));
        assert!(report.contains("plus#2 via delay#5"));
        assert!(report.contains("  stage 2:\n    times#3 (start 0)\n    delay#5 (start 1)\n"));
    }
}
