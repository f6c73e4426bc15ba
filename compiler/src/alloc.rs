// alloc.rs — Storage binding and update-logic emission
//
// Binds every scheduled node to storage and emits the logic that computes it,
// in two phases over the node set in NodeId order:
//   1. bind: choose a `Binding` per node and declare its registers;
//   2. emit: declare wires with their assignments and add register update
//      rules, creating stage-aligned copies of operands on demand.
//
// Timing model: a node's value is valid at its `end_stage`. A consumer that
// reads an operand at a later stage `s` reads the staged copy `<base>_s<s>`,
// a register chain advanced once per clock from the base signal.
//
// Preconditions: every node in `nodes` has both stages set and its operands
//                are also in `nodes`; variable input ports already exist.
// Postconditions: every node in `nodes` has exactly one binding; every
//                 register has an update rule.
// Failure modes: `DuplicateBinding` (node bound twice or signal name clash),
//                `UnknownNode`.
// Side effects: declares signals and rules on the given `rtl::Module`.

use std::collections::{BTreeMap, BTreeSet};

use crate::diag::CompileError;
use crate::graph::{Dataflow, Node, NodeKind};
use crate::id::NodeId;
use crate::rtl::{Expr, Module, SeqRule};

// ── Bindings ────────────────────────────────────────────────────────────────

/// Storage chosen for a node's value at its end stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Binding {
    /// Emitted inline as a literal.
    Constant { value: i64 },
    /// An input port of the module.
    Port { name: String },
    /// A combinational wire.
    Wire { name: String },
    /// A clocked register.
    Register { name: String },
}

impl Binding {
    /// The signal holding the value, if any.
    pub fn signal(&self) -> Option<&str> {
        match self {
            Binding::Constant { .. } => None,
            Binding::Port { name } | Binding::Wire { name } | Binding::Register { name } => {
                Some(name)
            }
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Binding::Constant { .. } => "constant",
            Binding::Port { .. } => "port",
            Binding::Wire { .. } => "wire",
            Binding::Register { .. } => "register",
        }
    }
}

/// Result of allocation: one binding per node plus the staged copies made.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Allocation {
    bindings: BTreeMap<NodeId, Binding>,
    staged: BTreeMap<(NodeId, u32), String>,
}

impl Allocation {
    pub fn binding(&self, id: NodeId) -> Option<&Binding> {
        self.bindings.get(&id)
    }

    pub fn bindings(&self) -> &BTreeMap<NodeId, Binding> {
        &self.bindings
    }

    /// Staged copies as `(node, stage, signal)` in node/stage order.
    pub fn staged_copies(&self) -> impl Iterator<Item = (NodeId, u32, &str)> + '_ {
        self.staged
            .iter()
            .map(|(&(id, stage), name)| (id, stage, name.as_str()))
    }

    pub fn register_count(&self) -> usize {
        self.bindings
            .values()
            .filter(|b| matches!(b, Binding::Register { .. }))
            .count()
    }

    /// Expression reading `id` at its end stage.
    pub fn expr(&self, graph: &Dataflow, id: NodeId) -> Result<Expr, CompileError> {
        let node = graph.get(id)?;
        let binding = self.bindings.get(&id).ok_or(CompileError::UnknownNode(id))?;
        Ok(binding_expr(node, binding))
    }
}

fn binding_expr(node: &Node, binding: &Binding) -> Expr {
    match binding {
        Binding::Constant { value } => Expr::constant(*value, node.width, node.signed),
        Binding::Port { name } | Binding::Wire { name } | Binding::Register { name } => {
            Expr::signal(name.as_str())
        }
    }
}

/// Deterministic signal name for a computed node: `_df_<kind>_<id>`.
pub fn signal_name(node: &Node) -> String {
    format!("_df_{}_{}", node.kind_name(), node.id.0)
}

// ── Allocator ───────────────────────────────────────────────────────────────

/// Bind and emit every node of `nodes` into `module`.
pub fn allocate(
    graph: &Dataflow,
    module: &mut Module,
    nodes: &BTreeSet<NodeId>,
) -> Result<Allocation, CompileError> {
    let mut allocator = Allocator {
        graph,
        module,
        alloc: Allocation::default(),
    };
    for &id in nodes {
        allocator.bind(id)?;
    }
    for &id in nodes {
        allocator.emit(id)?;
    }
    log::debug!(
        "allocate: {} binding(s), {} register(s), {} staged cop(ies)",
        allocator.alloc.bindings.len(),
        allocator.alloc.register_count(),
        allocator.alloc.staged.len()
    );
    Ok(allocator.alloc)
}

struct Allocator<'a> {
    graph: &'a Dataflow,
    module: &'a mut Module,
    alloc: Allocation,
}

impl Allocator<'_> {
    // ── Phase 1: binding ───────────────────────────────────────────────────

    fn bind(&mut self, id: NodeId) -> Result<(), CompileError> {
        let node = self.graph.get(id)?;
        let (start, end) = stages(node);
        let binding = match &node.kind {
            NodeKind::Constant { value } => Binding::Constant { value: *value },
            NodeKind::Variable { .. } => Binding::Port {
                name: node.name.clone().unwrap_or_else(|| signal_name(node)),
            },
            NodeKind::Operation { .. } if end == start => Binding::Wire {
                name: signal_name(node),
            },
            NodeKind::Operation { .. } => {
                let base = signal_name(node);
                self.module.reg(&base, node.width, node.signed, 0)?;
                for k in 1..(end - start) {
                    self.module
                        .reg(&format!("{base}_p{k}"), node.width, node.signed, 0)?;
                }
                Binding::Register { name: base }
            }
            NodeKind::Accumulator { initval, .. } => {
                let base = signal_name(node);
                self.module.reg(&base, node.width, node.signed, *initval)?;
                Binding::Register { name: base }
            }
            NodeKind::Delay { .. } => {
                let base = signal_name(node);
                self.module.reg(&base, node.width, node.signed, 0)?;
                Binding::Register { name: base }
            }
        };
        log::trace!("bind: {} -> {} {:?}", node.label(), binding.kind_name(), binding.signal());
        if self.alloc.bindings.insert(id, binding).is_some() {
            return Err(CompileError::DuplicateBinding {
                node: node.label(),
                reason: "node bound twice".to_string(),
            });
        }
        Ok(())
    }

    // ── Phase 2: logic emission ────────────────────────────────────────────

    fn emit(&mut self, id: NodeId) -> Result<(), CompileError> {
        let graph = self.graph;
        let node = graph.get(id)?;
        let (start, end) = stages(node);
        let Some(base) = self
            .alloc
            .bindings
            .get(&id)
            .and_then(|b| b.signal())
            .map(str::to_string)
        else {
            return Ok(());
        };

        match &node.kind {
            NodeKind::Constant { .. } | NodeKind::Variable { .. } => {}
            NodeKind::Operation { op, operands } => {
                let args = operands
                    .iter()
                    .map(|&o| self.value_at(o, start))
                    .collect::<Result<Vec<_>, _>>()?;
                let value = match args.as_slice() {
                    [a] => Expr::unary(*op, a.clone()),
                    [a, b] => Expr::binary(*op, a.clone(), b.clone()),
                    _ => {
                        return Err(CompileError::TypeMismatch {
                            node: node.label(),
                            reason: format!("'{op}' with {} operands", args.len()),
                        })
                    }
                };
                let latency = end - start;
                if latency == 0 {
                    self.module.wire(&base, node.width, node.signed, value)?;
                } else if latency == 1 {
                    self.module.add_rule(SeqRule::always(base, value));
                } else {
                    self.module
                        .add_rule(SeqRule::always(format!("{base}_p1"), value));
                    for k in 2..latency {
                        self.module.add_rule(SeqRule::always(
                            format!("{base}_p{k}"),
                            Expr::signal(format!("{base}_p{}", k - 1)),
                        ));
                    }
                    let last = Expr::signal(format!("{base}_p{}", latency - 1));
                    self.module.add_rule(SeqRule::always(base, last));
                }
            }
            NodeKind::Accumulator {
                op,
                data,
                initval,
                reset,
            } => {
                let data = self.value_at(*data, start)?;
                let mut next = Expr::signal(base.as_str());
                for step in op.operators() {
                    next = Expr::binary(step, next, data.clone());
                }
                let mut rule = SeqRule::always(base, next);
                if let Some(reset) = reset {
                    let cond = self.value_at(*reset, start)?;
                    rule = rule.when(cond, Expr::constant(*initval, node.width, node.signed));
                }
                self.module.add_rule(rule);
            }
            NodeKind::Delay { source } => {
                let value = self.value_at(*source, start)?;
                self.module.add_rule(SeqRule::always(base, value));
            }
        }
        Ok(())
    }

    /// Expression reading `id` as seen at `stage`, creating staged copies
    /// `_df_<kind>_<id>_s<k>` for every stage between its end stage and
    /// `stage`. Port-bound nodes are staged under their generated name too,
    /// keeping copies out of the user's port namespace.
    fn value_at(&mut self, id: NodeId, stage: u32) -> Result<Expr, CompileError> {
        let graph = self.graph;
        let node = graph.get(id)?;
        let binding = self.alloc.bindings.get(&id).ok_or(CompileError::UnknownNode(id))?;
        let base = binding_expr(node, binding);
        let Some(signal) = binding.signal().map(str::to_string) else {
            return Ok(base);
        };
        let (_, end) = stages(node);
        if stage <= end {
            return Ok(base);
        }

        let staged = signal_name(node);
        let mut prev = signal;
        for k in end + 1..=stage {
            let name = format!("{staged}_s{k}");
            if !self.alloc.staged.contains_key(&(id, k)) {
                self.module.reg(&name, node.width, node.signed, 0)?;
                self.module
                    .add_rule(SeqRule::always(name.as_str(), Expr::signal(prev.as_str())));
                log::trace!("stage copy: {} at stage {} as {}", node.label(), k, name);
                self.alloc.staged.insert((id, k), name.clone());
            }
            prev = name;
        }
        Ok(Expr::signal(prev))
    }
}

fn stages(node: &Node) -> (u32, u32) {
    node.stages().unwrap_or((0, 0))
}
