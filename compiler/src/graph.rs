// graph.rs — Dataflow graph model and construction API
//
// A `Dataflow` is the explicit compilation context: an arena of typed nodes
// indexed by `NodeId`. Operand edges are ids into the arena, so the implicit
// feedback edge of an accumulator never creates an ownership cycle.
//
// Preconditions: none.
// Postconditions: every node returned by a construction call is registered in
//                 the arena with a fresh, strictly increasing id and passed
//                 operand type checks.
// Failure modes: `TypeMismatch`, `UndefinedOperator`, `UnknownNode`.
// Side effects: none.

use std::fmt;

use serde::Serialize;

use crate::diag::CompileError;
use crate::id::{IdAllocator, NodeId};
use crate::op::{AccumOp, Operator};

pub const DEFAULT_DATAWIDTH: u32 = 32;
pub const MAX_WIDTH: u32 = 64;

// ── Public types ────────────────────────────────────────────────────────────

/// The kind of a graph node.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NodeKind {
    /// An immediate value.
    Constant { value: i64 },
    /// An external streaming input. The port name is the node name.
    Variable {
        valid: Option<String>,
        ready: Option<String>,
    },
    /// A pure function of its operands.
    Operation { op: Operator, operands: Vec<NodeId> },
    /// A registered value updated once per cycle from its own previous value
    /// and `data`.
    Accumulator {
        op: AccumOp,
        data: NodeId,
        initval: i64,
        reset: Option<NodeId>,
    },
    /// A pass-through pipeline register inserted by output balancing.
    Delay { source: NodeId },
}

/// A node in the dataflow graph.
#[derive(Debug, Clone, Serialize)]
pub struct Node {
    pub id: NodeId,
    pub name: Option<String>,
    #[serde(flatten)]
    pub kind: NodeKind,
    pub width: u32,
    pub signed: bool,
    #[serde(skip)]
    pub start_stage: Option<u32>,
    #[serde(skip)]
    pub end_stage: Option<u32>,
}

impl Node {
    pub fn is_constant(&self) -> bool {
        matches!(self.kind, NodeKind::Constant { .. })
    }

    pub fn is_variable(&self) -> bool {
        matches!(self.kind, NodeKind::Variable { .. })
    }

    /// Short lowercase kind name used in labels and signal names.
    pub fn kind_name(&self) -> &'static str {
        match &self.kind {
            NodeKind::Constant { .. } => "const",
            NodeKind::Variable { .. } => "var",
            NodeKind::Operation { op, .. } => op.signal_name(),
            NodeKind::Accumulator { op, .. } => op.signal_name(),
            NodeKind::Delay { .. } => "delay",
        }
    }

    /// Human-readable reference used in error messages: `name#id` or `kind#id`.
    pub fn label(&self) -> String {
        match &self.name {
            Some(name) => format!("{}#{}", name, self.id.0),
            None => format!("{}#{}", self.kind_name(), self.id.0),
        }
    }

    /// Operands that gate scheduling. The accumulator's feedback edge is
    /// implicit and never listed.
    pub fn forward_operands(&self) -> Vec<NodeId> {
        match &self.kind {
            NodeKind::Constant { .. } | NodeKind::Variable { .. } => Vec::new(),
            NodeKind::Operation { operands, .. } => operands.clone(),
            NodeKind::Accumulator { data, reset, .. } => {
                let mut ops = vec![*data];
                ops.extend(reset.iter().copied());
                ops
            }
            NodeKind::Delay { source } => vec![*source],
        }
    }

    /// Both stages, if the node has been scheduled.
    pub fn stages(&self) -> Option<(u32, u32)> {
        Some((self.start_stage?, self.end_stage?))
    }
}

/// Options for `Dataflow::variable`.
#[derive(Debug, Clone, Default)]
pub struct VariableOpts {
    pub valid: Option<String>,
    pub ready: Option<String>,
    /// Defaults to the dataflow's datawidth.
    pub width: Option<u32>,
    pub signed: bool,
}

impl VariableOpts {
    pub fn width(width: u32) -> Self {
        Self {
            width: Some(width),
            ..Self::default()
        }
    }
}

/// Options for the `accumulate_*` constructors.
#[derive(Debug, Clone, Default)]
pub struct AccumOpts {
    /// Value loaded on reset. Defaults to 0.
    pub initval: Option<i64>,
    /// One-bit synchronous reset condition.
    pub reset: Option<NodeId>,
    /// Defaults to the dataflow's datawidth.
    pub width: Option<u32>,
    pub signed: bool,
}

impl AccumOpts {
    pub fn width(width: u32) -> Self {
        Self {
            width: Some(width),
            ..Self::default()
        }
    }
}

/// The compilation context: owns every node of one dataflow graph.
#[derive(Debug, Clone, Serialize)]
pub struct Dataflow {
    datawidth: u32,
    nodes: Vec<Node>,
    #[serde(skip)]
    ids: IdAllocator,
}

impl Default for Dataflow {
    fn default() -> Self {
        Self::new()
    }
}

// ── Construction ────────────────────────────────────────────────────────────

impl Dataflow {
    pub fn new() -> Self {
        Dataflow {
            datawidth: DEFAULT_DATAWIDTH,
            nodes: Vec::new(),
            ids: IdAllocator::new(),
        }
    }

    /// Context whose variables and accumulators default to `datawidth` bits.
    pub fn with_datawidth(datawidth: u32) -> Result<Self, CompileError> {
        check_width("datawidth", datawidth)?;
        Ok(Dataflow {
            datawidth,
            ..Self::new()
        })
    }

    pub fn datawidth(&self) -> u32 {
        self.datawidth
    }

    fn push(&mut self, name: Option<String>, kind: NodeKind, width: u32, signed: bool) -> NodeId {
        let id = self.ids.alloc_node();
        debug_assert_eq!(id.index(), self.nodes.len());
        self.nodes.push(Node {
            id,
            name,
            kind,
            width,
            signed,
            start_stage: None,
            end_stage: None,
        });
        id
    }

    pub fn constant(&mut self, value: i64) -> NodeId {
        let (width, signed) = constant_width(value);
        self.push(None, NodeKind::Constant { value }, width, signed)
    }

    pub fn variable(&mut self, name: &str, opts: VariableOpts) -> Result<NodeId, CompileError> {
        let width = opts.width.unwrap_or(self.datawidth);
        check_width(name, width)?;
        Ok(self.push(
            Some(name.to_string()),
            NodeKind::Variable {
                valid: opts.valid,
                ready: opts.ready,
            },
            width,
            opts.signed,
        ))
    }

    /// Create an Operation node applying `op` to `operands`.
    pub fn operation(&mut self, op: Operator, operands: &[NodeId]) -> Result<NodeId, CompileError> {
        for &operand in operands {
            self.get(operand)?;
        }
        let label = format!("{}#{}", op.signal_name(), self.ids.allocated());
        let (width, signed) = self.operation_type(&label, op, operands)?;
        Ok(self.push(
            None,
            NodeKind::Operation {
                op,
                operands: operands.to_vec(),
            },
            width,
            signed,
        ))
    }

    pub fn unary(&mut self, op: Operator, a: NodeId) -> Result<NodeId, CompileError> {
        self.operation(op, &[a])
    }

    pub fn binary(&mut self, op: Operator, a: NodeId, b: NodeId) -> Result<NodeId, CompileError> {
        self.operation(op, &[a, b])
    }

    pub fn add(&mut self, a: NodeId, b: NodeId) -> Result<NodeId, CompileError> {
        self.binary(Operator::Add, a, b)
    }

    pub fn sub(&mut self, a: NodeId, b: NodeId) -> Result<NodeId, CompileError> {
        self.binary(Operator::Sub, a, b)
    }

    pub fn mul(&mut self, a: NodeId, b: NodeId) -> Result<NodeId, CompileError> {
        self.binary(Operator::Mul, a, b)
    }

    pub fn div(&mut self, a: NodeId, b: NodeId) -> Result<NodeId, CompileError> {
        self.binary(Operator::Div, a, b)
    }

    pub fn accumulate_add(&mut self, data: NodeId, opts: AccumOpts) -> Result<NodeId, CompileError> {
        self.accumulate(AccumOp::Add, data, opts)
    }

    pub fn accumulate_sub(&mut self, data: NodeId, opts: AccumOpts) -> Result<NodeId, CompileError> {
        self.accumulate(AccumOp::Sub, data, opts)
    }

    pub fn accumulate_mul(&mut self, data: NodeId, opts: AccumOpts) -> Result<NodeId, CompileError> {
        self.accumulate(AccumOp::Mul, data, opts)
    }

    pub fn accumulate_div(&mut self, data: NodeId, opts: AccumOpts) -> Result<NodeId, CompileError> {
        self.accumulate(AccumOp::Div, data, opts)
    }

    pub fn accumulate_custom(
        &mut self,
        ops: &[Operator],
        data: NodeId,
        opts: AccumOpts,
    ) -> Result<NodeId, CompileError> {
        self.accumulate(AccumOp::Custom(ops.to_vec()), data, opts)
    }

    /// Create an Accumulator node combining its stored value with `data`.
    pub fn accumulate(
        &mut self,
        op: AccumOp,
        data: NodeId,
        opts: AccumOpts,
    ) -> Result<NodeId, CompileError> {
        let label = format!("{}#{}", op.signal_name(), self.ids.allocated());
        let width = opts.width.unwrap_or(self.datawidth);
        check_width(&label, width)?;

        if let AccumOp::Custom(ops) = &op {
            if ops.is_empty() {
                return Err(CompileError::UndefinedOperator { node: label });
            }
            if let Some(bad) = ops.iter().find(|o| o.arity() != 2) {
                return Err(CompileError::TypeMismatch {
                    node: label,
                    reason: format!("accumulator operator '{bad}' is not binary"),
                });
            }
        }

        self.check_accum_operands(&label, width, opts.signed, data, opts.reset)?;

        Ok(self.push(
            None,
            NodeKind::Accumulator {
                op,
                data,
                initval: opts.initval.unwrap_or(0),
                reset: opts.reset,
            },
            width,
            opts.signed,
        ))
    }

    /// Append a balancing delay stage fed by `source`.
    pub(crate) fn delay(&mut self, source: NodeId) -> Result<NodeId, CompileError> {
        let src = self.get(source)?;
        let (width, signed) = (src.width, src.signed);
        Ok(self.push(None, NodeKind::Delay { source }, width, signed))
    }

    pub fn set_name(&mut self, node: NodeId, name: &str) -> Result<(), CompileError> {
        self.get_mut(node)?.name = Some(name.to_string());
        Ok(())
    }

    /// Replace operand `slot` of an Operation (or data/reset of an
    /// Accumulator, slots 0/1) with `operand`, re-running type checks.
    pub fn set_operand(
        &mut self,
        node: NodeId,
        slot: usize,
        operand: NodeId,
    ) -> Result<(), CompileError> {
        self.get(operand)?;
        let target = self.get(node)?;
        let label = target.label();
        let node_width = target.width;
        let node_signed = target.signed;
        match target.kind.clone() {
            NodeKind::Operation { op, mut operands } => {
                if slot >= operands.len() {
                    return Err(CompileError::TypeMismatch {
                        node: label,
                        reason: format!("operand slot {slot} out of range for '{op}'"),
                    });
                }
                operands[slot] = operand;
                let (width, signed) = self.operation_type(&label, op, &operands)?;
                let target = self.get_mut(node)?;
                target.kind = NodeKind::Operation { op, operands };
                target.width = width;
                target.signed = signed;
                Ok(())
            }
            NodeKind::Accumulator {
                op,
                data,
                initval,
                reset,
            } => {
                let (new_data, new_reset) = match slot {
                    0 => (operand, reset),
                    1 => (data, Some(operand)),
                    _ => {
                        return Err(CompileError::TypeMismatch {
                            node: label,
                            reason: format!("accumulator has no operand slot {slot}"),
                        })
                    }
                };
                self.check_accum_operands(&label, node_width, node_signed, new_data, new_reset)?;
                self.get_mut(node)?.kind = NodeKind::Accumulator {
                    op,
                    data: new_data,
                    initval,
                    reset: new_reset,
                };
                Ok(())
            }
            _ => Err(CompileError::TypeMismatch {
                node: label,
                reason: "node has no operands".to_string(),
            }),
        }
    }

    /// Accumulator `data` must fit the accumulator and share its signedness;
    /// `reset` must be one bit. Constants adapt and are exempt.
    fn check_accum_operands(
        &self,
        label: &str,
        width: u32,
        signed: bool,
        data: NodeId,
        reset: Option<NodeId>,
    ) -> Result<(), CompileError> {
        let data_node = self.get(data)?;
        if !data_node.is_constant() {
            if data_node.width > width {
                return Err(CompileError::TypeMismatch {
                    node: label.to_string(),
                    reason: format!(
                        "data {} is {} bits wide, accumulator is {} bits",
                        data_node.label(),
                        data_node.width,
                        width
                    ),
                });
            }
            if data_node.signed != signed {
                return Err(CompileError::TypeMismatch {
                    node: label.to_string(),
                    reason: format!("data {} has different signedness", data_node.label()),
                });
            }
        }
        if let Some(reset) = reset {
            let reset_node = self.get(reset)?;
            if !reset_node.is_constant() && reset_node.width != 1 {
                return Err(CompileError::TypeMismatch {
                    node: label.to_string(),
                    reason: format!(
                        "reset condition {} must be 1 bit wide, found {}",
                        reset_node.label(),
                        reset_node.width
                    ),
                });
            }
        }
        Ok(())
    }

    /// Result width and signedness of `op` over `operands`.
    fn operation_type(
        &self,
        label: &str,
        op: Operator,
        operands: &[NodeId],
    ) -> Result<(u32, bool), CompileError> {
        if operands.len() != op.arity() {
            return Err(CompileError::TypeMismatch {
                node: label.to_string(),
                reason: format!(
                    "'{}' takes {} operand(s), got {}",
                    op,
                    op.arity(),
                    operands.len()
                ),
            });
        }
        let nodes: Vec<&Node> = operands
            .iter()
            .map(|&id| self.get(id))
            .collect::<Result<_, _>>()?;

        // Shift amounts never constrain the result type.
        let typed: Vec<&Node> = if op.is_shift() {
            nodes.iter().take(1).copied().collect()
        } else {
            nodes.clone()
        };
        let sized: Vec<&Node> = typed.iter().copied().filter(|n| !n.is_constant()).collect();

        if let [a, b] = sized.as_slice() {
            if a.signed != b.signed {
                return Err(CompileError::TypeMismatch {
                    node: label.to_string(),
                    reason: format!(
                        "operands {} and {} differ in signedness",
                        a.label(),
                        b.label()
                    ),
                });
            }
            if op.is_bitwise() && a.width != b.width {
                return Err(CompileError::TypeMismatch {
                    node: label.to_string(),
                    reason: format!(
                        "bitwise '{}' needs equal widths, got {} ({}) and {} ({})",
                        op,
                        a.label(),
                        a.width,
                        b.label(),
                        b.width
                    ),
                });
            }
        }

        if op.is_comparison() {
            return Ok((1, false));
        }
        let basis = if sized.is_empty() { &typed } else { &sized };
        let width = basis.iter().map(|n| n.width).max().unwrap_or(1);
        let signed = basis.iter().any(|n| n.signed);
        Ok((width, signed))
    }
}

fn check_width(label: &str, width: u32) -> Result<(), CompileError> {
    if width == 0 || width > MAX_WIDTH {
        return Err(CompileError::TypeMismatch {
            node: label.to_string(),
            reason: format!("width {width} outside 1..={MAX_WIDTH}"),
        });
    }
    Ok(())
}

/// Minimal width and signedness able to hold `value`.
pub fn constant_width(value: i64) -> (u32, bool) {
    if value < 0 {
        (MAX_WIDTH - (!value).leading_zeros() + 1, true)
    } else {
        ((MAX_WIDTH - value.leading_zeros()).max(1), false)
    }
}

// ── Queries ─────────────────────────────────────────────────────────────────

impl Dataflow {
    pub fn get(&self, id: NodeId) -> Result<&Node, CompileError> {
        self.nodes.get(id.index()).ok_or(CompileError::UnknownNode(id))
    }

    pub(crate) fn get_mut(&mut self, id: NodeId) -> Result<&mut Node, CompileError> {
        self.nodes
            .get_mut(id.index())
            .ok_or(CompileError::UnknownNode(id))
    }

    /// Panicking accessor for ids already validated by this dataflow.
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    /// All nodes in id order.
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Look up a node by its user-assigned name.
    pub fn find(&self, name: &str) -> Option<NodeId> {
        self.nodes
            .iter()
            .find(|n| n.name.as_deref() == Some(name))
            .map(|n| n.id)
    }

    pub fn label(&self, id: NodeId) -> String {
        match self.nodes.get(id.index()) {
            Some(node) => node.label(),
            None => id.to_string(),
        }
    }

    pub(crate) fn clear_stages(&mut self) {
        for node in &mut self.nodes {
            node.start_stage = None;
            node.end_stage = None;
        }
    }
}

// ── Display ─────────────────────────────────────────────────────────────────

impl fmt::Display for Dataflow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Dataflow ({} nodes)", self.nodes.len())?;
        for node in &self.nodes {
            let stages = match node.stages() {
                Some((s, e)) => format!("[{s}, {e}]"),
                None => "[-]".to_string(),
            };
            let sign = if node.signed { "s" } else { "u" };
            write!(f, "  {:<14} {}{:<3} {:<8}", node.label(), sign, node.width, stages)?;
            match &node.kind {
                NodeKind::Constant { value } => writeln!(f, " = {value}")?,
                NodeKind::Variable { .. } => writeln!(f, " input")?,
                NodeKind::Operation { op, operands } => {
                    let args: Vec<String> = operands.iter().map(|o| o.to_string()).collect();
                    writeln!(f, " {}({})", op, args.join(", "))?;
                }
                NodeKind::Accumulator {
                    data, initval, reset, ..
                } => match reset {
                    Some(r) => writeln!(f, " acc({data}, init={initval}, reset={r})")?,
                    None => writeln!(f, " acc({data}, init={initval})")?,
                },
                NodeKind::Delay { source } => writeln!(f, " delay({source})")?,
            }
        }
        Ok(())
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn var(df: &mut Dataflow, name: &str, width: u32) -> NodeId {
        df.variable(name, VariableOpts::width(width)).unwrap()
    }

    #[test]
    fn ids_follow_construction_order() {
        let mut df = Dataflow::new();
        let a = var(&mut df, "a", 8);
        let c = df.constant(3);
        let s = df.add(a, c).unwrap();
        assert_eq!((a, c, s), (NodeId(0), NodeId(1), NodeId(2)));
        assert_eq!(df.len(), 3);
    }

    #[test]
    fn constant_widths() {
        assert_eq!(constant_width(0), (1, false));
        assert_eq!(constant_width(1), (1, false));
        assert_eq!(constant_width(255), (8, false));
        assert_eq!(constant_width(256), (9, false));
        assert_eq!(constant_width(-1), (1, true));
        assert_eq!(constant_width(-128), (8, true));
        assert_eq!(constant_width(-129), (9, true));
    }

    #[test]
    fn default_datawidth_applies_to_variables() {
        let mut df = Dataflow::with_datawidth(16).unwrap();
        let a = df.variable("a", VariableOpts::default()).unwrap();
        assert_eq!(df.node(a).width, 16);
        let acc = df.accumulate_add(a, AccumOpts::default()).unwrap();
        assert_eq!(df.node(acc).width, 16);
    }

    #[test]
    fn operation_result_types() {
        let mut df = Dataflow::new();
        let a = var(&mut df, "a", 8);
        let b = var(&mut df, "b", 12);
        let c = df.constant(1000);
        let sum = df.add(a, b).unwrap();
        assert_eq!(df.node(sum).width, 12);
        let scaled = df.mul(a, c).unwrap();
        assert_eq!(df.node(scaled).width, 8, "constants adapt to their consumer");
        let cmp = df.binary(Operator::Lt, a, b).unwrap();
        assert_eq!((df.node(cmp).width, df.node(cmp).signed), (1, false));
        let shifted = df.binary(Operator::Shl, a, b).unwrap();
        assert_eq!(df.node(shifted).width, 8);
    }

    #[test]
    fn mixed_signedness_is_rejected() {
        let mut df = Dataflow::new();
        let a = var(&mut df, "a", 8);
        let b = df
            .variable(
                "b",
                VariableOpts {
                    width: Some(8),
                    signed: true,
                    ..VariableOpts::default()
                },
            )
            .unwrap();
        let err = df.add(a, b).unwrap_err();
        assert!(matches!(err, CompileError::TypeMismatch { .. }), "{err}");
        // Shift amount signedness does not matter.
        assert!(df.binary(Operator::Shr, b, a).is_ok());
    }

    #[test]
    fn bitwise_width_mismatch_is_rejected() {
        let mut df = Dataflow::new();
        let a = var(&mut df, "a", 8);
        let b = var(&mut df, "b", 4);
        assert!(matches!(
            df.binary(Operator::And, a, b),
            Err(CompileError::TypeMismatch { .. })
        ));
        let mask = df.constant(0xf);
        assert!(df.binary(Operator::And, a, mask).is_ok());
    }

    #[test]
    fn wrong_arity_is_rejected() {
        let mut df = Dataflow::new();
        let a = var(&mut df, "a", 8);
        assert!(matches!(
            df.operation(Operator::Add, &[a]),
            Err(CompileError::TypeMismatch { .. })
        ));
        assert!(matches!(
            df.operation(Operator::Not, &[a, a]),
            Err(CompileError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn invalid_widths_are_rejected() {
        let mut df = Dataflow::new();
        assert!(df.variable("z", VariableOpts::width(0)).is_err());
        assert!(df.variable("w", VariableOpts::width(65)).is_err());
    }

    #[test]
    fn unknown_operand_is_rejected() {
        let mut df = Dataflow::new();
        let a = var(&mut df, "a", 8);
        assert_eq!(
            df.add(a, NodeId(42)),
            Err(CompileError::UnknownNode(NodeId(42)))
        );
    }

    #[test]
    fn empty_custom_accumulator_is_undefined() {
        let mut df = Dataflow::new();
        let a = var(&mut df, "a", 8);
        let err = df
            .accumulate_custom(&[], a, AccumOpts::width(8))
            .unwrap_err();
        assert!(matches!(err, CompileError::UndefinedOperator { .. }));
    }

    #[test]
    fn accumulator_type_checks() {
        let mut df = Dataflow::new();
        let wide = var(&mut df, "wide", 16);
        assert!(matches!(
            df.accumulate_add(wide, AccumOpts::width(8)),
            Err(CompileError::TypeMismatch { .. })
        ));
        let rst = var(&mut df, "rst", 4);
        let narrow = var(&mut df, "narrow", 8);
        let opts = AccumOpts {
            reset: Some(rst),
            ..AccumOpts::width(8)
        };
        assert!(matches!(
            df.accumulate_add(narrow, opts),
            Err(CompileError::TypeMismatch { .. })
        ));
        assert!(matches!(
            df.accumulate_custom(&[Operator::Not], narrow, AccumOpts::width(8)),
            Err(CompileError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn accumulator_forward_operands_exclude_feedback() {
        let mut df = Dataflow::new();
        let x = var(&mut df, "x", 8);
        let rst = var(&mut df, "rst", 1);
        let acc = df
            .accumulate_add(
                x,
                AccumOpts {
                    reset: Some(rst),
                    ..AccumOpts::width(8)
                },
            )
            .unwrap();
        assert_eq!(df.node(acc).forward_operands(), vec![x, rst]);
        assert!(!df.node(acc).forward_operands().contains(&acc));
    }

    #[test]
    fn set_operand_rewires_and_rechecks() {
        let mut df = Dataflow::new();
        let a = var(&mut df, "a", 8);
        let b = var(&mut df, "b", 8);
        let s = df.add(a, b).unwrap();
        let t = df.sub(s, a).unwrap();
        df.set_operand(s, 1, t).unwrap();
        assert_eq!(df.node(s).forward_operands(), vec![a, t]);
        let other = var(&mut df, "c", 4);
        let x = df.binary(Operator::Xor, a, b).unwrap();
        assert!(df.set_operand(x, 0, other).is_err());
        assert!(df.set_operand(a, 0, b).is_err());
    }

    #[test]
    fn set_operand_rechecks_accumulator_data_and_reset() {
        let mut df = Dataflow::new();
        let u = var(&mut df, "u", 8);
        let s = df
            .variable(
                "s",
                VariableOpts {
                    signed: true,
                    ..VariableOpts::width(8)
                },
            )
            .unwrap();
        let wide = var(&mut df, "wide", 16);
        let flag = var(&mut df, "flag", 1);
        let acc = df.accumulate_add(u, AccumOpts::width(8)).unwrap();

        let err = df.set_operand(acc, 0, s).unwrap_err();
        assert!(
            matches!(&err, CompileError::TypeMismatch { reason, .. } if reason.contains("signedness")),
            "{err}"
        );
        assert!(df.set_operand(acc, 0, wide).is_err());
        assert!(df.set_operand(acc, 1, u).is_err());

        // Rejected rewires leave the node untouched.
        assert_eq!(df.node(acc).forward_operands(), vec![u]);

        let c = df.constant(-3);
        df.set_operand(acc, 0, c).unwrap();
        df.set_operand(acc, 1, flag).unwrap();
        assert_eq!(df.node(acc).forward_operands(), vec![c, flag]);
    }

    #[test]
    fn datawidth_outside_range_is_rejected() {
        for width in [0, MAX_WIDTH + 1, 100] {
            assert!(matches!(
                Dataflow::with_datawidth(width),
                Err(CompileError::TypeMismatch { node, .. }) if node == "datawidth"
            ));
        }
        assert_eq!(Dataflow::with_datawidth(MAX_WIDTH).unwrap().datawidth(), MAX_WIDTH);
    }

    #[test]
    fn labels_prefer_user_names() {
        let mut df = Dataflow::new();
        let a = var(&mut df, "a", 8);
        let c = df.constant(1);
        let s = df.add(a, c).unwrap();
        assert_eq!(df.label(s), "plus#2");
        df.set_name(s, "sum").unwrap();
        assert_eq!(df.label(s), "sum#2");
        assert_eq!(df.find("sum"), Some(s));
    }
}
