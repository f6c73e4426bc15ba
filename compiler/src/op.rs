// op.rs — Operator kinds, accumulator operators, and the latency table
//
// Operators are pure combinational functions of one or two operands. Each
// has a configurable latency (pipeline stages between reading its operands
// and producing a result); combinational operators default to 0, multiply
// and divide to multi-cycle values.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A combinational operator applied by an Operation node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operator {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    And,
    Or,
    Xor,
    Shl,
    Shr,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Not,
    Neg,
}

impl Operator {
    pub const ALL: [Operator; 18] = [
        Operator::Add,
        Operator::Sub,
        Operator::Mul,
        Operator::Div,
        Operator::Rem,
        Operator::And,
        Operator::Or,
        Operator::Xor,
        Operator::Shl,
        Operator::Shr,
        Operator::Eq,
        Operator::Ne,
        Operator::Lt,
        Operator::Le,
        Operator::Gt,
        Operator::Ge,
        Operator::Not,
        Operator::Neg,
    ];

    pub fn arity(self) -> usize {
        match self {
            Operator::Not | Operator::Neg => 1,
            _ => 2,
        }
    }

    pub fn is_bitwise(self) -> bool {
        matches!(self, Operator::And | Operator::Or | Operator::Xor)
    }

    pub fn is_shift(self) -> bool {
        matches!(self, Operator::Shl | Operator::Shr)
    }

    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            Operator::Eq | Operator::Ne | Operator::Lt | Operator::Le | Operator::Gt | Operator::Ge
        )
    }

    /// Verilog operator token.
    pub fn symbol(self) -> &'static str {
        match self {
            Operator::Add => "+",
            Operator::Sub => "-",
            Operator::Mul => "*",
            Operator::Div => "/",
            Operator::Rem => "%",
            Operator::And => "&",
            Operator::Or => "|",
            Operator::Xor => "^",
            Operator::Shl => "<<",
            Operator::Shr => ">>",
            Operator::Eq => "==",
            Operator::Ne => "!=",
            Operator::Lt => "<",
            Operator::Le => "<=",
            Operator::Gt => ">",
            Operator::Ge => ">=",
            Operator::Not => "~",
            Operator::Neg => "-",
        }
    }

    /// Name used in generated signal names (`_df_<name>_<id>`).
    pub fn signal_name(self) -> &'static str {
        match self {
            Operator::Add => "plus",
            Operator::Sub => "minus",
            Operator::Mul => "times",
            Operator::Div => "divide",
            Operator::Rem => "mod",
            Operator::And => "and",
            Operator::Or => "or",
            Operator::Xor => "xor",
            Operator::Shl => "sll",
            Operator::Shr => "srl",
            Operator::Eq => "eq",
            Operator::Ne => "noteq",
            Operator::Lt => "lessthan",
            Operator::Le => "lesseq",
            Operator::Gt => "greaterthan",
            Operator::Ge => "greatereq",
            Operator::Not => "not",
            Operator::Neg => "uminus",
        }
    }

    pub fn keyword(self) -> &'static str {
        match self {
            Operator::Add => "add",
            Operator::Sub => "sub",
            Operator::Mul => "mul",
            Operator::Div => "div",
            Operator::Rem => "rem",
            Operator::And => "and",
            Operator::Or => "or",
            Operator::Xor => "xor",
            Operator::Shl => "shl",
            Operator::Shr => "shr",
            Operator::Eq => "eq",
            Operator::Ne => "ne",
            Operator::Lt => "lt",
            Operator::Le => "le",
            Operator::Gt => "gt",
            Operator::Ge => "ge",
            Operator::Not => "not",
            Operator::Neg => "neg",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownOperator(pub String);

impl fmt::Display for UnknownOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown operator '{}'", self.0)
    }
}

impl std::error::Error for UnknownOperator {}

impl FromStr for Operator {
    type Err = UnknownOperator;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Operator::ALL
            .into_iter()
            .find(|op| op.keyword() == s)
            .ok_or_else(|| UnknownOperator(s.to_string()))
    }
}

// ── Accumulator operators ───────────────────────────────────────────────

/// The combining function of an Accumulator node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum AccumOp {
    Add,
    Sub,
    Mul,
    Div,
    /// Binary operators applied left to right: `v = op_n(..op_1(v, data).., data)`.
    Custom(Vec<Operator>),
}

impl AccumOp {
    /// The binary operators applied each cycle, in order.
    pub fn operators(&self) -> Vec<Operator> {
        match self {
            AccumOp::Add => vec![Operator::Add],
            AccumOp::Sub => vec![Operator::Sub],
            AccumOp::Mul => vec![Operator::Mul],
            AccumOp::Div => vec![Operator::Div],
            AccumOp::Custom(ops) => ops.clone(),
        }
    }

    pub fn signal_name(&self) -> &'static str {
        match self {
            AccumOp::Add => "iadd",
            AccumOp::Sub => "isub",
            AccumOp::Mul => "imul",
            AccumOp::Div => "idiv",
            AccumOp::Custom(_) => "icustom",
        }
    }
}

// ── Latency table ───────────────────────────────────────────────────────

/// Per-operator latency in pipeline stages.
///
/// Defaults: `mul` 2, `div` 4, `rem` 4, everything else 0. Overrides are
/// applied on top of the defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LatencyTable {
    overrides: BTreeMap<Operator, u32>,
}

impl LatencyTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// A table where every operator is combinational.
    pub fn combinational() -> Self {
        let mut table = Self::new();
        for op in Operator::ALL {
            table.set(op, 0);
        }
        table
    }

    pub fn set(&mut self, op: Operator, stages: u32) -> &mut Self {
        self.overrides.insert(op, stages);
        self
    }

    pub fn latency(&self, op: Operator) -> u32 {
        if let Some(&stages) = self.overrides.get(&op) {
            return stages;
        }
        match op {
            Operator::Mul => 2,
            Operator::Div | Operator::Rem => 4,
            _ => 0,
        }
    }

    /// Parse a `op=stages` override as accepted by `--latency`.
    pub fn parse_override(spec: &str) -> Result<(Operator, u32), String> {
        let (op, stages) = spec
            .split_once('=')
            .ok_or_else(|| format!("expected <op>=<stages>, got '{spec}'"))?;
        let op: Operator = op.trim().parse().map_err(|e: UnknownOperator| e.to_string())?;
        let stages = stages
            .trim()
            .parse::<u32>()
            .map_err(|e| format!("invalid stage count in '{spec}': {e}"))?;
        Ok((op, stages))
    }
}
