// rtl.rs — Minimal RTL module builder
//
// A module is a set of declared signals (inputs, outputs, registers, wires),
// continuous assignments, and exactly one synchronous block keyed by a clock
// and an active-high synchronous reset. Signals are grouped by role in
// explicit lists, filled at declaration time.
//
// Preconditions: none.
// Postconditions: signal names are unique within a module.
// Failure modes: redeclaring a name → `DuplicateBinding`.
// Side effects: none.

use std::collections::HashSet;
use std::fmt;

use crate::diag::CompileError;
use crate::op::Operator;

// ── Expressions ─────────────────────────────────────────────────────────────

/// A combinational expression over module signals.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    Signal(String),
    Const { value: i64, width: u32, signed: bool },
    Unary { op: Operator, arg: Box<Expr> },
    Binary { op: Operator, lhs: Box<Expr>, rhs: Box<Expr> },
}

impl Expr {
    pub fn signal(name: impl Into<String>) -> Self {
        Expr::Signal(name.into())
    }

    pub fn constant(value: i64, width: u32, signed: bool) -> Self {
        Expr::Const {
            value,
            width,
            signed,
        }
    }

    pub fn unary(op: Operator, arg: Expr) -> Self {
        Expr::Unary {
            op,
            arg: Box::new(arg),
        }
    }

    pub fn binary(op: Operator, lhs: Expr, rhs: Expr) -> Self {
        Expr::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    /// Signal names referenced by this expression, in left-to-right order.
    pub fn signals(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_signals(&mut out);
        out
    }

    fn collect_signals<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Expr::Signal(name) => out.push(name),
            Expr::Const { .. } => {}
            Expr::Unary { arg, .. } => arg.collect_signals(out),
            Expr::Binary { lhs, rhs, .. } => {
                lhs.collect_signals(out);
                rhs.collect_signals(out);
            }
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Signal(name) => f.write_str(name),
            Expr::Const {
                value,
                width,
                signed,
            } => {
                if *value < 0 {
                    write!(f, "-{}'sd{}", width, value.unsigned_abs())
                } else if *signed {
                    write!(f, "{}'sd{}", width, value)
                } else {
                    write!(f, "{}'d{}", width, value)
                }
            }
            Expr::Unary { op, arg } => write!(f, "{}({})", op.symbol(), arg),
            Expr::Binary { op, lhs, rhs } => write!(f, "({} {} {})", lhs, op.symbol(), rhs),
        }
    }
}

// ── Signals ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signal {
    pub name: String,
    pub width: u32,
    pub signed: bool,
    /// Value loaded by the global reset (registers only).
    pub init: Option<i64>,
}

/// A continuous assignment `assign target = value;`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assign {
    pub target: String,
    pub value: Expr,
}

/// One register update in the synchronous block.
///
/// Evaluated as `if (c0) r <= v0; else if (c1) r <= v1; ... else r <= default;`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeqRule {
    pub target: String,
    pub branches: Vec<(Expr, Expr)>,
    pub default: Expr,
}

impl SeqRule {
    pub fn always(target: impl Into<String>, value: Expr) -> Self {
        SeqRule {
            target: target.into(),
            branches: Vec::new(),
            default: value,
        }
    }

    pub fn when(mut self, cond: Expr, value: Expr) -> Self {
        self.branches.push((cond, value));
        self
    }
}

/// The synchronous block: all rules fire on the same clock edge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Seq {
    pub name: String,
    pub clock: String,
    pub reset: String,
    pub rules: Vec<SeqRule>,
    finalized: bool,
}

impl Seq {
    pub fn is_finalized(&self) -> bool {
        self.finalized
    }
}

// ── Module ──────────────────────────────────────────────────────────────────

/// An RTL module under construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Module {
    pub name: String,
    pub inputs: Vec<Signal>,
    pub outputs: Vec<Signal>,
    pub regs: Vec<Signal>,
    pub wires: Vec<Signal>,
    pub assigns: Vec<Assign>,
    pub seq: Seq,
    names: HashSet<String>,
}

impl Module {
    /// Create a module whose clock and reset input ports are declared up front.
    pub fn new(name: &str, clock: &str, reset: &str, seq_name: &str) -> Result<Self, CompileError> {
        let mut module = Module {
            name: name.to_string(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            regs: Vec::new(),
            wires: Vec::new(),
            assigns: Vec::new(),
            seq: Seq {
                name: seq_name.to_string(),
                clock: clock.to_string(),
                reset: reset.to_string(),
                rules: Vec::new(),
                finalized: false,
            },
            names: HashSet::new(),
        };
        module.input(clock, 1, false)?;
        module.input(reset, 1, false)?;
        Ok(module)
    }

    fn claim(&mut self, name: &str) -> Result<(), CompileError> {
        if !self.names.insert(name.to_string()) {
            return Err(CompileError::DuplicateBinding {
                node: name.to_string(),
                reason: format!("signal '{name}' already declared in module '{}'", self.name),
            });
        }
        Ok(())
    }

    pub fn input(&mut self, name: &str, width: u32, signed: bool) -> Result<Expr, CompileError> {
        self.claim(name)?;
        self.inputs.push(signal(name, width, signed, None));
        Ok(Expr::signal(name))
    }

    /// Declare an output port driven by a continuous assignment.
    pub fn output(
        &mut self,
        name: &str,
        width: u32,
        signed: bool,
        value: Expr,
    ) -> Result<Expr, CompileError> {
        self.claim(name)?;
        self.outputs.push(signal(name, width, signed, None));
        self.assigns.push(Assign {
            target: name.to_string(),
            value,
        });
        Ok(Expr::signal(name))
    }

    pub fn reg(
        &mut self,
        name: &str,
        width: u32,
        signed: bool,
        init: i64,
    ) -> Result<Expr, CompileError> {
        self.claim(name)?;
        self.regs.push(signal(name, width, signed, Some(init)));
        Ok(Expr::signal(name))
    }

    /// Declare a wire driven by a continuous assignment.
    pub fn wire(
        &mut self,
        name: &str,
        width: u32,
        signed: bool,
        value: Expr,
    ) -> Result<Expr, CompileError> {
        self.claim(name)?;
        self.wires.push(signal(name, width, signed, None));
        self.assigns.push(Assign {
            target: name.to_string(),
            value,
        });
        Ok(Expr::signal(name))
    }

    /// Append an update rule to the synchronous block.
    pub fn add_rule(&mut self, rule: SeqRule) {
        debug_assert!(!self.seq.finalized, "rule added after finalize");
        self.seq.rules.push(rule);
    }

    /// Close the synchronous block. Further rules are a logic error.
    pub fn finalize(&mut self) {
        self.seq.finalized = true;
    }

    /// Look up any declared signal by name.
    pub fn signal(&self, name: &str) -> Option<&Signal> {
        self.inputs
            .iter()
            .chain(&self.outputs)
            .chain(&self.regs)
            .chain(&self.wires)
            .find(|s| s.name == name)
    }

    pub fn rule(&self, target: &str) -> Option<&SeqRule> {
        self.seq.rules.iter().find(|r| r.target == target)
    }

    pub fn assign(&self, target: &str) -> Option<&Assign> {
        self.assigns.iter().find(|a| a.target == target)
    }
}

fn signal(name: &str, width: u32, signed: bool, init: Option<i64>) -> Signal {
    Signal {
        name: name.to_string(),
        width,
        signed,
        init,
    }
}
