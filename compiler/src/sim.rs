// sim.rs — Cycle-accurate simulator for compiled RTL modules
//
// Evaluates an `rtl::Module` two-state: continuous assignments are settled in
// dependency order after every change, and `tick` models one rising clock
// edge: every register rule reads the pre-edge values, then all registers
// update at once. The module's reset input, when high at the edge, loads
// every register's initial value instead.
//
// Values are held as i64 normalized to their declared width (sign-extended
// for signed signals). Arithmetic is 64-bit two's complement; results are
// truncated when stored. Division or remainder by zero yields 0.
//
// Preconditions: the module was produced by the allocator (or hand-built
//                with the same builder API).
// Postconditions: none.
// Failure modes: unknown signal names, combinational loops among assigns.
// Side effects: none.

use std::collections::{BTreeSet, HashMap};

use thiserror::Error;

use crate::op::Operator;
use crate::rtl::{Expr, Module};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SimError {
    #[error("unknown signal '{0}'")]
    UnknownSignal(String),
    #[error("'{0}' is not an input port")]
    NotAnInput(String),
    #[error("combinational loop through '{0}'")]
    CombinationalLoop(String),
}

pub struct Simulator<'m> {
    module: &'m Module,
    name_to_idx: HashMap<&'m str, usize>,
    widths: Vec<(u32, bool)>,
    values: Vec<i64>,
    inputs: BTreeSet<usize>,
    /// Indices into `module.assigns`, producers before consumers.
    comb_order: Vec<usize>,
    reset_idx: Option<usize>,
    cycle: u64,
}

impl<'m> Simulator<'m> {
    pub fn new(module: &'m Module) -> Result<Self, SimError> {
        let mut name_to_idx = HashMap::new();
        let mut widths = Vec::new();
        let mut inputs = BTreeSet::new();
        let groups = [&module.inputs, &module.outputs, &module.regs, &module.wires];
        for (group, signals) in groups.into_iter().enumerate() {
            for signal in signals {
                let idx = widths.len();
                name_to_idx.insert(signal.name.as_str(), idx);
                widths.push((signal.width, signal.signed));
                if group == 0 {
                    inputs.insert(idx);
                }
            }
        }
        let reset_idx = name_to_idx.get(module.seq.reset.as_str()).copied();
        let comb_order = comb_order(module)?;
        let mut sim = Simulator {
            module,
            name_to_idx,
            values: vec![0; widths.len()],
            widths,
            inputs,
            comb_order,
            reset_idx,
            cycle: 0,
        };
        sim.reset();
        Ok(sim)
    }

    fn idx(&self, name: &str) -> Result<usize, SimError> {
        self.name_to_idx
            .get(name)
            .copied()
            .ok_or_else(|| SimError::UnknownSignal(name.to_string()))
    }

    /// Drive an input port and re-settle combinational logic.
    pub fn poke(&mut self, name: &str, value: i64) -> Result<(), SimError> {
        let idx = self.idx(name)?;
        if !self.inputs.contains(&idx) {
            return Err(SimError::NotAnInput(name.to_string()));
        }
        self.values[idx] = self.normalize(idx, value);
        self.evaluate();
        Ok(())
    }

    pub fn peek(&self, name: &str) -> Result<i64, SimError> {
        Ok(self.values[self.idx(name)?])
    }

    /// Number of clock edges simulated since construction or `reset`.
    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    /// Zero every signal, load register initial values, settle.
    pub fn reset(&mut self) {
        self.values.iter_mut().for_each(|v| *v = 0);
        for reg in &self.module.regs {
            if let Some(&idx) = self.name_to_idx.get(reg.name.as_str()) {
                self.values[idx] = self.normalize(idx, reg.init.unwrap_or(0));
            }
        }
        self.cycle = 0;
        self.evaluate();
    }

    /// Settle every continuous assignment.
    pub fn evaluate(&mut self) {
        for &i in &self.comb_order {
            let assign = &self.module.assigns[i];
            let Some(&idx) = self.name_to_idx.get(assign.target.as_str()) else {
                continue;
            };
            let value = self.eval(&assign.value);
            self.values[idx] = self.normalize(idx, value);
        }
    }

    /// One rising clock edge.
    pub fn tick(&mut self) {
        self.evaluate();
        let in_reset = self.reset_idx.is_some_and(|idx| self.values[idx] != 0);
        let mut next = Vec::with_capacity(self.module.seq.rules.len());
        for rule in &self.module.seq.rules {
            let Some(&idx) = self.name_to_idx.get(rule.target.as_str()) else {
                continue;
            };
            let value = if in_reset {
                self.module
                    .signal(&rule.target)
                    .and_then(|s| s.init)
                    .unwrap_or(0)
            } else {
                rule.branches
                    .iter()
                    .find(|(cond, _)| self.eval(cond) != 0)
                    .map(|(_, value)| self.eval(value))
                    .unwrap_or_else(|| self.eval(&rule.default))
            };
            next.push((idx, value));
        }
        for (idx, value) in next {
            self.values[idx] = self.normalize(idx, value);
        }
        self.cycle += 1;
        self.evaluate();
    }

    fn normalize(&self, idx: usize, value: i64) -> i64 {
        let (width, signed) = self.widths[idx];
        normalize(value, width, signed)
    }

    // ── Expression evaluation ───────────────────────────────────────────

    fn eval(&self, expr: &Expr) -> i64 {
        match expr {
            Expr::Signal(name) => self
                .name_to_idx
                .get(name.as_str())
                .map(|&idx| self.values[idx])
                .unwrap_or(0),
            Expr::Const { value, .. } => *value,
            Expr::Unary { op, arg } => {
                let a = self.eval(arg);
                match op {
                    Operator::Not => !a,
                    _ => a.wrapping_neg(),
                }
            }
            Expr::Binary { op, lhs, rhs } => {
                let a = self.eval(lhs);
                let b = self.eval(rhs);
                let signed = self.is_signed(lhs) && self.is_signed(rhs);
                match op {
                    Operator::Add => a.wrapping_add(b),
                    Operator::Sub => a.wrapping_sub(b),
                    Operator::Mul => a.wrapping_mul(b),
                    Operator::Div if b == 0 => 0,
                    Operator::Div => a.wrapping_div(b),
                    Operator::Rem if b == 0 => 0,
                    Operator::Rem => a.wrapping_rem(b),
                    Operator::And => a & b,
                    Operator::Or => a | b,
                    Operator::Xor => a ^ b,
                    Operator::Shl if (0..64).contains(&b) => a.wrapping_shl(b as u32),
                    Operator::Shr if (0..64).contains(&b) => {
                        let bits = mask(self.width_of(lhs));
                        ((a as u64 & bits) >> b) as i64
                    }
                    Operator::Shl | Operator::Shr => 0,
                    _ => {
                        let ord = if signed {
                            a.cmp(&b)
                        } else {
                            (a as u64).cmp(&(b as u64))
                        };
                        let hit = match op {
                            Operator::Eq => ord.is_eq(),
                            Operator::Ne => ord.is_ne(),
                            Operator::Lt => ord.is_lt(),
                            Operator::Le => ord.is_le(),
                            Operator::Gt => ord.is_gt(),
                            _ => ord.is_ge(),
                        };
                        hit as i64
                    }
                }
            }
        }
    }

    fn is_signed(&self, expr: &Expr) -> bool {
        match expr {
            Expr::Signal(name) => self
                .name_to_idx
                .get(name.as_str())
                .is_some_and(|&idx| self.widths[idx].1),
            Expr::Const { signed, .. } => *signed,
            Expr::Unary { arg, .. } => self.is_signed(arg),
            Expr::Binary { op, .. } if op.is_comparison() => false,
            Expr::Binary { lhs, rhs, .. } => self.is_signed(lhs) && self.is_signed(rhs),
        }
    }

    fn width_of(&self, expr: &Expr) -> u32 {
        match expr {
            Expr::Signal(name) => self
                .name_to_idx
                .get(name.as_str())
                .map(|&idx| self.widths[idx].0)
                .unwrap_or(64),
            Expr::Const { width, .. } => *width,
            Expr::Unary { arg, .. } => self.width_of(arg),
            Expr::Binary { op, .. } if op.is_comparison() => 1,
            Expr::Binary { op, lhs, .. } if op.is_shift() => self.width_of(lhs),
            Expr::Binary { lhs, rhs, .. } => self.width_of(lhs).max(self.width_of(rhs)),
        }
    }
}

fn mask(width: u32) -> u64 {
    if width >= 64 {
        u64::MAX
    } else {
        (1u64 << width) - 1
    }
}

fn normalize(value: i64, width: u32, signed: bool) -> i64 {
    let bits = mask(width);
    let v = value as u64 & bits;
    if signed && width < 64 && v >> (width - 1) & 1 == 1 {
        (v | !bits) as i64
    } else {
        v as i64
    }
}

/// Order assigns so every target is computed before it is read.
fn comb_order(module: &Module) -> Result<Vec<usize>, SimError> {
    let producer: HashMap<&str, usize> = module
        .assigns
        .iter()
        .enumerate()
        .map(|(i, a)| (a.target.as_str(), i))
        .collect();
    let mut in_degree = vec![0usize; module.assigns.len()];
    let mut users: Vec<Vec<usize>> = vec![Vec::new(); module.assigns.len()];
    for (i, assign) in module.assigns.iter().enumerate() {
        for name in assign.value.signals() {
            if let Some(&p) = producer.get(name) {
                in_degree[i] += 1;
                users[p].push(i);
            }
        }
    }
    let mut ready: BTreeSet<usize> = (0..in_degree.len()).filter(|&i| in_degree[i] == 0).collect();
    let mut order = Vec::with_capacity(in_degree.len());
    while let Some(i) = ready.pop_first() {
        order.push(i);
        for &u in &users[i] {
            in_degree[u] -= 1;
            if in_degree[u] == 0 {
                ready.insert(u);
            }
        }
    }
    if order.len() < module.assigns.len() {
        let stuck = (0..in_degree.len())
            .find(|&i| in_degree[i] > 0)
            .map(|i| module.assigns[i].target.clone())
            .unwrap_or_default();
        return Err(SimError::CombinationalLoop(stuck));
    }
    Ok(order)
}
