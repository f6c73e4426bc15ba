// codegen.rs — Verilog code generation for compiled dataflow modules
//
// Renders an `rtl::Module` as synthesizable Verilog-2001: a port list,
// register and wire declarations, continuous assignments, and one
// `always @(posedge CLK)` block whose synchronous reset loads every
// register's initial value.
//
// Preconditions: the module's synchronous block is finalized.
// Postconditions: returns `GeneratedCode` with the Verilog source; output is
//                 a pure function of the module (byte-identical on re-run).
// Failure modes: none.
// Side effects: none.

use std::fmt::Write as _;

use crate::rtl::{Expr, Module, SeqRule, Signal};

// ── Public types ────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct GeneratedCode {
    pub verilog_source: String,
}

// ── Public entry point ──────────────────────────────────────────────────────

pub fn codegen(module: &Module) -> GeneratedCode {
    let mut ctx = CodegenCtx::new(module);
    ctx.emit_all();
    GeneratedCode {
        verilog_source: ctx.out,
    }
}

/// Shorthand for `codegen(module).verilog_source`.
pub fn emit_verilog(module: &Module) -> String {
    codegen(module).verilog_source
}

// ── Internal context ────────────────────────────────────────────────────────

struct CodegenCtx<'a> {
    module: &'a Module,
    out: String,
}

impl<'a> CodegenCtx<'a> {
    fn new(module: &'a Module) -> Self {
        CodegenCtx {
            module,
            out: String::with_capacity(2048),
        }
    }

    // ── Top-level emit ──────────────────────────────────────────────────

    fn emit_all(&mut self) {
        self.emit_header();
        self.emit_declarations();
        self.emit_assigns();
        self.emit_always();
        self.out.push_str("endmodule\n");
    }

    // ── Phase 1: Port list ──────────────────────────────────────────────

    fn emit_header(&mut self) {
        let m = self.module;
        let ports: Vec<String> = m
            .inputs
            .iter()
            .map(|s| format!("input {}{}", type_prefix(s), s.name))
            .chain(
                m.outputs
                    .iter()
                    .map(|s| format!("output {}{}", type_prefix(s), s.name)),
            )
            .collect();
        let _ = writeln!(self.out, "module {}", m.name);
        self.out.push_str("(\n");
        for (i, port) in ports.iter().enumerate() {
            let sep = if i + 1 < ports.len() { "," } else { "" };
            let _ = writeln!(self.out, "  {port}{sep}");
        }
        self.out.push_str(");\n\n");
    }

    // ── Phase 2: Registers and wires ────────────────────────────────────

    fn emit_declarations(&mut self) {
        let m = self.module;
        for reg in &m.regs {
            let _ = writeln!(self.out, "  reg {}{};", type_prefix(reg), reg.name);
        }
        for wire in &m.wires {
            let _ = writeln!(self.out, "  wire {}{};", type_prefix(wire), wire.name);
        }
        if !m.regs.is_empty() || !m.wires.is_empty() {
            self.out.push('\n');
        }
    }

    // ── Phase 3: Continuous assignments ─────────────────────────────────

    fn emit_assigns(&mut self) {
        let m = self.module;
        for assign in &m.assigns {
            let _ = writeln!(self.out, "  assign {} = {};", assign.target, assign.value);
        }
        if !m.assigns.is_empty() {
            self.out.push('\n');
        }
    }

    // ── Phase 4: Synchronous block ──────────────────────────────────────

    fn emit_always(&mut self) {
        let m = self.module;
        if m.seq.rules.is_empty() {
            return;
        }
        let _ = writeln!(self.out, "  always @(posedge {}) begin", m.seq.clock);
        let _ = writeln!(self.out, "    if({}) begin", m.seq.reset);
        for rule in &m.seq.rules {
            let init = m
                .signal(&rule.target)
                .map(|s| Expr::constant(s.init.unwrap_or(0), s.width, s.signed))
                .unwrap_or_else(|| Expr::constant(0, 1, false));
            let _ = writeln!(self.out, "      {} <= {};", rule.target, init);
        }
        self.out.push_str("    end else begin\n");
        for rule in &m.seq.rules {
            self.emit_rule(rule);
        }
        self.out.push_str("    end\n");
        self.out.push_str("  end\n\n");
    }

    fn emit_rule(&mut self, rule: &SeqRule) {
        if rule.branches.is_empty() {
            let _ = writeln!(self.out, "      {} <= {};", rule.target, rule.default);
            return;
        }
        for (i, (cond, value)) in rule.branches.iter().enumerate() {
            let kw = if i == 0 { "if" } else { "end else if" };
            let _ = writeln!(self.out, "      {kw}({cond}) begin");
            let _ = writeln!(self.out, "        {} <= {};", rule.target, value);
        }
        self.out.push_str("      end else begin\n");
        let _ = writeln!(self.out, "        {} <= {};", rule.target, rule.default);
        self.out.push_str("      end\n");
    }
}

/// `signed [W-1:0] ` prefix for a declaration (empty for unsigned 1-bit).
fn type_prefix(signal: &Signal) -> String {
    let sign = if signal.signed { "signed " } else { "" };
    if signal.width > 1 {
        format!("{}[{}:0] ", sign, signal.width - 1)
    } else {
        sign.to_string()
    }
}
