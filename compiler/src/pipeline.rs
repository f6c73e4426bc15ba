// pipeline.rs — Compilation state and pass orchestration
//
// Holds all pass artifacts for one compile and runs the minimal set of
// passes for a given terminal PassId:
//   collect_ports → schedule → balance → allocate → finalize
// The compile works on a private copy of the caller's dataflow, so the same
// graph can be compiled any number of times with identical results.
//
// Preconditions: the declared outputs are ids of the given dataflow.
// Postconditions: all artifacts for required passes are populated, or a
//                 `PipelineError` names the failing pass.
// Failure modes: any `CompileError` raised by a pass.
// Side effects: calls on_pass_complete after each pass; logs pass timings.

use std::collections::BTreeSet;
use std::time::{Duration, Instant};

use serde::Serialize;
use thiserror::Error;

use crate::alloc::{allocate, signal_name, Allocation};
use crate::diag::{codes, CompileError, DiagLevel, Diagnostic};
use crate::graph::{Dataflow, NodeKind};
use crate::id::NodeId;
use crate::op::LatencyTable;
use crate::pass::{required_passes, PassId, StageCert};
use crate::rtl::{Expr, Module};
use crate::schedule::{
    balance_outputs, schedule, verify_schedule, BalancedOutput, Schedule, StageReport,
};
use crate::visit::{collect_all, collect_inputs};

// ── Options ────────────────────────────────────────────────────────────────

/// Knobs for one compilation.
#[derive(Debug, Clone)]
pub struct CompileOptions {
    pub module_name: String,
    pub clock: String,
    pub reset: String,
    /// Name of the synchronous block.
    pub seq_name: String,
    pub latency: LatencyTable,
}

impl Default for CompileOptions {
    fn default() -> Self {
        CompileOptions {
            module_name: "top".to_string(),
            clock: "CLK".to_string(),
            reset: "RST".to_string(),
            seq_name: "seq".to_string(),
            latency: LatencyTable::new(),
        }
    }
}

impl CompileOptions {
    pub fn named(module_name: &str) -> Self {
        CompileOptions {
            module_name: module_name.to_string(),
            ..Self::default()
        }
    }
}

// ── Provenance ─────────────────────────────────────────────────────────────

/// Provenance metadata for hermetic builds and cache-key use.
///
/// `graph_hash`: SHA-256 of the canonical compact JSON of the input dataflow.
/// `compiler_version`: crate version from `Cargo.toml`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Provenance {
    pub graph_hash: [u8; 32],
    pub compiler_version: &'static str,
}

#[derive(Serialize)]
struct BuildInfo<'a> {
    graph_hash: String,
    compiler_version: &'a str,
}

impl Provenance {
    /// Hex string of the graph hash (64 characters).
    pub fn graph_hash_hex(&self) -> String {
        let mut s = String::with_capacity(64);
        for b in &self.graph_hash {
            use std::fmt::Write;
            let _ = write!(s, "{:02x}", b);
        }
        s
    }

    /// Serialize provenance as a JSON string for `--emit build-info`.
    pub fn to_json(&self) -> String {
        let info = BuildInfo {
            graph_hash: self.graph_hash_hex(),
            compiler_version: self.compiler_version,
        };
        let mut json = serde_json::to_string_pretty(&info).unwrap_or_default();
        json.push('\n');
        json
    }
}

/// Compute provenance from the dataflow as the user built it.
pub fn compute_provenance(graph: &Dataflow) -> Provenance {
    use sha2::{Digest, Sha256};

    let canonical = serde_json::to_vec(graph).unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(&canonical);
    let result = hasher.finalize();
    let mut graph_hash = [0u8; 32];
    graph_hash.copy_from_slice(&result);

    Provenance {
        graph_hash,
        compiler_version: env!("CARGO_PKG_VERSION"),
    }
}

// ── Artifact storage ───────────────────────────────────────────────────────

/// An output port of the compiled module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPort {
    pub name: String,
    pub output: BalancedOutput,
}

/// Holds all compilation artifacts and accumulated diagnostics.
pub struct CompilationState {
    /// Private copy of the caller's dataflow; gains stages and delay nodes.
    pub graph: Dataflow,
    pub declared: BTreeSet<NodeId>,
    pub options: CompileOptions,
    pub inputs: Option<BTreeSet<NodeId>>,
    pub module: Option<Module>,
    pub schedule: Option<Schedule>,
    pub balanced: Option<Vec<BalancedOutput>>,
    pub allocation: Option<Allocation>,
    pub output_ports: Option<Vec<OutputPort>>,
    pub diagnostics: Vec<Diagnostic>,
    pub provenance: Provenance,
}

impl CompilationState {
    pub fn new(graph: &Dataflow, outputs: &[NodeId], options: CompileOptions) -> Self {
        let provenance = compute_provenance(graph);
        let mut graph = graph.clone();
        graph.clear_stages();
        Self {
            graph,
            declared: outputs.iter().copied().collect(),
            options,
            inputs: None,
            module: None,
            schedule: None,
            balanced: None,
            allocation: None,
            output_ports: None,
            diagnostics: Vec::new(),
            provenance,
        }
    }

    /// Stage report over the balanced graph, once `balance` has run.
    pub fn stage_report(&self) -> Option<StageReport<'_>> {
        Some(StageReport {
            graph: &self.graph,
            outputs: self.balanced.as_deref()?,
            max_stage: self.schedule.as_ref()?.max_stage,
        })
    }

    /// Take the finished design out of a state that ran through `finalize`.
    pub fn into_design(self) -> Result<Design, PipelineError> {
        let missing = |artifact| PipelineError {
            failing_pass: PassId::Finalize,
            error: CompileError::MissingArtifact(artifact),
        };
        let module = self.module.ok_or_else(|| missing("module"))?;
        if !module.seq.is_finalized() {
            return Err(missing("finalized module"));
        }
        Ok(Design {
            module,
            inputs: self
                .inputs
                .ok_or_else(|| missing("inputs"))?
                .into_iter()
                .collect(),
            max_stage: self.schedule.ok_or_else(|| missing("schedule"))?.max_stage,
            balanced: self.balanced.ok_or_else(|| missing("balanced outputs"))?,
            allocation: self.allocation.ok_or_else(|| missing("allocation"))?,
            outputs: self.output_ports.ok_or_else(|| missing("output ports"))?,
            graph: self.graph,
            diagnostics: self.diagnostics,
            provenance: self.provenance,
        })
    }
}

/// A fully compiled, staged, and allocated dataflow.
#[derive(Debug, Clone)]
pub struct Design {
    pub module: Module,
    /// The scheduled private copy of the dataflow, including delay nodes.
    pub graph: Dataflow,
    /// Variables that became input ports, in id order.
    pub inputs: Vec<NodeId>,
    pub outputs: Vec<OutputPort>,
    pub balanced: Vec<BalancedOutput>,
    pub max_stage: u32,
    pub allocation: Allocation,
    /// Warnings collected along the way.
    pub diagnostics: Vec<Diagnostic>,
    pub provenance: Provenance,
}

impl Design {
    pub fn verilog(&self) -> String {
        crate::codegen::emit_verilog(&self.module)
    }

    pub fn stage_report(&self) -> StageReport<'_> {
        StageReport {
            graph: &self.graph,
            outputs: &self.balanced,
            max_stage: self.max_stage,
        }
    }
}

// ── Error type ─────────────────────────────────────────────────────────────

/// Pipeline execution failed in `failing_pass`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{} failed: {}", .failing_pass.name(), .error)]
pub struct PipelineError {
    pub failing_pass: PassId,
    #[source]
    pub error: CompileError,
}

// ── Per-pass bookkeeping ───────────────────────────────────────────────────

/// Per-pass post-processing: callback, accumulate, timing log, error check.
fn finish_pass(
    state: &mut CompilationState,
    pass_id: PassId,
    result: Result<Vec<Diagnostic>, CompileError>,
    elapsed: Duration,
    on_pass_complete: &mut impl FnMut(PassId, &[Diagnostic]),
) -> Result<(), PipelineError> {
    let (diags, error) = match result {
        Ok(diags) => (diags, None),
        Err(error) => (vec![error.to_diagnostic()], Some(error)),
    };
    on_pass_complete(pass_id, &diags);
    state.diagnostics.extend(diags);
    log::info!(
        "dfc: {} complete, {:.1}ms",
        pass_id.name(),
        elapsed.as_secs_f64() * 1000.0
    );
    match error {
        Some(error) => Err(PipelineError {
            failing_pass: pass_id,
            error,
        }),
        None => Ok(()),
    }
}

// ── Pipeline runner ────────────────────────────────────────────────────────

/// Run the minimal set of passes to produce `terminal`.
///
/// Per-pass sequence: execute → on_pass_complete(callback) → log → error check.
pub fn run_pipeline(
    state: &mut CompilationState,
    terminal: PassId,
    mut on_pass_complete: impl FnMut(PassId, &[Diagnostic]),
) -> Result<(), PipelineError> {
    for pass_id in required_passes(terminal) {
        let t = Instant::now();
        let result = match pass_id {
            PassId::CollectPorts => collect_ports(state),
            PassId::Schedule => schedule_pass(state),
            PassId::Balance => balance_pass(state),
            PassId::Allocate => allocate_pass(state),
            PassId::Finalize => finalize_pass(state),
        };
        let elapsed = t.elapsed();
        finish_pass(state, pass_id, result, elapsed, &mut on_pass_complete)?;
    }
    Ok(())
}

/// Compile `outputs` of `graph` into a finished design.
pub fn compile(
    graph: &Dataflow,
    outputs: &[NodeId],
    options: &CompileOptions,
) -> Result<Design, PipelineError> {
    let mut state = CompilationState::new(graph, outputs, options.clone());
    run_pipeline(&mut state, PassId::Finalize, |_, _| {})?;
    state.into_design()
}

impl Dataflow {
    /// Compile this dataflow with `outputs` as the module's output ports.
    pub fn compile(
        &self,
        outputs: &[NodeId],
        options: &CompileOptions,
    ) -> Result<Design, PipelineError> {
        compile(self, outputs, options)
    }
}

// ── Passes ─────────────────────────────────────────────────────────────────

fn collect_ports(state: &mut CompilationState) -> Result<Vec<Diagnostic>, CompileError> {
    if state.declared.is_empty() {
        return Err(CompileError::NoOutputs);
    }
    for &id in &state.declared {
        state.graph.get(id)?;
    }

    let opts = &state.options;
    let mut module = Module::new(&opts.module_name, &opts.clock, &opts.reset, &opts.seq_name)?;
    let inputs = collect_inputs(&state.graph, &state.declared);
    for &id in &inputs {
        let node = state.graph.get(id)?;
        let name = node.name.clone().unwrap_or_else(|| signal_name(node));
        module.input(&name, node.width, node.signed)?;
        if let NodeKind::Variable { valid, ready } = &node.kind {
            if let Some(valid) = valid {
                module.input(valid, 1, false)?;
            }
            // The pipeline never stalls.
            if let Some(ready) = ready {
                module.output(ready, 1, false, Expr::constant(1, 1, false))?;
            }
        }
    }
    log::debug!("collect_ports: {} input variable(s)", inputs.len());

    let reachable = collect_all(&state.graph, &state.declared);
    let diags = state
        .graph
        .nodes()
        .iter()
        .filter(|n| !n.is_constant() && !reachable.contains(&n.id))
        .map(|n| {
            Diagnostic::new(
                DiagLevel::Warning,
                format!("{} is unreachable from every output and is not compiled", n.label()),
            )
            .with_code(codes::W0100)
            .at(n.id)
        })
        .collect();

    state.inputs = Some(inputs);
    state.module = Some(module);
    Ok(diags)
}

fn schedule_pass(state: &mut CompilationState) -> Result<Vec<Diagnostic>, CompileError> {
    let sched = schedule(&mut state.graph, &state.declared, &state.options.latency)?;
    state.schedule = Some(sched);
    Ok(Vec::new())
}

fn balance_pass(state: &mut CompilationState) -> Result<Vec<Diagnostic>, CompileError> {
    let max_stage = state
        .schedule
        .as_ref()
        .ok_or(CompileError::MissingArtifact("schedule"))?
        .max_stage;
    let balanced = balance_outputs(&mut state.graph, &state.declared, max_stage)?;
    let cert = verify_schedule(&state.graph, &balanced, max_stage, &state.options.latency);
    if !cert.all_pass() {
        return Err(CompileError::ScheduleVerification {
            failed: cert.failed(),
        });
    }
    state.balanced = Some(balanced);
    Ok(Vec::new())
}

fn allocate_pass(state: &mut CompilationState) -> Result<Vec<Diagnostic>, CompileError> {
    let balanced = state
        .balanced
        .as_ref()
        .ok_or(CompileError::MissingArtifact("balanced outputs"))?;
    let module = state
        .module
        .as_mut()
        .ok_or(CompileError::MissingArtifact("module"))?;
    // Delay nodes are only reachable from the balanced outputs.
    let roots: Vec<NodeId> = balanced.iter().map(|o| o.balanced).collect();
    let all = collect_all(&state.graph, &roots);
    state.allocation = Some(allocate(&state.graph, module, &all)?);
    Ok(Vec::new())
}

fn finalize_pass(state: &mut CompilationState) -> Result<Vec<Diagnostic>, CompileError> {
    let balanced = state
        .balanced
        .as_ref()
        .ok_or(CompileError::MissingArtifact("balanced outputs"))?;
    let allocation = state
        .allocation
        .as_ref()
        .ok_or(CompileError::MissingArtifact("allocation"))?;
    let module = state
        .module
        .as_mut()
        .ok_or(CompileError::MissingArtifact("module"))?;

    let mut ports = Vec::with_capacity(balanced.len());
    for &output in balanced {
        let node = state.graph.get(output.declared)?;
        // A variable's own name is already taken by its input port.
        let name = match &node.name {
            Some(name) if !node.is_variable() => name.clone(),
            _ => format!("_df_out_{}", node.id.0),
        };
        let value = allocation.expr(&state.graph, output.balanced)?;
        module.output(&name, node.width, node.signed, value)?;
        ports.push(OutputPort { name, output });
    }
    module.finalize();
    state.output_ports = Some(ports);
    Ok(Vec::new())
}

// ── Tests ──────────────────────────────────────────────────────────────────
