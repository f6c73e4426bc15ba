// pass.rs — Pass descriptor module: metadata, dependency resolution, artifact IDs
//
// Declares the compiler's five passes, their dependency edges, and the
// artifacts they produce. Used by the pipeline runner to compute the minimal
// pass subset for each --emit target (a schedule report never needs RTL).

use std::collections::HashSet;

// ── Pass and Artifact identifiers ──────────────────────────────────────────

/// Identifies each compiler pass, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PassId {
    CollectPorts,
    Schedule,
    Balance,
    Allocate,
    Finalize,
}

/// Machine-readable artifact identifiers. Each maps to a concrete field
/// of the compilation state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactId {
    Ports,     // input/output node sets + port signals
    Stages,    // start/end stages on the graph copy
    Balanced,  // Vec<BalancedOutput>
    Bindings,  // Allocation
    Module,    // finalized rtl::Module
}

impl PassId {
    pub fn name(self) -> &'static str {
        descriptor(self).name
    }
}

// ── Pass descriptor ────────────────────────────────────────────────────────

/// Static metadata about a compiler pass.
pub struct PassDescriptor {
    /// Human-readable name for diagnostics/verbose output.
    pub name: &'static str,
    /// Pass dependencies (other passes whose outputs this pass consumes).
    pub inputs: &'static [PassId],
    /// Artifacts this pass produces.
    pub outputs: &'static [ArtifactId],
    /// Pre/post conditions (documentation only).
    pub invariants: &'static str,
}

/// Return the static descriptor for a given pass.
pub fn descriptor(id: PassId) -> PassDescriptor {
    match id {
        PassId::CollectPorts => PassDescriptor {
            name: "collect_ports",
            inputs: &[],
            outputs: &[ArtifactId::Ports],
            invariants: "clock, reset, and every reachable variable declared as input",
        },
        PassId::Schedule => PassDescriptor {
            name: "schedule",
            inputs: &[PassId::CollectPorts],
            outputs: &[ArtifactId::Stages],
            invariants: "every reachable node staged ASAP, no forward cycles",
        },
        PassId::Balance => PassDescriptor {
            name: "balance",
            inputs: &[PassId::Schedule],
            outputs: &[ArtifactId::Balanced],
            invariants: "S1-S4 obligations verified, outputs end at max stage",
        },
        PassId::Allocate => PassDescriptor {
            name: "allocate",
            inputs: &[PassId::Balance],
            outputs: &[ArtifactId::Bindings],
            invariants: "every reachable node bound exactly once",
        },
        PassId::Finalize => PassDescriptor {
            name: "finalize",
            inputs: &[PassId::Allocate],
            outputs: &[ArtifactId::Module],
            invariants: "output ports declared, synchronous block closed",
        },
    }
}

// ── Stage certificates ─────────────────────────────────────────────────────

/// Machine-checkable evidence that a pass met its postconditions.
pub trait StageCert {
    fn all_pass(&self) -> bool;

    /// Named obligations and whether each held.
    fn obligations(&self) -> Vec<(&'static str, bool)>;

    /// Names of the obligations that failed.
    fn failed(&self) -> Vec<&'static str> {
        self.obligations()
            .into_iter()
            .filter(|(_, ok)| !ok)
            .map(|(name, _)| name)
            .collect()
    }
}

// ── Dependency resolution ──────────────────────────────────────────────────

/// All pass IDs in declaration order (used for iteration).
pub const ALL_PASSES: [PassId; 5] = [
    PassId::CollectPorts,
    PassId::Schedule,
    PassId::Balance,
    PassId::Allocate,
    PassId::Finalize,
];

/// Compute the minimal ordered set of passes needed to produce `terminal`.
/// Returns passes in topological (execution) order.
pub fn required_passes(terminal: PassId) -> Vec<PassId> {
    let mut visited = HashSet::new();
    let mut order = Vec::new();
    visit(terminal, &mut visited, &mut order);
    order
}

fn visit(id: PassId, visited: &mut HashSet<PassId>, order: &mut Vec<PassId>) {
    if !visited.insert(id) {
        return;
    }
    for &dep in descriptor(id).inputs {
        visit(dep, visited, order);
    }
    order.push(id);
}

// ── Tests ──────────────────────────────────────────────────────────────────
