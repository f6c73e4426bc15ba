// diag.rs — Unified diagnostics model and compile error taxonomy
//
// Provides the error type shared by graph construction, scheduling, and
// allocation, plus the rendered diagnostic form used by the CLI.
//
// Preconditions: none (types only).
// Postconditions: none (types only).
// Failure modes: none.
// Side effects: none.

use std::fmt;

use thiserror::Error;

use crate::id::NodeId;

// ── Diagnostic code ──────────────────────────────────────────────────────

/// A stable diagnostic code (e.g., `E0100`, `W0100`).
///
/// Once assigned, a code must never be reassigned to a different semantic
/// meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DiagCode(pub &'static str);

impl fmt::Display for DiagCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub mod codes {
    use super::DiagCode;

    // Graph construction
    pub const E0100: DiagCode = DiagCode("E0100"); // type mismatch
    pub const E0101: DiagCode = DiagCode("E0101"); // undefined operator
    pub const E0102: DiagCode = DiagCode("E0102"); // unknown node

    // Scheduling
    pub const E0200: DiagCode = DiagCode("E0200"); // cyclic dependency

    // Allocation
    pub const E0300: DiagCode = DiagCode("E0300"); // duplicate binding

    // Orchestration
    pub const E0400: DiagCode = DiagCode("E0400"); // no outputs
    pub const E0401: DiagCode = DiagCode("E0401"); // schedule verification
    pub const E0402: DiagCode = DiagCode("E0402"); // pass artifact missing

    // Warnings
    pub const W0100: DiagCode = DiagCode("W0100"); // node unreachable from outputs
}

// ── Compile error ────────────────────────────────────────────────────────

/// Fatal error raised while building or compiling a dataflow graph.
///
/// Node references are rendered as `name#id` so the offending node can be
/// located in the user's construction code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    #[error("type mismatch at {node}: {reason}")]
    TypeMismatch { node: String, reason: String },

    #[error("undefined operator for {node}: custom accumulator has no operators")]
    UndefinedOperator { node: String },

    #[error("unknown node {0}: not created by this dataflow")]
    UnknownNode(NodeId),

    /// `nodes` holds the `name#id` labels of `cycle`, in the same order.
    #[error("cyclic dependency between {}", .nodes.join(" -> "))]
    CyclicDependency { nodes: Vec<String>, cycle: Vec<NodeId> },

    #[error("duplicate binding for {node}: {reason}")]
    DuplicateBinding { node: String, reason: String },

    #[error("no outputs declared")]
    NoOutputs,

    #[error("schedule verification failed: {}", .failed.join(", "))]
    ScheduleVerification { failed: Vec<&'static str> },

    #[error("internal: {0} read before the pass producing it ran")]
    MissingArtifact(&'static str),
}

impl CompileError {
    pub fn code(&self) -> DiagCode {
        match self {
            CompileError::TypeMismatch { .. } => codes::E0100,
            CompileError::UndefinedOperator { .. } => codes::E0101,
            CompileError::UnknownNode(_) => codes::E0102,
            CompileError::CyclicDependency { .. } => codes::E0200,
            CompileError::DuplicateBinding { .. } => codes::E0300,
            CompileError::NoOutputs => codes::E0400,
            CompileError::ScheduleVerification { .. } => codes::E0401,
            CompileError::MissingArtifact(_) => codes::E0402,
        }
    }

    /// Render as an error-level diagnostic with a remediation hint.
    pub fn to_diagnostic(&self) -> Diagnostic {
        let diag = Diagnostic::new(DiagLevel::Error, self.to_string()).with_code(self.code());
        match self {
            CompileError::CyclicDependency { nodes, cycle } => cycle
                .iter()
                .zip(nodes)
                .fold(diag, |d, (&id, label)| d.with_related(id, label.as_str()))
                .with_hint("break the loop with an accumulator; only accumulator feedback is allowed"),
            CompileError::UndefinedOperator { .. } => {
                diag.with_hint("pass at least one operator to accumulate_custom")
            }
            CompileError::NoOutputs => diag.with_hint("declare at least one output node"),
            CompileError::ScheduleVerification { failed } => failed
                .iter()
                .fold(diag, |d, f| d.with_cause(format!("{f} does not hold"), None)),
            _ => diag,
        }
    }
}

// ── Severity level ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagLevel {
    Error,
    Warning,
}

// ── Related node ─────────────────────────────────────────────────────────

/// A secondary node providing context for a diagnostic.
#[derive(Debug, Clone)]
pub struct RelatedNode {
    pub node: NodeId,
    pub label: String,
}

// ── Cause record ─────────────────────────────────────────────────────────

/// One link in a cause chain explaining a propagated failure.
#[derive(Debug, Clone)]
pub struct CauseRecord {
    pub message: String,
    pub node: Option<NodeId>,
}

// ── Diagnostic ───────────────────────────────────────────────────────────

/// A compiler diagnostic emitted by any phase.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub code: Option<DiagCode>,
    pub level: DiagLevel,
    pub node: Option<NodeId>,
    pub message: String,
    pub hint: Option<String>,
    pub related_nodes: Vec<RelatedNode>,
    pub cause_chain: Vec<CauseRecord>,
}

impl Diagnostic {
    /// Create a new diagnostic with no code, node, hint, related nodes, or causes.
    pub fn new(level: DiagLevel, message: impl Into<String>) -> Self {
        Self {
            code: None,
            level,
            node: None,
            message: message.into(),
            hint: None,
            related_nodes: Vec::new(),
            cause_chain: Vec::new(),
        }
    }

    /// Attach a stable diagnostic code.
    pub fn with_code(mut self, code: DiagCode) -> Self {
        self.code = Some(code);
        self
    }

    /// Attach the primary node.
    pub fn at(mut self, node: NodeId) -> Self {
        self.node = Some(node);
        self
    }

    /// Attach a remediation hint.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    /// Attach a related node.
    pub fn with_related(mut self, node: NodeId, label: impl Into<String>) -> Self {
        self.related_nodes.push(RelatedNode {
            node,
            label: label.into(),
        });
        self
    }

    /// Attach a cause record to the chain.
    pub fn with_cause(mut self, message: impl Into<String>, node: Option<NodeId>) -> Self {
        self.cause_chain.push(CauseRecord {
            message: message.into(),
            node,
        });
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match self.level {
            DiagLevel::Error => "error",
            DiagLevel::Warning => "warning",
        };
        if let Some(code) = &self.code {
            write!(f, "{}[{}]: {}", level, code, self.message)?;
        } else {
            write!(f, "{}: {}", level, self.message)?;
        }
        for cause in &self.cause_chain {
            write!(f, "\n  caused by: {}", cause.message)?;
        }
        if let Some(hint) = &self.hint {
            write!(f, "\n  hint: {}", hint)?;
        }
        Ok(())
    }
}
