// load.rs — JSON graph description files
//
// Reads a dataflow description (`nodes` + `outputs`, operands referenced by
// node name) and rebuilds it through the `Dataflow` construction API, so the
// same type checks apply as for programmatic construction. References may
// point forward; a reference back into a node still under construction
// (a loop) is wired with `set_operand` once both ends exist, leaving the
// scheduler to report the cycle.
//
// Preconditions: none.
// Postconditions: every described node exists in the returned dataflow,
//                 named after its description entry. A description whose
//                 references loop also holds one unnamed placeholder
//                 constant.
// Failure modes: malformed JSON, duplicate or unknown names, construction
//                errors (wrapped `CompileError`).
// Side effects: none.

use std::collections::{HashMap, HashSet};

use serde::Deserialize;
use thiserror::Error;

use crate::diag::CompileError;
use crate::graph::{AccumOpts, Dataflow, VariableOpts, DEFAULT_DATAWIDTH};
use crate::id::NodeId;
use crate::op::{AccumOp, LatencyTable, Operator};

// ── File format ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct GraphFile {
    /// Module name; the CLI falls back to the file stem.
    pub name: Option<String>,
    #[serde(default)]
    pub datawidth: Option<u32>,
    #[serde(default)]
    pub latency: LatencyTable,
    pub nodes: Vec<NodeDesc>,
    pub outputs: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NodeDesc {
    pub name: String,
    #[serde(flatten)]
    pub spec: NodeSpec,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NodeSpec {
    Constant {
        value: i64,
    },
    Variable {
        width: Option<u32>,
        #[serde(default)]
        signed: bool,
        valid: Option<String>,
        ready: Option<String>,
    },
    Operation {
        op: Operator,
        operands: Vec<String>,
    },
    Accumulator {
        op: AccumSpec,
        data: String,
        initval: Option<i64>,
        reset: Option<String>,
        width: Option<u32>,
        #[serde(default)]
        signed: bool,
    },
}

/// `"add"` for a single operator, `["add", "xor"]` for a custom chain.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum AccumSpec {
    Single(Operator),
    Chain(Vec<Operator>),
}

impl AccumSpec {
    fn to_accum_op(&self) -> AccumOp {
        match self {
            AccumSpec::Single(Operator::Add) => AccumOp::Add,
            AccumSpec::Single(Operator::Sub) => AccumOp::Sub,
            AccumSpec::Single(Operator::Mul) => AccumOp::Mul,
            AccumSpec::Single(Operator::Div) => AccumOp::Div,
            AccumSpec::Single(op) => AccumOp::Custom(vec![*op]),
            AccumSpec::Chain(ops) => AccumOp::Custom(ops.clone()),
        }
    }
}

// ── Errors ──────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("invalid graph description: {0}")]
    Json(#[from] serde_json::Error),

    #[error("duplicate node name '{0}'")]
    DuplicateName(String),

    #[error("node '{node}' references unknown node '{reference}'")]
    UnknownReference { node: String, reference: String },

    #[error("output '{0}' is not a described node")]
    UnknownOutput(String),

    #[error("node '{node}': {source}")]
    Compile {
        node: String,
        source: CompileError,
    },
}

// ── Loading ─────────────────────────────────────────────────────────────────

/// A description file rebuilt as a dataflow.
#[derive(Debug, Clone)]
pub struct LoadedGraph {
    pub name: Option<String>,
    pub dataflow: Dataflow,
    pub outputs: Vec<NodeId>,
    pub latency: LatencyTable,
}

pub fn parse_graph(text: &str) -> Result<LoadedGraph, LoadError> {
    let file: GraphFile = serde_json::from_str(text)?;
    build_graph(&file)
}

pub fn build_graph(file: &GraphFile) -> Result<LoadedGraph, LoadError> {
    let mut index = HashMap::new();
    for (i, node) in file.nodes.iter().enumerate() {
        if index.insert(node.name.as_str(), i).is_some() {
            return Err(LoadError::DuplicateName(node.name.clone()));
        }
    }

    let mut builder = Builder {
        file,
        index,
        ids: HashMap::new(),
        in_progress: HashSet::new(),
        fixups: Vec::new(),
        placeholder: None,
        df: Dataflow::with_datawidth(file.datawidth.unwrap_or(DEFAULT_DATAWIDTH)).map_err(
            |source| LoadError::Compile {
                node: "datawidth".to_string(),
                source,
            },
        )?,
    };
    for i in 0..file.nodes.len() {
        builder.build(i)?;
    }
    builder.apply_fixups()?;

    let outputs = file
        .outputs
        .iter()
        .map(|name| {
            builder
                .index
                .get(name.as_str())
                .and_then(|i| builder.ids.get(i))
                .copied()
                .ok_or_else(|| LoadError::UnknownOutput(name.clone()))
        })
        .collect::<Result<Vec<_>, _>>()?;
    log::debug!(
        "load: {} node(s), {} output(s)",
        builder.df.len(),
        outputs.len()
    );

    Ok(LoadedGraph {
        name: file.name.clone(),
        dataflow: builder.df,
        outputs,
        latency: file.latency.clone(),
    })
}

struct Builder<'f> {
    file: &'f GraphFile,
    index: HashMap<&'f str, usize>,
    ids: HashMap<usize, NodeId>,
    in_progress: HashSet<usize>,
    /// `(node, slot, operand)` edges into nodes that were still being built.
    fixups: Vec<(usize, usize, usize)>,
    /// Stand-in operand for loop edges. Only a description whose references
    /// form a loop needs one, and such a graph never schedules, so acyclic
    /// descriptions build exactly one node per entry.
    placeholder: Option<NodeId>,
    df: Dataflow,
}

impl<'f> Builder<'f> {
    fn build(&mut self, i: usize) -> Result<NodeId, LoadError> {
        if let Some(&id) = self.ids.get(&i) {
            return Ok(id);
        }
        self.in_progress.insert(i);
        let file = self.file;
        let desc = &file.nodes[i];
        let wrap = |source| LoadError::Compile {
            node: desc.name.clone(),
            source,
        };

        let id = match &desc.spec {
            NodeSpec::Constant { value } => self.df.constant(*value),
            NodeSpec::Variable {
                width,
                signed,
                valid,
                ready,
            } => self
                .df
                .variable(
                    &desc.name,
                    VariableOpts {
                        valid: valid.clone(),
                        ready: ready.clone(),
                        width: *width,
                        signed: *signed,
                    },
                )
                .map_err(wrap)?,
            NodeSpec::Operation { op, operands } => {
                let mut ids = Vec::with_capacity(operands.len());
                for (slot, name) in operands.iter().enumerate() {
                    ids.push(self.operand(i, slot, name)?);
                }
                self.df.operation(*op, &ids).map_err(wrap)?
            }
            NodeSpec::Accumulator {
                op,
                data,
                initval,
                reset,
                width,
                signed,
            } => {
                let data = self.operand(i, 0, data)?;
                let reset = match reset {
                    Some(name) => Some(self.operand(i, 1, name)?),
                    None => None,
                };
                let opts = AccumOpts {
                    initval: *initval,
                    reset,
                    width: *width,
                    signed: *signed,
                };
                self.df
                    .accumulate(op.to_accum_op(), data, opts)
                    .map_err(wrap)?
            }
        };
        self.df.set_name(id, &desc.name).map_err(wrap)?;

        self.in_progress.remove(&i);
        self.ids.insert(i, id);
        Ok(id)
    }

    fn operand(&mut self, node: usize, slot: usize, name: &str) -> Result<NodeId, LoadError> {
        let Some(&target) = self.index.get(name) else {
            return Err(LoadError::UnknownReference {
                node: self.file.nodes[node].name.clone(),
                reference: name.to_string(),
            });
        };
        if self.in_progress.contains(&target) {
            self.fixups.push((node, slot, target));
            let placeholder = match self.placeholder {
                Some(id) => id,
                None => *self.placeholder.insert(self.df.constant(0)),
            };
            return Ok(placeholder);
        }
        self.build(target)
    }

    fn apply_fixups(&mut self) -> Result<(), LoadError> {
        let file = self.file;
        for (node, slot, target) in std::mem::take(&mut self.fixups) {
            let name = &file.nodes[node].name;
            let wrap = |source| LoadError::Compile {
                node: name.clone(),
                source,
            };
            let (Some(&id), Some(&operand)) = (self.ids.get(&node), self.ids.get(&target)) else {
                continue;
            };
            self.df.set_operand(id, slot, operand).map_err(wrap)?;
        }
        Ok(())
    }
}
