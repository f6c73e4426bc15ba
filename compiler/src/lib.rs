// dfc — pipelined dataflow-to-RTL compiler
//
// Library root. Leaves first: ids and diagnostics, the graph model and its
// walks, scheduling, RTL construction and allocation, then orchestration and
// the emitters built on top of it.

pub mod alloc;
pub mod codegen;
pub mod diag;
pub mod dot;
pub mod graph;
pub mod id;
pub mod load;
pub mod op;
pub mod pass;
pub mod pipeline;
pub mod rtl;
pub mod schedule;
pub mod sim;
pub mod visit;

pub use diag::CompileError;
pub use graph::{AccumOpts, Dataflow, VariableOpts};
pub use id::NodeId;
pub use op::{AccumOp, LatencyTable, Operator};
pub use pipeline::{compile, CompileOptions, Design, PipelineError};
