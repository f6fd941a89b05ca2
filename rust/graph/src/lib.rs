//! The execution DAG: nodes, fragments, the sealed graph, and its
//! validation.
//!
//! Tasks and modules accumulate work in [`ExecutionFragment`]s, which
//! merge and link into one final [`ExecutionGraph`] the engine runs.
//! Everything here is deterministic: node order follows insertion, and
//! entry/exit lists are sorted, so replanning an unchanged
//! configuration reproduces the same graph.

mod error;
mod fragment;
mod graph;
mod node;

pub use error::{GraphError, GraphResult, GraphValidationError, ValidationRule};
pub use fragment::ExecutionFragment;
pub use graph::ExecutionGraph;
pub use node::{ExecutionNode, HostParallelism, NodeId, RetryPolicy};
