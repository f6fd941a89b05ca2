//! The composition layers above steps: tasks produce fragments,
//! modules sequence tasks, pipelines sequence modules into the one
//! graph a run executes.
//!
//! Planning is pure: the same context always yields the same graph.
//! Execution is driven by the pipeline, which always returns a result
//! tree; planning errors short-circuit into a failed result with no
//! node entries.

mod error;
mod module;
mod pipeline;
mod task;

pub use error::{PlanError, PlanResult};
pub use module::{Module, plan_module, plan_task, require_role};
pub use pipeline::Pipeline;
pub use task::Task;
