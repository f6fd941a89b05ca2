use kubexm_context::TaskContext;
use kubexm_graph::ExecutionFragment;

use crate::error::PlanResult;

/// Produces one fragment expressing a single goal on a role, e.g.
/// "install etcd binaries".
///
/// `plan` is a pure function from context to graph shape: it must not
/// mutate hosts, and replanning an unchanged context must reproduce
/// the same fragment. Dependencies may only reference node ids
/// produced by this task; linking across tasks happens in the module.
/// Derived artifacts travel through documented cache keys, never
/// through task-to-task references.
pub trait Task: Send + Sync {
    /// Short identifier, unique within its module.
    fn name(&self) -> &str;

    /// One-line human description.
    fn description(&self) -> &str;

    /// Cheap, idempotent gate. A task that returns `false` contributes
    /// an empty fragment.
    ///
    /// # Errors
    ///
    /// Returns a [`crate::PlanError`] when the gate itself cannot be
    /// evaluated.
    fn is_required(&self, ctx: &TaskContext) -> PlanResult<bool> {
        let _ = ctx;
        Ok(true)
    }

    /// Produce this task's fragment.
    ///
    /// # Errors
    ///
    /// Returns a [`crate::PlanError`] when the fragment cannot be
    /// produced.
    fn plan(&self, ctx: &TaskContext) -> PlanResult<ExecutionFragment>;
}
