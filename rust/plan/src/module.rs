use kubexm_context::ModuleContext;
use kubexm_graph::{ExecutionFragment, NodeId};
use kubexm_host::Role;

use crate::error::{PlanError, PlanResult};
use crate::task::Task;

/// Composes the tasks of one subsystem (etcd, control-plane, …) into a
/// module fragment.
///
/// The default `plan` sequences task fragments: each task's nodes are
/// merged into the module fragment and its entries linked to the
/// running last-exits. Empty task fragments are skipped transparently.
pub trait Module: Send + Sync {
    /// Short identifier, unique within its pipeline.
    fn name(&self) -> &str;

    /// One-line human description.
    fn description(&self) -> &str;

    /// Cheap gate; a module that returns `false` contributes an empty
    /// fragment. Role-based gating belongs here.
    ///
    /// # Errors
    ///
    /// Returns a [`PlanError`] when the gate cannot be evaluated.
    fn is_required(&self, ctx: &ModuleContext) -> PlanResult<bool> {
        let _ = ctx;
        Ok(true)
    }

    /// The tasks of this module, in execution order.
    ///
    /// # Errors
    ///
    /// Returns a [`PlanError`] when the task list cannot be built.
    fn tasks(&self, ctx: &ModuleContext) -> PlanResult<Vec<Box<dyn Task>>>;

    /// Produce the module fragment by sequencing the task fragments.
    ///
    /// # Errors
    ///
    /// Returns the first [`PlanError`] a task raises, or a graph error
    /// on node id collisions.
    fn plan(&self, ctx: &ModuleContext) -> PlanResult<ExecutionFragment> {
        plan_module(self, ctx)
    }
}

/// The default module planning algorithm; exposed so custom `plan`
/// implementations can delegate to it.
///
/// # Errors
///
/// Returns the first [`PlanError`] a task raises, or a graph error on
/// node id collisions.
pub fn plan_module<M: Module + ?Sized>(
    module: &M,
    ctx: &ModuleContext,
) -> PlanResult<ExecutionFragment> {
    let mut module_fragment = ExecutionFragment::new(module.name());
    let mut last_exits: Vec<NodeId> = Vec::new();

    for task in module.tasks(ctx)? {
        let fragment = plan_task(ctx, task.as_ref())?;
        if fragment.is_empty() {
            tracing::debug!(module = module.name(), task = task.name(), "task not required");
            continue;
        }

        let mut fragment = fragment;
        fragment.calculate_entry_and_exit_nodes();
        let entries = fragment.entry_nodes().to_vec();
        let exits = fragment.exit_nodes().to_vec();

        module_fragment.merge_fragment(fragment)?;
        module_fragment.link(&last_exits, &entries)?;
        last_exits = exits;
    }

    Ok(module_fragment)
}

/// Plan one task under a module context: evaluate the gate, produce
/// the fragment, and stamp every node with the (module, task) scope.
///
/// # Errors
///
/// Returns the task's [`PlanError`] unchanged.
pub fn plan_task(ctx: &ModuleContext, task: &dyn Task) -> PlanResult<ExecutionFragment> {
    let task_ctx = ctx.task_context(task.name());
    if !task.is_required(&task_ctx)? {
        return Ok(ExecutionFragment::new(task.name()));
    }
    let mut fragment = task.plan(&task_ctx)?;
    fragment.apply_scope(task_ctx.scope());
    Ok(fragment)
}

/// Fail planning when the inventory has no host with the role.
///
/// # Errors
///
/// Returns [`PlanError::MissingRole`].
pub fn require_role(ctx: &ModuleContext, role: Role) -> PlanResult<()> {
    if ctx.inventory().has_role(role) {
        Ok(())
    } else {
        Err(PlanError::MissingRole { role })
    }
}
