use async_trait::async_trait;

use kubexm_context::PipelineContext;
use kubexm_engine::{Engine, GraphExecutionResult};
use kubexm_graph::{ExecutionFragment, ExecutionGraph, NodeId};

use crate::error::PlanResult;
use crate::module::Module;

/// The top-level workflow: sequences modules into one validated graph
/// and drives its execution.
///
/// `run` never returns an error for execution failures: those live in
/// the result tree. A planning error yields a failed result with no
/// node entries; execution never starts.
#[async_trait]
pub trait Pipeline: Send + Sync {
    /// Pipeline name; also the graph name.
    fn name(&self) -> &str;

    /// One-line human description.
    fn description(&self) -> &str;

    /// The modules of this pipeline, in execution order.
    ///
    /// # Errors
    ///
    /// Returns a [`crate::PlanError`] when the module list cannot be
    /// built.
    fn modules(&self, ctx: &PipelineContext) -> PlanResult<Vec<Box<dyn Module>>>;

    /// Compose the module fragments and seal the final graph.
    ///
    /// # Errors
    ///
    /// Returns the first [`crate::PlanError`] a module raises, a graph
    /// error on node id collisions across modules, or the validation
    /// error of the sealed graph.
    fn plan(&self, ctx: &PipelineContext) -> PlanResult<ExecutionGraph> {
        let mut pipeline_fragment = ExecutionFragment::new(self.name());
        let mut last_exits: Vec<NodeId> = Vec::new();

        for module in self.modules(ctx)? {
            let module_ctx = ctx.module_context(module.name());
            if !module.is_required(&module_ctx)? {
                tracing::debug!(module = module.name(), "module not required");
                continue;
            }

            let mut fragment = module.plan(&module_ctx)?;
            if fragment.is_empty() {
                continue;
            }
            fragment.calculate_entry_and_exit_nodes();
            let entries = fragment.entry_nodes().to_vec();
            let exits = fragment.exit_nodes().to_vec();

            pipeline_fragment.merge_fragment(fragment)?;
            pipeline_fragment.link(&last_exits, &entries)?;
            last_exits = exits;
        }

        let graph = ExecutionGraph::seal(self.name(), pipeline_fragment)?;
        tracing::info!(pipeline = self.name(), nodes = graph.len(), "planned");
        Ok(graph)
    }

    /// Plan, validate, and execute, always returning a result tree.
    async fn run(&self, ctx: &PipelineContext, engine: &Engine) -> GraphExecutionResult {
        let graph = match self.plan(ctx) {
            Ok(graph) => graph,
            Err(e) => {
                tracing::error!(pipeline = self.name(), error = %e, "planning failed");
                return GraphExecutionResult::planning_failure(self.name(), e.to_string());
            }
        };
        engine.execute(ctx, &graph).await
    }
}
