//! Request-scoped execution context: configuration, inventory, caches,
//! work directories, cancellation, and the layered views handed to each
//! composition layer.
//!
//! One [`RuntimeContext`] backs a whole run. The layers never see it
//! directly; they receive narrowing views ([`PipelineContext`] →
//! [`ModuleContext`] → [`TaskContext`] → [`StepContext`]) over the same
//! shared object, each exposing only the caches and helpers valid at
//! that layer.

mod cache;
mod cancel;
mod workspace;

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use kubexm_config::ClusterSpec;
use kubexm_host::Inventory;
use kubexm_runner::SharedRunner;

pub use cache::{Cache, CacheScope, CacheView, ScopedCaches};
pub use cancel::CancelSignal;
pub use workspace::Workspace;

/// Errors raised by context construction.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ContextError {
    /// An I/O error occurred while preparing the work directories.
    #[error("io error: {message}")]
    Io { message: String },
}

/// A `Result` type alias using [`ContextError`].
pub type ContextResult<T> = Result<T, ContextError>;

/// The (module, task) scope an execution node belongs to.
///
/// Nodes carry their scope so execution-time steps resolve the same
/// module and task caches that planning created.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeScope {
    /// Name of the owning module.
    pub module: String,
    /// Name of the owning task.
    pub task: String,
}

impl NodeScope {
    /// Build a scope from module and task names.
    #[must_use]
    pub fn new(module: impl Into<String>, task: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            task: task.into(),
        }
    }
}

/// The shared state backing one run.
#[derive(Debug)]
struct RuntimeContext {
    config: Arc<ClusterSpec>,
    inventory: Arc<Inventory>,
    runner: SharedRunner,
    caches: ScopedCaches,
    workspace: Workspace,
    dry_run: bool,
    offline: bool,
    cancel: CancelSignal,
}

/// Builder for the run context.
#[derive(Debug)]
pub struct ContextBuilder {
    config: Arc<ClusterSpec>,
    inventory: Arc<Inventory>,
    runner: SharedRunner,
    workspace: Workspace,
    dry_run: bool,
    offline: bool,
    cancel: CancelSignal,
}

impl ContextBuilder {
    /// Start a builder from the three mandatory collaborators.
    ///
    /// The workspace defaults to `.kubexm/<cluster>` under the current
    /// directory.
    #[must_use]
    pub fn new(config: Arc<ClusterSpec>, inventory: Arc<Inventory>, runner: SharedRunner) -> Self {
        let workspace = Workspace::new(".", &config.cluster_name);
        Self {
            config,
            inventory,
            runner,
            workspace,
            dry_run: false,
            offline: false,
            cancel: CancelSignal::new(),
        }
    }

    /// Place the work directory under a different base directory.
    #[must_use]
    pub fn workspace_base(mut self, base: impl AsRef<Path>) -> Self {
        self.workspace = Workspace::new(base, &self.config.cluster_name);
        self
    }

    /// Plan and report without touching any host.
    #[must_use]
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Forbid network downloads; artifacts must already be present.
    #[must_use]
    pub fn offline(mut self, offline: bool) -> Self {
        self.offline = offline;
        self
    }

    /// Use an externally owned cancellation signal.
    #[must_use]
    pub fn cancel_signal(mut self, cancel: CancelSignal) -> Self {
        self.cancel = cancel;
        self
    }

    /// Finish the builder, producing the pipeline-level view.
    #[must_use]
    pub fn build(self) -> PipelineContext {
        PipelineContext {
            inner: Arc::new(RuntimeContext {
                config: self.config,
                inventory: self.inventory,
                runner: self.runner,
                caches: ScopedCaches::new(),
                workspace: self.workspace,
                dry_run: self.dry_run,
                offline: self.offline,
                cancel: self.cancel,
            }),
        }
    }
}

/// The widest view: what a pipeline and the engine see.
#[derive(Debug, Clone)]
pub struct PipelineContext {
    inner: Arc<RuntimeContext>,
}

impl PipelineContext {
    /// The immutable cluster specification.
    #[must_use]
    pub fn config(&self) -> &ClusterSpec {
        &self.inner.config
    }

    /// The host inventory with its role index.
    #[must_use]
    pub fn inventory(&self) -> &Inventory {
        &self.inner.inventory
    }

    /// The command runner collaborator.
    #[must_use]
    pub fn runner(&self) -> SharedRunner {
        Arc::clone(&self.inner.runner)
    }

    /// The work-directory layout.
    #[must_use]
    pub fn workspace(&self) -> &Workspace {
        &self.inner.workspace
    }

    /// Whether this run is a dry run.
    #[must_use]
    pub fn is_dry_run(&self) -> bool {
        self.inner.dry_run
    }

    /// Whether network downloads are forbidden.
    #[must_use]
    pub fn is_offline(&self) -> bool {
        self.inner.offline
    }

    /// The cancellation signal for this run.
    #[must_use]
    pub fn cancel(&self) -> CancelSignal {
        self.inner.cancel.clone()
    }

    /// The pipeline-level cache.
    #[must_use]
    pub fn pipeline_cache(&self) -> Arc<Cache> {
        self.inner.caches.pipeline()
    }

    /// Narrow to a module's view.
    #[must_use]
    pub fn module_context(&self, module: impl Into<String>) -> ModuleContext {
        ModuleContext {
            inner: Arc::clone(&self.inner),
            module: module.into(),
        }
    }

    /// The step view for a node's scope, handed out by the engine.
    #[must_use]
    pub fn step_context(&self, scope: &NodeScope) -> StepContext {
        StepContext {
            inner: Arc::clone(&self.inner),
            scope: scope.clone(),
        }
    }

    /// Tear down a module's caches once its scope ends.
    pub fn finish_module(&self, module: &str) {
        self.inner.caches.drop_module(module);
    }
}

/// The view a module plans with.
#[derive(Debug, Clone)]
pub struct ModuleContext {
    inner: Arc<RuntimeContext>,
    module: String,
}

impl ModuleContext {
    /// Name of the module this view belongs to.
    #[must_use]
    pub fn module(&self) -> &str {
        &self.module
    }

    /// The immutable cluster specification.
    #[must_use]
    pub fn config(&self) -> &ClusterSpec {
        &self.inner.config
    }

    /// The host inventory with its role index.
    #[must_use]
    pub fn inventory(&self) -> &Inventory {
        &self.inner.inventory
    }

    /// The pipeline-level cache.
    #[must_use]
    pub fn pipeline_cache(&self) -> Arc<Cache> {
        self.inner.caches.pipeline()
    }

    /// This module's cache.
    #[must_use]
    pub fn module_cache(&self) -> Arc<Cache> {
        self.inner.caches.module(&self.module)
    }

    /// Narrow to a task's view.
    #[must_use]
    pub fn task_context(&self, task: impl Into<String>) -> TaskContext {
        TaskContext {
            inner: Arc::clone(&self.inner),
            scope: NodeScope {
                module: self.module.clone(),
                task: task.into(),
            },
        }
    }

    /// Tear down a task's cache once its scope ends.
    pub fn finish_task(&self, task: &str) {
        self.inner.caches.drop_task(&self.module, task);
    }
}

/// The view a task plans with.
#[derive(Debug, Clone)]
pub struct TaskContext {
    inner: Arc<RuntimeContext>,
    scope: NodeScope,
}

impl TaskContext {
    /// The (module, task) scope of this view.
    #[must_use]
    pub fn scope(&self) -> &NodeScope {
        &self.scope
    }

    /// The immutable cluster specification.
    #[must_use]
    pub fn config(&self) -> &ClusterSpec {
        &self.inner.config
    }

    /// The host inventory with its role index.
    #[must_use]
    pub fn inventory(&self) -> &Inventory {
        &self.inner.inventory
    }

    /// The work-directory layout.
    #[must_use]
    pub fn workspace(&self) -> &Workspace {
        &self.inner.workspace
    }

    /// Whether network downloads are forbidden.
    #[must_use]
    pub fn is_offline(&self) -> bool {
        self.inner.offline
    }

    /// The read-through cache view for this scope.
    #[must_use]
    pub fn cache(&self) -> CacheView {
        CacheView::new(
            self.inner.caches.pipeline(),
            self.inner.caches.module(&self.scope.module),
            self.inner.caches.task(&self.scope.module, &self.scope.task),
        )
    }
}

/// The narrowest view: what a step runs with.
///
/// Configuration and inventory are deliberately absent; recipes bake
/// what they need into the step at plan time.
#[derive(Debug, Clone)]
pub struct StepContext {
    inner: Arc<RuntimeContext>,
    scope: NodeScope,
}

impl StepContext {
    /// The (module, task) scope this step executes in.
    #[must_use]
    pub fn scope(&self) -> &NodeScope {
        &self.scope
    }

    /// The command runner collaborator.
    #[must_use]
    pub fn runner(&self) -> SharedRunner {
        Arc::clone(&self.inner.runner)
    }

    /// The work-directory layout.
    #[must_use]
    pub fn workspace(&self) -> &Workspace {
        &self.inner.workspace
    }

    /// Whether network downloads are forbidden.
    #[must_use]
    pub fn is_offline(&self) -> bool {
        self.inner.offline
    }

    /// The cancellation signal; steps poll it at suspension points.
    #[must_use]
    pub fn cancel(&self) -> CancelSignal {
        self.inner.cancel.clone()
    }

    /// The read-through cache view for this scope.
    #[must_use]
    pub fn cache(&self) -> CacheView {
        CacheView::new(
            self.inner.caches.pipeline(),
            self.inner.caches.module(&self.scope.module),
            self.inner.caches.task(&self.scope.module, &self.scope.task),
        )
    }
}
