use kubexm_graph::GraphError;
use kubexm_host::{HostError, Role};

/// Errors raised while planning. All of them abort the run before
/// execution starts.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlanError {
    /// A task's plan could not be produced.
    #[error("task {task}: {message}")]
    Task { task: String, message: String },

    /// A module's plan could not be produced.
    #[error("module {module}: {message}")]
    Module { module: String, message: String },

    /// A role a recipe depends on is absent from the inventory.
    #[error("no host has role: {role}")]
    MissingRole { role: Role },

    /// An inventory lookup failed.
    #[error(transparent)]
    Host(#[from] HostError),

    /// Fragment composition or graph validation failed.
    #[error(transparent)]
    Graph(#[from] GraphError),

    /// The configuration is unusable for this plan.
    #[error("configuration: {message}")]
    Config { message: String },
}

impl PlanError {
    /// A task-scoped error.
    #[must_use]
    pub fn task(task: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Task {
            task: task.into(),
            message: message.into(),
        }
    }

    /// A module-scoped error.
    #[must_use]
    pub fn module(module: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Module {
            module: module.into(),
            message: message.into(),
        }
    }
}

/// A `Result` type alias using [`PlanError`].
pub type PlanResult<T> = Result<T, PlanError>;
