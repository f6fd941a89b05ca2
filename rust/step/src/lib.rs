//! The leaf unit of work: the [`Step`] capability set and the generic
//! step library recipes compose.
//!
//! A step is immutable configuration data plus behavior, invoked once
//! per (node, host) pair. The engine drives the precheck/run/rollback
//! protocol; steps never retry or branch on dry-run themselves.

pub mod steps;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use kubexm_context::StepContext;
use kubexm_host::Host;
use kubexm_runner::RunnerError;

/// Name and description of a step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepMeta {
    /// Short identifier, e.g. `download-etcd`.
    pub name: String,
    /// One-line human description.
    pub description: String,
}

impl StepMeta {
    /// Build a meta record.
    #[must_use]
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
        }
    }
}

/// What a precheck found on one host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Precheck {
    /// The state the step would establish is already present; the
    /// engine records a precheck-skip and does not call `run`.
    Satisfied {
        /// Why the step can be skipped.
        reason: String,
    },
    /// The step must run.
    Required,
}

impl Precheck {
    /// A satisfied precheck with the given reason.
    #[must_use]
    pub fn satisfied(reason: impl Into<String>) -> Self {
        Self::Satisfied {
            reason: reason.into(),
        }
    }
}

/// What a successful `run` reports.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StepOutput {
    /// Human-readable summary.
    pub message: String,
    /// Captured standard output, if any.
    pub stdout: String,
    /// Captured standard error, if any.
    pub stderr: String,
}

impl StepOutput {
    /// An output with only a summary message.
    #[must_use]
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stdout: String::new(),
            stderr: String::new(),
        }
    }

    /// An output carrying a command exchange.
    #[must_use]
    pub fn from_exec(message: impl Into<String>, output: kubexm_runner::ExecOutput) -> Self {
        Self {
            message: message.into(),
            stdout: output.stdout,
            stderr: output.stderr,
        }
    }
}

/// Errors a step can raise.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StepError {
    /// The transport failed.
    #[error(transparent)]
    Runner(#[from] RunnerError),

    /// A command ran but did not do what the step needed.
    #[error("{message}")]
    Command {
        message: String,
        stdout: String,
        stderr: String,
    },

    /// A cache key the step depends on is missing.
    #[error("missing cache key: {key}")]
    MissingCacheKey { key: String },

    /// A template placeholder could not be resolved.
    #[error("unresolved template placeholder: {placeholder}")]
    Template { placeholder: String },

    /// A download failed.
    #[error("download of {url} failed: {message}")]
    Download { url: String, message: String },

    /// The run is offline and the artifact is not already present.
    #[error("offline mode: {url} is not available locally")]
    Offline { url: String },

    /// A digest did not match.
    #[error("checksum mismatch for {path}: expected {expected}, got {actual}")]
    Checksum {
        path: String,
        expected: String,
        actual: String,
    },

    /// An archive could not be unpacked.
    #[error("cannot extract {path}: {message}")]
    Extract { path: String, message: String },

    /// The step targets only the control node but was given a cluster
    /// host.
    #[error("step {step} only targets the control node, got {host}")]
    ControlNodeOnly { step: String, host: String },

    /// A local I/O error occurred.
    #[error("io error: {message}")]
    Io { message: String },

    /// The run was cancelled.
    #[error("cancelled")]
    Cancelled,
}

impl StepError {
    fn io(e: std::io::Error) -> Self {
        Self::Io {
            message: e.to_string(),
        }
    }
}

/// A `Result` type alias using [`StepError`].
pub type StepResult<T> = Result<T, StepError>;

/// The leaf contract the engine schedules.
///
/// `run` is the only operation permitted to mutate the target host.
/// `precheck` is advisory; `rollback` is best-effort, invoked only
/// after a failed `run` on the same host. Retry behavior is governed
/// by per-node overrides, never by the step itself.
#[async_trait]
pub trait Step: Send + Sync + fmt::Debug {
    /// Name and description of this step.
    fn meta(&self) -> StepMeta;

    /// Check whether the step's effect is already present on the host.
    ///
    /// The default says the step must run.
    async fn precheck(&self, ctx: &StepContext, host: &Host) -> StepResult<Precheck> {
        let (_, _) = (ctx, host);
        Ok(Precheck::Required)
    }

    /// Apply the step's effect to the host.
    async fn run(&self, ctx: &StepContext, host: &Host) -> StepResult<StepOutput>;

    /// Undo as much of a failed `run` as possible.
    ///
    /// The default does nothing.
    async fn rollback(&self, ctx: &StepContext, host: &Host) -> StepResult<()> {
        let (_, _) = (ctx, host);
        Ok(())
    }
}

/// A shared handle to a step.
pub type SharedStep = Arc<dyn Step>;
