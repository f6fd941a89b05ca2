//! The command-runner contract: how steps reach hosts.
//!
//! The engine never talks to a transport directly; it threads one
//! [`CommandRunner`] through the context and steps call it. The SSH
//! transport lives outside this workspace and plugs in behind the same
//! trait; what ships here is the control-node [`LocalRunner`] and the
//! scripted [`MockRunner`] used throughout the tests.

mod local;
mod mock;
mod router;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use kubexm_host::Host;

pub use local::LocalRunner;
pub use mock::{MockRunner, RecordedCall, ScriptedResponse};
pub use router::RouterRunner;

/// Errors raised by a command runner.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RunnerError {
    /// The transport could not reach the host.
    #[error("cannot connect to {host}: {message}")]
    Connect { host: String, message: String },

    /// The command started but exited non-zero.
    #[error("command on {host} exited with status {status}: {stderr}")]
    CommandFailed {
        host: String,
        status: i32,
        stdout: String,
        stderr: String,
    },

    /// A file transfer failed.
    #[error("transfer to {host} failed: {message}")]
    Transfer { host: String, message: String },

    /// The run was cancelled before or during the exchange.
    #[error("cancelled while talking to {host}")]
    Cancelled { host: String },

    /// A local I/O error occurred.
    #[error("io error: {message}")]
    Io { message: String },
}

impl RunnerError {
    /// Whether the error came from the command itself rather than the
    /// transport.
    #[must_use]
    pub fn is_command_failure(&self) -> bool {
        matches!(self, Self::CommandFailed { .. })
    }
}

/// A `Result` type alias using [`RunnerError`].
pub type RunnerResult<T> = Result<T, RunnerError>;

/// Captured output of one command exchange.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExecOutput {
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
    /// Process exit status.
    pub status: i32,
}

impl ExecOutput {
    /// A successful exchange with the given stdout and nothing else.
    #[must_use]
    pub fn stdout(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: String::new(),
            status: 0,
        }
    }
}

/// A command to run on a host.
///
/// Commands are shell fragments; the runner wraps them in a login shell
/// on the far side. `sudo` selects privilege escalation for transports
/// that connect as an unprivileged user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    /// The shell fragment to run.
    pub script: String,
    /// Run under privilege escalation.
    pub sudo: bool,
}

impl Command {
    /// A plain command.
    #[must_use]
    pub fn new(script: impl Into<String>) -> Self {
        Self {
            script: script.into(),
            sudo: false,
        }
    }

    /// A command run under privilege escalation.
    #[must_use]
    pub fn sudo(script: impl Into<String>) -> Self {
        Self {
            script: script.into(),
            sudo: true,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.sudo {
            write!(f, "sudo {}", self.script)
        } else {
            f.write_str(&self.script)
        }
    }
}

/// The transport contract steps reach hosts through.
///
/// Implementations handle their own pooling and reconnection; callers
/// see one logical channel per host. All operations are cancel-safe:
/// dropping the future abandons the exchange.
#[async_trait]
pub trait CommandRunner: Send + Sync + fmt::Debug {
    /// Run a command on a host and capture its output.
    ///
    /// A non-zero exit is an `Ok` with the status recorded, not an
    /// error; [`RunnerError::CommandFailed`] is reserved for
    /// [`exec_checked`](Self::exec_checked).
    async fn exec(&self, host: &Host, command: &Command) -> RunnerResult<ExecOutput>;

    /// Write bytes to a path on a host.
    async fn upload(&self, host: &Host, content: &[u8], remote_path: &str) -> RunnerResult<()>;

    /// Read bytes from a path on a host.
    async fn fetch(&self, host: &Host, remote_path: &str) -> RunnerResult<Vec<u8>>;

    /// Run a command and treat a non-zero exit as an error.
    async fn exec_checked(&self, host: &Host, command: &Command) -> RunnerResult<ExecOutput> {
        let output = self.exec(host, command).await?;
        if output.status != 0 {
            return Err(RunnerError::CommandFailed {
                host: host.name().to_string(),
                status: output.status,
                stdout: output.stdout,
                stderr: output.stderr,
            });
        }
        Ok(output)
    }
}

/// A shared handle to a command runner.
pub type SharedRunner = Arc<dyn CommandRunner>;
