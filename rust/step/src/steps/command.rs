use async_trait::async_trait;
use serde_json::Value;

use kubexm_context::{CacheScope, StepContext};
use kubexm_host::Host;
use kubexm_runner::{Command, RunnerError};

use crate::{Precheck, Step, StepError, StepMeta, StepOutput, StepResult};

/// Run a shell command on the target host.
///
/// An optional check script makes the step idempotent: when the check
/// exits zero the precheck reports the state as already satisfied. The
/// trimmed stdout of the main script can be published to a cache key
/// for later steps.
#[derive(Debug, Clone)]
pub struct CommandStep {
    name: String,
    description: String,
    script: String,
    sudo: bool,
    check: Option<String>,
    rollback: Option<String>,
    publish: Option<(CacheScope, String)>,
}

impl CommandStep {
    /// A command step running the given shell fragment.
    #[must_use]
    pub fn new(name: impl Into<String>, script: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            description: format!("run command for {name}"),
            name,
            script: script.into(),
            sudo: false,
            check: None,
            rollback: None,
            publish: None,
        }
    }

    /// Override the one-line description.
    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Run the script under privilege escalation.
    #[must_use]
    pub fn sudo(mut self) -> Self {
        self.sudo = true;
        self
    }

    /// Idempotency check: when this script exits zero the step is
    /// skipped.
    #[must_use]
    pub fn check(mut self, script: impl Into<String>) -> Self {
        self.check = Some(script.into());
        self
    }

    /// Script run on rollback after a failed `run`.
    #[must_use]
    pub fn rollback_with(mut self, script: impl Into<String>) -> Self {
        self.rollback = Some(script.into());
        self
    }

    /// Publish the trimmed stdout of the script to a cache key.
    #[must_use]
    pub fn publish(mut self, scope: CacheScope, key: impl Into<String>) -> Self {
        self.publish = Some((scope, key.into()));
        self
    }

    fn command(&self, script: &str) -> Command {
        if self.sudo {
            Command::sudo(script)
        } else {
            Command::new(script)
        }
    }
}

#[async_trait]
impl Step for CommandStep {
    fn meta(&self) -> StepMeta {
        StepMeta::new(&self.name, &self.description)
    }

    async fn precheck(&self, ctx: &StepContext, host: &Host) -> StepResult<Precheck> {
        let Some(check) = &self.check else {
            return Ok(Precheck::Required);
        };
        let output = ctx.runner().exec(host, &self.command(check)).await?;
        if output.status == 0 {
            Ok(Precheck::satisfied(format!("check passed: {check}")))
        } else {
            Ok(Precheck::Required)
        }
    }

    async fn run(&self, ctx: &StepContext, host: &Host) -> StepResult<StepOutput> {
        if ctx.cancel().is_cancelled() {
            return Err(StepError::Cancelled);
        }

        let result = ctx
            .runner()
            .exec_checked(host, &self.command(&self.script))
            .await;
        let output = match result {
            Ok(output) => output,
            Err(RunnerError::CommandFailed {
                status,
                stdout,
                stderr,
                ..
            }) => {
                return Err(StepError::Command {
                    message: format!("{} exited with status {status}", self.name),
                    stdout,
                    stderr,
                });
            }
            Err(other) => return Err(other.into()),
        };

        if let Some((scope, key)) = &self.publish {
            ctx.cache()
                .set(*scope, key.clone(), Value::String(output.stdout.trim().to_string()));
            tracing::debug!(step = self.name, key = %key, "published command output");
        }

        Ok(StepOutput::from_exec(format!("ran {}", self.name), output))
    }

    async fn rollback(&self, ctx: &StepContext, host: &Host) -> StepResult<()> {
        let Some(rollback) = &self.rollback else {
            return Ok(());
        };
        ctx.runner()
            .exec_checked(host, &self.command(rollback))
            .await?;
        Ok(())
    }
}
