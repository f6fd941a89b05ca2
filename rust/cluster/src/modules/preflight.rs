//! Preflight: record OS facts and prepare every host for the
//! components that follow.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use kubexm_context::{CacheScope, ModuleContext, StepContext, TaskContext};
use kubexm_graph::{ExecutionFragment, ExecutionNode};
use kubexm_host::{Host, OsFacts};
use kubexm_plan::{Module, PlanError, PlanResult, Task};
use kubexm_runner::Command;
use kubexm_step::steps::CommandStep;
use kubexm_step::{Step, StepError, StepMeta, StepOutput, StepResult};

use crate::keys;

/// Records `uname` and os-release facts for its host, both onto the
/// [`Host`] itself and under the per-host facts cache key.
#[derive(Debug)]
pub struct GatherFactsStep;

#[async_trait]
impl Step for GatherFactsStep {
    fn meta(&self) -> StepMeta {
        StepMeta::new("gather-facts", "record kernel and distribution facts")
    }

    async fn run(&self, ctx: &StepContext, host: &Host) -> StepResult<StepOutput> {
        if ctx.cancel().is_cancelled() {
            return Err(StepError::Cancelled);
        }

        let runner = ctx.runner();
        let kernel = runner
            .exec_checked(host, &Command::new("uname -r"))
            .await?
            .stdout
            .trim()
            .to_string();
        let hostname = runner
            .exec_checked(host, &Command::new("hostname"))
            .await?
            .stdout
            .trim()
            .to_string();
        let os_release = runner
            .exec_checked(host, &Command::new("cat /etc/os-release"))
            .await?
            .stdout;

        let field = |key: &str| -> String {
            os_release
                .lines()
                .find_map(|line| line.strip_prefix(&format!("{key}=")))
                .map(|value| value.trim_matches('"').to_string())
                .unwrap_or_default()
        };

        let facts = OsFacts {
            os_id: field("ID"),
            os_version: field("VERSION_ID"),
            kernel,
            hostname,
        };
        host.record_facts(facts.clone());
        ctx.cache().set(
            CacheScope::Pipeline,
            keys::host_facts(host.name()),
            json!({
                "os_id": facts.os_id,
                "os_version": facts.os_version,
                "kernel": facts.kernel,
                "hostname": facts.hostname,
            }),
        );

        Ok(StepOutput::message(format!(
            "{} {} (kernel {})",
            facts.os_id, facts.os_version, facts.kernel
        )))
    }
}

/// One facts node per host: each host publishes under its own key.
struct GatherFactsTask;

impl Task for GatherFactsTask {
    fn name(&self) -> &str {
        "gather-facts"
    }

    fn description(&self) -> &str {
        "record OS facts for every host"
    }

    fn plan(&self, ctx: &TaskContext) -> PlanResult<ExecutionFragment> {
        let mut fragment = ExecutionFragment::new(self.name());
        for host in ctx.inventory().all() {
            fragment
                .add_node(ExecutionNode::new(
                    format!("gather-facts-{}", host.name()),
                    Arc::new(GatherFactsStep),
                    vec![host],
                ))
                .map_err(PlanError::from)?;
        }
        Ok(fragment)
    }
}

/// Kernel and runtime prerequisites, applied to all hosts at once.
struct PrepareHostsTask;

impl Task for PrepareHostsTask {
    fn name(&self) -> &str {
        "prepare-hosts"
    }

    fn description(&self) -> &str {
        "disable swap and enable forwarding on every host"
    }

    fn plan(&self, ctx: &TaskContext) -> PlanResult<ExecutionFragment> {
        let mut fragment = ExecutionFragment::new(self.name());
        let step = CommandStep::new(
            "prepare-host",
            "swapoff -a && \
             sed -i '/ swap / s/^/#/' /etc/fstab && \
             modprobe br_netfilter && \
             sysctl -w net.ipv4.ip_forward=1 net.bridge.bridge-nf-call-iptables=1",
        )
        .sudo()
        .description("swap off, br_netfilter, ip forwarding");

        fragment
            .add_node(ExecutionNode::new(
                "prepare-hosts",
                Arc::new(step),
                ctx.inventory().all(),
            ))
            .map_err(PlanError::from)?;
        Ok(fragment)
    }
}

/// The preflight module: facts first, then host preparation.
pub struct PreflightModule;

impl Module for PreflightModule {
    fn name(&self) -> &str {
        "preflight"
    }

    fn description(&self) -> &str {
        "record facts and prepare hosts"
    }

    fn tasks(&self, _ctx: &ModuleContext) -> PlanResult<Vec<Box<dyn Task>>> {
        Ok(vec![Box::new(GatherFactsTask), Box::new(PrepareHostsTask)])
    }
}
