//! Workers: join every worker node using the cached join artifacts.

use std::sync::Arc;

use kubexm_context::{ModuleContext, TaskContext};
use kubexm_graph::{ExecutionFragment, ExecutionNode};
use kubexm_host::Role;
use kubexm_plan::{Module, PlanResult, Task};
use kubexm_step::steps::{CommandStep, RenderStep};

use crate::keys;
use crate::templates;

const JOIN_CONFIG_PATH: &str = "/etc/kubernetes/kubeadm-join.yaml";

struct JoinWorkersTask;

impl Task for JoinWorkersTask {
    fn name(&self) -> &str {
        "join-workers"
    }

    fn description(&self) -> &str {
        "join every worker node"
    }

    fn plan(&self, ctx: &TaskContext) -> PlanResult<ExecutionFragment> {
        let config = ctx.config();
        let endpoint = format!(
            "{}:{}",
            config.control_plane_endpoint.domain, config.control_plane_endpoint.port
        );
        let mut fragment = ExecutionFragment::new(self.name());

        // Masters double as workers in small clusters; they already
        // run a kubelet, so only pure workers join here.
        let workers = ctx
            .inventory()
            .with_role(Role::Worker)
            .into_iter()
            .filter(|h| !h.has_role(Role::Master));

        for worker in workers {
            let name = worker.name().to_string();

            let render = RenderStep::new(
                format!("render-join-config-{name}"),
                templates::KUBEADM_JOIN_WORKER_CONFIG,
                JOIN_CONFIG_PATH,
            )
            .var("endpoint", endpoint.as_str())
            .var("cri_socket", config.kubernetes.cri_socket.path())
            .cache_var(keys::KUBEADM_TOKEN)
            .cache_var(keys::KUBEADM_DISCOVERY_HASH)
            .mode(0o600);
            let render_id = fragment.add_node(ExecutionNode::new(
                format!("render-join-config-{name}"),
                Arc::new(render),
                vec![Arc::clone(&worker)],
            ))?;

            let join = CommandStep::new(
                format!("kubeadm-join-{name}"),
                format!("kubeadm join --config {JOIN_CONFIG_PATH}"),
            )
            .sudo()
            .check("test -f /etc/kubernetes/kubelet.conf")
            .rollback_with("kubeadm reset -f");
            let join_id = fragment.add_node(
                ExecutionNode::new(
                    format!("kubeadm-join-{name}"),
                    Arc::new(join),
                    vec![worker],
                )
                .timeout(std::time::Duration::from_secs(600)),
            )?;
            fragment.add_dependency(&render_id, &join_id)?;
        }

        Ok(fragment)
    }
}

/// The worker module; empty when every worker is also a master.
pub struct WorkerModule;

impl Module for WorkerModule {
    fn name(&self) -> &str {
        "worker"
    }

    fn description(&self) -> &str {
        "join worker nodes"
    }

    fn is_required(&self, ctx: &ModuleContext) -> PlanResult<bool> {
        Ok(ctx
            .inventory()
            .with_role(Role::Worker)
            .iter()
            .any(|h| !h.has_role(Role::Master)))
    }

    fn tasks(&self, _ctx: &ModuleContext) -> PlanResult<Vec<Box<dyn Task>>> {
        Ok(vec![Box::new(JoinWorkersTask)])
    }
}
