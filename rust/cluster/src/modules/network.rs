//! Network: apply the CNI manifest from the first master.

use std::sync::Arc;

use kubexm_config::NetworkPlugin;
use kubexm_context::{ModuleContext, TaskContext};
use kubexm_graph::{ExecutionFragment, ExecutionNode, RetryPolicy};
use kubexm_host::Role;
use kubexm_plan::{Module, PlanError, PlanResult, Task};
use kubexm_step::steps::CommandStep;

fn manifest_url(plugin: NetworkPlugin) -> Option<&'static str> {
    match plugin {
        NetworkPlugin::Calico => {
            Some("https://raw.githubusercontent.com/projectcalico/calico/v3.27.2/manifests/calico.yaml")
        }
        NetworkPlugin::Flannel => {
            Some("https://raw.githubusercontent.com/flannel-io/flannel/v0.24.3/Documentation/kube-flannel.yml")
        }
        NetworkPlugin::Cilium => {
            Some("https://raw.githubusercontent.com/cilium/cilium/v1.15.1/install/kubernetes/quick-install.yaml")
        }
        NetworkPlugin::None => None,
    }
}

struct ApplyCniTask {
    plugin: NetworkPlugin,
}

impl Task for ApplyCniTask {
    fn name(&self) -> &str {
        "apply-cni"
    }

    fn description(&self) -> &str {
        "apply the CNI manifest"
    }

    fn plan(&self, ctx: &TaskContext) -> PlanResult<ExecutionFragment> {
        let Some(url) = manifest_url(self.plugin) else {
            return Ok(ExecutionFragment::new(self.name()));
        };
        let first = ctx
            .inventory()
            .first_with_role(Role::Master)
            .map_err(PlanError::from)?;

        let step = CommandStep::new(
            "apply-cni",
            format!("kubectl --kubeconfig /etc/kubernetes/admin.conf apply -f {url}"),
        )
        .sudo();

        let mut fragment = ExecutionFragment::new(self.name());
        fragment.add_node(
            ExecutionNode::new("apply-cni", Arc::new(step), vec![first])
                .retry(RetryPolicy::new(3, std::time::Duration::from_secs(5)))
                .timeout(std::time::Duration::from_secs(120)),
        )?;
        Ok(fragment)
    }
}

/// The network module; absent when the operator brings their own CNI.
pub struct NetworkModule;

impl Module for NetworkModule {
    fn name(&self) -> &str {
        "network"
    }

    fn description(&self) -> &str {
        "deploy the CNI plugin"
    }

    fn is_required(&self, ctx: &ModuleContext) -> PlanResult<bool> {
        Ok(ctx.config().network.plugin != NetworkPlugin::None)
    }

    fn tasks(&self, ctx: &ModuleContext) -> PlanResult<Vec<Box<dyn Task>>> {
        Ok(vec![Box::new(ApplyCniTask {
            plugin: ctx.config().network.plugin,
        })])
    }
}
