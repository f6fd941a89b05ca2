//! Teardown: reset kubernetes on every node, stop managed etcd, and
//! remove what the other modules placed.

use std::sync::Arc;

use kubexm_config::{EtcdDeployment, defaults};
use kubexm_context::{ModuleContext, TaskContext};
use kubexm_graph::{ExecutionFragment, ExecutionNode};
use kubexm_host::Role;
use kubexm_plan::{Module, PlanResult, Task};
use kubexm_step::steps::CommandStep;

struct ResetKubernetesTask;

impl Task for ResetKubernetesTask {
    fn name(&self) -> &str {
        "reset-kubernetes"
    }

    fn description(&self) -> &str {
        "kubeadm reset on every node"
    }

    fn plan(&self, ctx: &TaskContext) -> PlanResult<ExecutionFragment> {
        let mut hosts = ctx.inventory().with_role(Role::Master);
        for worker in ctx.inventory().with_role(Role::Worker) {
            if !hosts.iter().any(|h| h.name() == worker.name()) {
                hosts.push(worker);
            }
        }

        let step = CommandStep::new(
            "kubeadm-reset",
            "kubeadm reset -f || true; rm -rf /etc/kubernetes /var/lib/kubelet",
        )
        .sudo()
        .check("test ! -d /etc/kubernetes");

        let mut fragment = ExecutionFragment::new(self.name());
        fragment.add_node(ExecutionNode::new("kubeadm-reset", Arc::new(step), hosts))?;
        Ok(fragment)
    }
}

struct StopEtcdTask {
    managed: bool,
}

impl Task for StopEtcdTask {
    fn name(&self) -> &str {
        "stop-etcd"
    }

    fn description(&self) -> &str {
        "stop etcd and remove its data"
    }

    fn is_required(&self, _ctx: &TaskContext) -> PlanResult<bool> {
        Ok(self.managed)
    }

    fn plan(&self, ctx: &TaskContext) -> PlanResult<ExecutionFragment> {
        let members = ctx.inventory().with_role(Role::Etcd);
        let data_dir = ctx.config().etcd.data_dir.clone();

        let step = CommandStep::new(
            "stop-etcd",
            format!(
                "systemctl disable --now etcd || true; \
                 rm -rf {data_dir} {} {}",
                defaults::ETCD_PKI_DIR,
                defaults::ETCD_SYSTEMD_UNIT,
            ),
        )
        .sudo();

        let mut fragment = ExecutionFragment::new(self.name());
        if !members.is_empty() {
            fragment.add_node(ExecutionNode::new("stop-etcd", Arc::new(step), members))?;
        }
        Ok(fragment)
    }
}

struct RemoveBinariesTask;

impl Task for RemoveBinariesTask {
    fn name(&self) -> &str {
        "remove-binaries"
    }

    fn description(&self) -> &str {
        "remove installed binaries"
    }

    fn plan(&self, ctx: &TaskContext) -> PlanResult<ExecutionFragment> {
        let step = CommandStep::new(
            "remove-binaries",
            format!(
                "rm -f {bin}/etcd {bin}/etcdctl {bin}/kubeadm {bin}/kubelet {bin}/kubectl",
                bin = defaults::BIN_DIR
            ),
        )
        .sudo();

        let mut fragment = ExecutionFragment::new(self.name());
        fragment.add_node(ExecutionNode::new(
            "remove-binaries",
            Arc::new(step),
            ctx.inventory().all(),
        ))?;
        Ok(fragment)
    }
}

/// The teardown module, used by the delete pipeline.
pub struct TeardownModule;

impl Module for TeardownModule {
    fn name(&self) -> &str {
        "teardown"
    }

    fn description(&self) -> &str {
        "remove the cluster from its hosts"
    }

    fn tasks(&self, ctx: &ModuleContext) -> PlanResult<Vec<Box<dyn Task>>> {
        Ok(vec![
            Box::new(ResetKubernetesTask),
            Box::new(StopEtcdTask {
                managed: ctx.config().etcd.deployment == EtcdDeployment::Kubexm,
            }),
            Box::new(RemoveBinariesTask),
        ])
    }
}
