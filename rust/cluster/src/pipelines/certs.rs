use std::sync::Arc;

use async_trait::async_trait;

use kubexm_config::{EtcdDeployment, defaults};
use kubexm_context::{ModuleContext, PipelineContext, TaskContext};
use kubexm_graph::{ExecutionFragment, ExecutionNode, NodeId};
use kubexm_host::Role;
use kubexm_plan::{Module, Pipeline, PlanResult, Task};
use kubexm_step::steps::CommandStep;

use crate::modules::DistributeFilesStep;
use crate::pki;

/// Regenerate the etcd PKI unconditionally.
struct RegenerateEtcdPkiTask;

impl Task for RegenerateEtcdPkiTask {
    fn name(&self) -> &str {
        "regenerate-pki"
    }

    fn description(&self) -> &str {
        "regenerate the etcd CA and member certificates"
    }

    fn plan(&self, ctx: &TaskContext) -> PlanResult<ExecutionFragment> {
        pki::etcd_pki_fragment(ctx, true)
    }
}

/// Push the fresh certificates out and restart members one at a time
/// so the quorum survives the roll.
struct RollEtcdCertsTask;

impl Task for RollEtcdCertsTask {
    fn name(&self) -> &str {
        "roll-etcd"
    }

    fn description(&self) -> &str {
        "redistribute certificates and restart members serially"
    }

    fn plan(&self, ctx: &TaskContext) -> PlanResult<ExecutionFragment> {
        let members = ctx.inventory().with_role(Role::Etcd);
        let pki_dir = ctx.workspace().pki_dir("etcd");
        let mut fragment = ExecutionFragment::new(self.name());

        let mut previous: Option<NodeId> = None;
        for member in &members {
            let name = member.name();

            let files = [
                "ca.pem".to_string(),
                format!("{name}.pem"),
                format!("{name}-key.pem"),
                format!("peer-{name}.pem"),
                format!("peer-{name}-key.pem"),
            ]
            .into_iter()
            .map(|file| {
                (
                    pki_dir.join(&file),
                    format!("{}/{file}", defaults::ETCD_PKI_DIR),
                )
            })
            .collect();
            let certs = fragment.add_node(ExecutionNode::new(
                format!("push-certs-{name}"),
                Arc::new(DistributeFilesStep::new(format!("push-certs-{name}"), files)),
                vec![Arc::clone(member)],
            ))?;

            let restart = fragment.add_node(ExecutionNode::new(
                format!("restart-etcd-{name}"),
                Arc::new(
                    CommandStep::new(format!("restart-etcd-{name}"), "systemctl restart etcd")
                        .sudo(),
                ),
                vec![Arc::clone(member)],
            ))?;
            fragment.add_dependency(&certs, &restart)?;

            // One member down at a time.
            if let Some(previous) = &previous {
                fragment.add_dependency(previous, &certs)?;
            }
            previous = Some(restart);
        }

        Ok(fragment)
    }
}

/// Renew the kubeadm-managed certificates on every master.
struct RenewKubeadmCertsTask;

impl Task for RenewKubeadmCertsTask {
    fn name(&self) -> &str {
        "renew-kubeadm"
    }

    fn description(&self) -> &str {
        "renew kubeadm certificates on the masters"
    }

    fn plan(&self, ctx: &TaskContext) -> PlanResult<ExecutionFragment> {
        let masters = ctx.inventory().with_role(Role::Master);
        let step = CommandStep::new(
            "kubeadm-certs-renew",
            "kubeadm certs renew all && systemctl restart kubelet",
        )
        .sudo();

        let mut fragment = ExecutionFragment::new(self.name());
        fragment.add_node(
            ExecutionNode::new("kubeadm-certs-renew", Arc::new(step), masters).host_serial(),
        )?;
        Ok(fragment)
    }
}

/// Certificate renewal for a running cluster.
struct RenewCertsModule;

impl Module for RenewCertsModule {
    fn name(&self) -> &str {
        "renew-certs"
    }

    fn description(&self) -> &str {
        "renew etcd and kubeadm certificates"
    }

    fn tasks(&self, ctx: &ModuleContext) -> PlanResult<Vec<Box<dyn Task>>> {
        let mut tasks: Vec<Box<dyn Task>> = Vec::new();
        if ctx.config().etcd.deployment == EtcdDeployment::Kubexm {
            tasks.push(Box::new(RegenerateEtcdPkiTask));
            tasks.push(Box::new(RollEtcdCertsTask));
        }
        tasks.push(Box::new(RenewKubeadmCertsTask));
        Ok(tasks)
    }
}

/// Renew every certificate the cluster depends on.
pub struct RenewCertsPipeline;

#[async_trait]
impl Pipeline for RenewCertsPipeline {
    fn name(&self) -> &str {
        "renew-certs"
    }

    fn description(&self) -> &str {
        "renew cluster certificates"
    }

    fn modules(&self, _ctx: &PipelineContext) -> PlanResult<Vec<Box<dyn Module>>> {
        Ok(vec![Box::new(RenewCertsModule)])
    }
}
