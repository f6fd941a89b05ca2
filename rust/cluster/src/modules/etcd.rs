//! Managed etcd: PKI, binary installation, per-member configuration,
//! serial bootstrap, and a health gate.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;

use kubexm_config::{EtcdDeployment, defaults};
use kubexm_context::{ModuleContext, StepContext, TaskContext};
use kubexm_graph::{ExecutionFragment, ExecutionNode, NodeId, RetryPolicy};
use kubexm_host::{Arch, Host, Role};
use kubexm_plan::{Module, PlanError, PlanResult, Task, require_role};
use kubexm_resources::{BinaryArtifact, Component};
use kubexm_runner::Command;
use kubexm_step::steps::{CommandStep, FileSource, RenderStep, UploadStep};
use kubexm_step::{Step, StepError, StepMeta, StepOutput, StepResult};

use crate::pki;
use crate::templates;

/// The `name=peer-url` membership string every member's unit embeds.
fn initial_cluster(members: &[Arc<Host>], peer_port: u16) -> String {
    members
        .iter()
        .map(|h| format!("{}=https://{}:{peer_port}", h.name(), h.internal_address()))
        .collect::<Vec<_>>()
        .join(",")
}

/// Uploads a set of control-node files to one host directory.
///
/// Used for certificate distribution, where one logical action places
/// several related files.
#[derive(Debug)]
pub struct DistributeFilesStep {
    name: String,
    files: Vec<(PathBuf, String)>,
}

impl DistributeFilesStep {
    /// Upload each `(local, remote)` pair.
    #[must_use]
    pub fn new(name: impl Into<String>, files: Vec<(PathBuf, String)>) -> Self {
        Self {
            name: name.into(),
            files,
        }
    }
}

#[async_trait]
impl Step for DistributeFilesStep {
    fn meta(&self) -> StepMeta {
        StepMeta::new(&self.name, format!("distribute {} file(s)", self.files.len()))
    }

    async fn run(&self, ctx: &StepContext, host: &Host) -> StepResult<StepOutput> {
        let runner = ctx.runner();
        for (local, remote) in &self.files {
            if ctx.cancel().is_cancelled() {
                return Err(StepError::Cancelled);
            }
            let content = tokio::fs::read(local).await.map_err(|e| StepError::Io {
                message: format!("{}: {e}", local.display()),
            })?;
            runner.upload(host, &content, remote).await?;
        }
        Ok(StepOutput::message(format!(
            "distributed {} file(s)",
            self.files.len()
        )))
    }

    async fn rollback(&self, ctx: &StepContext, host: &Host) -> StepResult<()> {
        for (_, remote) in &self.files {
            ctx.runner()
                .exec(host, &Command::new(format!("rm -f {remote}")))
                .await?;
        }
        Ok(())
    }
}

/// Generate the etcd CA and per-member certificates on the control
/// node.
struct EtcdPkiTask;

impl Task for EtcdPkiTask {
    fn name(&self) -> &str {
        "pki"
    }

    fn description(&self) -> &str {
        "generate the etcd CA and member certificates"
    }

    fn plan(&self, ctx: &TaskContext) -> PlanResult<ExecutionFragment> {
        pki::etcd_pki_fragment(ctx, false)
    }
}

/// Download the etcd release per architecture and install the
/// binaries on every member.
struct InstallEtcdTask;

impl Task for InstallEtcdTask {
    fn name(&self) -> &str {
        "install"
    }

    fn description(&self) -> &str {
        "place etcd and etcdctl on every member"
    }

    fn plan(&self, ctx: &TaskContext) -> PlanResult<ExecutionFragment> {
        let members = ctx.inventory().with_role(Role::Etcd);
        let version = ctx.config().etcd.version.clone();
        let mut fragment = ExecutionFragment::new(self.name());

        let mut arches: Vec<Arch> = members.iter().map(|h| h.arch()).collect();
        arches.sort();
        arches.dedup();

        for arch in arches {
            let targets: Vec<Arc<Host>> = members
                .iter()
                .filter(|h| h.arch() == arch)
                .cloned()
                .collect();

            let artifact = BinaryArtifact::new(Component::Etcd, version.clone(), arch);
            let ensured = artifact.ensure_plan(ctx)?;
            let etcd_path = ensured.path.clone();
            let etcdctl_path = etcd_path.with_file_name("etcdctl");
            let exits = ensured.exits.clone();
            fragment.merge_fragment(ensured.fragment)?;

            for (binary, local) in [("etcd", etcd_path), ("etcdctl", etcdctl_path)] {
                let node_name = format!("install-{binary}-{arch}");
                let upload = UploadStep::new(
                    node_name.clone(),
                    FileSource::ControlNode(local),
                    format!("{}/{binary}", defaults::BIN_DIR),
                )
                .mode(0o755);
                let id = fragment.add_node(ExecutionNode::new(
                    node_name,
                    Arc::new(upload),
                    targets.clone(),
                ))?;
                fragment.link(&exits, &[id])?;
            }
        }

        Ok(fragment)
    }
}

/// Per member: place certificates and render the systemd unit.
struct ConfigureEtcdTask;

impl Task for ConfigureEtcdTask {
    fn name(&self) -> &str {
        "configure"
    }

    fn description(&self) -> &str {
        "distribute certificates and render the etcd unit"
    }

    fn plan(&self, ctx: &TaskContext) -> PlanResult<ExecutionFragment> {
        let members = ctx.inventory().with_role(Role::Etcd);
        let etcd = &ctx.config().etcd;
        let cluster = initial_cluster(&members, etcd.peer_port);
        let pki_dir = ctx.workspace().pki_dir("etcd");
        let mut fragment = ExecutionFragment::new(self.name());

        for member in &members {
            let name = member.name();

            let files = ["ca.pem".to_string()]
                .into_iter()
                .chain([
                    format!("{name}.pem"),
                    format!("{name}-key.pem"),
                    format!("peer-{name}.pem"),
                    format!("peer-{name}-key.pem"),
                ])
                .map(|file| {
                    (
                        pki_dir.join(&file),
                        format!("{}/{file}", defaults::ETCD_PKI_DIR),
                    )
                })
                .collect();
            let certs = fragment.add_node(ExecutionNode::new(
                format!("etcd-certs-{name}"),
                Arc::new(DistributeFilesStep::new(
                    format!("etcd-certs-{name}"),
                    files,
                )),
                vec![Arc::clone(member)],
            ))?;

            let unit = RenderStep::new(
                format!("etcd-unit-{name}"),
                templates::ETCD_UNIT,
                defaults::ETCD_SYSTEMD_UNIT,
            )
            .var("name", name)
            .var("address", member.internal_address())
            .var("data_dir", etcd.data_dir.as_str())
            .var("client_port", etcd.client_port.to_string())
            .var("peer_port", etcd.peer_port.to_string())
            .var("initial_cluster", cluster.as_str())
            .var("cluster_name", ctx.config().cluster_name.as_str())
            .mode(0o644);
            let unit_id = fragment.add_node(ExecutionNode::new(
                format!("etcd-unit-{name}"),
                Arc::new(unit),
                vec![Arc::clone(member)],
            ))?;
            fragment.add_dependency(&certs, &unit_id)?;
        }

        Ok(fragment)
    }
}

/// Start members one at a time; each join waits for the previous
/// member to be active.
struct BootstrapEtcdTask;

impl Task for BootstrapEtcdTask {
    fn name(&self) -> &str {
        "bootstrap"
    }

    fn description(&self) -> &str {
        "start etcd member by member"
    }

    fn plan(&self, ctx: &TaskContext) -> PlanResult<ExecutionFragment> {
        let members = ctx.inventory().with_role(Role::Etcd);
        let mut fragment = ExecutionFragment::new(self.name());

        let mut previous: Option<NodeId> = None;
        for member in &members {
            let name = member.name();
            let step = CommandStep::new(
                format!("start-etcd-{name}"),
                "systemctl daemon-reload && systemctl enable --now etcd",
            )
            .sudo()
            .check("systemctl is-active --quiet etcd")
            .rollback_with("systemctl disable --now etcd");

            let id = fragment.add_node(ExecutionNode::new(
                format!("start-etcd-{name}"),
                Arc::new(step),
                vec![Arc::clone(member)],
            ))?;
            if let Some(previous) = &previous {
                fragment.add_dependency(previous, &id)?;
            }
            previous = Some(id);
        }

        Ok(fragment)
    }
}

/// Cluster health gate, retried while the quorum settles.
struct EtcdHealthTask;

impl Task for EtcdHealthTask {
    fn name(&self) -> &str {
        "health"
    }

    fn description(&self) -> &str {
        "wait for a healthy etcd quorum"
    }

    fn plan(&self, ctx: &TaskContext) -> PlanResult<ExecutionFragment> {
        let first = ctx
            .inventory()
            .first_with_role(Role::Etcd)
            .map_err(PlanError::from)?;
        let etcd = &ctx.config().etcd;

        let endpoints = ctx
            .inventory()
            .with_role(Role::Etcd)
            .iter()
            .map(|h| format!("https://{}:{}", h.internal_address(), etcd.client_port))
            .collect::<Vec<_>>()
            .join(",");
        let script = format!(
            "ETCDCTL_API=3 etcdctl \
             --endpoints={endpoints} \
             --cacert={pki}/ca.pem \
             --cert={pki}/{name}.pem \
             --key={pki}/{name}-key.pem \
             endpoint health",
            pki = defaults::ETCD_PKI_DIR,
            name = first.name(),
        );

        let mut fragment = ExecutionFragment::new(self.name());
        fragment.add_node(
            ExecutionNode::new("etcd-health", Arc::new(CommandStep::new("etcd-health", script)), vec![first])
                .retry(RetryPolicy::new(5, std::time::Duration::from_secs(3)))
                .timeout(std::time::Duration::from_secs(60)),
        )?;
        Ok(fragment)
    }
}

/// The etcd module: only planned for managed deployments.
pub struct EtcdModule;

impl Module for EtcdModule {
    fn name(&self) -> &str {
        "etcd"
    }

    fn description(&self) -> &str {
        "deploy a managed etcd cluster"
    }

    fn is_required(&self, ctx: &ModuleContext) -> PlanResult<bool> {
        Ok(ctx.config().etcd.deployment == EtcdDeployment::Kubexm)
    }

    fn tasks(&self, ctx: &ModuleContext) -> PlanResult<Vec<Box<dyn Task>>> {
        require_role(ctx, Role::Etcd)?;
        Ok(vec![
            Box::new(EtcdPkiTask),
            Box::new(InstallEtcdTask),
            Box::new(ConfigureEtcdTask),
            Box::new(BootstrapEtcdTask),
            Box::new(EtcdHealthTask),
        ])
    }
}
