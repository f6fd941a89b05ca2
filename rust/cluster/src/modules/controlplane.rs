//! Control plane: kubernetes binaries everywhere, `kubeadm init` on
//! the first master, joins for the remaining masters, and publication
//! of the join artifacts through the pipeline cache.

use std::sync::Arc;

use kubexm_config::defaults;
use kubexm_context::{CacheScope, ModuleContext, TaskContext};
use kubexm_graph::{ExecutionFragment, ExecutionNode};
use kubexm_host::{Arch, Host, Role};
use kubexm_plan::{Module, PlanError, PlanResult, Task, require_role};
use kubexm_resources::{BinaryArtifact, Component};
use kubexm_step::steps::{CommandStep, FileSource, RenderStep, UploadStep};

use crate::keys;
use crate::templates;

/// The kubeadm configuration path placed on masters.
const KUBEADM_CONFIG_PATH: &str = "/etc/kubernetes/kubeadm-config.yaml";
const JOIN_CONFIG_PATH: &str = "/etc/kubernetes/kubeadm-join.yaml";

/// Hosts needing kubernetes binaries: masters and workers.
fn kubernetes_hosts(ctx: &TaskContext) -> Vec<Arc<Host>> {
    let mut hosts = ctx.inventory().with_role(Role::Master);
    for worker in ctx.inventory().with_role(Role::Worker) {
        if !hosts.iter().any(|h| h.name() == worker.name()) {
            hosts.push(worker);
        }
    }
    hosts
}

/// Download kubeadm, kubelet, and kubectl per architecture and place
/// them on every node.
struct InstallKubeBinariesTask;

impl Task for InstallKubeBinariesTask {
    fn name(&self) -> &str {
        "install-binaries"
    }

    fn description(&self) -> &str {
        "place kubeadm, kubelet, and kubectl on every node"
    }

    fn plan(&self, ctx: &TaskContext) -> PlanResult<ExecutionFragment> {
        let hosts = kubernetes_hosts(ctx);
        let version = ctx.config().kubernetes.version.clone();
        let mut fragment = ExecutionFragment::new(self.name());

        let mut arches: Vec<Arch> = hosts.iter().map(|h| h.arch()).collect();
        arches.sort();
        arches.dedup();

        for arch in arches {
            let targets: Vec<Arc<Host>> =
                hosts.iter().filter(|h| h.arch() == arch).cloned().collect();

            for component in [Component::Kubeadm, Component::Kubelet, Component::Kubectl] {
                let artifact = BinaryArtifact::new(component, version.clone(), arch);
                let ensured = artifact.ensure_plan(ctx)?;
                let path = ensured.path.clone();
                let exits = ensured.exits.clone();
                fragment.merge_fragment(ensured.fragment)?;

                let node_name = format!("install-{component}-{arch}");
                let upload = UploadStep::new(
                    node_name.clone(),
                    FileSource::ControlNode(path),
                    format!("{}/{component}", defaults::BIN_DIR),
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

/// `kubeadm init` on the first master, then mint and publish the join
/// artifacts (token, discovery hash, certificate key).
struct InitFirstMasterTask;

impl InitFirstMasterTask {
    fn cert_sans(ctx: &TaskContext) -> String {
        let config = ctx.config();
        let mut sans: Vec<String> = vec![config.control_plane_endpoint.domain.clone()];
        sans.extend(config.kubernetes.apiserver_cert_extra_sans.iter().cloned());
        sans.iter()
            .map(|san| format!("    - {san}"))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl Task for InitFirstMasterTask {
    fn name(&self) -> &str {
        "init-master"
    }

    fn description(&self) -> &str {
        "initialize the first control-plane node"
    }

    fn plan(&self, ctx: &TaskContext) -> PlanResult<ExecutionFragment> {
        let first = ctx
            .inventory()
            .first_with_role(Role::Master)
            .map_err(PlanError::from)?;
        let config = ctx.config();
        let endpoint = format!(
            "{}:{}",
            config.control_plane_endpoint.domain, config.control_plane_endpoint.port
        );
        let mut fragment = ExecutionFragment::new(self.name());

        let render = RenderStep::new("render-kubeadm-config", templates::KUBEADM_INIT_CONFIG, KUBEADM_CONFIG_PATH)
            .var("cluster_name", config.cluster_name.as_str())
            .var("kubernetes_version", config.kubernetes.version.as_str())
            .var("endpoint", endpoint.as_str())
            .var("pod_cidr", config.network.pod_cidr.as_str())
            .var("service_cidr", config.network.service_cidr.as_str())
            .var("cri_socket", config.kubernetes.cri_socket.path())
            .var("cert_sans", Self::cert_sans(ctx))
            .mode(0o600);
        let render_id = fragment.add_node(ExecutionNode::new(
            "render-kubeadm-config",
            Arc::new(render),
            vec![Arc::clone(&first)],
        ))?;

        let init = CommandStep::new(
            "kubeadm-init",
            format!("kubeadm init --config {KUBEADM_CONFIG_PATH} --upload-certs"),
        )
        .sudo()
        .check("test -f /etc/kubernetes/admin.conf")
        .rollback_with("kubeadm reset -f");
        let init_id = fragment.add_node(
            ExecutionNode::new("kubeadm-init", Arc::new(init), vec![Arc::clone(&first)])
                .timeout(std::time::Duration::from_secs(600)),
        )?;
        fragment.add_dependency(&render_id, &init_id)?;

        // Join artifacts live in the pipeline cache; later tasks and
        // modules consume them by key only.
        let publishers: [(&str, String, &str); 3] = [
            (
                "publish-token",
                "kubeadm token create".to_string(),
                keys::KUBEADM_TOKEN,
            ),
            (
                "publish-discovery-hash",
                "openssl x509 -pubkey -in /etc/kubernetes/pki/ca.crt \
                 | openssl rsa -pubin -outform der 2>/dev/null \
                 | openssl dgst -sha256 -hex \
                 | sed 's/^.* //'"
                    .to_string(),
                keys::KUBEADM_DISCOVERY_HASH,
            ),
            (
                "publish-certificate-key",
                "kubeadm init phase upload-certs --upload-certs | tail -1".to_string(),
                keys::KUBEADM_CERTIFICATE_KEY,
            ),
        ];

        let mut previous = init_id;
        for (name, script, key) in publishers {
            let step = CommandStep::new(name, script)
                .sudo()
                .publish(CacheScope::Pipeline, key);
            let id = fragment.add_node(ExecutionNode::new(
                name,
                Arc::new(step),
                vec![Arc::clone(&first)],
            ))?;
            fragment.add_dependency(&previous, &id)?;
            previous = id;
        }

        Ok(fragment)
    }
}

/// Join every further master using the cached join artifacts.
struct JoinMastersTask;

impl Task for JoinMastersTask {
    fn name(&self) -> &str {
        "join-masters"
    }

    fn description(&self) -> &str {
        "join the remaining control-plane nodes"
    }

    fn is_required(&self, ctx: &TaskContext) -> PlanResult<bool> {
        Ok(ctx.inventory().with_role(Role::Master).len() > 1)
    }

    fn plan(&self, ctx: &TaskContext) -> PlanResult<ExecutionFragment> {
        let masters = ctx.inventory().with_role(Role::Master);
        let config = ctx.config();
        let endpoint = format!(
            "{}:{}",
            config.control_plane_endpoint.domain, config.control_plane_endpoint.port
        );
        let mut fragment = ExecutionFragment::new(self.name());

        for master in masters.iter().skip(1) {
            let name = master.name();

            let render = RenderStep::new(
                format!("render-join-config-{name}"),
                templates::KUBEADM_JOIN_MASTER_CONFIG,
                JOIN_CONFIG_PATH,
            )
            .var("endpoint", endpoint.as_str())
            .var("cri_socket", config.kubernetes.cri_socket.path())
            .cache_var(keys::KUBEADM_TOKEN)
            .cache_var(keys::KUBEADM_DISCOVERY_HASH)
            .cache_var(keys::KUBEADM_CERTIFICATE_KEY)
            .mode(0o600);
            let render_id = fragment.add_node(ExecutionNode::new(
                format!("render-join-config-{name}"),
                Arc::new(render),
                vec![Arc::clone(master)],
            ))?;

            let join = CommandStep::new(
                format!("kubeadm-join-{name}"),
                format!("kubeadm join --config {JOIN_CONFIG_PATH}"),
            )
            .sudo()
            .check("test -f /etc/kubernetes/admin.conf")
            .rollback_with("kubeadm reset -f");
            let join_id = fragment.add_node(
                ExecutionNode::new(
                    format!("kubeadm-join-{name}"),
                    Arc::new(join),
                    vec![Arc::clone(master)],
                )
                .timeout(std::time::Duration::from_secs(600)),
            )?;
            fragment.add_dependency(&render_id, &join_id)?;
        }

        Ok(fragment)
    }
}

/// The control-plane module.
pub struct ControlPlaneModule;

impl Module for ControlPlaneModule {
    fn name(&self) -> &str {
        "control-plane"
    }

    fn description(&self) -> &str {
        "initialize and join the control plane"
    }

    fn tasks(&self, ctx: &ModuleContext) -> PlanResult<Vec<Box<dyn Task>>> {
        require_role(ctx, Role::Master)?;
        Ok(vec![
            Box::new(InstallKubeBinariesTask),
            Box::new(InitFirstMasterTask),
            Box::new(JoinMastersTask),
        ])
    }
}
