//! The resource-acquisition sub-engine: artifacts that must exist on
//! the control node before recipes can upload or install them.
//!
//! A [`BinaryArtifact`] is identified by (component, version, arch,
//! os). Its [`ensure_plan`](BinaryArtifact::ensure_plan) returns a
//! fragment (download, then extract for archives; checksum
//! verification rides on the download) that makes
//! [`path`](BinaryArtifact::path) valid once executed. A pipeline-cache
//! marker keyed by the artifact id makes repeat invocations in the
//! same run return a no-op fragment.

use std::path::PathBuf;
use std::sync::Arc;

use serde_json::json;
use url::Url;

use kubexm_context::{CacheScope, TaskContext, Workspace};
use kubexm_graph::{ExecutionFragment, ExecutionNode, NodeId};
use kubexm_host::Arch;
use kubexm_plan::{PlanError, PlanResult};
use kubexm_step::steps::{DownloadStep, ExtractStep};

/// A component whose release artifacts the control node can fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Component {
    Etcd,
    Kubeadm,
    Kubelet,
    Kubectl,
}

impl Component {
    /// Canonical lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Etcd => "etcd",
            Self::Kubeadm => "kubeadm",
            Self::Kubelet => "kubelet",
            Self::Kubectl => "kubectl",
        }
    }

    /// Whether releases ship as a tar.gz archive rather than a raw
    /// binary.
    #[must_use]
    pub const fn is_archive(self) -> bool {
        matches!(self, Self::Etcd)
    }
}

impl std::fmt::Display for Component {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The fragment an `ensure_plan` call produced, plus what later nodes
/// need from it: the exit ids to depend on and the final path.
#[derive(Debug, Clone)]
pub struct EnsuredResource {
    /// The download/extract sub-DAG; empty when a previous call in
    /// this run already planned the same artifact.
    pub fragment: ExecutionFragment,
    /// Exit node ids of the fragment; empty for the no-op case.
    pub exits: Vec<NodeId>,
    /// Where the artifact lives on the control node once the fragment
    /// has executed.
    pub path: PathBuf,
}

/// An artifact identified by (component, version, arch, os).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryArtifact {
    component: Component,
    version: String,
    arch: Arch,
    os: String,
    sha256: Option<String>,
}

impl BinaryArtifact {
    /// An artifact for the given component release on linux.
    #[must_use]
    pub fn new(component: Component, version: impl Into<String>, arch: Arch) -> Self {
        Self {
            component,
            version: version.into(),
            arch,
            os: "linux".to_string(),
            sha256: None,
        }
    }

    /// Expect the given hex SHA-256 digest of the downloaded file.
    #[must_use]
    pub fn sha256(mut self, digest: impl Into<String>) -> Self {
        self.sha256 = Some(digest.into());
        self
    }

    /// The component this artifact belongs to.
    #[must_use]
    pub fn component(&self) -> Component {
        self.component
    }

    /// Version with a leading `v`, however it was written.
    #[must_use]
    pub fn tagged_version(&self) -> String {
        if self.version.starts_with('v') {
            self.version.clone()
        } else {
            format!("v{}", self.version)
        }
    }

    /// Stable identity: `<component>-<version>-<os>-<arch>`.
    #[must_use]
    pub fn id(&self) -> String {
        format!(
            "{}-{}-{}-{}",
            self.component,
            self.tagged_version(),
            self.os,
            self.arch
        )
    }

    /// The release file name.
    #[must_use]
    pub fn file_name(&self) -> String {
        if self.component.is_archive() {
            format!("{}.tar.gz", self.id())
        } else {
            self.component.as_str().to_string()
        }
    }

    /// The upstream release URL.
    ///
    /// # Errors
    ///
    /// Returns [`PlanError::Config`] when the URL cannot be formed.
    pub fn download_url(&self) -> PlanResult<Url> {
        let version = self.tagged_version();
        let raw = match self.component {
            Component::Etcd => format!(
                "https://github.com/etcd-io/etcd/releases/download/{version}/etcd-{version}-{}-{}.tar.gz",
                self.os, self.arch
            ),
            Component::Kubeadm | Component::Kubelet | Component::Kubectl => format!(
                "https://dl.k8s.io/release/{version}/bin/{}/{}/{}",
                self.os, self.arch, self.component
            ),
        };
        Url::parse(&raw).map_err(|e| PlanError::Config {
            message: format!("bad download url {raw}: {e}"),
        })
    }

    /// Where the downloaded file lands.
    #[must_use]
    pub fn download_path(&self, workspace: &Workspace) -> PathBuf {
        workspace
            .component_dir(
                self.component.as_str(),
                &self.tagged_version(),
                &self.arch.to_string(),
            )
            .join(self.file_name())
    }

    /// Where the extracted tree lands (archives only).
    #[must_use]
    pub fn extract_dir(&self, workspace: &Workspace) -> PathBuf {
        workspace.extracts_dir().join(self.id())
    }

    /// The final location on the control node once the ensure
    /// fragment has executed: the binary inside the extracted tree for
    /// archives, the downloaded file itself otherwise.
    #[must_use]
    pub fn path(&self, workspace: &Workspace) -> PathBuf {
        match self.component {
            Component::Etcd => self
                .extract_dir(workspace)
                .join(format!(
                    "etcd-{}-{}-{}",
                    self.tagged_version(),
                    self.os,
                    self.arch
                ))
                .join("etcd"),
            _ => self.download_path(workspace),
        }
    }

    /// Plan the work making [`path`](Self::path) valid.
    ///
    /// The first call in a run produces a download node (and an
    /// extract node for archives); callers merge the fragment and
    /// depend on its exits. Later calls for the same id find the
    /// pipeline-cache marker and get a no-op fragment.
    ///
    /// # Errors
    ///
    /// Returns a [`PlanError`] when the URL cannot be formed or the
    /// fragment cannot be built.
    pub fn ensure_plan(&self, ctx: &TaskContext) -> PlanResult<EnsuredResource> {
        let workspace = ctx.workspace();
        let path = self.path(workspace);
        let marker_key = format!("resource.{}", self.id());

        if ctx.cache().get(&marker_key).is_some() {
            tracing::debug!(artifact = self.id(), "already planned in this run");
            return Ok(EnsuredResource {
                fragment: ExecutionFragment::new(format!("ensure-{}", self.id())),
                exits: Vec::new(),
                path,
            });
        }

        let control = ctx.inventory().control_node();
        let mut fragment = ExecutionFragment::new(format!("ensure-{}", self.id()));

        let mut download = DownloadStep::new(
            format!("download-{}", self.id()),
            self.download_url()?,
            self.download_path(workspace),
        );
        if let Some(digest) = &self.sha256 {
            download = download.sha256(digest.clone());
        }
        let download_id = fragment.add_node(ExecutionNode::new(
            format!("download-{}", self.id()),
            Arc::new(download),
            vec![Arc::clone(&control)],
        ))?;

        let mut exits = vec![download_id.clone()];
        if self.component.is_archive() {
            let extract_id = fragment.add_node(ExecutionNode::new(
                format!("extract-{}", self.id()),
                Arc::new(ExtractStep::new(
                    format!("extract-{}", self.id()),
                    self.download_path(workspace),
                    self.extract_dir(workspace),
                )),
                vec![control],
            ))?;
            fragment.add_dependency(&download_id, &extract_id)?;
            exits = vec![extract_id];
        }

        ctx.cache().set(
            CacheScope::Pipeline,
            marker_key,
            json!(path.to_string_lossy()),
        );

        Ok(EnsuredResource {
            fragment,
            exits,
            path,
        })
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use kubexm_context::ContextBuilder;
    use kubexm_host::Inventory;
    use kubexm_runner::{MockRunner, SharedRunner};

    use super::*;

    fn task_context() -> TaskContext {
        let config = Arc::new(
            kubexm_config::from_yaml(
                r"
clusterName: test
hosts:
  - name: cp-1
    address: 10.0.0.1
    roles: [master, etcd, worker]
",
            )
            .expect("valid spec"),
        );
        let inventory = Arc::new(Inventory::from_spec(&config).expect("valid inventory"));
        let runner: SharedRunner = Arc::new(MockRunner::new());
        ContextBuilder::new(config, inventory, runner)
            .build()
            .module_context("resources")
            .task_context("ensure")
    }

    fn etcd() -> BinaryArtifact {
        BinaryArtifact::new(Component::Etcd, "3.5.13", Arch::Amd64)
    }

    #[test]
    fn identity_and_urls_are_deterministic() {
        let artifact = etcd();
        assert_eq!(artifact.id(), "etcd-v3.5.13-linux-amd64");
        assert_eq!(
            artifact.download_url().expect("url").as_str(),
            "https://github.com/etcd-io/etcd/releases/download/v3.5.13/etcd-v3.5.13-linux-amd64.tar.gz"
        );

        let kubeadm = BinaryArtifact::new(Component::Kubeadm, "v1.29.2", Arch::Arm64);
        assert_eq!(
            kubeadm.download_url().expect("url").as_str(),
            "https://dl.k8s.io/release/v1.29.2/bin/linux/arm64/kubeadm"
        );
    }

    #[test]
    fn archive_plan_is_download_then_extract_on_the_control_node() {
        let ctx = task_context();
        let ensured = etcd().ensure_plan(&ctx).expect("plan");

        assert_eq!(ensured.fragment.len(), 2);
        let download = NodeId::from("download-etcd-v3.5.13-linux-amd64");
        let extract = NodeId::from("extract-etcd-v3.5.13-linux-amd64");
        assert!(ensured.fragment.has_node(&download));
        assert_eq!(
            ensured.fragment.get_node(&extract).expect("extract").deps(),
            &[download]
        );
        assert_eq!(ensured.exits, vec![extract]);

        for id in ensured.fragment.node_ids() {
            let node = ensured.fragment.get_node(&id).expect("node");
            assert!(node.hosts()[0].is_control_node());
        }

        assert!(ensured.path.ends_with("etcd-v3.5.13-linux-amd64/etcd"));
    }

    #[test]
    fn raw_binary_plan_is_a_single_download() {
        let ctx = task_context();
        let kubeadm = BinaryArtifact::new(Component::Kubeadm, "v1.29.2", Arch::Amd64);
        let ensured = kubeadm.ensure_plan(&ctx).expect("plan");

        assert_eq!(ensured.fragment.len(), 1);
        assert_eq!(ensured.exits.len(), 1);
        assert_eq!(ensured.path, kubeadm.download_path(ctx.workspace()));
    }

    #[test]
    fn repeat_invocations_return_a_noop_fragment() {
        let ctx = task_context();
        let first = etcd().ensure_plan(&ctx).expect("plan");
        assert!(!first.fragment.is_empty());

        let second = etcd().ensure_plan(&ctx).expect("plan");
        assert!(second.fragment.is_empty());
        assert!(second.exits.is_empty());
        assert_eq!(second.path, first.path);
    }
}
