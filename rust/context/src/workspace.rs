use std::path::{Path, PathBuf};

use kubexm_config::defaults;

use crate::{ContextError, ContextResult};

/// The deterministic work-directory layout on the control node.
///
/// ```text
/// <base>/.kubexm/<cluster>/
///   pki/<component>/
///   <component>/<version>/<arch>/
///   _extracts/
///   <hostname>/
///   logs/
/// ```
///
/// Paths are deterministic so reruns find prior artifacts, and per-host
/// scratch is partitioned so parallel writers cannot collide.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    /// Create the layout for a cluster under a base directory
    /// (typically the current directory).
    #[must_use]
    pub fn new(base: impl AsRef<Path>, cluster_name: &str) -> Self {
        Self {
            root: base
                .as_ref()
                .join(defaults::WORK_DIR_NAME)
                .join(cluster_name),
        }
    }

    /// The cluster's work-directory root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// PKI output directory for a component, e.g. `pki/etcd/`.
    #[must_use]
    pub fn pki_dir(&self, component: &str) -> PathBuf {
        self.root.join("pki").join(component)
    }

    /// Download directory for a component artifact, e.g.
    /// `etcd/v3.5.13/amd64/`.
    #[must_use]
    pub fn component_dir(&self, component: &str, version: &str, arch: &str) -> PathBuf {
        self.root.join(component).join(version).join(arch)
    }

    /// Directory extracted archive trees land in.
    #[must_use]
    pub fn extracts_dir(&self) -> PathBuf {
        self.root.join("_extracts")
    }

    /// Per-host scratch directory.
    #[must_use]
    pub fn host_dir(&self, hostname: &str) -> PathBuf {
        self.root.join(hostname)
    }

    /// Log directory for the run.
    #[must_use]
    pub fn logs_dir(&self) -> PathBuf {
        self.root.join("logs")
    }

    /// Create the fixed directories of the layout.
    ///
    /// # Errors
    ///
    /// Returns [`ContextError::Io`] when a directory cannot be created.
    pub fn ensure_created(&self) -> ContextResult<()> {
        for dir in [
            self.root.clone(),
            self.extracts_dir(),
            self.logs_dir(),
        ] {
            std::fs::create_dir_all(&dir).map_err(|e| ContextError::Io {
                message: format!("{}: {e}", dir.display()),
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn layout_is_deterministic() {
        let ws = Workspace::new("/work", "prod");
        assert_eq!(ws.root(), Path::new("/work/.kubexm/prod"));
        assert_eq!(ws.pki_dir("etcd"), PathBuf::from("/work/.kubexm/prod/pki/etcd"));
        assert_eq!(
            ws.component_dir("etcd", "v3.5.13", "amd64"),
            PathBuf::from("/work/.kubexm/prod/etcd/v3.5.13/amd64")
        );
        assert_eq!(ws.host_dir("cp-1"), PathBuf::from("/work/.kubexm/prod/cp-1"));
    }

    #[test]
    fn ensure_created_builds_the_fixed_directories() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ws = Workspace::new(dir.path(), "test");
        ws.ensure_created().expect("create");
        assert!(ws.extracts_dir().is_dir());
        assert!(ws.logs_dir().is_dir());
    }
}
