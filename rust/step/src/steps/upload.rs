use std::path::PathBuf;

use async_trait::async_trait;

use kubexm_context::StepContext;
use kubexm_host::Host;
use kubexm_runner::Command;

use crate::{Precheck, Step, StepError, StepMeta, StepOutput, StepResult};

use super::hex_digest;

/// Where an uploaded file's content comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileSource {
    /// Literal content baked in at plan time.
    Inline(Vec<u8>),
    /// A file on the control node, typically a downloaded artifact.
    ControlNode(PathBuf),
    /// A string stored under a cache key by an earlier step.
    CacheKey(String),
}

/// Put a file on the target host.
///
/// The precheck compares the remote digest against the content so an
/// unchanged file is skipped; a changed one is rewritten.
#[derive(Debug, Clone)]
pub struct UploadStep {
    name: String,
    source: FileSource,
    remote_path: String,
    mode: Option<u32>,
}

impl UploadStep {
    /// Upload from the given source to a remote path.
    #[must_use]
    pub fn new(name: impl Into<String>, source: FileSource, remote_path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source,
            remote_path: remote_path.into(),
            mode: None,
        }
    }

    /// Set the file mode after upload, e.g. `0o755`.
    #[must_use]
    pub fn mode(mut self, mode: u32) -> Self {
        self.mode = Some(mode);
        self
    }

    async fn content(&self, ctx: &StepContext) -> StepResult<Vec<u8>> {
        match &self.source {
            FileSource::Inline(bytes) => Ok(bytes.clone()),
            FileSource::ControlNode(path) => {
                tokio::fs::read(path).await.map_err(StepError::io)
            }
            FileSource::CacheKey(key) => ctx
                .cache()
                .get_string(key)
                .map(String::into_bytes)
                .ok_or_else(|| StepError::MissingCacheKey { key: key.clone() }),
        }
    }
}

#[async_trait]
impl Step for UploadStep {
    fn meta(&self) -> StepMeta {
        StepMeta::new(&self.name, format!("upload {}", self.remote_path))
    }

    async fn precheck(&self, ctx: &StepContext, host: &Host) -> StepResult<Precheck> {
        // Cache-sourced content is only known at run time of the
        // producing step, so compare digests only for static sources.
        if matches!(self.source, FileSource::CacheKey(_)) {
            return Ok(Precheck::Required);
        }
        let content = match self.content(ctx).await {
            Ok(content) => content,
            // A missing local artifact means an upstream node will
            // produce it; the upload must run.
            Err(StepError::Io { .. }) => return Ok(Precheck::Required),
            Err(other) => return Err(other),
        };

        let output = ctx
            .runner()
            .exec(
                host,
                &Command::new(format!("sha256sum {} 2>/dev/null", self.remote_path)),
            )
            .await?;
        if output.status != 0 {
            return Ok(Precheck::Required);
        }
        let remote_digest = output.stdout.split_whitespace().next().unwrap_or("");
        if remote_digest == hex_digest(&content) {
            Ok(Precheck::satisfied(format!(
                "{} already up to date",
                self.remote_path
            )))
        } else {
            Ok(Precheck::Required)
        }
    }

    async fn run(&self, ctx: &StepContext, host: &Host) -> StepResult<StepOutput> {
        if ctx.cancel().is_cancelled() {
            return Err(StepError::Cancelled);
        }

        let content = self.content(ctx).await?;
        ctx.runner()
            .upload(host, &content, &self.remote_path)
            .await?;

        if let Some(mode) = self.mode {
            ctx.runner()
                .exec_checked(
                    host,
                    &Command::new(format!("chmod {mode:o} {}", self.remote_path)),
                )
                .await?;
        }

        Ok(StepOutput::message(format!(
            "uploaded {} ({} bytes)",
            self.remote_path,
            content.len()
        )))
    }

    async fn rollback(&self, ctx: &StepContext, host: &Host) -> StepResult<()> {
        ctx.runner()
            .exec(host, &Command::new(format!("rm -f {}", self.remote_path)))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use pretty_assertions::assert_eq;

    use kubexm_context::{ContextBuilder, NodeScope};
    use kubexm_host::Inventory;
    use kubexm_runner::{ExecOutput, MockRunner, SharedRunner};

    use super::*;

    fn context(runner: Arc<MockRunner>) -> StepContext {
        let config = Arc::new(
            kubexm_config::from_yaml(
                r"
clusterName: test
hosts:
  - name: node-1
    address: 10.0.0.1
    roles: [master, etcd, worker]
",
            )
            .expect("valid spec"),
        );
        let inventory = Arc::new(Inventory::from_spec(&config).expect("valid inventory"));
        ContextBuilder::new(config, inventory, runner as SharedRunner)
            .build()
            .step_context(&NodeScope::new("mod", "task"))
    }

    #[tokio::test]
    async fn uploads_inline_content_and_sets_mode() {
        let runner = Arc::new(MockRunner::new());
        let ctx = context(Arc::clone(&runner));
        let host = Host::control_node();

        let step = UploadStep::new(
            "upload-unit",
            FileSource::Inline(b"[Unit]".to_vec()),
            "/etc/systemd/system/etcd.service",
        )
        .mode(0o644);
        step.run(&ctx, &host).await.expect("run");

        let uploads = runner.uploads();
        assert_eq!(uploads.len(), 1);
        assert_eq!(uploads[0].1, "/etc/systemd/system/etcd.service");
        assert!(
            runner
                .calls()
                .iter()
                .any(|c| c.script == "chmod 644 /etc/systemd/system/etcd.service")
        );
    }

    #[tokio::test]
    async fn precheck_skips_when_digest_matches() {
        let runner = Arc::new(MockRunner::new());
        let content = b"[Unit]".to_vec();
        runner.respond(
            "sha256sum",
            ExecOutput::stdout(format!("{}  /etc/x", hex_digest(&content))),
        );
        let ctx = context(Arc::clone(&runner));
        let host = Host::control_node();

        let step = UploadStep::new("upload", FileSource::Inline(content), "/etc/x");
        let precheck = step.precheck(&ctx, &host).await.expect("precheck");
        assert!(matches!(precheck, Precheck::Satisfied { .. }));
    }

    #[tokio::test]
    async fn missing_cache_key_is_an_error() {
        let runner = Arc::new(MockRunner::new());
        let ctx = context(Arc::clone(&runner));
        let host = Host::control_node();

        let step = UploadStep::new(
            "upload",
            FileSource::CacheKey("kubeadm.config".to_string()),
            "/etc/kubeadm.yaml",
        );
        let err = step.run(&ctx, &host).await.expect_err("missing key");
        assert_eq!(
            err,
            StepError::MissingCacheKey {
                key: "kubeadm.config".to_string()
            }
        );
    }
}
