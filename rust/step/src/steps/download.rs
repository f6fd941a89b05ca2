use std::path::PathBuf;

use async_trait::async_trait;
use url::Url;

use kubexm_context::StepContext;
use kubexm_host::Host;

use crate::{Precheck, Step, StepError, StepMeta, StepOutput, StepResult};

use super::hex_digest;

/// Fetch an artifact over HTTP onto the control node.
///
/// Downloads only target the control node; uploads move artifacts to
/// cluster hosts afterwards. In offline mode the step fails unless the
/// artifact is already present, and the precheck treats a present file
/// with a matching digest as satisfied so reruns are free.
#[derive(Debug, Clone)]
pub struct DownloadStep {
    name: String,
    url: Url,
    dest: PathBuf,
    sha256: Option<String>,
}

impl DownloadStep {
    /// Download `url` to `dest` on the control node.
    #[must_use]
    pub fn new(name: impl Into<String>, url: Url, dest: PathBuf) -> Self {
        Self {
            name: name.into(),
            url,
            dest,
            sha256: None,
        }
    }

    /// Expect the given hex SHA-256 digest.
    #[must_use]
    pub fn sha256(mut self, digest: impl Into<String>) -> Self {
        self.sha256 = Some(digest.into());
        self
    }

    fn check_control_node(&self, host: &Host) -> StepResult<()> {
        if host.is_control_node() {
            Ok(())
        } else {
            Err(StepError::ControlNodeOnly {
                step: self.name.clone(),
                host: host.name().to_string(),
            })
        }
    }

    async fn local_digest(&self) -> Option<String> {
        let bytes = tokio::fs::read(&self.dest).await.ok()?;
        Some(hex_digest(&bytes))
    }
}

#[async_trait]
impl Step for DownloadStep {
    fn meta(&self) -> StepMeta {
        StepMeta::new(&self.name, format!("download {}", self.url))
    }

    async fn precheck(&self, _ctx: &StepContext, host: &Host) -> StepResult<Precheck> {
        self.check_control_node(host)?;

        let Some(digest) = self.local_digest().await else {
            return Ok(Precheck::Required);
        };
        match &self.sha256 {
            Some(expected) if expected != &digest => Ok(Precheck::Required),
            _ => Ok(Precheck::satisfied(format!(
                "{} already downloaded",
                self.dest.display()
            ))),
        }
    }

    async fn run(&self, ctx: &StepContext, host: &Host) -> StepResult<StepOutput> {
        self.check_control_node(host)?;

        if ctx.is_offline() {
            return Err(StepError::Offline {
                url: self.url.to_string(),
            });
        }
        if ctx.cancel().is_cancelled() {
            return Err(StepError::Cancelled);
        }

        tracing::info!(url = %self.url, dest = %self.dest.display(), "downloading");

        let response = reqwest::get(self.url.as_str())
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| StepError::Download {
                url: self.url.to_string(),
                message: e.to_string(),
            })?;
        let bytes = response.bytes().await.map_err(|e| StepError::Download {
            url: self.url.to_string(),
            message: e.to_string(),
        })?;

        if let Some(expected) = &self.sha256 {
            let actual = hex_digest(&bytes);
            if expected != &actual {
                return Err(StepError::Checksum {
                    path: self.dest.display().to_string(),
                    expected: expected.clone(),
                    actual,
                });
            }
        }

        if let Some(parent) = self.dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(StepError::io)?;
        }
        tokio::fs::write(&self.dest, &bytes)
            .await
            .map_err(StepError::io)?;

        Ok(StepOutput::message(format!(
            "downloaded {} ({} bytes)",
            self.dest.display(),
            bytes.len()
        )))
    }

    async fn rollback(&self, _ctx: &StepContext, host: &Host) -> StepResult<()> {
        self.check_control_node(host)?;
        match tokio::fs::remove_file(&self.dest).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StepError::io(e)),
        }
    }
}
