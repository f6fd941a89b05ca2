use std::path::PathBuf;

use async_trait::async_trait;
use flate2::read::GzDecoder;

use kubexm_context::StepContext;
use kubexm_host::Host;

use crate::{Precheck, Step, StepError, StepMeta, StepOutput, StepResult};

/// Unpack a gzipped tar archive on the control node.
///
/// Extraction is idempotent: a non-empty destination tree satisfies the
/// precheck. The blocking unpack runs on the blocking thread pool.
#[derive(Debug, Clone)]
pub struct ExtractStep {
    name: String,
    archive: PathBuf,
    dest: PathBuf,
}

impl ExtractStep {
    /// Extract `archive` into `dest`.
    #[must_use]
    pub fn new(name: impl Into<String>, archive: PathBuf, dest: PathBuf) -> Self {
        Self {
            name: name.into(),
            archive,
            dest,
        }
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
}

#[async_trait]
impl Step for ExtractStep {
    fn meta(&self) -> StepMeta {
        StepMeta::new(&self.name, format!("extract {}", self.archive.display()))
    }

    async fn precheck(&self, _ctx: &StepContext, host: &Host) -> StepResult<Precheck> {
        self.check_control_node(host)?;

        let mut entries = match tokio::fs::read_dir(&self.dest).await {
            Ok(entries) => entries,
            Err(_) => return Ok(Precheck::Required),
        };
        match entries.next_entry().await {
            Ok(Some(_)) => Ok(Precheck::satisfied(format!(
                "{} already extracted",
                self.dest.display()
            ))),
            _ => Ok(Precheck::Required),
        }
    }

    async fn run(&self, ctx: &StepContext, host: &Host) -> StepResult<StepOutput> {
        self.check_control_node(host)?;
        if ctx.cancel().is_cancelled() {
            return Err(StepError::Cancelled);
        }

        let archive = self.archive.clone();
        let dest = self.dest.clone();
        let extract_err = |message: String| StepError::Extract {
            path: archive.display().to_string(),
            message,
        };

        tokio::task::spawn_blocking({
            let archive = archive.clone();
            let dest = dest.clone();
            move || -> Result<(), String> {
                std::fs::create_dir_all(&dest).map_err(|e| e.to_string())?;
                let file = std::fs::File::open(&archive).map_err(|e| e.to_string())?;
                let mut tar = tar::Archive::new(GzDecoder::new(file));
                tar.unpack(&dest).map_err(|e| e.to_string())
            }
        })
        .await
        .map_err(|e| extract_err(e.to_string()))?
        .map_err(extract_err)?;

        Ok(StepOutput::message(format!(
            "extracted {} to {}",
            self.archive.display(),
            self.dest.display()
        )))
    }

    async fn rollback(&self, _ctx: &StepContext, host: &Host) -> StepResult<()> {
        self.check_control_node(host)?;
        match tokio::fs::remove_dir_all(&self.dest).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StepError::io(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::sync::Arc;

    use flate2::Compression;
    use flate2::write::GzEncoder;

    use kubexm_context::{ContextBuilder, NodeScope};
    use kubexm_host::Inventory;
    use kubexm_runner::{MockRunner, SharedRunner};

    use super::*;

    fn context() -> StepContext {
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
        let runner: SharedRunner = Arc::new(MockRunner::new());
        ContextBuilder::new(config, inventory, runner)
            .build()
            .step_context(&NodeScope::new("mod", "task"))
    }

    fn write_archive(path: &std::path::Path) {
        let file = std::fs::File::create(path).expect("create archive");
        let encoder = GzEncoder::new(file, Compression::default());
        let mut tar = tar::Builder::new(encoder);
        let data = b"#!/bin/sh\n";
        let mut header = tar::Header::new_gnu();
        header.set_path("etcd-v3.5.13/etcd").expect("path");
        header.set_size(data.len() as u64);
        header.set_mode(0o755);
        header.set_cksum();
        tar.append(&header, &mut data.as_slice()).expect("append");
        tar.into_inner()
            .and_then(GzEncoder::finish)
            .and_then(|mut f| f.flush().map(|()| f))
            .expect("finish archive");
    }

    #[tokio::test]
    async fn extracts_then_precheck_skips() {
        let dir = tempfile::tempdir().expect("tempdir");
        let archive = dir.path().join("etcd.tar.gz");
        let dest = dir.path().join("_extracts/etcd");
        write_archive(&archive);

        let ctx = context();
        let step = ExtractStep::new("extract-etcd", archive, dest.clone());
        let control = Host::control_node();

        assert!(matches!(
            step.precheck(&ctx, &control).await.expect("precheck"),
            Precheck::Required
        ));

        step.run(&ctx, &control).await.expect("run");
        assert!(dest.join("etcd-v3.5.13/etcd").is_file());

        assert!(matches!(
            step.precheck(&ctx, &control).await.expect("precheck"),
            Precheck::Satisfied { .. }
        ));
    }
}
