use std::path::Path;

use async_trait::async_trait;
use tokio::process;

use kubexm_host::Host;

use crate::{Command, CommandRunner, ExecOutput, RunnerError, RunnerResult};

/// A runner that executes directly on the orchestrator machine.
///
/// Used for control-node steps (downloads, PKI generation, archive
/// extraction) and by tests. It refuses hosts other than the control
/// node so a mis-targeted step fails loudly instead of running a
/// cluster command locally.
#[derive(Debug, Default, Clone)]
pub struct LocalRunner;

impl LocalRunner {
    /// Create a local runner.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn check_host(host: &Host) -> RunnerResult<()> {
        if host.is_control_node() {
            Ok(())
        } else {
            Err(RunnerError::Connect {
                host: host.name().to_string(),
                message: "local runner only reaches the control node".to_string(),
            })
        }
    }
}

#[async_trait]
impl CommandRunner for LocalRunner {
    async fn exec(&self, host: &Host, command: &Command) -> RunnerResult<ExecOutput> {
        Self::check_host(host)?;

        tracing::debug!(host = host.name(), script = %command.script, "local exec");

        let output = process::Command::new("sh")
            .arg("-c")
            .arg(&command.script)
            .output()
            .await
            .map_err(|e| RunnerError::Io {
                message: e.to_string(),
            })?;

        Ok(ExecOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            status: output.status.code().unwrap_or(-1),
        })
    }

    async fn upload(&self, host: &Host, content: &[u8], remote_path: &str) -> RunnerResult<()> {
        Self::check_host(host)?;

        let path = Path::new(remote_path);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| RunnerError::Transfer {
                    host: host.name().to_string(),
                    message: e.to_string(),
                })?;
        }
        tokio::fs::write(path, content)
            .await
            .map_err(|e| RunnerError::Transfer {
                host: host.name().to_string(),
                message: e.to_string(),
            })
    }

    async fn fetch(&self, host: &Host, remote_path: &str) -> RunnerResult<Vec<u8>> {
        Self::check_host(host)?;

        tokio::fs::read(remote_path)
            .await
            .map_err(|e| RunnerError::Transfer {
                host: host.name().to_string(),
                message: e.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[tokio::test]
    async fn exec_captures_output_and_status() {
        let runner = LocalRunner::new();
        let control = Host::control_node();

        let ok = runner
            .exec(&control, &Command::new("echo hello"))
            .await
            .expect("exec");
        assert_eq!(ok.stdout.trim(), "hello");
        assert_eq!(ok.status, 0);

        let bad = runner
            .exec(&control, &Command::new("exit 3"))
            .await
            .expect("exec");
        assert_eq!(bad.status, 3);
    }

    #[tokio::test]
    async fn exec_checked_rejects_nonzero() {
        let runner = LocalRunner::new();
        let control = Host::control_node();

        let err = runner
            .exec_checked(&control, &Command::new("exit 3"))
            .await
            .expect_err("non-zero exit");
        assert!(err.is_command_failure());
    }

    #[tokio::test]
    async fn upload_and_fetch_round_trip() {
        let runner = LocalRunner::new();
        let control = Host::control_node();
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("sub/file.txt");
        let path_str = path.to_string_lossy().to_string();

        runner
            .upload(&control, b"payload", &path_str)
            .await
            .expect("upload");
        let read = runner.fetch(&control, &path_str).await.expect("fetch");
        assert_eq!(read, b"payload");
    }

    #[tokio::test]
    async fn refuses_cluster_hosts() {
        let runner = LocalRunner::new();
        let spec = kubexm_host::Host::from_spec(&kubexm_config::HostSpec {
            name: "node-1".to_string(),
            address: "10.0.0.1".to_string(),
            internal_address: None,
            arch: "amd64".to_string(),
            port: 22,
            user: "root".to_string(),
            roles: vec!["worker".to_string()],
        });
        let host = spec.expect("valid host");

        let err = runner
            .exec(&host, &Command::new("true"))
            .await
            .expect_err("must refuse");
        assert!(matches!(err, RunnerError::Connect { .. }));
    }
}
