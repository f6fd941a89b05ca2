use std::sync::Arc;

use async_trait::async_trait;

use kubexm_host::Host;

use crate::{Command, CommandRunner, ExecOutput, LocalRunner, RunnerError, RunnerResult};

/// Routes by target: the control node runs locally, cluster hosts go
/// to the plugged-in transport.
///
/// The SSH transport lives outside this workspace; until one is
/// plugged in, cluster-host calls fail with a clear connect error
/// instead of silently running locally.
#[derive(Debug)]
pub struct RouterRunner {
    local: LocalRunner,
    remote: Option<Arc<dyn CommandRunner>>,
}

impl RouterRunner {
    /// A router with a transport for cluster hosts.
    #[must_use]
    pub fn new(remote: Arc<dyn CommandRunner>) -> Self {
        Self {
            local: LocalRunner::new(),
            remote: Some(remote),
        }
    }

    /// A router that can only reach the control node.
    #[must_use]
    pub fn local_only() -> Self {
        Self {
            local: LocalRunner::new(),
            remote: None,
        }
    }

    fn remote(&self, host: &Host) -> RunnerResult<&Arc<dyn CommandRunner>> {
        self.remote.as_ref().ok_or_else(|| RunnerError::Connect {
            host: host.name().to_string(),
            message: "no transport configured for cluster hosts".to_string(),
        })
    }
}

#[async_trait]
impl CommandRunner for RouterRunner {
    async fn exec(&self, host: &Host, command: &Command) -> RunnerResult<ExecOutput> {
        if host.is_control_node() {
            self.local.exec(host, command).await
        } else {
            self.remote(host)?.exec(host, command).await
        }
    }

    async fn upload(&self, host: &Host, content: &[u8], remote_path: &str) -> RunnerResult<()> {
        if host.is_control_node() {
            self.local.upload(host, content, remote_path).await
        } else {
            self.remote(host)?.upload(host, content, remote_path).await
        }
    }

    async fn fetch(&self, host: &Host, remote_path: &str) -> RunnerResult<Vec<u8>> {
        if host.is_control_node() {
            self.local.fetch(host, remote_path).await
        } else {
            self.remote(host)?.fetch(host, remote_path).await
        }
    }
}
