use std::sync::Mutex;

use async_trait::async_trait;

use kubexm_host::Host;

use crate::{Command, CommandRunner, ExecOutput, RunnerError, RunnerResult};

/// One recorded runner invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    /// Host the call targeted.
    pub host: String,
    /// The shell fragment that was sent.
    pub script: String,
    /// Whether privilege escalation was requested.
    pub sudo: bool,
}

/// A scripted answer for [`MockRunner::exec`].
#[derive(Debug, Clone)]
pub struct ScriptedResponse {
    host: Option<String>,
    script_contains: String,
    result: RunnerResult<ExecOutput>,
}

/// A scripted runner for tests.
///
/// Answers `exec` calls from a list of substring-matched responses and
/// records every invocation for later assertions. Unmatched commands
/// succeed with empty output, so tests only script what they care
/// about.
#[derive(Debug, Default)]
pub struct MockRunner {
    responses: Mutex<Vec<ScriptedResponse>>,
    calls: Mutex<Vec<RecordedCall>>,
    uploads: Mutex<Vec<(String, String, Vec<u8>)>>,
}

impl MockRunner {
    /// Create a mock runner with no scripted responses.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Script a response for any host whose command contains the
    /// given fragment.
    pub fn respond(&self, script_contains: impl Into<String>, output: ExecOutput) {
        self.push(ScriptedResponse {
            host: None,
            script_contains: script_contains.into(),
            result: Ok(output),
        });
    }

    /// Script a response for one host whose command contains the
    /// given fragment.
    pub fn respond_on(
        &self,
        host: impl Into<String>,
        script_contains: impl Into<String>,
        output: ExecOutput,
    ) {
        self.push(ScriptedResponse {
            host: Some(host.into()),
            script_contains: script_contains.into(),
            result: Ok(output),
        });
    }

    /// Script a transport error for one host whose command contains
    /// the given fragment.
    pub fn fail_on(
        &self,
        host: impl Into<String>,
        script_contains: impl Into<String>,
        error: RunnerError,
    ) {
        self.push(ScriptedResponse {
            host: Some(host.into()),
            script_contains: script_contains.into(),
            result: Err(error),
        });
    }

    fn push(&self, response: ScriptedResponse) {
        self.responses
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(response);
    }

    /// All recorded `exec` invocations in order.
    #[must_use]
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    /// All recorded uploads as `(host, path, content)` in order.
    #[must_use]
    pub fn uploads(&self) -> Vec<(String, String, Vec<u8>)> {
        self.uploads
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl CommandRunner for MockRunner {
    async fn exec(&self, host: &Host, command: &Command) -> RunnerResult<ExecOutput> {
        self.calls
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(RecordedCall {
                host: host.name().to_string(),
                script: command.script.clone(),
                sudo: command.sudo,
            });

        let responses = self
            .responses
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        for response in responses.iter() {
            let host_matches = response
                .host
                .as_deref()
                .is_none_or(|name| name == host.name());
            if host_matches && command.script.contains(&response.script_contains) {
                return response.result.clone();
            }
        }
        Ok(ExecOutput::default())
    }

    async fn upload(&self, host: &Host, content: &[u8], remote_path: &str) -> RunnerResult<()> {
        self.uploads
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push((
                host.name().to_string(),
                remote_path.to_string(),
                content.to_vec(),
            ));
        Ok(())
    }

    async fn fetch(&self, host: &Host, remote_path: &str) -> RunnerResult<Vec<u8>> {
        let uploads = self
            .uploads
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        uploads
            .iter()
            .rev()
            .find(|(h, p, _)| h == host.name() && p == remote_path)
            .map(|(_, _, content)| content.clone())
            .ok_or_else(|| RunnerError::Transfer {
                host: host.name().to_string(),
                message: format!("nothing uploaded at {remote_path}"),
            })
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[tokio::test]
    async fn scripted_responses_match_by_substring_and_host() {
        let runner = MockRunner::new();
        runner.respond("uname", ExecOutput::stdout("Linux"));
        runner.respond_on(
            "localhost",
            "whoami",
            ExecOutput::stdout("root"),
        );

        let control = Host::control_node();
        let uname = runner
            .exec(&control, &Command::new("uname -r"))
            .await
            .expect("exec");
        assert_eq!(uname.stdout, "Linux");

        let whoami = runner
            .exec(&control, &Command::new("whoami"))
            .await
            .expect("exec");
        assert_eq!(whoami.stdout, "root");

        let other = runner
            .exec(&control, &Command::new("true"))
            .await
            .expect("exec");
        assert_eq!(other, ExecOutput::default());

        assert_eq!(runner.calls().len(), 3);
    }

    #[tokio::test]
    async fn upload_then_fetch() {
        let runner = MockRunner::new();
        let control = Host::control_node();

        runner
            .upload(&control, b"unit", "/etc/systemd/system/etcd.service")
            .await
            .expect("upload");
        let fetched = runner
            .fetch(&control, "/etc/systemd/system/etcd.service")
            .await
            .expect("fetch");
        assert_eq!(fetched, b"unit");
    }
}
