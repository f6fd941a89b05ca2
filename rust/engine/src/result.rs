use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::Serialize;

use kubexm_graph::NodeId;

/// Lifecycle state of a node or host execution.
///
/// `Pending` and `Running` are scheduler-internal; the result tree only
/// ever carries `Success`, `Failed`, or `Skipped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Pending,
    Running,
    Success,
    Failed,
    Skipped,
}

impl Status {
    /// Whether this is a terminal state.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Failed | Self::Skipped)
    }

    /// The `snake_case` string matching serialization.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one (node, host) execution. Written once, never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HostResult {
    /// Host name.
    pub host: String,
    /// Terminal status of this host-execution.
    pub status: Status,
    /// Human-readable summary; names the failed ancestor for
    /// dependency-skips.
    pub message: String,
    /// Captured standard output, if any.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub stdout: String,
    /// Captured standard error, if any.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub stderr: String,
    /// When this host-execution started (UTC).
    pub started_at: DateTime<Utc>,
    /// When this host-execution ended (UTC).
    pub finished_at: DateTime<Utc>,
    /// Whether the step's precheck reported the state already
    /// satisfied. Distinct from dependency-skips, which are node-level.
    #[serde(rename = "skipped")]
    pub skipped_by_precheck: bool,
}

impl HostResult {
    /// A successful host-execution.
    #[must_use]
    pub fn success(
        host: impl Into<String>,
        message: impl Into<String>,
        stdout: String,
        stderr: String,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            host: host.into(),
            status: Status::Success,
            message: message.into(),
            stdout,
            stderr,
            started_at,
            finished_at: Utc::now(),
            skipped_by_precheck: false,
        }
    }

    /// A failed host-execution.
    #[must_use]
    pub fn failed(
        host: impl Into<String>,
        message: impl Into<String>,
        stdout: String,
        stderr: String,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            host: host.into(),
            status: Status::Failed,
            message: message.into(),
            stdout,
            stderr,
            started_at,
            finished_at: Utc::now(),
            skipped_by_precheck: false,
        }
    }

    /// A host-execution skipped because its precheck reported the
    /// state already satisfied.
    #[must_use]
    pub fn skipped_by_precheck(
        host: impl Into<String>,
        reason: impl Into<String>,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            host: host.into(),
            status: Status::Skipped,
            message: reason.into(),
            stdout: String::new(),
            stderr: String::new(),
            started_at,
            finished_at: Utc::now(),
            skipped_by_precheck: true,
        }
    }

    /// A host entry for a node that never ran.
    #[must_use]
    pub fn never_ran(host: impl Into<String>, message: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            host: host.into(),
            status: Status::Skipped,
            message: message.into(),
            stdout: String::new(),
            stderr: String::new(),
            started_at: now,
            finished_at: now,
            skipped_by_precheck: false,
        }
    }
}

/// Outcome of one node: its host-executions and their aggregation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeResult {
    /// Node display name.
    pub node: String,
    /// Name of the step the node ran.
    pub step: String,
    /// Terminal status aggregated over hosts.
    pub status: Status,
    /// Human-readable summary.
    pub message: String,
    /// When the node started (UTC).
    pub started_at: DateTime<Utc>,
    /// When the node ended (UTC).
    pub finished_at: DateTime<Utc>,
    /// Per-host outcomes, in the node's host declaration order.
    pub hosts: IndexMap<String, HostResult>,
}

impl NodeResult {
    /// A node entry skipped because an ancestor failed or the run was
    /// cancelled. All hosts receive matching skip entries.
    #[must_use]
    pub fn skipped(
        node: impl Into<String>,
        step: impl Into<String>,
        message: impl Into<String>,
        host_names: impl IntoIterator<Item = String>,
    ) -> Self {
        let now = Utc::now();
        let message = message.into();
        let hosts = host_names
            .into_iter()
            .map(|host| {
                (
                    host.clone(),
                    HostResult::never_ran(host, message.clone()),
                )
            })
            .collect();
        Self {
            node: node.into(),
            step: step.into(),
            status: Status::Skipped,
            message,
            started_at: now,
            finished_at: now,
            hosts,
        }
    }
}

/// The result tree of one run; the only machine-readable surface.
///
/// Step and host references are excluded from serialization by
/// construction: the tree carries names only. Timestamps are UTC;
/// durations are derived by the reader.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GraphExecutionResult {
    /// Name of the executed graph.
    pub graph: String,
    /// Overall status: exactly `Success` or `Failed`.
    pub status: Status,
    /// When the run started (UTC).
    pub started_at: DateTime<Utc>,
    /// When the run ended (UTC).
    pub finished_at: DateTime<Utc>,
    /// Per-node outcomes.
    pub nodes: IndexMap<NodeId, NodeResult>,
    /// Top-level error, set only for planning failures, cancellation,
    /// and internal engine bugs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl GraphExecutionResult {
    /// A failed result with no node entries, for errors that abort the
    /// run before execution starts.
    #[must_use]
    pub fn planning_failure(graph: impl Into<String>, error: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            graph: graph.into(),
            status: Status::Failed,
            started_at: now,
            finished_at: now,
            nodes: IndexMap::new(),
            error: Some(error.into()),
        }
    }

    /// Whether the run succeeded overall.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == Status::Success
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn result_serializes_names_not_references() {
        let mut nodes = IndexMap::new();
        let started = Utc::now();
        let mut hosts = IndexMap::new();
        hosts.insert(
            "node-1".to_string(),
            HostResult::success("node-1", "ran install", String::new(), String::new(), started),
        );
        nodes.insert(
            NodeId::from("install"),
            NodeResult {
                node: "install".to_string(),
                step: "install-etcd".to_string(),
                status: Status::Success,
                message: "1 host succeeded".to_string(),
                started_at: started,
                finished_at: Utc::now(),
                hosts,
            },
        );
        let result = GraphExecutionResult {
            graph: "create-cluster".to_string(),
            status: Status::Success,
            started_at: started,
            finished_at: Utc::now(),
            nodes,
            error: None,
        };

        let json = serde_json::to_value(&result).expect("serialize");
        assert_eq!(json["status"], "success");
        assert_eq!(json["nodes"]["install"]["step"], "install-etcd");
        assert_eq!(json["nodes"]["install"]["hosts"]["node-1"]["skipped"], false);
        assert!(json.get("error").is_none());
    }

    #[test]
    fn precheck_skip_and_dependency_skip_are_distinguishable() {
        let precheck = HostResult::skipped_by_precheck("node-1", "already installed", Utc::now());
        assert!(precheck.skipped_by_precheck);
        assert_eq!(precheck.status, Status::Skipped);

        let dep = HostResult::never_ran("node-1", "dependency install failed");
        assert!(!dep.skipped_by_precheck);
        assert_eq!(dep.status, Status::Skipped);
    }
}
