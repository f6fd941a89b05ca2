use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use kubexm_context::NodeScope;
use kubexm_host::Host;
use kubexm_step::SharedStep;

/// An opaque node identifier, unique within one graph.
///
/// Typically derived from the node name, but a distinct type so
/// producers can rename nodes without touching identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    /// Build an id from a string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for NodeId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Per-node retry overrides. The engine loops; steps stay pure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RetryPolicy {
    /// How many times a failed `run` is re-invoked.
    pub count: u32,
    /// Fixed delay between attempts.
    pub delay: Duration,
}

impl RetryPolicy {
    /// Retry `count` times with a fixed `delay` between attempts.
    #[must_use]
    pub fn new(count: u32, delay: Duration) -> Self {
        Self { count, delay }
    }
}

/// How a node's host-executions may overlap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HostParallelism {
    /// All hosts in parallel (bounded only by the engine's host
    /// fan-out default).
    #[default]
    Parallel,
    /// One host at a time, in declaration order.
    Serial,
    /// At most this many hosts at a time.
    Bounded(usize),
}

impl HostParallelism {
    /// The concurrency limit for a node with `host_count` hosts under
    /// the engine-wide default `fanout`.
    #[must_use]
    pub fn limit(self, host_count: usize, fanout: usize) -> usize {
        let limit = match self {
            Self::Parallel => fanout.min(host_count),
            Self::Serial => 1,
            Self::Bounded(n) => n.min(host_count),
        };
        limit.max(1)
    }
}

/// One scheduling unit: a step fanned out over a host set.
///
/// The node references, never owns, its step and hosts. Dependencies
/// are ids local to the owning fragment or graph.
#[derive(Debug, Clone)]
pub struct ExecutionNode {
    name: String,
    step: SharedStep,
    hosts: Vec<Arc<Host>>,
    deps: Vec<NodeId>,
    scope: NodeScope,
    retry: RetryPolicy,
    timeout: Option<Duration>,
    host_parallelism: HostParallelism,
}

impl ExecutionNode {
    /// A node running `step` on `hosts`, named `name`.
    #[must_use]
    pub fn new(name: impl Into<String>, step: SharedStep, hosts: Vec<Arc<Host>>) -> Self {
        Self {
            name: name.into(),
            step,
            hosts,
            deps: Vec::new(),
            scope: NodeScope::new("", ""),
            retry: RetryPolicy::default(),
            timeout: None,
            host_parallelism: HostParallelism::default(),
        }
    }

    /// Set the (module, task) scope the node's caches resolve through.
    #[must_use]
    pub fn scope(mut self, scope: NodeScope) -> Self {
        self.scope = scope;
        self
    }

    /// Set the retry override.
    #[must_use]
    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Set the per-node timeout.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Run hosts one at a time.
    #[must_use]
    pub fn host_serial(mut self) -> Self {
        self.host_parallelism = HostParallelism::Serial;
        self
    }

    /// Bound concurrent hosts for this node.
    #[must_use]
    pub fn host_bound(mut self, limit: usize) -> Self {
        self.host_parallelism = HostParallelism::Bounded(limit);
        self
    }

    /// Display name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The owning step.
    #[must_use]
    pub fn step(&self) -> SharedStep {
        Arc::clone(&self.step)
    }

    /// Target hosts, in declaration order.
    #[must_use]
    pub fn hosts(&self) -> &[Arc<Host>] {
        &self.hosts
    }

    /// Dependency ids, in insertion order.
    #[must_use]
    pub fn deps(&self) -> &[NodeId] {
        &self.deps
    }

    /// The (module, task) scope.
    #[must_use]
    pub fn node_scope(&self) -> &NodeScope {
        &self.scope
    }

    /// Retry override.
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Per-node timeout, if declared.
    #[must_use]
    pub fn timeout_limit(&self) -> Option<Duration> {
        self.timeout
    }

    /// Host concurrency mode.
    #[must_use]
    pub fn host_parallelism(&self) -> HostParallelism {
        self.host_parallelism
    }

    /// Overwrite the (module, task) scope in place. Used by the
    /// planning layer to stamp every node of a task's fragment.
    pub fn set_scope(&mut self, scope: NodeScope) {
        self.scope = scope;
    }

    pub(crate) fn add_dep(&mut self, dep: NodeId) {
        if !self.deps.contains(&dep) {
            self.deps.push(dep);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_parallelism_limits() {
        assert_eq!(HostParallelism::Parallel.limit(5, 16), 5);
        assert_eq!(HostParallelism::Parallel.limit(5, 2), 2);
        assert_eq!(HostParallelism::Serial.limit(5, 16), 1);
        assert_eq!(HostParallelism::Bounded(3).limit(5, 16), 3);
        assert_eq!(HostParallelism::Bounded(0).limit(5, 16), 1);
        assert_eq!(HostParallelism::Parallel.limit(0, 16), 1);
    }

    #[test]
    fn node_ids_order_and_display() {
        let a = NodeId::from("a");
        let b = NodeId::new("b");
        assert!(a < b);
        assert_eq!(a.to_string(), "a");
    }
}
