//! The scheduler: dynamic topological execution of a validated graph
//! with bounded parallelism, dependency-skip propagation, and a result
//! tree for every run.
//!
//! The engine is the only component that creates concurrency. Nodes
//! whose dependencies are satisfied enter a work queue; a bounded pool
//! of node-workers drains it, each fanning out host-workers for its
//! node. Execution errors never propagate up-call: they are written
//! into the result tree and skip the failed node's descendants.

mod exec;
mod result;

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::Utc;
use futures::StreamExt;
use futures::stream::FuturesUnordered;
use indexmap::IndexMap;
use tokio::sync::Semaphore;

use kubexm_context::PipelineContext;
use kubexm_graph::{ExecutionGraph, NodeId};

pub use result::{GraphExecutionResult, HostResult, NodeResult, Status};

/// Concurrency bounds for one engine.
#[derive(Debug, Clone, Copy, Default)]
pub struct EngineOptions {
    /// Maximum concurrently executing nodes. Defaults to the inventory
    /// size, never below one.
    pub node_fanout: Option<usize>,
    /// Default bound on concurrent host-workers within one node.
    /// Defaults to all of the node's hosts in parallel; per-node
    /// overrides narrow it further.
    pub host_fanout: Option<usize>,
}

/// Executes validated graphs.
#[derive(Debug, Clone, Default)]
pub struct Engine {
    options: EngineOptions,
}

impl Engine {
    /// An engine with the given bounds.
    #[must_use]
    pub fn new(options: EngineOptions) -> Self {
        Self { options }
    }

    /// Execute a validated graph and return its result tree.
    ///
    /// Always drains to a terminal state and returns a result: nodes
    /// end `Success`, `Failed`, or `Skipped`, never `Pending`. In
    /// dry-run mode no step is called and every node is stamped
    /// successful.
    pub async fn execute(
        &self,
        ctx: &PipelineContext,
        graph: &ExecutionGraph,
    ) -> GraphExecutionResult {
        if ctx.is_dry_run() {
            return dry_run(graph);
        }

        let started_at = Utc::now();
        let node_fanout = self
            .options
            .node_fanout
            .unwrap_or_else(|| ctx.inventory().len())
            .max(1);
        let host_fanout = self.options.host_fanout.unwrap_or(usize::MAX).max(1);

        tracing::info!(graph = graph.name(), nodes = graph.len(), node_fanout, "run started");

        let children = graph.children();
        let mut remaining = graph.in_degrees();
        let mut statuses: IndexMap<NodeId, Status> = graph
            .nodes()
            .keys()
            .map(|id| (id.clone(), Status::Pending))
            .collect();
        let mut results: IndexMap<NodeId, NodeResult> = IndexMap::new();

        let cancel = ctx.cancel();
        let semaphore = Arc::new(Semaphore::new(node_fanout));
        let mut ready: VecDeque<NodeId> = remaining
            .iter()
            .filter(|(_, degree)| **degree == 0)
            .map(|(id, _)| id.clone())
            .collect();
        let mut running = FuturesUnordered::new();

        loop {
            // Launch everything that is ready. Cancellation stops
            // pending nodes from ever starting.
            while let Some(id) = ready.pop_front() {
                let Some(node) = graph.get(&id) else {
                    continue;
                };
                if cancel.is_cancelled() {
                    statuses.insert(id.clone(), Status::Skipped);
                    results.insert(
                        id.clone(),
                        NodeResult::skipped(
                            node.name(),
                            node.step().meta().name,
                            "run cancelled",
                            node.hosts().iter().map(|h| h.name().to_string()),
                        ),
                    );
                    continue;
                }

                statuses.insert(id.clone(), Status::Running);
                let semaphore = Arc::clone(&semaphore);
                running.push(async move {
                    let result = match semaphore.acquire_owned().await {
                        Ok(_permit) => exec::execute_node(ctx, node, host_fanout).await,
                        Err(_) => NodeResult::skipped(
                            node.name(),
                            node.step().meta().name,
                            "node worker pool closed",
                            node.hosts().iter().map(|h| h.name().to_string()),
                        ),
                    };
                    (id, result)
                });
            }

            let Some((id, node_result)) = running.next().await else {
                break;
            };
            statuses.insert(id.clone(), node_result.status);

            match node_result.status {
                Status::Success => {
                    for child in children.get(&id).into_iter().flatten() {
                        if statuses.get(child) != Some(&Status::Pending) {
                            continue;
                        }
                        if let Some(degree) = remaining.get_mut(child) {
                            *degree = degree.saturating_sub(1);
                            if *degree == 0 {
                                ready.push_back(child.clone());
                            }
                        }
                    }
                }
                _ => {
                    // A failed node never releases its children:
                    // everything reachable becomes a dependency-skip
                    // naming this node, the moment the ancestor fails.
                    mark_descendants_skipped(graph, &children, &id, &mut statuses, &mut results);
                }
            }
            results.insert(id, node_result);
        }

        // Nodes still pending at drain can only be cancellation
        // leftovers: their ancestors neither succeeded nor failed.
        for (id, status) in &mut statuses {
            if *status != Status::Pending {
                continue;
            }
            *status = Status::Skipped;
            if let Some(node) = graph.get(id) {
                results.insert(
                    id.clone(),
                    NodeResult::skipped(
                        node.name(),
                        node.step().meta().name,
                        "run cancelled",
                        node.hosts().iter().map(|h| h.name().to_string()),
                    ),
                );
            }
        }

        // Report nodes in graph order, not completion order.
        let mut ordered = IndexMap::with_capacity(results.len());
        for id in graph.nodes().keys() {
            if let Some(result) = results.shift_remove(id) {
                ordered.insert(id.clone(), result);
            }
        }

        let status = if ordered.values().all(|r| r.status == Status::Success) {
            Status::Success
        } else {
            Status::Failed
        };
        let error = cancel.is_cancelled().then(|| "run cancelled".to_string());

        tracing::info!(graph = graph.name(), %status, "run finished");

        GraphExecutionResult {
            graph: graph.name().to_string(),
            status,
            started_at,
            finished_at: Utc::now(),
            nodes: ordered,
            error,
        }
    }
}

/// Mark every not-yet-started descendant of `failed` as skipped,
/// with a message naming the failed ancestor. Running descendants are
/// left to finish on their own.
fn mark_descendants_skipped(
    graph: &ExecutionGraph,
    children: &IndexMap<NodeId, Vec<NodeId>>,
    failed: &NodeId,
    statuses: &mut IndexMap<NodeId, Status>,
    results: &mut IndexMap<NodeId, NodeResult>,
) {
    let message = format!("skipped: dependency {failed} failed");
    let mut queue: VecDeque<&NodeId> = children.get(failed).into_iter().flatten().collect();

    while let Some(id) = queue.pop_front() {
        if statuses.get(id) != Some(&Status::Pending) {
            continue;
        }
        statuses.insert(id.clone(), Status::Skipped);
        if let Some(node) = graph.get(id) {
            tracing::debug!(node = node.name(), ancestor = %failed, "dependency-skip");
            results.insert(
                id.clone(),
                NodeResult::skipped(
                    node.name(),
                    node.step().meta().name,
                    message.clone(),
                    node.hosts().iter().map(|h| h.name().to_string()),
                ),
            );
        }
        queue.extend(children.get(id).into_iter().flatten());
    }
}

/// Walk the graph in topological order without calling any step,
/// stamping every node and host successful with a dry-run message.
fn dry_run(graph: &ExecutionGraph) -> GraphExecutionResult {
    let started_at = Utc::now();

    let order = match graph.topo_sort() {
        Ok(order) => order,
        // A sealed graph cannot fail the sort; guard anyway so the
        // engine never panics on a hand-built graph.
        Err(e) => return GraphExecutionResult::planning_failure(graph.name(), e.to_string()),
    };

    let mut nodes = IndexMap::with_capacity(order.len());
    for id in order {
        let Some(node) = graph.get(&id) else { continue };
        let now = Utc::now();
        let hosts: IndexMap<String, HostResult> = node
            .hosts()
            .iter()
            .map(|host| {
                (
                    host.name().to_string(),
                    HostResult {
                        host: host.name().to_string(),
                        status: Status::Success,
                        message: "dry-run".to_string(),
                        stdout: String::new(),
                        stderr: String::new(),
                        started_at: now,
                        finished_at: now,
                        skipped_by_precheck: false,
                    },
                )
            })
            .collect();
        nodes.insert(
            id,
            NodeResult {
                node: node.name().to_string(),
                step: node.step().meta().name,
                status: Status::Success,
                message: "dry-run".to_string(),
                started_at: now,
                finished_at: now,
                hosts,
            },
        );
    }

    GraphExecutionResult {
        graph: graph.name().to_string(),
        status: Status::Success,
        started_at,
        finished_at: Utc::now(),
        nodes,
        error: None,
    }
}
