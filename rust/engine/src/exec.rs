//! Node- and host-level execution: the precheck/run/rollback protocol,
//! retries, timeouts, and host fan-out for one node.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::StreamExt;
use futures::stream::FuturesUnordered;
use indexmap::IndexMap;
use tokio::sync::Semaphore;

use kubexm_context::PipelineContext;
use kubexm_graph::ExecutionNode;
use kubexm_host::Host;
use kubexm_step::{Precheck, SharedStep, StepError};

use crate::result::{HostResult, NodeResult, Status};

/// Execute one node: fan out its hosts, run the per-host protocol, and
/// aggregate.
///
/// Host concurrency is the node's own mode bounded by the engine-wide
/// default; host-serial nodes run their hosts in declaration order.
pub(crate) async fn execute_node(
    ctx: &PipelineContext,
    node: &ExecutionNode,
    host_fanout: usize,
) -> NodeResult {
    let started_at = Utc::now();
    let step = node.step();
    let meta = step.meta();
    let limit = node.host_parallelism().limit(node.hosts().len(), host_fanout);

    tracing::debug!(node = node.name(), hosts = node.hosts().len(), limit, "node started");

    let mut by_host: IndexMap<String, HostResult> = IndexMap::new();
    if limit <= 1 {
        // Declaration order is part of the host-serial contract, so
        // run the loop directly instead of racing for permits.
        for host in node.hosts() {
            let result = execute_host(ctx, node, &step, host).await;
            by_host.insert(host.name().to_string(), result);
        }
    } else {
        let semaphore = Arc::new(Semaphore::new(limit));
        let mut workers: FuturesUnordered<_> = node
            .hosts()
            .iter()
            .map(|host| {
                let semaphore = Arc::clone(&semaphore);
                let host = Arc::clone(host);
                let step = Arc::clone(&step);
                async move {
                    // The semaphore is never closed; a denied permit
                    // can only mean shutdown, which we surface as a
                    // failed host rather than a panic.
                    let Ok(_permit) = semaphore.acquire_owned().await else {
                        return (
                            host.name().to_string(),
                            HostResult::failed(
                                host.name(),
                                "host worker pool closed",
                                String::new(),
                                String::new(),
                                Utc::now(),
                            ),
                        );
                    };
                    let result = execute_host(ctx, node, &step, &host).await;
                    (host.name().to_string(), result)
                }
            })
            .collect();

        let mut completed: IndexMap<String, HostResult> = IndexMap::new();
        while let Some((name, result)) = workers.next().await {
            completed.insert(name, result);
        }
        // Report hosts in declaration order regardless of completion
        // order.
        for host in node.hosts() {
            if let Some(result) = completed.shift_remove(host.name()) {
                by_host.insert(host.name().to_string(), result);
            }
        }
    }

    let failed = by_host.values().filter(|r| r.status == Status::Failed).count();
    let skipped = by_host.values().filter(|r| r.skipped_by_precheck).count();
    let succeeded = by_host.values().filter(|r| r.status == Status::Success).count();

    let (status, message) = if failed > 0 {
        let first = by_host
            .values()
            .find(|r| r.status == Status::Failed)
            .map(|r| format!("{}: {}", r.host, r.message))
            .unwrap_or_default();
        (
            Status::Failed,
            format!("{failed} of {} host(s) failed; first: {first}", by_host.len()),
        )
    } else if succeeded == 0 && skipped > 0 {
        (Status::Success, "all hosts already satisfied".to_string())
    } else if skipped > 0 {
        (
            Status::Success,
            format!("{succeeded} host(s) succeeded, {skipped} already satisfied"),
        )
    } else {
        (Status::Success, format!("{succeeded} host(s) succeeded"))
    };

    tracing::debug!(node = node.name(), %status, "node finished");

    NodeResult {
        node: node.name().to_string(),
        step: meta.name,
        status,
        message,
        started_at,
        finished_at: Utc::now(),
        hosts: by_host,
    }
}

/// Why one run attempt did not succeed.
enum AttemptFailure {
    Step(StepError),
    Timeout(Duration),
}

impl AttemptFailure {
    fn message(&self) -> String {
        match self {
            Self::Step(e) => e.to_string(),
            Self::Timeout(limit) => format!("run timed out after {}s", limit.as_secs_f64()),
        }
    }

    fn captured_output(&self) -> (String, String) {
        match self {
            Self::Step(StepError::Command { stdout, stderr, .. }) => {
                (stdout.clone(), stderr.clone())
            }
            _ => (String::new(), String::new()),
        }
    }
}

/// The per-host protocol: precheck, then run under the node's timeout
/// with the node's retries, then best-effort rollback on failure.
async fn execute_host(
    ctx: &PipelineContext,
    node: &ExecutionNode,
    step: &SharedStep,
    host: &Host,
) -> HostResult {
    let started_at = Utc::now();
    let step_ctx = ctx.step_context(node.node_scope());

    // 1. Precheck: advisory, never retried.
    match step.precheck(&step_ctx, host).await {
        Err(e) => {
            tracing::warn!(node = node.name(), host = host.name(), error = %e, "precheck failed");
            return HostResult::failed(
                host.name(),
                format!("precheck failed: {e}"),
                String::new(),
                String::new(),
                started_at,
            );
        }
        Ok(Precheck::Satisfied { reason }) => {
            tracing::debug!(node = node.name(), host = host.name(), "precheck satisfied");
            return HostResult::skipped_by_precheck(host.name(), reason, started_at);
        }
        Ok(Precheck::Required) => {}
    }

    // 2/3. Run with per-node retries; the delay between attempts is
    // the node's retry delay.
    let retry = node.retry_policy();
    let mut attempt: u32 = 0;
    loop {
        attempt += 1;

        let outcome = match node.timeout_limit() {
            Some(limit) => match tokio::time::timeout(limit, step.run(&step_ctx, host)).await {
                Ok(result) => result.map_err(AttemptFailure::Step),
                // The elapsed timeout dropped the in-flight future,
                // cancelling the exchange.
                Err(_) => Err(AttemptFailure::Timeout(limit)),
            },
            None => step.run(&step_ctx, host).await.map_err(AttemptFailure::Step),
        };

        match outcome {
            Ok(output) => {
                return HostResult::success(
                    host.name(),
                    output.message,
                    output.stdout,
                    output.stderr,
                    started_at,
                );
            }
            Err(failure) => {
                if attempt <= retry.count {
                    tracing::warn!(
                        node = node.name(),
                        host = host.name(),
                        attempt,
                        max_attempts = retry.count + 1,
                        error = %failure.message(),
                        "retrying run"
                    );
                    tokio::time::sleep(retry.delay).await;
                    continue;
                }

                let (stdout, stderr) = failure.captured_output();
                let mut message = failure.message();
                if attempt > 1 {
                    message.push_str(&format!(" (after {attempt} attempts)"));
                }

                // Rollback is best-effort and never changes the
                // terminal status.
                match step.rollback(&step_ctx, host).await {
                    Ok(()) => message.push_str("; rollback completed"),
                    Err(e) => {
                        tracing::warn!(
                            node = node.name(),
                            host = host.name(),
                            error = %e,
                            "rollback failed"
                        );
                        message.push_str(&format!("; rollback failed: {e}"));
                    }
                }

                tracing::warn!(node = node.name(), host = host.name(), %message, "host failed");
                return HostResult::failed(host.name(), message, stdout, stderr, started_at);
            }
        }
    }
}
