//! Scheduler behavior: ordering, fan-out, failure propagation,
//! precheck skips, retries, timeouts, cancellation, and dry-run.

mod common;

use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use pretty_assertions::assert_eq;

use kubexm_context::{NodeScope, PipelineContext};
use kubexm_engine::{Engine, EngineOptions, Status};
use kubexm_graph::{ExecutionFragment, ExecutionGraph, ExecutionNode, NodeId, RetryPolicy};
use kubexm_step::SharedStep;

use common::{
    BrokenPrecheckStep, CancellingStep, FailingStep, FlakyStep, Gauge, HangingStep,
    RecordingStep, SatisfiedStep,
};

fn node(ctx: &PipelineContext, name: &str, step: SharedStep, hosts: &[&str]) -> ExecutionNode {
    let hosts = hosts.iter().map(|h| common::host(ctx, h)).collect();
    ExecutionNode::new(name, step, hosts).scope(NodeScope::new("test-module", "test-task"))
}

fn seal(fragment: ExecutionFragment) -> ExecutionGraph {
    ExecutionGraph::seal("test-graph", fragment).expect("valid graph")
}

#[test_log::test(tokio::test)]
async fn serial_chain_runs_in_order() {
    let ctx = common::context();
    let log = Arc::new(Mutex::new(Vec::new()));

    let mut fragment = ExecutionFragment::new("chain");
    let a = fragment
        .add_node(node(&ctx, "a", Arc::new(RecordingStep::new("a", Arc::clone(&log))), &["cp-1"]))
        .expect("add");
    let b = fragment
        .add_node(node(&ctx, "b", Arc::new(RecordingStep::new("b", Arc::clone(&log))), &["cp-1"]))
        .expect("add");
    let c = fragment
        .add_node(node(&ctx, "c", Arc::new(RecordingStep::new("c", Arc::clone(&log))), &["cp-1"]))
        .expect("add");
    fragment.add_dependency(&a, &b).expect("edge");
    fragment.add_dependency(&b, &c).expect("edge");

    let result = Engine::default().execute(&ctx, &seal(fragment)).await;

    assert_eq!(result.status, Status::Success);
    let events = log.lock().expect("log").clone();
    assert_eq!(
        events,
        vec![
            "start:a:cp-1",
            "end:a:cp-1",
            "start:b:cp-1",
            "end:b:cp-1",
            "start:c:cp-1",
            "end:c:cp-1",
        ]
    );

    // Edge timestamps: every edge X -> Y has start(Y) >= end(X).
    let node_a = &result.nodes[&NodeId::from("a")];
    let node_b = &result.nodes[&NodeId::from("b")];
    let node_c = &result.nodes[&NodeId::from("c")];
    assert!(node_b.started_at >= node_a.finished_at);
    assert!(node_c.started_at >= node_b.finished_at);
}

#[tokio::test]
async fn fan_out_overlaps_and_fan_in_waits() {
    let ctx = common::context();
    let log = Arc::new(Mutex::new(Vec::new()));
    let gauge = Gauge::new();

    let mut fragment = ExecutionFragment::new("diamond");
    let a = fragment
        .add_node(node(&ctx, "a", Arc::new(RecordingStep::new("a", Arc::clone(&log))), &["cp-1"]))
        .expect("add");
    let b = fragment
        .add_node(node(
            &ctx,
            "b",
            Arc::new(
                RecordingStep::new("b", Arc::clone(&log))
                    .delay(Duration::from_millis(50))
                    .gauge(Arc::clone(&gauge)),
            ),
            &["cp-1"],
        ))
        .expect("add");
    let c = fragment
        .add_node(node(
            &ctx,
            "c",
            Arc::new(
                RecordingStep::new("c", Arc::clone(&log))
                    .delay(Duration::from_millis(50))
                    .gauge(Arc::clone(&gauge)),
            ),
            &["cp-2"],
        ))
        .expect("add");
    let d = fragment
        .add_node(node(&ctx, "d", Arc::new(RecordingStep::new("d", Arc::clone(&log))), &["cp-1"]))
        .expect("add");
    fragment.add_dependency(&a, &b).expect("edge");
    fragment.add_dependency(&a, &c).expect("edge");
    fragment.add_dependency(&b, &d).expect("edge");
    fragment.add_dependency(&c, &d).expect("edge");

    let result = Engine::default().execute(&ctx, &seal(fragment)).await;

    assert_eq!(result.status, Status::Success);
    assert!(gauge.max() >= 2, "b and c must overlap, max was {}", gauge.max());

    let node_b = &result.nodes[&NodeId::from("b")];
    let node_c = &result.nodes[&NodeId::from("c")];
    let node_d = &result.nodes[&NodeId::from("d")];
    assert!(node_d.started_at >= node_b.finished_at);
    assert!(node_d.started_at >= node_c.finished_at);
}

#[tokio::test]
async fn node_fanout_bound_serializes_independent_nodes() {
    let ctx = common::context();
    let log = Arc::new(Mutex::new(Vec::new()));
    let gauge = Gauge::new();

    let mut fragment = ExecutionFragment::new("parallel");
    for name in ["a", "b", "c"] {
        fragment
            .add_node(node(
                &ctx,
                name,
                Arc::new(
                    RecordingStep::new(name, Arc::clone(&log))
                        .delay(Duration::from_millis(20))
                        .gauge(Arc::clone(&gauge)),
                ),
                &["cp-1"],
            ))
            .expect("add");
    }

    let engine = Engine::new(EngineOptions {
        node_fanout: Some(1),
        host_fanout: None,
    });
    let result = engine.execute(&ctx, &seal(fragment)).await;

    assert_eq!(result.status, Status::Success);
    assert_eq!(gauge.max(), 1);
}

#[test_log::test(tokio::test)]
async fn failure_skips_descendants_but_not_siblings() {
    let ctx = common::context();
    let log = Arc::new(Mutex::new(Vec::new()));

    // a -> b -> c, a -> d; b fails.
    let mut fragment = ExecutionFragment::new("branching");
    let a = fragment
        .add_node(node(&ctx, "a", Arc::new(RecordingStep::new("a", Arc::clone(&log))), &["cp-1"]))
        .expect("add");
    let b = fragment
        .add_node(node(&ctx, "b", Arc::new(FailingStep::new("b")), &["cp-1"]))
        .expect("add");
    let c = fragment
        .add_node(node(&ctx, "c", Arc::new(RecordingStep::new("c", Arc::clone(&log))), &["cp-1"]))
        .expect("add");
    let d = fragment
        .add_node(node(&ctx, "d", Arc::new(RecordingStep::new("d", Arc::clone(&log))), &["cp-1"]))
        .expect("add");
    fragment.add_dependency(&a, &b).expect("edge");
    fragment.add_dependency(&b, &c).expect("edge");
    fragment.add_dependency(&a, &d).expect("edge");

    let result = Engine::default().execute(&ctx, &seal(fragment)).await;

    assert_eq!(result.status, Status::Failed);
    assert_eq!(result.nodes[&NodeId::from("a")].status, Status::Success);
    assert_eq!(result.nodes[&NodeId::from("b")].status, Status::Failed);
    assert_eq!(result.nodes[&NodeId::from("c")].status, Status::Skipped);
    assert_eq!(result.nodes[&NodeId::from("d")].status, Status::Success);

    // The dependency-skip names its failed ancestor, per host too.
    let skipped = &result.nodes[&NodeId::from("c")];
    assert!(skipped.message.contains('b'), "message: {}", skipped.message);
    assert!(skipped.hosts["cp-1"].message.contains('b'));
    assert!(!skipped.hosts["cp-1"].skipped_by_precheck);

    // No node is ever reported Pending or Running.
    assert!(
        result
            .nodes
            .values()
            .all(|n| matches!(n.status, Status::Success | Status::Failed | Status::Skipped))
    );
}

#[tokio::test]
async fn precheck_skip_counts_as_success() {
    let ctx = common::context();
    let log = Arc::new(Mutex::new(Vec::new()));

    let mut fragment = ExecutionFragment::new("skip");
    let a = fragment
        .add_node(node(&ctx, "a", Arc::new(SatisfiedStep::new("a")), &["cp-1"]))
        .expect("add");
    let b = fragment
        .add_node(node(&ctx, "b", Arc::new(RecordingStep::new("b", Arc::clone(&log))), &["cp-1"]))
        .expect("add");
    fragment.add_dependency(&a, &b).expect("edge");

    let result = Engine::default().execute(&ctx, &seal(fragment)).await;

    assert_eq!(result.status, Status::Success);
    let node_a = &result.nodes[&NodeId::from("a")];
    assert_eq!(node_a.status, Status::Success);
    assert_eq!(node_a.hosts["cp-1"].status, Status::Skipped);
    assert!(node_a.hosts["cp-1"].skipped_by_precheck);

    // Downstream proceeded normally.
    assert_eq!(result.nodes[&NodeId::from("b")].status, Status::Success);
    assert_eq!(log.lock().expect("log").len(), 2);
}

#[tokio::test]
async fn multi_host_node_fails_when_any_host_fails() {
    let ctx = common::context();
    let log = Arc::new(Mutex::new(Vec::new()));

    let mut fragment = ExecutionFragment::new("partial");
    let a = fragment
        .add_node(node(
            &ctx,
            "a",
            Arc::new(FailingStep::new("a").only_on("cp-2")),
            &["cp-1", "cp-2"],
        ))
        .expect("add");
    let b = fragment
        .add_node(node(&ctx, "b", Arc::new(RecordingStep::new("b", Arc::clone(&log))), &["cp-1"]))
        .expect("add");
    fragment.add_dependency(&a, &b).expect("edge");

    let result = Engine::default().execute(&ctx, &seal(fragment)).await;

    assert_eq!(result.status, Status::Failed);
    let node_a = &result.nodes[&NodeId::from("a")];
    assert_eq!(node_a.status, Status::Failed);
    assert_eq!(node_a.hosts["cp-1"].status, Status::Success);
    assert_eq!(node_a.hosts["cp-2"].status, Status::Failed);
    assert_eq!(result.nodes[&NodeId::from("b")].status, Status::Skipped);
}

#[tokio::test]
async fn retries_reinvoke_run_until_success() {
    let ctx = common::context();
    let step = Arc::new(FlakyStep::new("flaky", 2));
    let attempts = Arc::clone(&step.attempts);

    let mut fragment = ExecutionFragment::new("retry");
    fragment
        .add_node(
            node(&ctx, "flaky", step, &["cp-1"])
                .retry(RetryPolicy::new(2, Duration::from_millis(1))),
        )
        .expect("add");

    let result = Engine::default().execute(&ctx, &seal(fragment)).await;

    assert_eq!(result.status, Status::Success);
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn exhausted_retries_fail_and_roll_back() {
    let ctx = common::context();
    let step = Arc::new(FailingStep::new("always"));
    let rolled_back = Arc::clone(&step.rolled_back);

    let mut fragment = ExecutionFragment::new("retry-fail");
    fragment
        .add_node(
            node(&ctx, "always", step, &["cp-1"])
                .retry(RetryPolicy::new(1, Duration::from_millis(1))),
        )
        .expect("add");

    let result = Engine::default().execute(&ctx, &seal(fragment)).await;

    assert_eq!(result.status, Status::Failed);
    let host = &result.nodes[&NodeId::from("always")].hosts["cp-1"];
    assert!(host.message.contains("after 2 attempts"), "message: {}", host.message);
    assert!(host.message.contains("rollback completed"));
    assert_eq!(host.stderr, "boom");
    // Rollback runs once, after the final attempt only.
    assert_eq!(rolled_back.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn node_timeout_fails_the_host() {
    let ctx = common::context();

    let mut fragment = ExecutionFragment::new("timeout");
    fragment
        .add_node(
            node(&ctx, "hang", Arc::new(HangingStep::new("hang")), &["cp-1"])
                .timeout(Duration::from_millis(50)),
        )
        .expect("add");

    let result = Engine::default().execute(&ctx, &seal(fragment)).await;

    assert_eq!(result.status, Status::Failed);
    let host = &result.nodes[&NodeId::from("hang")].hosts["cp-1"];
    assert_eq!(host.status, Status::Failed);
    assert!(host.message.contains("timed out"), "message: {}", host.message);
}

#[tokio::test]
async fn precheck_error_is_a_host_failure() {
    let ctx = common::context();

    let mut fragment = ExecutionFragment::new("precheck-error");
    fragment
        .add_node(node(&ctx, "a", Arc::new(BrokenPrecheckStep::new("a")), &["cp-1"]))
        .expect("add");

    let result = Engine::default().execute(&ctx, &seal(fragment)).await;

    assert_eq!(result.status, Status::Failed);
    let host = &result.nodes[&NodeId::from("a")].hosts["cp-1"];
    assert_eq!(host.status, Status::Failed);
    assert!(host.message.starts_with("precheck failed"));
    assert!(!host.skipped_by_precheck);
}

#[tokio::test]
async fn cancellation_skips_pending_nodes_and_sets_the_error() {
    let ctx = common::context();
    let log = Arc::new(Mutex::new(Vec::new()));

    // a cancels the run (and itself succeeds); b and c never start.
    let mut fragment = ExecutionFragment::new("cancel");
    let a = fragment
        .add_node(node(&ctx, "a", Arc::new(CancellingStep::new("a")), &["cp-1"]))
        .expect("add");
    let b = fragment
        .add_node(node(&ctx, "b", Arc::new(RecordingStep::new("b", Arc::clone(&log))), &["cp-1"]))
        .expect("add");
    let c = fragment
        .add_node(node(&ctx, "c", Arc::new(RecordingStep::new("c", Arc::clone(&log))), &["cp-1"]))
        .expect("add");
    fragment.add_dependency(&a, &b).expect("edge");
    fragment.add_dependency(&b, &c).expect("edge");

    let result = Engine::default().execute(&ctx, &seal(fragment)).await;

    assert_eq!(result.status, Status::Failed);
    assert_eq!(result.error.as_deref(), Some("run cancelled"));
    assert_eq!(result.nodes[&NodeId::from("a")].status, Status::Success);
    assert_eq!(result.nodes[&NodeId::from("b")].status, Status::Skipped);
    assert_eq!(result.nodes[&NodeId::from("c")].status, Status::Skipped);
    assert!(log.lock().expect("log").is_empty(), "b and c must never run");
}

#[tokio::test]
async fn host_serial_mode_orders_host_executions() {
    let ctx = common::context();
    let log = Arc::new(Mutex::new(Vec::new()));

    let mut fragment = ExecutionFragment::new("serial-hosts");
    fragment
        .add_node(
            node(
                &ctx,
                "a",
                Arc::new(RecordingStep::new("a", Arc::clone(&log)).delay(Duration::from_millis(5))),
                &["cp-1", "cp-2", "w-1"],
            )
            .host_serial(),
        )
        .expect("add");

    let result = Engine::default().execute(&ctx, &seal(fragment)).await;

    assert_eq!(result.status, Status::Success);
    let events = log.lock().expect("log").clone();
    assert_eq!(
        events,
        vec![
            "start:a:cp-1",
            "end:a:cp-1",
            "start:a:cp-2",
            "end:a:cp-2",
            "start:a:w-1",
            "end:a:w-1",
        ]
    );
}

#[tokio::test]
async fn dry_run_never_calls_steps_and_always_succeeds() {
    let ctx = common::dry_run_context();

    // A graph whose steps would all fail if invoked.
    let mut fragment = ExecutionFragment::new("dry");
    let a = fragment
        .add_node(node(&ctx, "a", Arc::new(FailingStep::new("a")), &["cp-1"]))
        .expect("add");
    let b = fragment
        .add_node(node(&ctx, "b", Arc::new(FailingStep::new("b")), &["cp-1", "cp-2"]))
        .expect("add");
    fragment.add_dependency(&a, &b).expect("edge");
    let graph = seal(fragment);

    let result = Engine::default().execute(&ctx, &graph).await;

    assert_eq!(result.status, Status::Success);
    assert_eq!(result.nodes.len(), graph.len());
    for node_result in result.nodes.values() {
        assert_eq!(node_result.status, Status::Success);
        assert_eq!(node_result.message, "dry-run");
        for host in node_result.hosts.values() {
            assert_eq!(host.status, Status::Success);
            assert_eq!(host.message, "dry-run");
        }
    }
}

#[tokio::test]
async fn empty_graph_is_a_trivial_success() {
    let ctx = common::context();
    let graph = seal(ExecutionFragment::new("empty"));
    let result = Engine::default().execute(&ctx, &graph).await;
    assert_eq!(result.status, Status::Success);
    assert!(result.nodes.is_empty());
    assert!(result.error.is_none());
}
