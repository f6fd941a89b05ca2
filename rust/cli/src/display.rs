//! Result rendering for the terminal.

#![allow(clippy::print_stdout)]

use eyre::Result;

use kubexm_engine::{GraphExecutionResult, Status};

fn glyph(status: Status) -> &'static str {
    match status {
        Status::Success => "ok",
        Status::Failed => "FAILED",
        Status::Skipped => "skipped",
        Status::Pending | Status::Running => "…",
    }
}

/// Print a per-node, per-host summary.
pub fn text(result: &GraphExecutionResult) {
    println!(
        "{} {} ({} node(s))",
        result.graph,
        glyph(result.status),
        result.nodes.len()
    );

    for node in result.nodes.values() {
        println!("  [{}] {} - {}", glyph(node.status), node.node, node.message);
        for host in node.hosts.values() {
            let marker = if host.skipped_by_precheck {
                " (already satisfied)"
            } else {
                ""
            };
            println!(
                "      {} {}{}: {}",
                glyph(host.status),
                host.host,
                marker,
                host.message
            );
        }
    }

    if let Some(error) = &result.error {
        println!("error: {error}");
    }
}

/// Print the result tree as JSON.
pub fn json(result: &GraphExecutionResult) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(result)?);
    Ok(())
}
