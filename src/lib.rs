// src/lib.rs

//! checktree: hierarchical check and dashboard execution.
//!
//! A workspace file declares controls, benchmarks, dashboards, panels and
//! withs; `checktree run <target>...` builds an execution tree from the
//! named targets, runs every leaf concurrently under a global parallelism
//! limiter, aggregates statuses up the tree, and exits with a code
//! reflecting the worst result.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::debug;

pub mod cli;
pub mod dashboard;
pub mod errors;
pub mod execute;
pub mod logging;
pub mod query;
pub mod status;
pub mod types;
pub mod workspace;

use execute::{ExecutionTree, RunContext, TreeNode};
use query::StaticQueryClient;
use status::{EventSink, TracingSink};
use types::{OutputMode, RunConfig};

/// Top-level entry point: load the workspace, execute the targets and
/// render the results. Returns the process exit code.
pub async fn run(args: cli::CliArgs) -> anyhow::Result<i32> {
    anyhow::ensure!(args.max_parallel > 0, "--max-parallel must be at least 1");
    let workspace = workspace::load_and_validate(&args.workspace)
        .with_context(|| format!("failed to load workspace '{}'", args.workspace))?;
    debug!(
        controls = workspace.controls.len(),
        benchmarks = workspace.benchmarks.len(),
        dashboards = workspace.dashboards.len(),
        "workspace loaded"
    );

    let config = RunConfig {
        dry_run: args.dry_run,
        max_parallel: args.max_parallel,
        timeout: args.timeout.map(Duration::from_secs),
        output: args.output.into(),
    };

    let client = Arc::new(StaticQueryClient::new(workspace.fixtures.clone()));
    let events: Arc<dyn EventSink> = Arc::new(TracingSink);
    let tree = ExecutionTree::new(&workspace, &args.targets, client, config.clone(), events)?;

    let ctx = RunContext::with_timeout(config.timeout);
    {
        let ctx = ctx.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                ctx.cancel();
            }
        });
    }

    tree.execute(ctx).await?;

    match config.output {
        OutputMode::Summary => print_summary(&tree),
        OutputMode::Tree => print_tree(&tree.as_tree_node(), 0),
        OutputMode::Json => {
            let json = serde_json::to_string_pretty(&tree.as_tree_node())?;
            println!("{json}");
        }
    }

    Ok(tree.run_outcome().exit_code())
}

fn print_summary(tree: &ExecutionTree) {
    let root = tree.as_tree_node();
    for child in &root.children {
        if let Some(summary) = &child.summary {
            println!("{}: {}", child.name, summary);
        }
    }
    if let Some(summary) = &root.summary {
        println!("total: {summary}");
    }
}

fn print_tree(node: &TreeNode, depth: usize) {
    let indent = "  ".repeat(depth);
    let summary = node
        .summary
        .map(|s| format!(" ({s})"))
        .unwrap_or_default();
    match (&node.status, &node.error) {
        (Some(status), Some(error)) => {
            println!("{indent}{} [{}] {status}: {error}", node.name, node.node_type);
        }
        (Some(status), None) => {
            println!("{indent}{} [{}] {status}{summary}", node.name, node.node_type);
        }
        _ => {
            println!("{indent}{} [{}]{summary}", node.name, node.node_type);
        }
    }
    for child in &node.children {
        print_tree(child, depth + 1);
    }
}
