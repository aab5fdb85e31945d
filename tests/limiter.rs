mod common;

use std::sync::Arc;
use std::time::Duration;

use checktree::execute::RunStatus;
use checktree::status::NoopSink;
use checktree::types::RunConfig;
use checktree_test_utils::builders::{ControlBuilder, WorkspaceBuilder};
use checktree_test_utils::fake_client::{status_rows, FakeQueryClient, Script};

use common::{assert_all_groups_complete, init_tracing, run_tree, with_timeout};

fn workspace_with_controls(count: usize) -> checktree::workspace::Workspace {
    let mut builder = WorkspaceBuilder::new();
    let mut children = Vec::new();
    for i in 0..count {
        let name = format!("c{i}");
        builder = builder.with_control(&name, ControlBuilder::new(&format!("q{i}")).build());
        children.push(name);
    }
    let children: Vec<&str> = children.iter().map(String::as_str).collect();
    builder.with_benchmark("b", &children).build()
}

#[tokio::test]
async fn capacity_one_serializes_query_execution() {
    init_tracing();
    let workspace = workspace_with_controls(4);
    let client = FakeQueryClient::new();
    for i in 0..4 {
        client.script(
            &format!("q{i}"),
            Script::RespondAfter(Duration::from_millis(10), status_rows(&["ok"])),
        );
    }

    let config = RunConfig {
        max_parallel: 1,
        ..RunConfig::default()
    };
    let tree = with_timeout(run_tree(
        &workspace,
        &["b"],
        client.clone(),
        config,
        Arc::new(NoopSink),
    ))
    .await;

    assert_eq!(client.max_in_flight(), 1);
    assert_eq!(tree.root_summary().ok, 4);
    assert_all_groups_complete(&tree);
}

#[tokio::test]
async fn capacity_bounds_concurrent_queries() {
    init_tracing();
    let workspace = workspace_with_controls(6);
    let client = FakeQueryClient::new();
    for i in 0..6 {
        client.script(
            &format!("q{i}"),
            Script::RespondAfter(Duration::from_millis(30), status_rows(&["ok"])),
        );
    }

    let config = RunConfig {
        max_parallel: 2,
        ..RunConfig::default()
    };
    let tree = with_timeout(run_tree(
        &workspace,
        &["b"],
        client.clone(),
        config,
        Arc::new(NoopSink),
    ))
    .await;

    assert!(client.max_in_flight() <= 2);
    assert_eq!(tree.root_summary().ok, 6);
}

#[tokio::test]
async fn panicking_control_releases_its_capacity() {
    init_tracing();
    let workspace = workspace_with_controls(3);
    let client = FakeQueryClient::new();
    client.script("q0", Script::Panic("exploded".into()));
    client.script("q1", Script::Respond(status_rows(&["ok"])));
    client.script("q2", Script::Respond(status_rows(&["ok"])));

    // capacity 1: if the panicking task leaked its permit, the remaining
    // controls could never run and the root would never complete
    let config = RunConfig {
        max_parallel: 1,
        ..RunConfig::default()
    };
    let tree = with_timeout(run_tree(
        &workspace,
        &["b"],
        client,
        config,
        Arc::new(NoopSink),
    ))
    .await;

    let root = tree.root_summary();
    assert_eq!(root.error, 1);
    assert_eq!(root.ok, 2);

    let failed = tree.leaf("c0").expect("c0");
    assert_eq!(failed.status(), RunStatus::Error);
    let message = failed.error().expect("error recorded").to_string();
    assert!(message.contains("panicked"), "unexpected error: {message}");

    // permit conservation: everything acquired was released
    assert_eq!(tree.available_permits(), 1);
    assert_all_groups_complete(&tree);
}

#[tokio::test]
async fn dry_run_skips_leaves_without_touching_the_limiter() {
    init_tracing();
    let workspace = workspace_with_controls(2);
    // no scripts: any query execution would fail the run
    let client = FakeQueryClient::new();

    // zero capacity: a dry run that asked the limiter for a permit would
    // wait forever
    let config = RunConfig {
        dry_run: true,
        max_parallel: 0,
        ..RunConfig::default()
    };
    let tree = with_timeout(run_tree(
        &workspace,
        &["b"],
        client.clone(),
        config,
        Arc::new(NoopSink),
    ))
    .await;

    assert!(client.executed().is_empty());
    assert_eq!(tree.leaf("c0").expect("c0").status(), RunStatus::Skipped);
    assert_eq!(tree.root_summary().skip, 2);
    assert_all_groups_complete(&tree);
}
