mod common;

use std::sync::Arc;
use std::time::Duration;

use checktree::execute::RunStatus;
use checktree::query::CellValue;
use checktree::status::{NoopSink, RunEvent};
use checktree::types::RunConfig;
use checktree_test_utils::builders::WorkspaceBuilder;
use checktree_test_utils::fake_client::{single_row, status_rows, FakeQueryClient, Script};
use checktree_test_utils::sink::CollectingSink;

use common::{assert_all_groups_complete, init_tracing, run_tree, with_timeout};

#[tokio::test]
async fn with_output_is_substituted_before_the_panel_query_runs() {
    init_tracing();
    let workspace = WorkspaceBuilder::new()
        .with_with("w", "select id")
        .with_panel("p", Some("select * from t where id = ${with.w.id}"), &["w"])
        .with_dashboard("d", &["p"])
        .build();

    let client = FakeQueryClient::new();
    client.script(
        "select id",
        Script::Respond(single_row(&[("id", CellValue::Text("x".into()))])),
    );
    client.script(
        "select * from t where id = 'x'",
        Script::Respond(status_rows(&["ok"])),
    );

    let tree = with_timeout(run_tree(
        &workspace,
        &["d"],
        client.clone(),
        RunConfig::default(),
        Arc::new(NoopSink),
    ))
    .await;

    assert!(client
        .executed()
        .contains(&"select * from t where id = 'x'".to_string()));

    let panel = tree.leaf("p").expect("panel run");
    assert_eq!(panel.status(), RunStatus::Complete);
    // one panel leaf under the dashboard group; with-runs are not counted
    assert_eq!(tree.root_summary().ok, 1);
    assert_all_groups_complete(&tree);
}

#[tokio::test]
async fn numeric_with_values_substitute_without_quotes() {
    init_tracing();
    let workspace = WorkspaceBuilder::new()
        .with_with("w", "select max(id) as id")
        .with_panel("p", Some("select * from t where id > ${with.w.id}"), &["w"])
        .with_dashboard("d", &["p"])
        .build();

    let client = FakeQueryClient::new();
    client.script(
        "select max(id) as id",
        Script::Respond(single_row(&[("id", CellValue::Integer(42))])),
    );
    client.script(
        "select * from t where id > 42",
        Script::Respond(status_rows(&["ok"])),
    );

    with_timeout(run_tree(
        &workspace,
        &["d"],
        client.clone(),
        RunConfig::default(),
        Arc::new(NoopSink),
    ))
    .await;

    assert!(client
        .executed()
        .contains(&"select * from t where id > 42".to_string()));
}

#[tokio::test]
async fn failed_with_propagates_as_dependency_error() {
    init_tracing();
    let workspace = WorkspaceBuilder::new()
        .with_with("w", "select id")
        .with_panel("p", Some("select ${with.w.id}"), &["w"])
        .with_dashboard("d", &["p"])
        .build();

    let client = FakeQueryClient::new();
    client.script("select id", Script::Fail("no table".into()));

    let tree = with_timeout(run_tree(
        &workspace,
        &["d"],
        client,
        RunConfig::default(),
        Arc::new(NoopSink),
    ))
    .await;

    let panel = tree.leaf("p").expect("panel run");
    assert_eq!(panel.status(), RunStatus::Error);
    let message = panel.error().expect("error").to_string();
    assert!(
        message.contains("dependency 'w' failed"),
        "unexpected error: {message}"
    );
    assert_eq!(tree.root_summary().error, 1);
    assert_all_groups_complete(&tree);
}

#[tokio::test]
async fn panel_is_blocked_until_its_publisher_completes() {
    init_tracing();
    let workspace = WorkspaceBuilder::new()
        .with_with("w", "select id")
        .with_panel("p", Some("select ${with.w.id}"), &["w"])
        .with_dashboard("d", &["p"])
        .build();

    let client = FakeQueryClient::new();
    client.script(
        "select id",
        Script::RespondAfter(
            Duration::from_millis(50),
            single_row(&[("id", CellValue::Text("x".into()))]),
        ),
    );
    client.script("select 'x'", Script::Respond(status_rows(&["ok"])));

    let sink = CollectingSink::new();
    with_timeout(run_tree(
        &workspace,
        &["d"],
        client,
        RunConfig::default(),
        sink.clone(),
    ))
    .await;

    let lifecycle: Vec<String> = sink
        .events()
        .iter()
        .filter_map(|event| match event {
            RunEvent::PanelBlocked { name } if name == "p" => Some("blocked".to_string()),
            RunEvent::PanelRunning { name } if name == "p" => Some("running".to_string()),
            RunEvent::PanelComplete { name } if name == "p" => Some("complete".to_string()),
            _ => None,
        })
        .collect();
    assert_eq!(lifecycle, vec!["blocked", "running", "complete"]);
}

#[tokio::test]
async fn with_shared_by_two_panels_executes_once() {
    init_tracing();
    let workspace = WorkspaceBuilder::new()
        .with_with("w", "select id")
        .with_panel("p1", Some("select a from t where id = ${with.w.id}"), &["w"])
        .with_panel("p2", Some("select b from t where id = ${with.w.id}"), &["w"])
        .with_dashboard("d", &["p1", "p2"])
        .build();

    let client = FakeQueryClient::new();
    client.script(
        "select id",
        Script::Respond(single_row(&[("id", CellValue::Text("x".into()))])),
    );
    client.script(
        "select a from t where id = 'x'",
        Script::Respond(status_rows(&["ok"])),
    );
    client.script(
        "select b from t where id = 'x'",
        Script::Respond(status_rows(&["ok"])),
    );

    let tree = with_timeout(run_tree(
        &workspace,
        &["d"],
        client.clone(),
        RunConfig::default(),
        Arc::new(NoopSink),
    ))
    .await;

    let with_executions = client
        .executed()
        .iter()
        .filter(|sql| sql.as_str() == "select id")
        .count();
    assert_eq!(with_executions, 1);

    assert_eq!(tree.leaf("p1").unwrap().status(), RunStatus::Complete);
    assert_eq!(tree.leaf("p2").unwrap().status(), RunStatus::Complete);
    assert_eq!(tree.root_summary().ok, 2);
    assert_all_groups_complete(&tree);
}

#[tokio::test]
async fn panel_without_a_query_completes_after_its_children() {
    init_tracing();
    let workspace = WorkspaceBuilder::new()
        .with_with("w", "select id")
        .with_panel("p", None, &["w"])
        .with_dashboard("d", &["p"])
        .build();

    let client = FakeQueryClient::new();
    client.script(
        "select id",
        Script::Respond(single_row(&[("id", CellValue::Text("x".into()))])),
    );

    let tree = with_timeout(run_tree(
        &workspace,
        &["d"],
        client,
        RunConfig::default(),
        Arc::new(NoopSink),
    ))
    .await;

    let panel = tree.leaf("p").expect("panel run");
    assert_eq!(panel.status(), RunStatus::Complete);
    let with_run = tree.leaf("w").expect("with run");
    assert!(with_run.status().is_finished());
    assert_all_groups_complete(&tree);
}

#[tokio::test]
async fn dependency_waits_do_not_deadlock_under_capacity_one() {
    init_tracing();
    // the panel must not hold the only permit while blocked on its with
    let workspace = WorkspaceBuilder::new()
        .with_with("w", "select id")
        .with_panel("p", Some("select ${with.w.id}"), &["w"])
        .with_dashboard("d", &["p"])
        .build();

    let client = FakeQueryClient::new();
    client.script(
        "select id",
        Script::RespondAfter(
            Duration::from_millis(20),
            single_row(&[("id", CellValue::Text("x".into()))]),
        ),
    );
    client.script("select 'x'", Script::Respond(status_rows(&["ok"])));

    let config = RunConfig {
        max_parallel: 1,
        ..RunConfig::default()
    };
    let tree = with_timeout(run_tree(
        &workspace,
        &["d"],
        client,
        config,
        Arc::new(NoopSink),
    ))
    .await;

    assert_eq!(tree.leaf("p").unwrap().status(), RunStatus::Complete);
    assert_all_groups_complete(&tree);
}

#[tokio::test]
async fn panicking_with_still_publishes_and_fails_the_dependent_panel() {
    init_tracing();
    let workspace = WorkspaceBuilder::new()
        .with_with("w", "select id")
        .with_panel("p", Some("select ${with.w.id}"), &["w"])
        .with_dashboard("d", &["p"])
        .build();

    let client = FakeQueryClient::new();
    client.script("select id", Script::Panic("with exploded".into()));

    // if the panicked with-run never published, the panel would wait on
    // its channel forever and the root would never complete
    let tree = with_timeout(run_tree(
        &workspace,
        &["d"],
        client,
        RunConfig::default(),
        Arc::new(NoopSink),
    ))
    .await;

    let with_run = tree.leaf("w").expect("with run");
    assert_eq!(with_run.status(), RunStatus::Error);

    let panel = tree.leaf("p").expect("panel run");
    assert_eq!(panel.status(), RunStatus::Error);
    let message = panel.error().expect("error").to_string();
    assert!(
        message.contains("dependency 'w' failed") && message.contains("panicked"),
        "unexpected error: {message}"
    );

    assert_eq!(tree.root_summary().error, 1);
    assert_all_groups_complete(&tree);
}
