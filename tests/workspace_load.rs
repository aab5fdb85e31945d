mod common;

use std::io::Write;

use checktree::errors::ChecktreeError;
use checktree::workspace::{load_and_validate, RawWorkspaceFile, Workspace};

use common::init_tracing;

fn parse(toml_text: &str) -> Result<Workspace, ChecktreeError> {
    let raw: RawWorkspaceFile = toml::from_str(toml_text).expect("fixture TOML must parse");
    Workspace::try_from(raw)
}

#[test]
fn loads_a_valid_workspace_from_disk() {
    init_tracing();
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    write!(
        file,
        r#"
[control.c1]
query = "select status from t"
severity = "high"

[benchmark.b]
children = ["c1"]
title = "My benchmark"

[result.c1]
columns = ["status"]
rows = [{{ status = "ok" }}]
"#
    )
    .expect("write fixture");

    let workspace = load_and_validate(file.path().to_str().unwrap()).expect("load");
    assert_eq!(workspace.controls.len(), 1);
    assert_eq!(workspace.benchmarks["b"].children, vec!["c1"]);
    assert_eq!(
        workspace.controls["c1"].severity.as_deref(),
        Some("high")
    );

    // the fixture is keyed by the control's query text
    let fixture = &workspace.fixtures["select status from t"];
    assert_eq!(fixture.rows.len(), 1);
}

#[test]
fn missing_file_reports_io_error() {
    init_tracing();
    let err = load_and_validate("/nonexistent/Checktree.toml").unwrap_err();
    assert!(matches!(err, ChecktreeError::IoError(_)));
}

#[test]
fn duplicate_names_across_sections_are_rejected() {
    init_tracing();
    let err = parse(
        r#"
[control.x]
query = "select 1"

[benchmark.x]
children = ["x"]
"#,
    )
    .unwrap_err();
    assert!(matches!(err, ChecktreeError::WorkspaceError(_)));
}

#[test]
fn unknown_benchmark_child_is_rejected() {
    init_tracing();
    let err = parse(
        r#"
[benchmark.b]
children = ["missing"]
"#,
    )
    .unwrap_err();
    assert!(err.to_string().contains("missing"));
}

#[test]
fn benchmark_cycles_are_rejected() {
    init_tracing();
    let err = parse(
        r#"
[control.c]
query = "select 1"

[benchmark.b1]
children = ["b2"]

[benchmark.b2]
children = ["b1", "c"]
"#,
    )
    .unwrap_err();
    assert!(matches!(err, ChecktreeError::BenchmarkCycle(_)));
}

#[test]
fn benchmark_self_reference_is_rejected() {
    init_tracing();
    let err = parse(
        r#"
[benchmark.b]
children = ["b"]
"#,
    )
    .unwrap_err();
    assert!(matches!(
        err,
        ChecktreeError::WorkspaceError(_) | ChecktreeError::BenchmarkCycle(_)
    ));
}

#[test]
fn runtime_reference_outside_dashboard_scope_is_rejected() {
    init_tracing();
    let err = parse(
        r#"
[with.w]
query = "select id"

[panel.p]
query = "select ${with.other.id}"
with = ["w"]

[dashboard.d]
panels = ["p"]
"#,
    )
    .unwrap_err();
    assert!(err.to_string().contains("other"));
}

#[test]
fn panel_shared_between_dashboards_is_rejected() {
    init_tracing();
    let err = parse(
        r#"
[panel.p]
query = "select 1"

[dashboard.d1]
panels = ["p"]

[dashboard.d2]
panels = ["p"]
"#,
    )
    .unwrap_err();
    assert!(err.to_string().contains("only one dashboard"));
}

#[test]
fn empty_workspace_is_rejected() {
    init_tracing();
    let err = parse("").unwrap_err();
    assert!(matches!(err, ChecktreeError::WorkspaceError(_)));
}

#[test]
fn unknown_target_is_reported() {
    init_tracing();
    let workspace = parse(
        r#"
[control.c]
query = "select 1"
"#,
    )
    .expect("valid workspace");
    let err = workspace.resolve_target("nope").unwrap_err();
    assert!(matches!(err, ChecktreeError::ResourceNotFound(_)));
}
