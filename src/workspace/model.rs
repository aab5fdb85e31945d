// src/workspace/model.rs

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde::Deserialize;

use crate::query::{CellValue, QueryResult, Row};

/// Top-level workspace file as read from TOML, before validation.
///
/// All sections are optional; validation requires at least one runnable
/// resource. Keys of each map are the resource names.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawWorkspaceFile {
    #[serde(default)]
    pub control: BTreeMap<String, RawControl>,
    #[serde(default)]
    pub benchmark: BTreeMap<String, RawBenchmark>,
    #[serde(default)]
    pub dashboard: BTreeMap<String, RawDashboard>,
    #[serde(default)]
    pub panel: BTreeMap<String, RawPanel>,
    #[serde(default)]
    pub with: BTreeMap<String, RawWith>,
    #[serde(default)]
    pub result: BTreeMap<String, RawResultFixture>,
}

/// `[control.<name>]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct RawControl {
    pub query: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub documentation: Option<String>,
    pub display: Option<String>,
    /// Severity label ("critical", "high", ...); free-form.
    pub severity: Option<String>,
    /// Column of the result rows carrying the per-row status.
    /// Defaults to `status`.
    pub status_column: Option<String>,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

/// `[benchmark.<name>]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct RawBenchmark {
    /// Names of child benchmarks and controls, in declaration order.
    #[serde(default)]
    pub children: Vec<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub documentation: Option<String>,
    pub display: Option<String>,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

/// `[dashboard.<name>]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct RawDashboard {
    /// Names of panels, in declaration order.
    #[serde(default)]
    pub panels: Vec<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

/// `[panel.<name>]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct RawPanel {
    /// Optional query text; may contain `${with.<name>.<column>}` runtime
    /// references that are substituted before execution.
    pub query: Option<String>,
    pub title: Option<String>,
    /// Names of with-resources started as children of this panel.
    #[serde(default, rename = "with")]
    pub withs: Vec<String>,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

/// `[with.<name>]` section.
///
/// A with's query may itself contain `${with.*}` references; the runtime
/// protocol resolves them the same way it does for panels.
#[derive(Debug, Clone, Deserialize)]
pub struct RawWith {
    pub query: String,
}

/// `[result.<name>]` fixture for the static query client.
#[derive(Debug, Clone, Deserialize)]
pub struct RawResultFixture {
    /// Override for the query text this fixture answers. Defaults to the
    /// query of the like-named control/panel/with.
    pub query: Option<String>,
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default)]
    pub rows: Vec<BTreeMap<String, toml::Value>>,
}

/// Validated control definition.
#[derive(Debug, Clone)]
pub struct ControlDef {
    pub name: String,
    pub query: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub documentation: Option<String>,
    pub display: Option<String>,
    pub severity: Option<String>,
    pub status_column: Option<String>,
    pub tags: BTreeMap<String, String>,
}

impl ControlDef {
    pub fn effective_status_column(&self) -> &str {
        self.status_column.as_deref().unwrap_or("status")
    }
}

/// Validated benchmark definition.
#[derive(Debug, Clone)]
pub struct BenchmarkDef {
    pub name: String,
    pub children: Vec<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub documentation: Option<String>,
    pub display: Option<String>,
    pub tags: BTreeMap<String, String>,
}

/// Validated dashboard definition.
#[derive(Debug, Clone)]
pub struct DashboardDef {
    pub name: String,
    pub panels: Vec<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub tags: BTreeMap<String, String>,
}

/// Validated panel definition.
#[derive(Debug, Clone)]
pub struct PanelDef {
    pub name: String,
    pub query: Option<String>,
    pub title: Option<String>,
    pub withs: Vec<String>,
    pub tags: BTreeMap<String, String>,
}

/// Validated with definition.
#[derive(Debug, Clone)]
pub struct WithDef {
    pub name: String,
    pub query: String,
}

/// A resolved top-level execution target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Benchmark(String),
    Control(String),
    Dashboard(String),
}

/// Validated workspace: all references resolved, hierarchy acyclic.
///
/// Construct via `Workspace::try_from(raw)` or
/// [`loader::load_and_validate`](crate::workspace::loader::load_and_validate).
#[derive(Debug, Clone)]
pub struct Workspace {
    pub controls: BTreeMap<String, Arc<ControlDef>>,
    pub benchmarks: BTreeMap<String, BenchmarkDef>,
    pub dashboards: BTreeMap<String, DashboardDef>,
    pub panels: BTreeMap<String, Arc<PanelDef>>,
    pub withs: BTreeMap<String, Arc<WithDef>>,
    /// Fixture results keyed by the query text they answer.
    pub fixtures: HashMap<String, QueryResult>,
}

impl Workspace {
    /// Resolve a CLI target name to a concrete resource.
    pub fn resolve_target(&self, name: &str) -> crate::errors::Result<Target> {
        if self.benchmarks.contains_key(name) {
            Ok(Target::Benchmark(name.to_string()))
        } else if self.controls.contains_key(name) {
            Ok(Target::Control(name.to_string()))
        } else if self.dashboards.contains_key(name) {
            Ok(Target::Dashboard(name.to_string()))
        } else {
            Err(crate::errors::ChecktreeError::ResourceNotFound(
                name.to_string(),
            ))
        }
    }

    /// Number of leaves (controls) in a benchmark's subtree.
    ///
    /// Used to prune branches that would contribute nothing to the result
    /// tree. The hierarchy is validated acyclic, so recursion terminates.
    pub fn benchmark_leaf_count(&self, name: &str) -> usize {
        let Some(benchmark) = self.benchmarks.get(name) else {
            return 0;
        };
        benchmark
            .children
            .iter()
            .map(|child| {
                if self.controls.contains_key(child) {
                    1
                } else {
                    self.benchmark_leaf_count(child)
                }
            })
            .sum()
    }
}

/// Convert a TOML fixture value to a typed cell value.
pub(crate) fn value_to_cell(value: &toml::Value) -> CellValue {
    match value {
        toml::Value::String(s) => CellValue::Text(s.clone()),
        toml::Value::Integer(i) => CellValue::Integer(*i),
        toml::Value::Float(f) => CellValue::Float(*f),
        toml::Value::Boolean(b) => CellValue::Bool(*b),
        other => CellValue::Text(other.to_string()),
    }
}

/// Build a [`QueryResult`] from a raw fixture section.
pub(crate) fn fixture_to_result(fixture: &RawResultFixture) -> QueryResult {
    let mut columns = fixture.columns.clone();
    let rows: Vec<Row> = fixture
        .rows
        .iter()
        .map(|raw_row| {
            let mut row = Row::default();
            for (column, value) in raw_row {
                if !columns.contains(column) {
                    columns.push(column.clone());
                }
                row.cells.insert(column.clone(), value_to_cell(value));
            }
            row
        })
        .collect();
    QueryResult { columns, rows }
}
