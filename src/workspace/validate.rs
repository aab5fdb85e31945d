// src/workspace/validate.rs

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;

use crate::dashboard::template;
use crate::errors::{ChecktreeError, Result};
use crate::workspace::model::{
    fixture_to_result, BenchmarkDef, ControlDef, DashboardDef, PanelDef, RawWorkspaceFile, WithDef,
    Workspace,
};

impl TryFrom<RawWorkspaceFile> for Workspace {
    type Error = ChecktreeError;

    fn try_from(raw: RawWorkspaceFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_workspace(&raw)?;
        Ok(build_workspace(raw))
    }
}

fn validate_raw_workspace(raw: &RawWorkspaceFile) -> Result<()> {
    ensure_has_resources(raw)?;
    validate_unique_names(raw)?;
    validate_benchmark_children(raw)?;
    validate_benchmark_hierarchy(raw)?;
    validate_dashboards(raw)?;
    Ok(())
}

fn ensure_has_resources(raw: &RawWorkspaceFile) -> Result<()> {
    if raw.control.is_empty() && raw.benchmark.is_empty() && raw.dashboard.is_empty() {
        return Err(ChecktreeError::WorkspaceError(
            "workspace must contain at least one [control.<name>], [benchmark.<name>] \
             or [dashboard.<name>] section"
                .to_string(),
        ));
    }
    Ok(())
}

/// Resource names must be unique across every section so that a bare name
/// (in `children`, `panels`, `with` or a CLI target) is unambiguous, and so
/// the leaf index of the execution tree stays collision-free.
fn validate_unique_names(raw: &RawWorkspaceFile) -> Result<()> {
    let mut seen: HashMap<&str, &str> = HashMap::new();
    let sections: [(&str, Vec<&String>); 5] = [
        ("control", raw.control.keys().collect()),
        ("benchmark", raw.benchmark.keys().collect()),
        ("dashboard", raw.dashboard.keys().collect()),
        ("panel", raw.panel.keys().collect()),
        ("with", raw.with.keys().collect()),
    ];

    for (section, names) in sections {
        for name in names {
            if let Some(previous) = seen.insert(name.as_str(), section) {
                return Err(ChecktreeError::WorkspaceError(format!(
                    "resource name '{name}' is declared both as [{previous}.{name}] \
                     and [{section}.{name}]"
                )));
            }
        }
    }
    Ok(())
}

fn validate_benchmark_children(raw: &RawWorkspaceFile) -> Result<()> {
    for (name, benchmark) in raw.benchmark.iter() {
        for child in benchmark.children.iter() {
            if child == name {
                return Err(ChecktreeError::WorkspaceError(format!(
                    "benchmark '{name}' cannot include itself in `children`"
                )));
            }
            if !raw.benchmark.contains_key(child) && !raw.control.contains_key(child) {
                return Err(ChecktreeError::WorkspaceError(format!(
                    "benchmark '{name}' has unknown child '{child}' \
                     (expected a benchmark or control name)"
                )));
            }
        }
    }
    Ok(())
}

fn validate_benchmark_hierarchy(raw: &RawWorkspaceFile) -> Result<()> {
    // Edge direction: parent benchmark -> child benchmark.
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();

    for name in raw.benchmark.keys() {
        graph.add_node(name.as_str());
    }

    for (name, benchmark) in raw.benchmark.iter() {
        for child in benchmark.children.iter() {
            if raw.benchmark.contains_key(child) {
                graph.add_edge(name.as_str(), child.as_str(), ());
            }
        }
    }

    // A topological sort fails exactly when the inclusion graph has a cycle.
    match toposort(&graph, None) {
        Ok(_order) => Ok(()),
        Err(cycle) => {
            let node = cycle.node_id();
            Err(ChecktreeError::BenchmarkCycle(format!(
                "cycle detected in benchmark hierarchy involving '{node}'"
            )))
        }
    }
}

/// Validate dashboards, panels and with references.
///
/// Runtime references (`${with.<name>.<column>}`) must name a with that is
/// declared by some panel of the same dashboard: the runtime protocol can
/// only subscribe to publishers inside the enclosing dashboard's scope.
/// NOTE: reference *cycles* among withs are deliberately not detected here
/// or at runtime; a cyclic declaration will block until the run deadline.
fn validate_dashboards(raw: &RawWorkspaceFile) -> Result<()> {
    for (panel_name, panel) in raw.panel.iter() {
        for with_name in panel.withs.iter() {
            if !raw.with.contains_key(with_name) {
                return Err(ChecktreeError::WorkspaceError(format!(
                    "panel '{panel_name}' declares unknown with '{with_name}'"
                )));
            }
        }
    }

    // a panel belongs to exactly one dashboard; sharing would make its
    // with-run scope ambiguous
    let mut panel_owner: std::collections::HashMap<&str, &str> = std::collections::HashMap::new();
    for (dashboard_name, dashboard) in raw.dashboard.iter() {
        for panel_name in dashboard.panels.iter() {
            if let Some(previous) = panel_owner.insert(panel_name, dashboard_name) {
                return Err(ChecktreeError::WorkspaceError(format!(
                    "panel '{panel_name}' appears in dashboards '{previous}' \
                     and '{dashboard_name}'; a panel may belong to only one dashboard"
                )));
            }
        }
    }

    for (dashboard_name, dashboard) in raw.dashboard.iter() {
        let mut scope: HashSet<&str> = HashSet::new();
        for panel_name in dashboard.panels.iter() {
            let Some(panel) = raw.panel.get(panel_name) else {
                return Err(ChecktreeError::WorkspaceError(format!(
                    "dashboard '{dashboard_name}' references unknown panel '{panel_name}'"
                )));
            };
            scope.extend(panel.withs.iter().map(String::as_str));
        }

        // every runtime reference used inside this dashboard must resolve
        // to a with declared somewhere in the dashboard's scope
        for panel_name in dashboard.panels.iter() {
            let panel = &raw.panel[panel_name];
            let mut queries: Vec<(&str, &str)> = Vec::new();
            if let Some(query) = panel.query.as_deref() {
                queries.push((panel_name.as_str(), query));
            }
            for with_name in panel.withs.iter() {
                queries.push((with_name.as_str(), raw.with[with_name].query.as_str()));
            }

            for (owner, query) in queries {
                for reference in template::references(query) {
                    if !scope.contains(reference.with_name.as_str()) {
                        return Err(ChecktreeError::WorkspaceError(format!(
                            "'{owner}' references '${{with.{}.{}}}' but with \
                             '{}' is not declared by any panel of dashboard \
                             '{dashboard_name}'",
                            reference.with_name, reference.column, reference.with_name
                        )));
                    }
                }
            }
        }
    }
    Ok(())
}

fn build_workspace(raw: RawWorkspaceFile) -> Workspace {
    let controls: BTreeMap<String, Arc<ControlDef>> = raw
        .control
        .iter()
        .map(|(name, c)| {
            (
                name.clone(),
                Arc::new(ControlDef {
                    name: name.clone(),
                    query: c.query.clone(),
                    title: c.title.clone(),
                    description: c.description.clone(),
                    documentation: c.documentation.clone(),
                    display: c.display.clone(),
                    severity: c.severity.clone(),
                    status_column: c.status_column.clone(),
                    tags: c.tags.clone(),
                }),
            )
        })
        .collect();

    let benchmarks: BTreeMap<String, BenchmarkDef> = raw
        .benchmark
        .iter()
        .map(|(name, b)| {
            (
                name.clone(),
                BenchmarkDef {
                    name: name.clone(),
                    children: b.children.clone(),
                    title: b.title.clone(),
                    description: b.description.clone(),
                    documentation: b.documentation.clone(),
                    display: b.display.clone(),
                    tags: b.tags.clone(),
                },
            )
        })
        .collect();

    let dashboards: BTreeMap<String, DashboardDef> = raw
        .dashboard
        .iter()
        .map(|(name, d)| {
            (
                name.clone(),
                DashboardDef {
                    name: name.clone(),
                    panels: d.panels.clone(),
                    title: d.title.clone(),
                    description: d.description.clone(),
                    tags: d.tags.clone(),
                },
            )
        })
        .collect();

    let panels: BTreeMap<String, Arc<PanelDef>> = raw
        .panel
        .iter()
        .map(|(name, p)| {
            (
                name.clone(),
                Arc::new(PanelDef {
                    name: name.clone(),
                    query: p.query.clone(),
                    title: p.title.clone(),
                    withs: p.withs.clone(),
                    tags: p.tags.clone(),
                }),
            )
        })
        .collect();

    let withs: BTreeMap<String, Arc<WithDef>> = raw
        .with
        .iter()
        .map(|(name, w)| {
            (
                name.clone(),
                Arc::new(WithDef {
                    name: name.clone(),
                    query: w.query.clone(),
                }),
            )
        })
        .collect();

    // fixtures: keyed by the query text they answer; default key is the
    // like-named resource's query
    let mut fixtures = HashMap::new();
    for (name, fixture) in raw.result.iter() {
        let key = fixture
            .query
            .clone()
            .or_else(|| controls.get(name).map(|c| c.query.clone()))
            .or_else(|| withs.get(name).map(|w| w.query.clone()))
            .or_else(|| panels.get(name).and_then(|p| p.query.clone()));
        if let Some(key) = key {
            fixtures.insert(key, fixture_to_result(fixture));
        }
    }

    Workspace {
        controls,
        benchmarks,
        dashboards,
        panels,
        withs,
        fixtures,
    }
}
