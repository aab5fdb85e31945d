#![allow(dead_code)]

use std::collections::BTreeMap;

use checktree::workspace::{
    RawBenchmark, RawControl, RawDashboard, RawPanel, RawWith, RawWorkspaceFile, Workspace,
};

/// Builder for `Workspace` to simplify test setup.
pub struct WorkspaceBuilder {
    raw: RawWorkspaceFile,
}

impl WorkspaceBuilder {
    pub fn new() -> Self {
        Self {
            raw: RawWorkspaceFile::default(),
        }
    }

    pub fn with_control(mut self, name: &str, control: RawControl) -> Self {
        self.raw.control.insert(name.to_string(), control);
        self
    }

    pub fn with_benchmark(mut self, name: &str, children: &[&str]) -> Self {
        self.raw.benchmark.insert(
            name.to_string(),
            RawBenchmark {
                children: children.iter().map(|c| c.to_string()).collect(),
                title: None,
                description: None,
                documentation: None,
                display: None,
                tags: BTreeMap::new(),
            },
        );
        self
    }

    pub fn with_dashboard(mut self, name: &str, panels: &[&str]) -> Self {
        self.raw.dashboard.insert(
            name.to_string(),
            RawDashboard {
                panels: panels.iter().map(|p| p.to_string()).collect(),
                title: None,
                description: None,
                tags: BTreeMap::new(),
            },
        );
        self
    }

    pub fn with_panel(mut self, name: &str, query: Option<&str>, withs: &[&str]) -> Self {
        self.raw.panel.insert(
            name.to_string(),
            RawPanel {
                query: query.map(str::to_string),
                title: None,
                withs: withs.iter().map(|w| w.to_string()).collect(),
                tags: BTreeMap::new(),
            },
        );
        self
    }

    pub fn with_with(mut self, name: &str, query: &str) -> Self {
        self.raw.with.insert(
            name.to_string(),
            RawWith {
                query: query.to_string(),
            },
        );
        self
    }

    pub fn raw(self) -> RawWorkspaceFile {
        self.raw
    }

    pub fn build(self) -> Workspace {
        Workspace::try_from(self.raw).expect("Failed to build valid workspace from builder")
    }
}

impl Default for WorkspaceBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `RawControl`.
pub struct ControlBuilder {
    control: RawControl,
}

impl ControlBuilder {
    pub fn new(query: &str) -> Self {
        Self {
            control: RawControl {
                query: query.to_string(),
                title: None,
                description: None,
                documentation: None,
                display: None,
                severity: None,
                status_column: None,
                tags: BTreeMap::new(),
            },
        }
    }

    pub fn severity(mut self, severity: &str) -> Self {
        self.control.severity = Some(severity.to_string());
        self
    }

    pub fn status_column(mut self, column: &str) -> Self {
        self.control.status_column = Some(column.to_string());
        self
    }

    pub fn tag(mut self, key: &str, value: &str) -> Self {
        self.control
            .tags
            .insert(key.to_string(), value.to_string());
        self
    }

    pub fn build(self) -> RawControl {
        self.control
    }
}
