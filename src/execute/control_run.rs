// src/execute/control_run.rs

//! Execution of a single control check.
//!
//! A control run executes its query once, maps each result row's status
//! column into the five-way status vocabulary, and reports the resulting
//! summary (plus severity and dimension columns) to every parent group.
//! Terminal transitions are exactly-once: the first of complete / error /
//! skip wins and later attempts are ignored.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::debug;

use crate::execute::group::GroupIndex;
use crate::execute::{run_query, ExecError, LeafState, RunEnv, RunStatus};
use crate::query::QueryResult;
use crate::status::{RunEvent, Status, StatusSummary};

/// Result-row columns that never count as dimensions.
const RESERVED_COLUMNS: [&str; 2] = ["reason", "resource"];

pub struct ControlRun {
    pub name: String,
    pub control: Arc<crate::workspace::ControlDef>,
    /// Groups this run reports to; more than one when the control is
    /// shared across benchmarks.
    pub parents: Vec<GroupIndex>,
    state: Mutex<LeafState>,
}

impl ControlRun {
    pub fn new(control: Arc<crate::workspace::ControlDef>, parents: Vec<GroupIndex>) -> Arc<Self> {
        Arc::new(Self {
            name: control.name.clone(),
            control,
            parents,
            state: Mutex::new(LeafState::default()),
        })
    }

    fn lock_state(&self) -> MutexGuard<'_, LeafState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn status(&self) -> RunStatus {
        self.lock_state().status
    }

    pub fn summary(&self) -> StatusSummary {
        self.lock_state().summary
    }

    pub fn error(&self) -> Option<ExecError> {
        self.lock_state().error.clone()
    }

    pub fn data(&self) -> Option<QueryResult> {
        self.lock_state().data.clone()
    }

    /// Run the control's query and record the outcome.
    ///
    /// The caller holds the limiter permit for the duration of this call,
    /// converts escaped panics into `set_error`, and handles dry runs by
    /// skipping the leaf without ever calling this.
    pub async fn execute(&self, env: &RunEnv) {
        if env.ctx.is_cancelled() {
            self.set_error(env, env.ctx.cancellation_error());
            return;
        }

        {
            let mut state = self.lock_state();
            if state.status.is_finished() {
                return;
            }
            state.status = RunStatus::Running;
        }
        env.events.publish(RunEvent::ControlStarted {
            name: self.name.clone(),
        });
        debug!(control = %self.name, query = %self.control.query, "executing control");

        match run_query(env, &self.control.query).await {
            Ok(result) => self.set_complete(env, result),
            Err(error) => self.set_error(env, error),
        }
    }

    /// Record successful execution, mapping rows to statuses.
    fn set_complete(&self, env: &RunEnv, result: QueryResult) {
        let (summary, dimensions) = map_result(&self.control, &result);
        {
            let mut state = self.lock_state();
            if state.status.is_finished() {
                return;
            }
            state.status = RunStatus::Complete;
            state.summary = summary;
            state.data = Some(result);
        }
        env.events.publish(RunEvent::ControlComplete {
            name: self.name.clone(),
            summary,
        });
        self.report(env, &summary, &dimensions);
    }

    /// Record a failed execution as a single error-status result.
    pub(crate) fn set_error(&self, env: &RunEnv, error: ExecError) {
        let summary = StatusSummary::of(Status::Error);
        {
            let mut state = self.lock_state();
            if state.status.is_finished() {
                return;
            }
            state.status = RunStatus::Error;
            state.summary = summary;
            state.error = Some(error.clone());
        }
        env.events.publish(RunEvent::ControlError {
            name: self.name.clone(),
            error: error.to_string(),
        });
        self.report(env, &summary, &[]);
    }

    /// Record a skipped execution (dry-run) as a single skip-status result.
    pub(crate) fn skip(&self, env: &RunEnv) {
        let summary = StatusSummary::of(Status::Skip);
        {
            let mut state = self.lock_state();
            if state.status.is_finished() {
                return;
            }
            state.status = RunStatus::Skipped;
            state.summary = summary;
        }
        env.events.publish(RunEvent::ControlComplete {
            name: self.name.clone(),
            summary,
        });
        self.report(env, &summary, &[]);
    }

    /// Push the terminal summary into every parent group and mark this
    /// child done there. Called exactly once per run.
    fn report(&self, env: &RunEnv, summary: &StatusSummary, dimensions: &[String]) {
        for &parent in &self.parents {
            env.tree.update_summary(parent, summary);
            if let Some(severity) = &self.control.severity {
                env.tree.update_severity(parent, severity, summary);
            }
            env.tree.add_dimension_keys(parent, dimensions);
            env.tree.child_done(parent);
        }
    }
}

/// Map result rows to a status summary and collect dimension columns.
///
/// A row whose status cell is missing or not one of the five known values
/// counts as an error row. Dimension columns are every result column other
/// than the status column and the reserved reason/resource columns.
fn map_result(
    control: &crate::workspace::ControlDef,
    result: &QueryResult,
) -> (StatusSummary, Vec<String>) {
    let status_column = control.effective_status_column();

    let mut summary = StatusSummary::default();
    for row in &result.rows {
        let status = row
            .cells
            .get(status_column)
            .and_then(|cell| cell.as_text())
            .and_then(|text| text.parse::<Status>().ok())
            .unwrap_or(Status::Error);
        summary.add(status);
    }

    let dimensions: Vec<String> = result
        .columns
        .iter()
        .filter(|col| col.as_str() != status_column && !RESERVED_COLUMNS.contains(&col.as_str()))
        .cloned()
        .collect();

    (summary, dimensions)
}
