// src/dashboard/panel_run.rs

//! Panel and with-run execution.
//!
//! Panels and their with-children share one run type; both publish a
//! terminal outcome on a watch channel exactly once. Subscribers wait on
//! the publisher's channel for a terminal value, never for intermediate
//! state, so subscription ordering races cannot be observed: a late
//! subscriber simply finds the value already there.
//!
//! Lifecycle: with-children are spawned first, then the run blocks on the
//! publishers its own query references, substitutes their outputs into the
//! query text, executes, and finally waits for all of its with-children to
//! finish before reaching its own terminal state. A child error becomes a
//! dependency error on the parent.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::FutureExt;
use tokio::sync::{oneshot, watch};
use tracing::debug;

use crate::dashboard::template;
use crate::execute::group::GroupIndex;
use crate::execute::{
    acquire_permit, panic_message, run_query, ExecError, LeafHandle, LeafState, RunEnv, RunStatus,
};
use crate::query::QueryResult;
use crate::status::{RunEvent, Status, StatusSummary};
use crate::workspace::{PanelDef, WithDef};

/// Whether a run is a dashboard panel or an auxiliary with-run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanelKind {
    Panel,
    With,
}

/// The single terminal value a run publishes to its subscribers.
#[derive(Debug, Clone)]
pub enum PanelOutcome {
    Complete(QueryResult),
    Error(ExecError),
    Skipped,
}

pub struct PanelRun {
    pub name: String,
    pub title: Option<String>,
    pub kind: PanelKind,
    /// Raw query text, possibly containing `${with.*}` references.
    query: Option<String>,
    /// Names of the withs this run's own query references.
    depends_on: Vec<String>,
    /// With-runs declared as children of this run.
    pub with_runs: Vec<Arc<PanelRun>>,
    /// Groups this run reports to; empty for with-runs, which are not
    /// part of the result tree.
    pub parents: Vec<GroupIndex>,
    /// Query text after runtime-reference substitution.
    resolved_query: Mutex<Option<String>>,
    /// Guards against double execution when a shared with-run is spawned
    /// by more than one declaring parent.
    started: AtomicBool,
    state: Mutex<LeafState>,
    publish: watch::Sender<Option<PanelOutcome>>,
}

impl PanelRun {
    pub fn new_panel(
        def: &PanelDef,
        with_runs: Vec<Arc<PanelRun>>,
        parents: Vec<GroupIndex>,
    ) -> Arc<Self> {
        Self::new(
            def.name.clone(),
            def.title.clone(),
            PanelKind::Panel,
            def.query.clone(),
            with_runs,
            parents,
        )
    }

    pub fn new_with(def: &WithDef) -> Arc<Self> {
        Self::new(
            def.name.clone(),
            None,
            PanelKind::With,
            Some(def.query.clone()),
            Vec::new(),
            Vec::new(),
        )
    }

    fn new(
        name: String,
        title: Option<String>,
        kind: PanelKind,
        query: Option<String>,
        with_runs: Vec<Arc<PanelRun>>,
        parents: Vec<GroupIndex>,
    ) -> Arc<Self> {
        let depends_on: Vec<String> = query
            .as_deref()
            .map(|text| {
                template::references(text)
                    .into_iter()
                    .map(|r| r.with_name)
                    .collect()
            })
            .unwrap_or_default();

        // queries without runtime references are resolved eagerly
        let resolved = match &query {
            Some(text) if depends_on.is_empty() => Some(text.clone()),
            _ => None,
        };

        let (publish, _) = watch::channel(None);
        Arc::new(Self {
            name,
            title,
            kind,
            query,
            depends_on,
            with_runs,
            parents,
            resolved_query: Mutex::new(resolved),
            started: AtomicBool::new(false),
            state: Mutex::new(LeafState::default()),
            publish,
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

    pub fn node_type(&self) -> &'static str {
        match self.kind {
            PanelKind::Panel => "panel",
            PanelKind::With => "with",
        }
    }

    /// The fully substituted statement, once dependencies have resolved.
    pub fn resolved_query(&self) -> Option<String> {
        self.resolved_query
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Subscribe to this run's terminal outcome. The channel holds `None`
    /// until the run publishes, then holds the outcome forever.
    pub fn subscribe(&self) -> watch::Receiver<Option<PanelOutcome>> {
        self.publish.subscribe()
    }

    /// Drive this run to a terminal state.
    ///
    /// Idempotent under double spawn: only the first caller executes.
    /// Panics are converted to errors by [`spawn_panel`], which is the only
    /// production entry point.
    pub async fn execute(&self, env: &Arc<RunEnv>) {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }
        if self.status().is_finished() {
            return;
        }
        if env.ctx.is_cancelled() {
            self.set_error(env, env.ctx.cancellation_error());
            return;
        }

        // start children before anything can block on them
        for with_run in &self.with_runs {
            spawn_panel(with_run.clone(), env.clone());
        }
        let children_done = self.wait_for_children();

        if let Err(error) = self.evaluate_runtime_dependencies(env).await {
            self.set_error(env, error);
            return;
        }

        {
            let mut state = self.lock_state();
            if state.status.is_finished() {
                return;
            }
            state.status = RunStatus::Running;
        }
        env.events.publish(RunEvent::PanelRunning {
            name: self.name.clone(),
        });

        if let Some(sql) = self.resolved_query() {
            // The permit is scoped to the query call itself: holding it
            // while blocked on a publisher could starve that publisher of
            // capacity.
            let permit = match acquire_permit(env).await {
                Ok(permit) => permit,
                Err(error) => {
                    self.set_error(env, error);
                    return;
                }
            };
            debug!(panel = %self.name, query = %sql, "executing panel query");
            let outcome = run_query(env, &sql).await;
            drop(permit);

            match outcome {
                Ok(data) => {
                    self.lock_state().data = Some(data);
                }
                Err(error) => {
                    self.set_error(env, error);
                    return;
                }
            }
        }

        // a run is not complete until every declared child is
        match children_done.await {
            Ok(Some(error)) => self.set_error(env, error),
            Ok(None) | Err(_) => self.set_complete(env),
        }
    }

    /// Fan every with-child's terminal outcome into a single value: the
    /// first child error, or `None` when all children finished cleanly.
    ///
    /// Waits on the children's publish channels rather than their task
    /// handles, so a child started by another declaring parent is awaited
    /// correctly.
    fn wait_for_children(&self) -> oneshot::Receiver<Option<ExecError>> {
        let (tx, rx) = oneshot::channel();
        let children = self.with_runs.clone();
        tokio::spawn(async move {
            let mut first_error = None;
            for child in children {
                let mut outcome_rx = child.subscribe();
                let outcome = outcome_rx.wait_for(|value| value.is_some()).await;
                if first_error.is_some() {
                    continue;
                }
                if let Ok(value) = outcome {
                    if let Some(PanelOutcome::Error(error)) = value.clone() {
                        first_error = Some(ExecError::Dependency {
                            name: child.name.clone(),
                            source: Box::new(error),
                        });
                    }
                }
            }
            let _ = tx.send(first_error);
        });
        rx
    }

    /// Block on every publisher this run's query references, then
    /// substitute their published values into the query text.
    async fn evaluate_runtime_dependencies(&self, env: &Arc<RunEnv>) -> Result<(), ExecError> {
        if self.depends_on.is_empty() {
            return Ok(());
        }

        let mut publishers = Vec::with_capacity(self.depends_on.len());
        for name in &self.depends_on {
            let Some(LeafHandle::Panel(publisher)) = env.runs.get(name) else {
                return Err(ExecError::Resolution(format!(
                    "no publisher named '{name}' in this execution"
                )));
            };
            publishers.push((name, publisher.clone()));
        }

        // only report Blocked while something is actually unresolved
        let unresolved = publishers
            .iter()
            .any(|(_, publisher)| publisher.subscribe().borrow().is_none());
        if unresolved {
            {
                let mut state = self.lock_state();
                if state.status.is_finished() {
                    return Ok(());
                }
                state.status = RunStatus::Blocked;
            }
            env.events.publish(RunEvent::PanelBlocked {
                name: self.name.clone(),
            });
        }

        let mut published: HashMap<String, QueryResult> = HashMap::new();
        for (name, publisher) in publishers {
            let mut outcome_rx = publisher.subscribe();
            let outcome = tokio::select! {
                result = outcome_rx.wait_for(|value| value.is_some()) => {
                    result.ok().and_then(|value| value.clone())
                }
                _ = env.ctx.cancelled() => return Err(env.ctx.cancellation_error()),
            };

            match outcome {
                Some(PanelOutcome::Complete(data)) => {
                    debug!(panel = %self.name, with = %name, "runtime dependency resolved");
                    published.insert(name.clone(), data);
                }
                Some(PanelOutcome::Error(error)) => {
                    return Err(ExecError::Dependency {
                        name: name.clone(),
                        source: Box::new(error),
                    });
                }
                Some(PanelOutcome::Skipped) => {
                    return Err(ExecError::Resolution(format!(
                        "with '{name}' was skipped and published no data"
                    )));
                }
                None => {
                    return Err(ExecError::Resolution(format!(
                        "publisher '{name}' closed without publishing"
                    )));
                }
            }
        }

        let text = self.query.as_deref().unwrap_or_default();
        let resolved = template::resolve(text, &published).map_err(ExecError::Resolution)?;
        *self
            .resolved_query
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(resolved);
        Ok(())
    }

    fn set_complete(&self, env: &RunEnv) {
        let summary = StatusSummary::of(Status::Ok);
        let data = {
            let mut state = self.lock_state();
            if state.status.is_finished() {
                return;
            }
            state.status = RunStatus::Complete;
            state.summary = summary;
            state.data.clone().unwrap_or_default()
        };
        self.publish.send_replace(Some(PanelOutcome::Complete(data)));
        env.events.publish(RunEvent::PanelComplete {
            name: self.name.clone(),
        });
        self.report(env, &summary);
    }

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
        self.publish
            .send_replace(Some(PanelOutcome::Error(error.clone())));
        env.events.publish(RunEvent::PanelError {
            name: self.name.clone(),
            error: error.to_string(),
        });
        self.report(env, &summary);
    }

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
        self.publish.send_replace(Some(PanelOutcome::Skipped));
        env.events.publish(RunEvent::PanelComplete {
            name: self.name.clone(),
        });
        self.report(env, &summary);
    }

    fn report(&self, env: &RunEnv, summary: &StatusSummary) {
        for &parent in &self.parents {
            env.tree.update_summary(parent, summary);
            env.tree.child_done(parent);
        }
    }
}

/// Spawn a panel/with run, converting an escaped panic into a terminal
/// error so the parent group's completion counter still fires.
pub(crate) fn spawn_panel(run: Arc<PanelRun>, env: Arc<RunEnv>) {
    tokio::spawn(async move {
        let result = AssertUnwindSafe(run.execute(&env)).catch_unwind().await;
        if let Err(payload) = result {
            run.set_error(&env, ExecError::Panic(panic_message(&payload)));
        }
    });
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::execute::group::{GroupMeta, GroupTree, GroupTreeBuilder};
    use crate::execute::RunContext;
    use crate::query::{CellValue, Row, StaticQueryClient};
    use crate::status::EventSink;
    use tokio::sync::Semaphore;

    #[derive(Default)]
    struct BlockedCounter(Mutex<u32>);

    impl EventSink for BlockedCounter {
        fn publish(&self, event: RunEvent) {
            if matches!(event, RunEvent::PanelBlocked { .. }) {
                *self.0.lock().unwrap() += 1;
            }
        }
    }

    fn one_cell_result() -> QueryResult {
        let mut cells = BTreeMap::new();
        cells.insert("x".to_string(), CellValue::Integer(1));
        QueryResult {
            columns: vec!["x".to_string()],
            rows: vec![Row { cells }],
        }
    }

    fn env_with(
        runs: HashMap<String, LeafHandle>,
        tree: GroupTree,
        sink: Arc<BlockedCounter>,
    ) -> Arc<RunEnv> {
        let mut fixtures = HashMap::new();
        fixtures.insert("select 1".to_string(), one_cell_result());
        Arc::new(RunEnv {
            ctx: RunContext::new(),
            client: Arc::new(StaticQueryClient::new(fixtures)),
            limiter: Arc::new(Semaphore::new(4)),
            tree: Arc::new(tree),
            events: sink,
            runs,
            dry_run: false,
        })
    }

    #[tokio::test]
    async fn blocked_is_not_reported_when_publishers_already_published() {
        let with_def = WithDef {
            name: "w".into(),
            query: "select 1".into(),
        };
        let w = PanelRun::new_with(&with_def);

        let panel_def = PanelDef {
            name: "p".into(),
            query: Some("select ${with.w.x}".into()),
            title: None,
            withs: vec!["w".into()],
            tags: BTreeMap::new(),
        };

        let mut builder = GroupTreeBuilder::new();
        let idx = builder.add_group(
            GroupMeta {
                group_id: "d".into(),
                node_type: "dashboard",
                ..GroupMeta::default()
            },
            GroupTree::root(),
        );
        let p = PanelRun::new_panel(&panel_def, vec![w.clone()], vec![idx]);
        builder.add_leaf(idx, "p");

        let mut runs = HashMap::new();
        runs.insert("w".to_string(), LeafHandle::Panel(w.clone()));
        runs.insert("p".to_string(), LeafHandle::Panel(p.clone()));
        let (tree, _done) = builder.build(&runs);

        let sink = Arc::new(BlockedCounter::default());
        let env = env_with(runs, tree, sink.clone());

        // publisher reaches its terminal state before the panel starts
        w.execute(&env).await;
        assert_eq!(w.status(), RunStatus::Complete);

        p.execute(&env).await;
        assert_eq!(p.status(), RunStatus::Complete);
        assert_eq!(*sink.0.lock().unwrap(), 0);
    }
}
