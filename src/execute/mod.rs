// src/execute/mod.rs

//! The execution engine.
//!
//! - [`group`] holds the result-group arena: per-node aggregates, the
//!   atomic completed-children counters and upward propagation.
//! - [`control_run`] executes a single control check against the query
//!   service and maps result rows to statuses.
//! - [`tree`] builds the whole execution tree from workspace resources,
//!   owns the global parallelism limiter and drives dispatch.
//!
//! Concurrency model: group-tree traversal is synchronous; only leaves run
//! as spawned tasks, bounded globally by the limiter. Every leaf reports
//! exactly once to each of its parent groups on reaching a terminal state.

use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;

use crate::query::{QueryClient, QueryError, QueryResult};
use crate::status::{EventSink, StatusSummary};

pub mod control_run;
pub mod group;
pub mod tree;

pub use control_run::ControlRun;
pub use group::{GroupIndex, GroupTree, TreeChild};
pub use tree::{ExecutionTree, TreeNode};

use crate::dashboard::PanelRun;

/// Execution state of a single leaf.
///
/// `Blocked` is only entered by leaves participating in the
/// runtime-dependency protocol while they await a publisher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    NotStarted,
    Blocked,
    Running,
    Complete,
    Error,
    Skipped,
}

impl RunStatus {
    pub fn is_finished(self) -> bool {
        matches!(
            self,
            RunStatus::Complete | RunStatus::Error | RunStatus::Skipped
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::NotStarted => "not_started",
            RunStatus::Blocked => "blocked",
            RunStatus::Running => "running",
            RunStatus::Complete => "complete",
            RunStatus::Error => "error",
            RunStatus::Skipped => "skipped",
        }
    }
}

/// Mutable per-leaf state, guarded by the leaf's own lock.
///
/// A leaf holds either result data or an error, never both.
#[derive(Debug)]
pub(crate) struct LeafState {
    pub status: RunStatus,
    pub data: Option<QueryResult>,
    pub error: Option<ExecError>,
    pub summary: StatusSummary,
}

impl Default for LeafState {
    fn default() -> Self {
        Self {
            status: RunStatus::NotStarted,
            data: None,
            error: None,
            summary: StatusSummary::default(),
        }
    }
}

/// Failure taxonomy for leaf execution.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExecError {
    /// The run's context was cancelled before or during this leaf.
    #[error("execution was cancelled")]
    Cancelled,

    /// The run's deadline expired before this leaf started.
    #[error("execution timed out before this node started")]
    TimedOut,

    /// The query service failed executing a resolved statement.
    #[error(transparent)]
    Query(#[from] QueryError),

    /// A referenced with-leaf failed; its error propagates to dependents.
    #[error("dependency '{name}' failed: {source}")]
    Dependency {
        name: String,
        #[source]
        source: Box<ExecError>,
    },

    /// Runtime references could not be substituted from published data.
    #[error("failed to resolve runtime dependencies: {0}")]
    Resolution(String),

    /// A panic escaped leaf execution and was converted at the dispatch
    /// boundary.
    #[error("execution panicked: {0}")]
    Panic(String),
}

/// Cancellable context governing one whole run.
///
/// Cancellation comes from an explicit signal (Ctrl-C) or from the run
/// deadline; the two are distinguished so error messages can say which.
#[derive(Debug, Clone)]
pub struct RunContext {
    token: CancellationToken,
    timed_out: Arc<AtomicBool>,
}

impl RunContext {
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            timed_out: Arc::new(AtomicBool::new(false)),
        }
    }

    /// A context that cancels itself when `timeout` elapses.
    ///
    /// Must be called from within a tokio runtime when a timeout is given.
    pub fn with_timeout(timeout: Option<Duration>) -> Self {
        let ctx = Self::new();
        if let Some(timeout) = timeout {
            let token = ctx.token.clone();
            let timed_out = ctx.timed_out.clone();
            tokio::spawn(async move {
                tokio::time::sleep(timeout).await;
                timed_out.store(true, Ordering::SeqCst);
                token.cancel();
            });
        }
        ctx
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub async fn cancelled(&self) {
        self.token.cancelled().await;
    }

    pub fn timed_out(&self) -> bool {
        self.timed_out.load(Ordering::SeqCst)
    }

    /// The error a leaf records when it never got to run.
    pub fn cancellation_error(&self) -> ExecError {
        if self.timed_out() {
            ExecError::TimedOut
        } else {
            ExecError::Cancelled
        }
    }
}

impl Default for RunContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared, read-only environment handed to every executing leaf.
pub struct RunEnv {
    pub ctx: RunContext,
    pub client: Arc<dyn QueryClient>,
    pub limiter: Arc<Semaphore>,
    pub tree: Arc<GroupTree>,
    pub events: Arc<dyn EventSink>,
    /// Unique-name index of every run in the tree (controls, panels and
    /// with-runs), used for publish/subscribe lookups.
    pub runs: std::collections::HashMap<String, LeafHandle>,
    pub dry_run: bool,
}

/// A leaf of the execution tree: either a plain control check or a
/// dashboard-style panel participating in the runtime-dependency protocol.
///
/// A leaf included by multiple parents is represented once and referenced
/// from each parent group (it executes once, reports to every parent).
#[derive(Clone)]
pub enum LeafHandle {
    Control(Arc<ControlRun>),
    Panel(Arc<PanelRun>),
}

impl LeafHandle {
    pub fn name(&self) -> &str {
        match self {
            LeafHandle::Control(run) => &run.name,
            LeafHandle::Panel(run) => &run.name,
        }
    }

    pub fn status(&self) -> RunStatus {
        match self {
            LeafHandle::Control(run) => run.status(),
            LeafHandle::Panel(run) => run.status(),
        }
    }

    pub fn summary(&self) -> StatusSummary {
        match self {
            LeafHandle::Control(run) => run.summary(),
            LeafHandle::Panel(run) => run.summary(),
        }
    }

    pub fn error(&self) -> Option<ExecError> {
        match self {
            LeafHandle::Control(run) => run.error(),
            LeafHandle::Panel(run) => run.error(),
        }
    }

    pub fn node_type(&self) -> &'static str {
        match self {
            LeafHandle::Control(_) => "control",
            LeafHandle::Panel(run) => run.node_type(),
        }
    }

    pub(crate) fn fail(&self, env: &RunEnv, error: ExecError) {
        match self {
            LeafHandle::Control(run) => run.set_error(env, error),
            LeafHandle::Panel(run) => run.set_error(env, error),
        }
    }

    pub(crate) fn skip(&self, env: &RunEnv) {
        match self {
            LeafHandle::Control(run) => run.skip(env),
            LeafHandle::Panel(run) => run.skip(env),
        }
    }
}

/// Acquire one unit from the global limiter, or bail out early if the run
/// context is cancelled while waiting.
pub(crate) async fn acquire_permit(env: &RunEnv) -> Result<OwnedSemaphorePermit, ExecError> {
    tokio::select! {
        permit = env.limiter.clone().acquire_owned() => {
            permit.map_err(|_| ExecError::Cancelled)
        }
        _ = env.ctx.cancelled() => Err(env.ctx.cancellation_error()),
    }
}

/// Execute a resolved statement against the query service, translating
/// cancellation into the appropriate error flavour.
pub(crate) async fn run_query(env: &RunEnv, sql: &str) -> Result<QueryResult, ExecError> {
    if env.ctx.is_cancelled() {
        return Err(env.ctx.cancellation_error());
    }

    let started = Instant::now();
    tokio::select! {
        result = env.client.execute_sync(sql) => result.map_err(ExecError::from),
        _ = env.ctx.cancelled() => {
            if env.ctx.timed_out() {
                Err(ExecError::Query(QueryError::Timeout {
                    elapsed_secs: started.elapsed().as_secs_f64(),
                }))
            } else {
                Err(ExecError::Cancelled)
            }
        }
    }
}

/// Extract a readable message from a caught panic payload.
pub(crate) fn panic_message(payload: &Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic with non-string payload".to_string()
    }
}
