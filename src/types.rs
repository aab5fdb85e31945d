// src/types.rs

use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use crate::status::StatusSummary;

/// How results are printed once the run finishes.
///
/// - `Summary`: aggregate counters per top-level group plus the root total.
/// - `Tree`: indented tree of groups and leaves with per-node status.
/// - `Json`: the exported tree shape serialized as JSON.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    Summary,
    Tree,
    Json,
}

impl Default for OutputMode {
    fn default() -> Self {
        OutputMode::Summary
    }
}

impl FromStr for OutputMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "summary" => Ok(OutputMode::Summary),
            "tree" => Ok(OutputMode::Tree),
            "json" => Ok(OutputMode::Json),
            other => Err(format!(
                "invalid output mode: {other} (expected \"summary\", \"tree\" or \"json\")"
            )),
        }
    }
}

/// Immutable configuration for a single execution run.
///
/// This is passed into `ExecutionTree` construction instead of being read
/// from mutable global state, so a tree's behaviour is fixed at build time.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Mark every leaf as skipped instead of executing it.
    pub dry_run: bool,
    /// Capacity of the global parallelism limiter (concurrent query calls).
    pub max_parallel: usize,
    /// Overall deadline for the run; `None` means no deadline.
    pub timeout: Option<Duration>,
    /// Output rendering mode.
    pub output: OutputMode,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            dry_run: false,
            max_parallel: 10,
            timeout: None,
            output: OutputMode::Summary,
        }
    }
}

/// Overall outcome of a run, derived from the root summary.
///
/// Errors take precedence over alarms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// No alarms and no errors.
    Clean,
    /// One or more alarms, no errors.
    Alarms,
    /// One or more control errors.
    Errors,
}

impl RunOutcome {
    pub fn from_summary(summary: &StatusSummary) -> Self {
        if summary.error > 0 {
            RunOutcome::Errors
        } else if summary.alarm > 0 {
            RunOutcome::Alarms
        } else {
            RunOutcome::Clean
        }
    }

    /// Process exit code contract:
    /// 0 = clean, 1 = alarms but no errors, 2 = errors, 3+ = runtime failure.
    pub fn exit_code(self) -> i32 {
        match self {
            RunOutcome::Clean => 0,
            RunOutcome::Alarms => 1,
            RunOutcome::Errors => 2,
        }
    }
}
