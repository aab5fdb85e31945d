// src/cli.rs

//! CLI argument parsing using `clap`.
//!
//! NOTE: this expects `clap` to be built with the `derive` feature, e.g.:
//! `clap = { version = "4.5.53", features = ["derive"] }` in `Cargo.toml`.

use clap::{Parser, ValueEnum};

use crate::types::OutputMode;

/// Command-line arguments for `checktree`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "checktree",
    version,
    about = "Run hierarchical checks and dashboards, aggregating results up the tree.",
    long_about = None
)]
pub struct CliArgs {
    /// Names of benchmarks, controls or dashboards to run.
    #[arg(value_name = "TARGET", required = true)]
    pub targets: Vec<String>,

    /// Path to the workspace file (TOML).
    ///
    /// Default: `Checktree.toml` in the current working directory.
    #[arg(long, value_name = "PATH", default_value = "Checktree.toml")]
    pub workspace: String,

    /// Maximum number of concurrent query executions.
    #[arg(long, value_name = "N", default_value_t = 10)]
    pub max_parallel: usize,

    /// Overall run deadline in seconds. No deadline if omitted.
    #[arg(long, value_name = "SECONDS")]
    pub timeout: Option<u64>,

    /// Build the tree and mark every leaf skipped, without executing.
    #[arg(long)]
    pub dry_run: bool,

    /// Output format once the run finishes.
    #[arg(long, value_enum, value_name = "MODE", default_value = "summary")]
    pub output: OutputArg,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `CHECKTREE_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,
}

/// Output format as exposed on the CLI.
#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum OutputArg {
    Summary,
    Tree,
    Json,
}

impl From<OutputArg> for OutputMode {
    fn from(arg: OutputArg) -> Self {
        match arg {
            OutputArg::Summary => OutputMode::Summary,
            OutputArg::Tree => OutputMode::Tree,
            OutputArg::Json => OutputMode::Json,
        }
    }
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
