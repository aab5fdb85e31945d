// src/workspace/mod.rs

//! Workspace resource definitions.
//!
//! A workspace file declares the named, tagged container/leaf resources the
//! execution tree is built from:
//!
//! - `[control.<name>]`: a single executable check
//! - `[benchmark.<name>]`: a grouping of controls and/or other benchmarks
//! - `[dashboard.<name>]`: a grouping of panels
//! - `[panel.<name>]`: a dashboard leaf, optionally depending on withs
//! - `[with.<name>]`: an auxiliary query whose output other leaves consume
//! - `[result.<name>]`: fixture rows for the built-in static query client
//!
//! [`model`] holds the raw (serde) and validated forms, [`loader`] reads
//! TOML from disk, and [`validate`] implements the raw→validated
//! conversion (name resolution, duplicate detection, hierarchy cycles).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{load_and_validate, load_from_path};
pub use model::{
    BenchmarkDef, ControlDef, DashboardDef, PanelDef, RawBenchmark, RawControl, RawDashboard,
    RawPanel, RawResultFixture, RawWith, RawWorkspaceFile, Target, WithDef, Workspace,
};
