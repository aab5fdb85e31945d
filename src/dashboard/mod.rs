// src/dashboard/mod.rs

//! Dashboard leaves and the runtime-dependency protocol.
//!
//! [`panel_run`] executes panels and with-runs, publishing terminal
//! outcomes over watch channels; [`template`] parses and substitutes the
//! `${with.<name>.<column>}` references that tie subscribers to
//! publishers.

pub mod panel_run;
pub mod template;

pub use panel_run::{PanelKind, PanelOutcome, PanelRun};
pub use template::WithRef;
