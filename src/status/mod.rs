// src/status/mod.rs

//! Status domain for control results.
//!
//! - [`summary`] holds the per-row [`Status`] and the [`StatusSummary`]
//!   counter vector that is merged bottom-up through the result tree.
//! - [`events`] holds the progress-event sink used purely for
//!   observability (it is not part of the correctness protocol).

pub mod events;
pub mod summary;

pub use events::{EventSink, NoopSink, RunEvent, TracingSink};
pub use summary::{merge_severity, SeveritySummary, Status, StatusSummary};
