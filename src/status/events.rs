// src/status/events.rs

//! Progress-event sink.
//!
//! Completion events are published for observability (progress displays,
//! dashboards) and are deliberately kept outside the correctness protocol:
//! dropping every event must not change any result or any completion
//! signalling.

use tracing::{debug, info, warn};

use crate::status::StatusSummary;

/// Events raised as leaves progress through their lifecycle.
#[derive(Debug, Clone)]
pub enum RunEvent {
    ControlStarted {
        name: String,
    },
    ControlComplete {
        name: String,
        summary: StatusSummary,
    },
    ControlError {
        name: String,
        error: String,
    },
    /// A panel is waiting on one or more runtime-dependency publishers.
    PanelBlocked {
        name: String,
    },
    PanelRunning {
        name: String,
    },
    PanelComplete {
        name: String,
    },
    PanelError {
        name: String,
        error: String,
    },
}

/// Trait abstracting where progress events go.
///
/// Production installs [`TracingSink`]; tests can install a collector to
/// assert on the observed lifecycle.
pub trait EventSink: Send + Sync {
    fn publish(&self, event: RunEvent);
}

/// Sink that discards all events.
pub struct NoopSink;

impl EventSink for NoopSink {
    fn publish(&self, _event: RunEvent) {}
}

/// Default sink: forwards events to `tracing`.
pub struct TracingSink;

impl EventSink for TracingSink {
    fn publish(&self, event: RunEvent) {
        match event {
            RunEvent::ControlStarted { name } => {
                debug!(control = %name, "control started");
            }
            RunEvent::ControlComplete { name, summary } => {
                info!(control = %name, %summary, "control complete");
            }
            RunEvent::ControlError { name, error } => {
                warn!(control = %name, error = %error, "control error");
            }
            RunEvent::PanelBlocked { name } => {
                debug!(panel = %name, "panel blocked on runtime dependencies");
            }
            RunEvent::PanelRunning { name } => {
                debug!(panel = %name, "panel running");
            }
            RunEvent::PanelComplete { name } => {
                info!(panel = %name, "panel complete");
            }
            RunEvent::PanelError { name, error } => {
                warn!(panel = %name, error = %error, "panel error");
            }
        }
    }
}
