//! Phase-boundary progress events.
//!
//! The pipeline reports when extraction, graph assembly and traversal start
//! and finish. Anything that wants to show progress implements
//! [`ProgressSink`]; the core never waits on it.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Extraction,
    GraphAssembly,
    Traversal,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Extraction => write!(f, "extraction"),
            Phase::GraphAssembly => write!(f, "graph_assembly"),
            Phase::Traversal => write!(f, "traversal"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProgressEvent {
    PhaseStarted {
        phase: Phase,
        /// Work items in the phase (files, analyses, targets).
        items: usize,
    },
    PhaseCompleted {
        phase: Phase,
        items: usize,
        elapsed_ms: u64,
    },
}

impl ProgressEvent {
    pub fn started(phase: Phase, items: usize) -> Self {
        ProgressEvent::PhaseStarted { phase, items }
    }

    pub fn completed(phase: Phase, items: usize, elapsed: Duration) -> Self {
        ProgressEvent::PhaseCompleted {
            phase,
            items,
            elapsed_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
        }
    }

    pub fn phase(&self) -> Phase {
        match self {
            ProgressEvent::PhaseStarted { phase, .. }
            | ProgressEvent::PhaseCompleted { phase, .. } => *phase,
        }
    }
}

pub trait ProgressSink: Send + Sync {
    fn emit(&self, event: ProgressEvent);
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn emit(&self, _event: ProgressEvent) {}
}

/// Logs events at info level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingProgress;

impl ProgressSink for TracingProgress {
    fn emit(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::PhaseStarted { phase, items } => {
                info!(%phase, items, "phase started");
            }
            ProgressEvent::PhaseCompleted {
                phase,
                items,
                elapsed_ms,
            } => {
                info!(%phase, items, elapsed_ms, "phase completed");
            }
        }
    }
}

/// Streams events to an async consumer. A dropped receiver is ignored.
impl ProgressSink for UnboundedSender<ProgressEvent> {
    fn emit(&self, event: ProgressEvent) {
        let _ = self.send(event);
    }
}
