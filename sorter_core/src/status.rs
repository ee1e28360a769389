//! Outcomes reported by the dispatcher, the supervisor and the workflow.

use std::path::PathBuf;

use sorter_traits::{LightColor, Prediction};

use crate::error::SorterError;
use crate::types::WasteCategory;

/// Result of one classification cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// The item was classified and the category light is on.
    Classified(Classification),
    /// The cycle ended early on a collaborator failure.
    Failed(SorterError),
    /// Shutdown was observed between steps.
    Aborted,
}

impl CycleOutcome {
    pub fn is_classified(&self) -> bool {
        matches!(self, CycleOutcome::Classified(_))
    }
}

/// A successful classification.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub image: PathBuf,
    pub prediction: Prediction,
    pub category: WasteCategory,
    pub color: LightColor,
}

/// What happened to a dispatched event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    Handled,
    /// The handler ran and reported an error (already logged).
    Failed,
    /// Shutdown in progress; nothing ran.
    Dropped,
    /// No handler registered for the event.
    Unhandled,
}

/// How a stop request ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// The task exited and was joined.
    Joined,
    /// The task panicked; it was joined and the panic logged.
    Panicked,
    /// Stop was requested from inside the task; it will exit on its own.
    Signalled,
    /// The task did not exit in time and was detached.
    TimedOut,
    /// No live task matched the request.
    NotRunning,
}
