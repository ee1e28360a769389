//! Routes semantic scale events to their registered handlers.

use std::fmt;

use tracing::{error, trace, warn};

use crate::error::Result;
use crate::signal::ShutdownFlag;
use crate::status::Dispatch;
use crate::types::SemanticEvent;

pub type Handler = Box<dyn Fn() -> Result<()> + Send + Sync>;

/// Fixed event -> handler table. Handlers run synchronously on the caller's
/// thread; during shutdown every dispatch is a no-op.
pub struct EventDispatcher {
    handlers: [Option<Handler>; 3],
    shutdown: ShutdownFlag,
}

impl fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let registered: Vec<_> = SemanticEvent::ALL
            .iter()
            .filter(|e| self.handlers[e.index()].is_some())
            .collect();
        f.debug_struct("EventDispatcher")
            .field("registered", &registered)
            .field("shutting_down", &self.shutdown.is_set())
            .finish()
    }
}

impl EventDispatcher {
    pub fn new(shutdown: ShutdownFlag) -> Self {
        Self {
            handlers: [None, None, None],
            shutdown,
        }
    }

    /// Register `handler` for `event`, replacing any previous one.
    pub fn register<F>(&mut self, event: SemanticEvent, handler: F)
    where
        F: Fn() -> Result<()> + Send + Sync + 'static,
    {
        self.handlers[event.index()] = Some(Box::new(handler));
    }

    pub fn is_registered(&self, event: SemanticEvent) -> bool {
        self.handlers[event.index()].is_some()
    }

    pub fn dispatch(&self, event: SemanticEvent) -> Dispatch {
        if self.shutdown.is_set() {
            trace!(%event, "shutdown in progress; event dropped");
            return Dispatch::Dropped;
        }
        let Some(handler) = &self.handlers[event.index()] else {
            warn!(%event, "no handler registered");
            return Dispatch::Unhandled;
        };
        match handler() {
            Ok(()) => Dispatch::Handled,
            Err(e) => {
                error!(%event, error = %e, "event handler failed");
                Dispatch::Failed
            }
        }
    }
}
