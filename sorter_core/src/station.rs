//! The assembled sorting station and its operator-facing cycle API.

use std::sync::Arc;
use std::time::Duration;

use sorter_traits::{Clock, LightChannel};
use tracing::{error, info, warn};

use crate::builder::{Missing, StationBuilder};
use crate::dispatcher::EventDispatcher;
use crate::error::{Result, SorterError};
use crate::lights::{SharedLights, start_animation};
use crate::monitor::ScaleMonitor;
use crate::shutdown::{ShutdownCoordinator, ShutdownReport};
use crate::signal::{CompletionSignal, ShutdownFlag, Wake};
use crate::status::CycleOutcome;
use crate::supervisor::{TaskHandle, TaskKind, TaskSupervisor};
use crate::workflow::ClassificationWorkflow;

pub struct Station {
    pub(crate) shutdown: ShutdownFlag,
    pub(crate) supervisor: Arc<TaskSupervisor>,
    pub(crate) monitor: Arc<ScaleMonitor>,
    pub(crate) dispatcher: Arc<EventDispatcher>,
    pub(crate) workflow: Arc<ClassificationWorkflow>,
    pub(crate) coordinator: Arc<ShutdownCoordinator>,
    pub(crate) completion: Arc<CompletionSignal>,
    pub(crate) lights: SharedLights,
    pub(crate) clock: Arc<dyn Clock + Send + Sync>,
}

impl std::fmt::Debug for Station {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Station")
            .field("supervisor", &self.supervisor)
            .field("shutting_down", &self.shutdown.is_set())
            .finish()
    }
}

impl Station {
    /// Start building a Station.
    pub fn builder() -> StationBuilder<Missing, Missing, Missing, Missing> {
        StationBuilder::default()
    }

    /// Tare the scale behind the processing animation, then show ready
    /// (all lights on).
    pub fn initialize(&self) -> Result<()> {
        let anim = self.workflow.cfg().processing;
        let handle = start_animation(&self.supervisor, &self.lights, anim, &self.clock)?;
        let zeroed = self.monitor.zero();
        self.supervisor.stop(&handle);
        zeroed?;
        self.lights.on(LightChannel::All);
        info!("station ready");
        Ok(())
    }

    /// Start the listener for the next cycle. Lights go off while waiting
    /// for an item.
    pub fn arm(&self) -> Result<TaskHandle> {
        self.lights.off(LightChannel::All);
        let monitor = self.monitor.clone();
        let dispatcher = self.dispatcher.clone();
        let workflow = self.workflow.clone();
        let shutdown = self.shutdown.clone();
        let handle = self
            .supervisor
            .start(TaskKind::ScaleListening, move |cancel| {
                if let Err(e) = monitor.run(&dispatcher, &cancel)
                    && !shutdown.is_set()
                {
                    error!(error = %e, "scale listener stopped");
                    // Mark the task dead before waking the waiter so the next arm respawns it.
                    cancel.cancel();
                    workflow.fail_cycle(e);
                }
            })?;
        info!("waiting for an item");
        Ok(handle)
    }

    /// Block until the armed cycle completes or shutdown interrupts it.
    /// Consumes the completion signal.
    pub fn wait_for_cycle(&self) -> Option<CycleOutcome> {
        match self.completion.wait(&self.shutdown) {
            Wake::Completed => {
                self.completion.clear();
                Some(
                    self.workflow
                        .take_outcome()
                        .unwrap_or(CycleOutcome::Aborted),
                )
            }
            Wake::Interrupted => None,
        }
    }

    /// Like `wait_for_cycle`, giving up after `timeout`.
    pub fn wait_for_cycle_timeout(&self, timeout: Duration) -> Option<CycleOutcome> {
        match self.completion.wait_timeout(&self.shutdown, timeout) {
            Some(Wake::Completed) => {
                self.completion.clear();
                self.workflow.take_outcome()
            }
            _ => None,
        }
    }

    /// Arm, then wait. `Ok(None)` means shutdown ended the cycle.
    pub fn run_cycle(&self) -> Result<Option<CycleOutcome>> {
        if self.shutdown.is_set() {
            return Ok(None);
        }
        self.arm()?;
        Ok(self.wait_for_cycle())
    }

    pub fn shutdown(&self) -> ShutdownReport {
        self.coordinator.shutdown()
    }

    pub fn coordinator(&self) -> Arc<ShutdownCoordinator> {
        self.coordinator.clone()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_set()
    }

    pub fn supervisor(&self) -> &TaskSupervisor {
        &self.supervisor
    }

    pub fn workflow(&self) -> &ClassificationWorkflow {
        &self.workflow
    }

    pub fn monitor(&self) -> &ScaleMonitor {
        &self.monitor
    }
}

impl Drop for Station {
    fn drop(&mut self) {
        if !self.coordinator.is_finished() {
            warn!("station dropped without shutdown; tearing down");
            let _ = self.coordinator.shutdown();
        }
    }
}

/// Map a cycle failure to the error that explains it, if any.
pub fn outcome_error(outcome: &CycleOutcome) -> Option<&SorterError> {
    match outcome {
        CycleOutcome::Failed(e) => Some(e),
        _ => None,
    }
}
