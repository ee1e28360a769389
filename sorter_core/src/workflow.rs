//! The classification cycle run when an item settles, plus the placement
//! and removal reactions.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError};
use std::thread;
use std::time::{Duration, Instant};

use sorter_traits::{Camera, Classifier, Clock, LightChannel};
use tracing::{debug, error, info, warn};

use crate::categories::CategoryTable;
use crate::config::WorkflowCfg;
use crate::error::{Result, SorterError};
use crate::hw_error::{Collaborator, map_hw_error};
use crate::lights::{SharedLights, start_animation};
use crate::signal::{CompletionGuard, CompletionSignal, ShutdownFlag};
use crate::status::{Classification, CycleOutcome};
use crate::supervisor::{SupervisorError, TaskHandle, TaskKind, TaskSupervisor};

const CAMERA_POLL: Duration = Duration::from_millis(5);

pub type SharedCamera = Arc<Mutex<Box<dyn Camera + Send>>>;

pub(crate) fn lock_camera(camera: &SharedCamera) -> MutexGuard<'_, Box<dyn Camera + Send>> {
    camera.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Like `lock_camera`, but gives up after `timeout` if a capture holds the device.
pub(crate) fn lock_camera_within(
    camera: &SharedCamera,
    timeout: Duration,
) -> Option<MutexGuard<'_, Box<dyn Camera + Send>>> {
    let deadline = Instant::now() + timeout;
    loop {
        match camera.try_lock() {
            Ok(guard) => return Some(guard),
            Err(TryLockError::Poisoned(p)) => return Some(p.into_inner()),
            Err(TryLockError::WouldBlock) if Instant::now() >= deadline => return None,
            Err(TryLockError::WouldBlock) => thread::sleep(CAMERA_POLL),
        }
    }
}

/// Everything the workflow drives. Cloned handles are shared with the
/// shutdown coordinator.
pub struct Collaborators {
    pub lights: SharedLights,
    pub camera: SharedCamera,
    pub classifier: Arc<dyn Classifier + Send + Sync>,
    pub clock: Arc<dyn Clock + Send + Sync>,
}

pub struct ClassificationWorkflow {
    supervisor: Arc<TaskSupervisor>,
    lights: SharedLights,
    camera: SharedCamera,
    classifier: Arc<dyn Classifier + Send + Sync>,
    clock: Arc<dyn Clock + Send + Sync>,
    categories: CategoryTable,
    cfg: WorkflowCfg,
    shutdown: ShutdownFlag,
    completion: Arc<CompletionSignal>,
    last_outcome: Mutex<Option<CycleOutcome>>,
}

macro_rules! bail_if_shutting_down {
    ($self:ident, $step:literal) => {
        if $self.shutdown.is_set() {
            info!(step = $step, "shutdown observed; abandoning cycle");
            return CycleOutcome::Aborted;
        }
    };
}

impl ClassificationWorkflow {
    pub fn new(
        supervisor: Arc<TaskSupervisor>,
        collaborators: Collaborators,
        categories: CategoryTable,
        cfg: WorkflowCfg,
        shutdown: ShutdownFlag,
        completion: Arc<CompletionSignal>,
    ) -> Self {
        let Collaborators {
            lights,
            camera,
            classifier,
            clock,
        } = collaborators;
        Self {
            supervisor,
            lights,
            camera,
            classifier,
            clock,
            categories,
            cfg,
            shutdown,
            completion,
            last_outcome: Mutex::new(None),
        }
    }

    pub fn cfg(&self) -> &WorkflowCfg {
        &self.cfg
    }

    pub fn categories(&self) -> &CategoryTable {
        &self.categories
    }

    /// Something landed on the platform.
    pub fn on_item_placed(&self) -> Result<()> {
        if self.shutdown.is_set() {
            return Ok(());
        }
        debug!("item placed; lights on");
        self.lights.on(LightChannel::All);
        Ok(())
    }

    /// The platform was cleared before or after classification.
    pub fn on_item_removed(&self) -> Result<()> {
        if self.shutdown.is_set() {
            return Ok(());
        }
        debug!("item removed; lights off");
        self.stop_animation();
        self.lights.off(LightChannel::All);
        Ok(())
    }

    /// Run one classification cycle. The completion signal is set exactly
    /// once when this returns, whatever the outcome.
    pub fn on_item_settled(&self) -> CycleOutcome {
        let _signal = CompletionGuard::new(&self.completion);
        let outcome = self.classify();
        self.record(outcome.clone());
        outcome
    }

    /// End the current cycle without classifying, e.g. when the listener dies.
    pub fn fail_cycle(&self, err: SorterError) {
        let _signal = CompletionGuard::new(&self.completion);
        self.lights.off(LightChannel::All);
        self.record(CycleOutcome::Failed(err));
    }

    /// Outcome of the last finished cycle, consumed by the caller.
    pub fn take_outcome(&self) -> Option<CycleOutcome> {
        self.outcome_slot().take()
    }

    pub fn start_animation(&self) -> std::result::Result<TaskHandle, SupervisorError> {
        start_animation(
            &self.supervisor,
            &self.lights,
            self.cfg.processing,
            &self.clock,
        )
    }

    pub fn stop_animation(&self) {
        self.supervisor.stop_kind(TaskKind::LightAnimation, None);
    }

    fn outcome_slot(&self) -> MutexGuard<'_, Option<CycleOutcome>> {
        self.last_outcome
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, outcome: CycleOutcome) {
        match &outcome {
            CycleOutcome::Classified(c) => {
                info!(label = %c.prediction.label, category = %c.category, "cycle complete")
            }
            CycleOutcome::Failed(e) => warn!(error = %e, "cycle failed"),
            CycleOutcome::Aborted => info!("cycle aborted"),
        }
        *self.outcome_slot() = Some(outcome);
    }

    fn classify(&self) -> CycleOutcome {
        bail_if_shutting_down!(self, "stop_listening");
        // From the listener's own thread this only signals it.
        self.supervisor.stop_kind(TaskKind::ScaleListening, None);

        bail_if_shutting_down!(self, "indicate");
        self.lights.off(LightChannel::All);
        if let Err(e) = self.start_animation() {
            warn!(error = %e, "processing animation not started");
        }
        self.clock.sleep(self.cfg.indication);
        self.stop_animation();

        bail_if_shutting_down!(self, "capture");
        let captured = {
            let mut camera = lock_camera(&self.camera);
            // Teardown may have released the camera while this cycle waited for it.
            bail_if_shutting_down!(self, "capture");
            self.lights.on(LightChannel::All);
            let r = camera.capture();
            // A teardown that gave up on the lock left the release to us.
            if self.cfg.release_after_capture || self.shutdown.is_set() {
                camera.release();
            }
            r
        };
        self.lights.off(LightChannel::All);
        let image = match captured {
            Ok(p) => p,
            Err(e) => {
                let err = map_hw_error(e.as_ref(), Collaborator::Camera);
                error!(error = %err, "capture failed");
                return CycleOutcome::Failed(err);
            }
        };
        info!(image = %image.display(), "image captured");

        bail_if_shutting_down!(self, "classify");
        let prediction = match self.classifier.predict(&image) {
            Ok(p) => p,
            Err(e) => {
                let err = map_hw_error(e.as_ref(), Collaborator::Classifier);
                error!(error = %err, image = %image.display(), "classification failed");
                return CycleOutcome::Failed(err);
            }
        };
        for p in &prediction.probabilities {
            debug!(label = %p.label, probability = p.probability, "class probability");
        }

        bail_if_shutting_down!(self, "indicate_category");
        let category = match self.categories.category(&prediction.label) {
            Ok(c) => c,
            Err(err) => {
                error!(label = %prediction.label, "classifier label has no waste category");
                return CycleOutcome::Failed(err);
            }
        };
        let color = category.color();
        self.lights.on(color.into());
        CycleOutcome::Classified(Classification {
            image,
            prediction,
            category,
            color,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Animation, Pattern};
    use crate::mocks::{CountingCamera, FixedClassifier, LightCall, RecordingLights};
    use crate::types::WasteCategory;
    use sorter_traits::{LightColor, MonotonicClock};
    use std::time::Duration;

    struct Rig {
        wf: ClassificationWorkflow,
        lights: Arc<RecordingLights>,
        completion: Arc<CompletionSignal>,
        shutdown: ShutdownFlag,
    }

    fn rig(camera: CountingCamera, classifier: FixedClassifier) -> Rig {
        let shutdown = ShutdownFlag::new();
        let completion = Arc::new(CompletionSignal::new());
        let lights = Arc::new(RecordingLights::new());
        let cfg = WorkflowCfg {
            processing: Animation {
                pattern: Pattern::Flash,
                interval: Duration::from_millis(2),
            },
            indication: Duration::from_millis(10),
            release_after_capture: true,
        };
        let wf = ClassificationWorkflow::new(
            Arc::new(TaskSupervisor::new(shutdown.clone())),
            Collaborators {
                lights: lights.clone(),
                camera: Arc::new(Mutex::new(Box::new(camera))),
                classifier: Arc::new(classifier),
                clock: Arc::new(MonotonicClock::new()),
            },
            CategoryTable::stock(),
            cfg,
            shutdown.clone(),
            completion.clone(),
        );
        Rig {
            wf,
            lights,
            completion,
            shutdown,
        }
    }

    #[test]
    fn glass_ends_on_blue() {
        let r = rig(CountingCamera::new(), FixedClassifier::returning("glass"));
        let outcome = r.wf.on_item_settled();
        let CycleOutcome::Classified(c) = outcome else {
            panic!("expected classification, got {outcome:?}");
        };
        assert_eq!(c.category, WasteCategory::Recycling);
        assert_eq!(c.color, LightColor::Blue);
        assert_eq!(
            r.lights.last(),
            Some(LightCall::On(LightChannel::Color(LightColor::Blue)))
        );
        assert!(r.completion.is_set());
        assert!(r.wf.take_outcome().is_some_and(|o| o.is_classified()));
        assert!(r.wf.take_outcome().is_none());
    }

    #[test]
    fn capture_failure_still_completes() {
        let camera = CountingCamera::failing();
        let counters = camera.counters();
        let classifier = FixedClassifier::returning("glass");
        let calls = classifier.calls();
        let r = rig(camera, classifier);
        let outcome = r.wf.on_item_settled();
        assert!(matches!(outcome, CycleOutcome::Failed(SorterError::Camera(_))));
        assert!(r.completion.is_set());
        assert_eq!(counters.releases(), 1);
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 0);
    }

    #[test]
    fn classifier_failure_still_completes() {
        let r = rig(CountingCamera::new(), FixedClassifier::failing("model missing"));
        let outcome = r.wf.on_item_settled();
        assert!(matches!(
            outcome,
            CycleOutcome::Failed(SorterError::Classifier(_))
        ));
        assert!(r.completion.is_set());
        assert_eq!(r.lights.last(), Some(LightCall::Off(LightChannel::All)));
    }

    #[test]
    fn unmapped_label_fails_loudly() {
        let r = rig(CountingCamera::new(), FixedClassifier::returning("styrofoam"));
        let outcome = r.wf.on_item_settled();
        assert_eq!(
            outcome,
            CycleOutcome::Failed(SorterError::UnmappedLabel("styrofoam".into()))
        );
        assert!(r.completion.is_set());
    }

    #[test]
    fn shutdown_aborts_before_capture() {
        let camera = CountingCamera::new();
        let counters = camera.counters();
        let r = rig(camera, FixedClassifier::returning("glass"));
        r.shutdown.trigger();
        assert_eq!(r.wf.on_item_settled(), CycleOutcome::Aborted);
        assert_eq!(counters.captures(), 0);
        assert!(r.completion.is_set());
    }

    #[test]
    fn shutdown_while_waiting_for_camera_skips_capture() {
        let camera = CountingCamera::new();
        let counters = camera.counters();
        let r = rig(camera, FixedClassifier::returning("glass"));
        let outcome = std::thread::scope(|s| {
            let held = lock_camera(&r.wf.camera);
            let cycle = s.spawn(|| r.wf.on_item_settled());
            // Indication takes 10 ms; by now the cycle is queued on the camera.
            std::thread::sleep(Duration::from_millis(150));
            r.shutdown.trigger();
            drop(held);
            cycle.join().unwrap()
        });
        assert_eq!(outcome, CycleOutcome::Aborted);
        assert_eq!(counters.captures(), 0);
        assert_eq!(r.lights.last(), Some(LightCall::Off(LightChannel::All)));
        assert!(r.completion.is_set());
    }

    #[test]
    fn busy_camera_lock_gives_up_in_time() {
        let r = rig(CountingCamera::new(), FixedClassifier::returning("glass"));
        let _held = lock_camera(&r.wf.camera);
        let start = Instant::now();
        let got = std::thread::scope(|s| {
            s.spawn(|| lock_camera_within(&r.wf.camera, Duration::from_millis(50)).is_some())
                .join()
                .unwrap()
        });
        assert!(!got);
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn placed_and_removed_toggle_all_lights() {
        let r = rig(CountingCamera::new(), FixedClassifier::returning("glass"));
        r.wf.on_item_placed().unwrap();
        r.wf.on_item_removed().unwrap();
        assert_eq!(
            r.lights.calls(),
            vec![
                LightCall::On(LightChannel::All),
                LightCall::Off(LightChannel::All)
            ]
        );
    }

    #[test]
    fn listener_failure_completes_cycle() {
        let r = rig(CountingCamera::new(), FixedClassifier::returning("glass"));
        r.wf.fail_cycle(SorterError::SensorTimeout);
        assert!(r.completion.is_set());
        assert_eq!(
            r.wf.take_outcome(),
            Some(CycleOutcome::Failed(SorterError::SensorTimeout))
        );
    }
}
