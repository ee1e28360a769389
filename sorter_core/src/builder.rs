//! Type-state builder for `Station`.
//!
//! The builder enforces at compile time that a weight source, lights, a
//! camera and a classifier are provided before `build()` is available.
//! `try_build()` is always available for dynamic checks.

use std::marker::PhantomData;
use std::sync::{Arc, Mutex};

use sorter_traits::{Camera, Classifier, Clock, LightDriver, MonotonicClock, WeightSource};

use crate::categories::CategoryTable;
use crate::config::{MonitorCfg, TeardownCfg, WorkflowCfg};
use crate::dispatcher::EventDispatcher;
use crate::error::{BuildError, Result};
use crate::lights::SharedLights;
use crate::monitor::ScaleMonitor;
use crate::shutdown::ShutdownCoordinator;
use crate::signal::{CompletionSignal, ShutdownFlag};
use crate::station::Station;
use crate::supervisor::TaskSupervisor;
use crate::types::SemanticEvent;
use crate::workflow::{ClassificationWorkflow, Collaborators, SharedCamera};

// ── Type-state markers ───────────────────────────────────────────────────────

pub struct Missing;
pub struct Set;

/// Builder for `Station`. All fields are validated on `build()`.
pub struct StationBuilder<S, L, C, K> {
    scale: Option<Box<dyn WeightSource + Send>>,
    lights: Option<SharedLights>,
    camera: Option<Box<dyn Camera + Send>>,
    classifier: Option<Arc<dyn Classifier + Send + Sync>>,
    monitor: Option<MonitorCfg>,
    workflow: Option<WorkflowCfg>,
    teardown: Option<TeardownCfg>,
    categories: Option<CategoryTable>,
    labels: Option<Vec<String>>,
    clock: Option<Arc<dyn Clock + Send + Sync>>,
    _s: PhantomData<S>,
    _l: PhantomData<L>,
    _c: PhantomData<C>,
    _k: PhantomData<K>,
}

impl Default for StationBuilder<Missing, Missing, Missing, Missing> {
    fn default() -> Self {
        Self {
            scale: None,
            lights: None,
            camera: None,
            classifier: None,
            monitor: None,
            workflow: None,
            teardown: None,
            categories: None,
            labels: None,
            clock: None,
            _s: PhantomData,
            _l: PhantomData,
            _c: PhantomData,
            _k: PhantomData,
        }
    }
}

impl<S, L, C, K> StationBuilder<S, L, C, K> {
    fn retype<S2, L2, C2, K2>(self) -> StationBuilder<S2, L2, C2, K2> {
        StationBuilder {
            scale: self.scale,
            lights: self.lights,
            camera: self.camera,
            classifier: self.classifier,
            monitor: self.monitor,
            workflow: self.workflow,
            teardown: self.teardown,
            categories: self.categories,
            labels: self.labels,
            clock: self.clock,
            _s: PhantomData,
            _l: PhantomData,
            _c: PhantomData,
            _k: PhantomData,
        }
    }

    /// Fallible build available in any type-state; returns detailed error for missing pieces.
    pub fn try_build(self) -> Result<Station> {
        let scale = self
            .scale
            .ok_or_else(|| eyre::Report::new(BuildError::MissingScale))?;
        let lights = self
            .lights
            .ok_or_else(|| eyre::Report::new(BuildError::MissingLights))?;
        let camera = self
            .camera
            .ok_or_else(|| eyre::Report::new(BuildError::MissingCamera))?;
        let classifier = self
            .classifier
            .ok_or_else(|| eyre::Report::new(BuildError::MissingClassifier))?;
        let monitor_cfg = self.monitor.unwrap_or_default();
        let workflow_cfg = self.workflow.unwrap_or_default();
        let teardown_cfg = self.teardown.unwrap_or_default();
        let categories = self.categories.unwrap_or_else(CategoryTable::stock);

        // ── Validation ───────────────────────────────────────────────────────
        if !(monitor_cfg.place_threshold_g.is_finite() && monitor_cfg.place_threshold_g > 0.0) {
            return Err(eyre::Report::new(BuildError::InvalidConfig(
                "place_threshold_g must be > 0",
            )));
        }
        if workflow_cfg.processing.interval.is_zero() {
            return Err(eyre::Report::new(BuildError::InvalidConfig(
                "animation interval must be > 0",
            )));
        }
        if teardown_cfg.join_timeout.is_zero() {
            return Err(eyre::Report::new(BuildError::InvalidConfig(
                "join_timeout must be > 0",
            )));
        }
        if categories.is_empty() {
            return Err(eyre::Report::new(BuildError::InvalidConfig(
                "category table is empty",
            )));
        }
        if let Some(labels) = &self.labels {
            categories.ensure_covers(labels.iter().map(String::as_str))?;
        }

        // ── Wiring ───────────────────────────────────────────────────────────
        let clock = self
            .clock
            .unwrap_or_else(|| Arc::new(MonotonicClock::new()));
        let shutdown = ShutdownFlag::new();
        let completion = Arc::new(CompletionSignal::new());
        let supervisor = Arc::new(TaskSupervisor::new(shutdown.clone()));
        let camera: SharedCamera = Arc::new(Mutex::new(camera));

        let workflow = Arc::new(ClassificationWorkflow::new(
            supervisor.clone(),
            Collaborators {
                lights: lights.clone(),
                camera: camera.clone(),
                classifier,
                clock: clock.clone(),
            },
            categories,
            workflow_cfg,
            shutdown.clone(),
            completion.clone(),
        ));

        let mut dispatcher = EventDispatcher::new(shutdown.clone());
        let wf = workflow.clone();
        dispatcher.register(SemanticEvent::ItemPlaced, move || wf.on_item_placed());
        let wf = workflow.clone();
        dispatcher.register(SemanticEvent::ItemSettled, move || {
            wf.on_item_settled();
            Ok(())
        });
        let wf = workflow.clone();
        dispatcher.register(SemanticEvent::ItemRemoved, move || wf.on_item_removed());

        let coordinator = Arc::new(ShutdownCoordinator::new(
            shutdown.clone(),
            supervisor.clone(),
            camera,
            lights.clone(),
            completion.clone(),
            teardown_cfg,
        ));

        Ok(Station {
            shutdown,
            supervisor,
            monitor: Arc::new(ScaleMonitor::new(scale, monitor_cfg, clock.clone())),
            dispatcher: Arc::new(dispatcher),
            workflow,
            coordinator,
            completion,
            lights,
            clock,
        })
    }
}

/// Chainable setters that do not affect type-state.
impl<S, L, C, K> StationBuilder<S, L, C, K> {
    pub fn with_monitor(mut self, cfg: MonitorCfg) -> Self {
        self.monitor = Some(cfg);
        self
    }
    pub fn with_workflow(mut self, cfg: WorkflowCfg) -> Self {
        self.workflow = Some(cfg);
        self
    }
    pub fn with_teardown(mut self, cfg: TeardownCfg) -> Self {
        self.teardown = Some(cfg);
        self
    }
    pub fn with_categories(mut self, categories: CategoryTable) -> Self {
        self.categories = Some(categories);
        self
    }
    /// Labels the classifier can emit; build fails unless every one is mapped.
    pub fn with_classifier_labels(mut self, labels: Vec<String>) -> Self {
        self.labels = Some(labels);
        self
    }
    /// Provide a custom clock implementation; defaults to `MonotonicClock` when not provided.
    pub fn with_clock(mut self, clock: Arc<dyn Clock + Send + Sync>) -> Self {
        self.clock = Some(clock);
        self
    }
}

// Setters that advance type-state
impl<L, C, K> StationBuilder<Missing, L, C, K> {
    pub fn with_scale(
        mut self,
        scale: impl WeightSource + Send + 'static,
    ) -> StationBuilder<Set, L, C, K> {
        self.scale = Some(Box::new(scale));
        self.retype()
    }
}

impl<S, C, K> StationBuilder<S, Missing, C, K> {
    pub fn with_lights(
        mut self,
        lights: impl LightDriver + Send + Sync + 'static,
    ) -> StationBuilder<S, Set, C, K> {
        self.lights = Some(Arc::new(lights));
        self.retype()
    }

    /// Share an existing light driver, e.g. to inspect it in tests.
    pub fn with_shared_lights(mut self, lights: SharedLights) -> StationBuilder<S, Set, C, K> {
        self.lights = Some(lights);
        self.retype()
    }
}

impl<S, L, K> StationBuilder<S, L, Missing, K> {
    pub fn with_camera(
        mut self,
        camera: impl Camera + Send + 'static,
    ) -> StationBuilder<S, L, Set, K> {
        self.camera = Some(Box::new(camera));
        self.retype()
    }
}

impl<S, L, C> StationBuilder<S, L, C, Missing> {
    pub fn with_classifier(
        mut self,
        classifier: impl Classifier + Send + Sync + 'static,
    ) -> StationBuilder<S, L, C, Set> {
        self.classifier = Some(Arc::new(classifier));
        self.retype()
    }
}

impl StationBuilder<Set, Set, Set, Set> {
    /// Validate and build the Station. Only available once every collaborator is set.
    pub fn build(self) -> Result<Station> {
        self.try_build()
    }
}
