//! Scale listening: turns a stream of mass readings into semantic events.
//!
//! `DebounceDetector` is the pure state machine; `ScaleMonitor` owns the
//! weight source and runs the blocking listen loop on a supervised task.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use sorter_traits::{Clock, WeightSource};
use tracing::{debug, error, info, trace, warn};

use crate::config::MonitorCfg;
use crate::dispatcher::EventDispatcher;
use crate::error::SorterError;
use crate::hw_error::{Collaborator, map_hw_error};
use crate::signal::CancelToken;
use crate::types::{ScaleState, SemanticEvent, WeightSample};

/// When the current item was first seen. Set only while Placed or Settled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DebounceWindow {
    placed_at: Option<Instant>,
}

impl DebounceWindow {
    pub fn placed_at(&self) -> Option<Instant> {
        self.placed_at
    }

    fn elapsed(&self, now: Instant) -> Option<Duration> {
        self.placed_at.map(|t| now.saturating_duration_since(t))
    }
}

/// Step-delta debounce state machine.
///
/// Placement and removal are detected from the change between consecutive
/// readings, not from absolute mass. At most one event per reading.
#[derive(Debug, Clone)]
pub struct DebounceDetector {
    cfg: MonitorCfg,
    state: ScaleState,
    window: DebounceWindow,
    last: Option<WeightSample>,
}

impl DebounceDetector {
    pub fn new(cfg: MonitorCfg) -> Self {
        Self {
            cfg,
            state: ScaleState::Empty,
            window: DebounceWindow::default(),
            last: None,
        }
    }

    pub fn state(&self) -> ScaleState {
        self.state
    }

    pub fn window(&self) -> DebounceWindow {
        self.window
    }

    pub fn last_sample(&self) -> Option<WeightSample> {
        self.last
    }

    /// Back to Empty with no reference reading.
    pub fn reset(&mut self) {
        self.state = ScaleState::Empty;
        self.window = DebounceWindow::default();
        self.last = None;
    }

    /// Feed one reading. The first reading after a reset only primes the
    /// reference and never produces an event.
    pub fn observe(&mut self, sample: WeightSample) -> Option<SemanticEvent> {
        let prev = self.last.replace(sample)?;
        let delta = sample.grams - prev.grams;
        let threshold = self.cfg.place_threshold_g;

        match self.state {
            ScaleState::Empty if delta > threshold => {
                self.state = ScaleState::Placed;
                self.window.placed_at = Some(sample.at);
                Some(SemanticEvent::ItemPlaced)
            }
            ScaleState::Placed | ScaleState::Settled if delta < -threshold => {
                self.state = ScaleState::Empty;
                self.window = DebounceWindow::default();
                Some(SemanticEvent::ItemRemoved)
            }
            ScaleState::Placed
                if self
                    .window
                    .elapsed(sample.at)
                    .is_some_and(|e| e >= self.cfg.settle) =>
            {
                self.state = ScaleState::Settled;
                Some(SemanticEvent::ItemSettled)
            }
            _ => None,
        }
    }
}

struct Listener {
    source: Box<dyn WeightSource + Send>,
    detector: DebounceDetector,
}

/// Owns the weight source. Only one listen loop can hold it at a time.
pub struct ScaleMonitor {
    inner: Mutex<Listener>,
    cfg: MonitorCfg,
    clock: Arc<dyn Clock + Send + Sync>,
}

impl ScaleMonitor {
    pub fn new(
        source: Box<dyn WeightSource + Send>,
        cfg: MonitorCfg,
        clock: Arc<dyn Clock + Send + Sync>,
    ) -> Self {
        Self {
            inner: Mutex::new(Listener {
                source,
                detector: DebounceDetector::new(cfg.clone()),
            }),
            cfg,
            clock,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Listener> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn cfg(&self) -> &MonitorCfg {
        &self.cfg
    }

    /// Tare the scale. Blocks while a listen loop is running.
    pub fn zero(&self) -> Result<(), SorterError> {
        let mut l = self.lock();
        l.source
            .zero()
            .map_err(|e| map_hw_error(e.as_ref(), Collaborator::Scale))
    }

    /// Detector state, or `None` while a listen loop holds the scale.
    pub fn state(&self) -> Option<ScaleState> {
        self.inner.try_lock().ok().map(|l| l.detector.state())
    }

    /// Blocking listen loop. Returns when `cancel` is observed or a read fails.
    ///
    /// The scale is zeroed on entry, after every removal, and on exit.
    pub fn run(
        &self,
        dispatcher: &EventDispatcher,
        cancel: &CancelToken,
    ) -> Result<(), SorterError> {
        let mut guard = self.lock();
        let l = &mut *guard;
        l.detector.reset();
        l.source
            .zero()
            .map_err(|e| map_hw_error(e.as_ref(), Collaborator::Scale))?;
        debug!(
            threshold_g = self.cfg.place_threshold_g,
            settle_ms = crate::util::millis(self.cfg.settle),
            "scale listening loop started"
        );

        let result = loop {
            if cancel.is_cancelled() {
                break Ok(());
            }
            let grams = match l.source.read_mass() {
                Ok(g) => g,
                Err(e) => {
                    let err = map_hw_error(e.as_ref(), Collaborator::Scale);
                    error!(error = %err, "scale read failed");
                    break Err(err);
                }
            };
            if cancel.is_cancelled() {
                break Ok(());
            }
            let sample = WeightSample::new(grams, self.clock.now());
            trace!(grams, "scale sample");

            if let Some(event) = l.detector.observe(sample) {
                info!(%event, grams, "scale event");
                dispatcher.dispatch(event);
                if event == SemanticEvent::ItemRemoved
                    && let Err(e) = l.source.zero()
                {
                    warn!(error = %e, "re-zero after removal failed");
                }
            }

            if !self.cfg.poll_interval.is_zero() {
                self.clock.sleep(self.cfg.poll_interval);
            }
        };

        if let Err(e) = l.source.zero() {
            warn!(error = %e, "re-zero on listener exit failed");
        }
        debug!("exiting scale listening loop");
        result
    }
}
