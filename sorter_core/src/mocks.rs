//! Test and helper mocks for sorter_core.
//!
//! Deterministic stand-ins for every collaborator, plus a manually advanced
//! clock so debounce timing can be driven without sleeping.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use sorter_traits::{
    Camera, Classifier, Clock, DriverError, LabelProbability, LightChannel, LightDriver,
    Prediction, WeightSource,
};

use crate::signal::CancelToken;

/// Clock whose time only moves when told to. `sleep` advances it.
#[derive(Debug, Clone)]
pub struct ManualClock {
    origin: Instant,
    offset: Arc<Mutex<Duration>>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            offset: Arc::new(Mutex::new(Duration::ZERO)),
        }
    }

    pub fn advance(&self, d: Duration) {
        *self.offset.lock().unwrap_or_else(PoisonError::into_inner) += d;
    }

    /// Total time advanced so far.
    pub fn elapsed(&self) -> Duration {
        *self.offset.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + self.elapsed()
    }

    fn sleep(&self, d: Duration) {
        self.advance(d);
    }
}

/// Read/zero counters shared with a `ScriptedWeightSource` after it is moved.
#[derive(Debug, Clone, Default)]
pub struct ScaleCounters {
    reads: Arc<AtomicUsize>,
    zeros: Arc<AtomicUsize>,
}

impl ScaleCounters {
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn zeros(&self) -> usize {
        self.zeros.load(Ordering::SeqCst)
    }
}

#[derive(Debug)]
enum Exhausted {
    Fail,
    Hold,
    Cancel(CancelToken),
}

/// Weight source replaying a fixed script of readings.
///
/// Each step optionally advances a `ManualClock` before its value is
/// returned. When the script runs out the source fails, holds the last
/// value, or cancels a token, depending on how it was built.
#[derive(Debug)]
pub struct ScriptedWeightSource {
    script: VecDeque<(Duration, f32)>,
    clock: Option<ManualClock>,
    exhausted: Exhausted,
    read_delay: Duration,
    last: f32,
    counters: ScaleCounters,
}

impl ScriptedWeightSource {
    pub fn new(values: impl IntoIterator<Item = f32>) -> Self {
        Self {
            script: values.into_iter().map(|g| (Duration::ZERO, g)).collect(),
            clock: None,
            exhausted: Exhausted::Fail,
            read_delay: Duration::ZERO,
            last: 0.0,
            counters: ScaleCounters::default(),
        }
    }

    /// Each `(advance, grams)` step moves `clock` forward before the read.
    pub fn timed(steps: impl IntoIterator<Item = (Duration, f32)>, clock: ManualClock) -> Self {
        Self {
            script: steps.into_iter().collect(),
            clock: Some(clock),
            ..Self::new([])
        }
    }

    /// Keep returning the last value once the script is done.
    pub fn hold_last(mut self) -> Self {
        self.exhausted = Exhausted::Hold;
        self
    }

    /// Cancel `token` once the script is done.
    pub fn cancel_when_done(mut self, token: CancelToken) -> Self {
        self.exhausted = Exhausted::Cancel(token);
        self
    }

    /// Real sleep per read, to pace threaded tests.
    pub fn with_read_delay(mut self, d: Duration) -> Self {
        self.read_delay = d;
        self
    }

    pub fn counters(&self) -> ScaleCounters {
        self.counters.clone()
    }
}

impl WeightSource for ScriptedWeightSource {
    fn read_mass(&mut self) -> Result<f32, DriverError> {
        self.counters.reads.fetch_add(1, Ordering::SeqCst);
        if !self.read_delay.is_zero() {
            std::thread::sleep(self.read_delay);
        }
        match self.script.pop_front() {
            Some((advance, grams)) => {
                if let Some(clock) = &self.clock {
                    clock.advance(advance);
                }
                self.last = grams;
                Ok(grams)
            }
            None => match &self.exhausted {
                Exhausted::Fail => Err(Box::new(std::io::Error::other("scale script exhausted"))),
                Exhausted::Hold => Ok(self.last),
                Exhausted::Cancel(token) => {
                    token.cancel();
                    Ok(self.last)
                }
            },
        }
    }

    fn zero(&mut self) -> Result<(), DriverError> {
        self.counters.zeros.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LightCall {
    On(LightChannel),
    Off(LightChannel),
}

/// Light driver that records every command in order.
#[derive(Debug, Default)]
pub struct RecordingLights {
    calls: Mutex<Vec<LightCall>>,
}

impl RecordingLights {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<LightCall> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn last(&self) -> Option<LightCall> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last()
            .copied()
    }

    pub fn clear(&self) {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    fn push(&self, call: LightCall) {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(call);
    }
}

impl LightDriver for RecordingLights {
    fn on(&self, channel: LightChannel) {
        self.push(LightCall::On(channel));
    }

    fn off(&self, channel: LightChannel) {
        self.push(LightCall::Off(channel));
    }
}

/// Capture/release counters shared with a `CountingCamera`.
#[derive(Debug, Clone, Default)]
pub struct CameraCounters {
    captures: Arc<AtomicUsize>,
    releases: Arc<AtomicUsize>,
}

impl CameraCounters {
    pub fn captures(&self) -> usize {
        self.captures.load(Ordering::SeqCst)
    }

    pub fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }
}

/// Camera that hands out numbered paths without touching the filesystem.
#[derive(Debug, Default)]
pub struct CountingCamera {
    fail: bool,
    delay: Duration,
    counters: CameraCounters,
}

impl CountingCamera {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// Block each capture for `d`, like a camera that is slow to expose.
    /// The capture counts as started before the delay.
    pub fn with_capture_delay(mut self, d: Duration) -> Self {
        self.delay = d;
        self
    }

    pub fn counters(&self) -> CameraCounters {
        self.counters.clone()
    }
}

impl Camera for CountingCamera {
    fn capture(&mut self) -> Result<PathBuf, DriverError> {
        let n = self.counters.captures.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        if self.fail {
            return Err(Box::new(std::io::Error::other("camera unavailable")));
        }
        Ok(PathBuf::from(format!("pi_image_{n:03}.jpg")))
    }

    fn release(&mut self) {
        self.counters.releases.fetch_add(1, Ordering::SeqCst);
    }
}

/// Build a distribution giving `winner` 0.9 and splitting the rest evenly.
pub fn prediction_for(winner: &str, labels: &[&str]) -> Prediction {
    let others = labels.iter().filter(|l| **l != winner).count();
    let share = if others == 0 { 0.0 } else { 0.1 / others as f32 };
    let probabilities = labels
        .iter()
        .map(|l| LabelProbability {
            label: (*l).to_string(),
            probability: if *l == winner { 0.9 } else { share },
        })
        .collect();
    Prediction {
        label: winner.to_string(),
        probabilities,
    }
}

/// Classifier returning a canned result.
#[derive(Debug)]
pub struct FixedClassifier {
    result: Result<Prediction, String>,
    calls: Arc<AtomicUsize>,
}

impl FixedClassifier {
    pub const STOCK_LABELS: [&'static str; 7] = [
        "cardboard",
        "compost",
        "glass",
        "metal",
        "paper",
        "plastic",
        "trash",
    ];

    /// Predict `label` over the stock label set.
    pub fn returning(label: &str) -> Self {
        let mut labels = Self::STOCK_LABELS.to_vec();
        if !labels.contains(&label) {
            labels.push(label);
        }
        Self {
            result: Ok(prediction_for(label, &labels)),
            calls: Arc::default(),
        }
    }

    pub fn failing(msg: &str) -> Self {
        Self {
            result: Err(msg.to_string()),
            calls: Arc::default(),
        }
    }

    /// Shared count of `predict` calls.
    pub fn calls(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }
}

impl Classifier for FixedClassifier {
    fn predict(&self, _image: &Path) -> Result<Prediction, DriverError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.result
            .clone()
            .map_err(|m| Box::new(std::io::Error::other(m)) as DriverError)
    }
}
