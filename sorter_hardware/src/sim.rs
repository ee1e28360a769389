//! Simulated collaborators for running the station without a Pi attached.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use sorter_traits::{
    Camera, Classifier, DriverError, LabelProbability, LightChannel, LightColor, LightDriver,
    Prediction, WeightSource,
};

use crate::camera::ImageSequence;

/// Scale whose item lands a fixed delay after every zero.
///
/// Each read blocks for `conversion` to mimic the HX711's averaging time.
pub struct SimulatedScale {
    item_g: f32,
    place_after: Duration,
    conversion: Duration,
    zeroed_at: Instant,
}

impl SimulatedScale {
    pub fn new(item_g: f32, place_after: Duration) -> Self {
        Self {
            item_g,
            place_after,
            conversion: Duration::from_millis(20),
            zeroed_at: Instant::now(),
        }
    }

    pub fn with_conversion_time(mut self, d: Duration) -> Self {
        self.conversion = d;
        self
    }
}

impl WeightSource for SimulatedScale {
    fn read_mass(&mut self) -> Result<f32, DriverError> {
        if !self.conversion.is_zero() {
            std::thread::sleep(self.conversion);
        }
        let g = if self.zeroed_at.elapsed() >= self.place_after {
            self.item_g
        } else {
            0.0
        };
        tracing::trace!(grams = g, "simulated scale sample");
        Ok(g)
    }

    fn zero(&mut self) -> Result<(), DriverError> {
        self.zeroed_at = Instant::now();
        tracing::debug!("simulated scale zeroed");
        Ok(())
    }
}

/// Lights that only remember and log their state.
#[derive(Debug, Default)]
pub struct SimulatedLights {
    lit: Mutex<[bool; 3]>,
}

impl SimulatedLights {
    pub fn new() -> Self {
        Self::default()
    }

    /// Colours currently lit.
    pub fn lit(&self) -> Vec<LightColor> {
        let lit = self.lit.lock().map(|g| *g).unwrap_or_default();
        LightColor::ALL
            .into_iter()
            .zip(lit)
            .filter_map(|(c, on)| on.then_some(c))
            .collect()
    }

    fn set(&self, channel: LightChannel, on: bool) {
        if let Ok(mut lit) = self.lit.lock() {
            match channel {
                LightChannel::All => *lit = [on; 3],
                LightChannel::Color(c) => lit[index(c)] = on,
            }
        }
        tracing::trace!(%channel, on, "simulated light");
    }
}

fn index(c: LightColor) -> usize {
    match c {
        LightColor::Red => 0,
        LightColor::Green => 1,
        LightColor::Blue => 2,
    }
}

impl LightDriver for SimulatedLights {
    fn on(&self, channel: LightChannel) {
        self.set(channel, true);
    }

    fn off(&self, channel: LightChannel) {
        self.set(channel, false);
    }
}

/// Camera that writes a tiny placeholder file per capture.
pub struct SimulatedCamera {
    images: ImageSequence,
    open: bool,
}

impl SimulatedCamera {
    pub fn new(images: ImageSequence) -> Self {
        Self {
            images,
            open: false,
        }
    }

    pub fn dir(&self) -> &Path {
        self.images.dir()
    }
}

impl Camera for SimulatedCamera {
    fn capture(&mut self) -> Result<PathBuf, DriverError> {
        self.open = true;
        let path = self.images.next_path();
        fs::write(&path, b"simulated frame\n")?;
        tracing::info!(path = %path.display(), "image saved (simulated)");
        Ok(path)
    }

    fn release(&mut self) {
        if self.open {
            tracing::info!("releasing camera (simulated)");
            self.open = false;
        }
    }
}

/// Classifier that always predicts the same label with high confidence.
pub struct SimulatedClassifier {
    label: String,
    labels: Vec<String>,
}

impl SimulatedClassifier {
    /// `labels` is the full label set; `label` is added to it if absent.
    pub fn new(label: impl Into<String>, mut labels: Vec<String>) -> Self {
        let label = label.into();
        if !labels.contains(&label) {
            labels.push(label.clone());
        }
        Self { label, labels }
    }
}

impl Classifier for SimulatedClassifier {
    fn predict(&self, image: &Path) -> Result<Prediction, DriverError> {
        if !image.exists() {
            return Err(format!("image {} does not exist", image.display()).into());
        }
        let others = self.labels.len().saturating_sub(1);
        let winner = if others == 0 { 1.0 } else { 0.9 };
        let rest = if others == 0 {
            0.0
        } else {
            (1.0 - winner) / others as f32
        };
        let probabilities = self
            .labels
            .iter()
            .map(|l| LabelProbability {
                label: l.clone(),
                probability: if *l == self.label { winner } else { rest },
            })
            .collect();
        Ok(Prediction {
            label: self.label.clone(),
            probabilities,
        })
    }
}
