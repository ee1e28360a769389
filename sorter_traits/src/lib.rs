//! Contracts for the black-box collaborators around the sorting core.
//!
//! Drivers report failures as boxed errors so hardware crates stay free to
//! use their own error types; `sorter_core::hw_error` maps them back.

pub mod clock;

pub use clock::{Clock, MonotonicClock};

use std::fmt;
use std::path::{Path, PathBuf};

/// Boxed error returned across every collaborator boundary.
pub type DriverError = Box<dyn std::error::Error + Send + Sync>;

/// Load cell (or anything that can report a mass in grams).
pub trait WeightSource {
    /// Current mass in grams.
    fn read_mass(&mut self) -> Result<f32, DriverError>;

    /// Reset the reference baseline so the current load reads as zero.
    fn zero(&mut self) -> Result<(), DriverError>;
}

/// Still-image camera.
pub trait Camera {
    /// Acquire one frame and persist it, returning where it was written.
    fn capture(&mut self) -> Result<PathBuf, DriverError>;

    /// Release the device. Must be safe to call repeatedly.
    fn release(&mut self);
}

/// Individually addressable indicator colours.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LightColor {
    Red,
    Green,
    Blue,
}

impl LightColor {
    pub const ALL: [LightColor; 3] = [LightColor::Red, LightColor::Green, LightColor::Blue];

    pub fn name(self) -> &'static str {
        match self {
            LightColor::Red => "red",
            LightColor::Green => "green",
            LightColor::Blue => "blue",
        }
    }
}

impl fmt::Display for LightColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Target of a light command: one colour or every channel at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LightChannel {
    Color(LightColor),
    All,
}

impl From<LightColor> for LightChannel {
    fn from(c: LightColor) -> Self {
        LightChannel::Color(c)
    }
}

impl fmt::Display for LightChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LightChannel::Color(c) => c.fmt(f),
            LightChannel::All => f.write_str("all"),
        }
    }
}

/// Indicator lights. Commands are fire-and-forget; drivers log their own faults.
///
/// Takes `&self` because the lights are shared between the workflow and the
/// animation task.
pub trait LightDriver {
    fn on(&self, channel: LightChannel);
    fn off(&self, channel: LightChannel);
}

/// Probability assigned to one known label.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelProbability {
    pub label: String,
    pub probability: f32,
}

/// Classifier output: the winning label plus the full distribution.
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub label: String,
    pub probabilities: Vec<LabelProbability>,
}

/// Image classifier.
pub trait Classifier {
    fn predict(&self, image: &Path) -> Result<Prediction, DriverError>;
}

impl<T: WeightSource + ?Sized> WeightSource for Box<T> {
    fn read_mass(&mut self) -> Result<f32, DriverError> {
        (**self).read_mass()
    }

    fn zero(&mut self) -> Result<(), DriverError> {
        (**self).zero()
    }
}

impl<T: Camera + ?Sized> Camera for Box<T> {
    fn capture(&mut self) -> Result<PathBuf, DriverError> {
        (**self).capture()
    }

    fn release(&mut self) {
        (**self).release();
    }
}

impl<T: LightDriver + ?Sized> LightDriver for Box<T> {
    fn on(&self, channel: LightChannel) {
        (**self).on(channel);
    }

    fn off(&self, channel: LightChannel) {
        (**self).off(channel);
    }
}

impl<T: Classifier + ?Sized> Classifier for Box<T> {
    fn predict(&self, image: &Path) -> Result<Prediction, DriverError> {
        (**self).predict(image)
    }
}
