//! Runtime configuration for the station.
//!
//! These are the structs the core runs on. They are separate from the
//! TOML-deserialized config in `sorter_config`; see `conversions`.

use std::time::Duration;

/// Scale listening and debounce parameters.
#[derive(Debug, Clone)]
pub struct MonitorCfg {
    /// Minimum step change (grams) between consecutive readings that counts
    /// as a placement or removal.
    pub place_threshold_g: f32,
    /// Time an item must stay on the platform before it is considered settled.
    pub settle: Duration,
    /// Extra delay between reads. Zero polls as fast as the driver allows.
    pub poll_interval: Duration,
}

impl Default for MonitorCfg {
    fn default() -> Self {
        Self {
            place_threshold_g: 4.0,
            settle: Duration::from_millis(1000),
            poll_interval: Duration::ZERO,
        }
    }
}

/// Shape of a light animation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Pattern {
    /// All channels on, then all off.
    Flash,
    /// Channels switched on one after another, then off in the same order.
    #[default]
    Wave,
}

/// A repeating light pattern and its step interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Animation {
    pub pattern: Pattern,
    pub interval: Duration,
}

impl Default for Animation {
    fn default() -> Self {
        Self {
            pattern: Pattern::Wave,
            interval: Duration::from_millis(200),
        }
    }
}

/// Classification cycle parameters.
#[derive(Debug, Clone)]
pub struct WorkflowCfg {
    /// Animation shown while the station is busy.
    pub processing: Animation,
    /// How long the processing animation runs before the photo is taken.
    pub indication: Duration,
    /// Release the camera after each capture instead of holding it open.
    pub release_after_capture: bool,
}

impl Default for WorkflowCfg {
    fn default() -> Self {
        Self {
            processing: Animation::default(),
            indication: Duration::from_millis(3000),
            release_after_capture: true,
        }
    }
}

/// Shutdown parameters.
#[derive(Debug, Clone)]
pub struct TeardownCfg {
    /// Upper bound on waiting for each background task to exit.
    pub join_timeout: Duration,
}

impl Default for TeardownCfg {
    fn default() -> Self {
        Self {
            join_timeout: Duration::from_millis(500),
        }
    }
}
