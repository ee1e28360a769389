//! `From` implementations bridging `sorter_config` types to `sorter_core` types.

use std::time::Duration;

use crate::categories::CategoryTable;
use crate::config::{Animation, MonitorCfg, Pattern, TeardownCfg, WorkflowCfg};
use crate::types::WasteCategory;

// ── MonitorCfg ───────────────────────────────────────────────────────────────

impl From<&sorter_config::ScaleCfg> for MonitorCfg {
    fn from(c: &sorter_config::ScaleCfg) -> Self {
        Self {
            place_threshold_g: c.place_threshold_g,
            settle: Duration::from_millis(c.settle_ms),
            poll_interval: Duration::from_millis(c.poll_interval_ms),
        }
    }
}

// ── Animation ────────────────────────────────────────────────────────────────

impl From<sorter_config::Pattern> for Pattern {
    fn from(p: sorter_config::Pattern) -> Self {
        match p {
            sorter_config::Pattern::Flash => Pattern::Flash,
            sorter_config::Pattern::Wave => Pattern::Wave,
        }
    }
}

/// The processing animation, with the interval configured for its pattern.
impl From<&sorter_config::LightsCfg> for Animation {
    fn from(c: &sorter_config::LightsCfg) -> Self {
        let pattern = Pattern::from(c.processing_pattern);
        let interval_ms = match pattern {
            Pattern::Flash => c.flash_interval_ms,
            Pattern::Wave => c.wave_interval_ms,
        };
        Self {
            pattern,
            interval: Duration::from_millis(interval_ms),
        }
    }
}

// ── WorkflowCfg ──────────────────────────────────────────────────────────────

impl From<&sorter_config::Config> for WorkflowCfg {
    fn from(c: &sorter_config::Config) -> Self {
        Self {
            processing: Animation::from(&c.lights),
            indication: Duration::from_millis(c.lights.indication_ms),
            release_after_capture: c.camera.release_after_capture,
        }
    }
}

// ── TeardownCfg ──────────────────────────────────────────────────────────────

impl From<&sorter_config::ShutdownCfg> for TeardownCfg {
    fn from(c: &sorter_config::ShutdownCfg) -> Self {
        Self {
            join_timeout: Duration::from_millis(c.join_timeout_ms),
        }
    }
}

// ── Categories ───────────────────────────────────────────────────────────────

impl From<sorter_config::Category> for WasteCategory {
    fn from(c: sorter_config::Category) -> Self {
        match c {
            sorter_config::Category::Recycling => WasteCategory::Recycling,
            sorter_config::Category::Compost => WasteCategory::Compost,
            sorter_config::Category::Trash => WasteCategory::Trash,
        }
    }
}

impl From<&sorter_config::Config> for CategoryTable {
    fn from(c: &sorter_config::Config) -> Self {
        c.categories
            .iter()
            .map(|(label, cat)| (label.clone(), WasteCategory::from(*cat)))
            .collect()
    }
}
