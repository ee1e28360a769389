//! Plain data flowing through the station.

use std::fmt;
use std::time::Instant;

use sorter_traits::LightColor;

/// One scale reading. Immutable once taken.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeightSample {
    pub grams: f32,
    pub at: Instant,
}

impl WeightSample {
    pub fn new(grams: f32, at: Instant) -> Self {
        Self { grams, at }
    }
}

/// What the scale believes is on the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScaleState {
    #[default]
    Empty,
    Placed,
    Settled,
}

/// Discrete scale events. Each maps to at most one handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SemanticEvent {
    ItemPlaced,
    ItemSettled,
    ItemRemoved,
}

impl SemanticEvent {
    pub const ALL: [SemanticEvent; 3] = [
        SemanticEvent::ItemPlaced,
        SemanticEvent::ItemSettled,
        SemanticEvent::ItemRemoved,
    ];

    #[inline]
    pub(crate) fn index(self) -> usize {
        match self {
            SemanticEvent::ItemPlaced => 0,
            SemanticEvent::ItemSettled => 1,
            SemanticEvent::ItemRemoved => 2,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            SemanticEvent::ItemPlaced => "item_placed",
            SemanticEvent::ItemSettled => "item_settled",
            SemanticEvent::ItemRemoved => "item_removed",
        }
    }
}

impl fmt::Display for SemanticEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Bin an item belongs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WasteCategory {
    Recycling,
    Compost,
    Trash,
}

impl WasteCategory {
    /// Indicator colour for this bin.
    pub fn color(self) -> LightColor {
        match self {
            WasteCategory::Recycling => LightColor::Blue,
            WasteCategory::Compost => LightColor::Green,
            WasteCategory::Trash => LightColor::Red,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            WasteCategory::Recycling => "recycling",
            WasteCategory::Compost => "compost",
            WasteCategory::Trash => "trash",
        }
    }
}

impl fmt::Display for WasteCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
