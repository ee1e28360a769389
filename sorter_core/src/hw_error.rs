//! Maps `Box<dyn Error>` from collaborator boundaries to typed `SorterError`.
//!
//! The traits in `sorter_traits` use `Box<dyn Error + Send + Sync>`; this
//! module converts those to our error enum, with an optional feature-gated
//! path for `sorter_hardware::error::HwError` downcasting.

use crate::error::SorterError;

/// Which collaborator produced an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collaborator {
    Scale,
    Camera,
    Classifier,
}

/// Map a trait-boundary error to a typed `SorterError`.
pub fn map_hw_error(e: &(dyn std::error::Error + 'static), from: Collaborator) -> SorterError {
    #[cfg(feature = "hardware-errors")]
    {
        use sorter_hardware::error::HwError;
        if let Some(hw) = e.downcast_ref::<HwError>()
            && from == Collaborator::Scale
            && matches!(hw, HwError::Timeout | HwError::DataReadyTimeout)
        {
            return SorterError::SensorTimeout;
        }
    }

    let s = e.to_string();
    match from {
        Collaborator::Scale if s.to_lowercase().contains("timeout") => SorterError::SensorTimeout,
        Collaborator::Scale => SorterError::Sensor(s),
        Collaborator::Camera => SorterError::Camera(s),
        Collaborator::Classifier => SorterError::Classifier(s),
    }
}
