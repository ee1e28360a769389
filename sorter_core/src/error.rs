use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SorterError {
    #[error("scale read failed: {0}")]
    Sensor(String),
    #[error("timeout waiting for scale")]
    SensorTimeout,
    #[error("camera error: {0}")]
    Camera(String),
    #[error("classifier error: {0}")]
    Classifier(String),
    #[error("label {0:?} has no waste category")]
    UnmappedLabel(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("invalid state: {0}")]
    State(String),
}

#[derive(Debug, Error, Clone)]
pub enum BuildError {
    #[error("missing weight source")]
    MissingScale,
    #[error("missing light driver")]
    MissingLights,
    #[error("missing camera")]
    MissingCamera,
    #[error("missing classifier")]
    MissingClassifier,
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;
