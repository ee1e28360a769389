//! Collaborator construction: GPIO/command-line drivers on a Pi built with
//! `--features hardware`, simulated ones everywhere else.

use sorter_config::Config;
use sorter_core::SorterError;
use sorter_core::hw_error::{Collaborator, map_hw_error};
use sorter_hardware::ImageSequence;
use sorter_traits::{Camera, Classifier, LightDriver, WeightSource};

pub type BoxedScale = Box<dyn WeightSource + Send>;
pub type BoxedLights = Box<dyn LightDriver + Send + Sync>;
pub type BoxedCamera = Box<dyn Camera + Send>;
pub type BoxedClassifier = Box<dyn Classifier + Send + Sync>;

pub struct Backends {
    pub scale: BoxedScale,
    pub lights: BoxedLights,
    pub camera: BoxedCamera,
    pub classifier: BoxedClassifier,
}

pub fn make_backends(cfg: &Config) -> eyre::Result<Backends> {
    Ok(Backends {
        scale: make_scale(cfg)?,
        lights: make_lights(cfg)?,
        camera: make_camera(cfg)?,
        classifier: make_classifier(cfg),
    })
}

fn images(cfg: &Config) -> Result<ImageSequence, SorterError> {
    ImageSequence::open(&cfg.camera.image_dir)
        .map_err(|e| map_hw_error(&e, Collaborator::Camera))
}

#[cfg(all(feature = "hardware", target_os = "linux"))]
pub fn make_scale(cfg: &Config) -> eyre::Result<BoxedScale> {
    let scale = sorter_hardware::hardware::HardwareScale::new(
        cfg.pins.hx711_dt,
        cfg.pins.hx711_sck,
        cfg.scale.reference_unit,
        cfg.scale.zero_value,
        cfg.scale.samples_per_read,
        std::time::Duration::from_millis(cfg.scale.read_timeout_ms),
    )
    .map_err(|e| map_hw_error(&e, Collaborator::Scale))?;
    Ok(Box::new(scale))
}

#[cfg(not(all(feature = "hardware", target_os = "linux")))]
pub fn make_scale(cfg: &Config) -> eyre::Result<BoxedScale> {
    tracing::info!(item_g = cfg.simulation.item_g, "using simulated scale");
    Ok(Box::new(sorter_hardware::SimulatedScale::new(
        cfg.simulation.item_g,
        std::time::Duration::from_millis(cfg.simulation.place_after_ms),
    )))
}

#[cfg(all(feature = "hardware", target_os = "linux"))]
pub fn make_lights(cfg: &Config) -> eyre::Result<BoxedLights> {
    let lights = sorter_hardware::hardware::GpioLights::new(
        cfg.pins.led_red,
        cfg.pins.led_green,
        cfg.pins.led_blue,
    )
    .map_err(|e| eyre::Report::new(e).wrap_err("open LED pins"))?;
    Ok(Box::new(lights))
}

#[cfg(not(all(feature = "hardware", target_os = "linux")))]
pub fn make_lights(_cfg: &Config) -> eyre::Result<BoxedLights> {
    Ok(Box::new(sorter_hardware::SimulatedLights::new()))
}

#[cfg(all(feature = "hardware", target_os = "linux"))]
pub fn make_camera(cfg: &Config) -> eyre::Result<BoxedCamera> {
    Ok(Box::new(sorter_hardware::CommandCamera::new(
        cfg.camera.device.clone(),
        cfg.camera.command.clone(),
        images(cfg)?,
        std::time::Duration::from_millis(cfg.camera.timeout_ms),
    )))
}

#[cfg(not(all(feature = "hardware", target_os = "linux")))]
pub fn make_camera(cfg: &Config) -> eyre::Result<BoxedCamera> {
    Ok(Box::new(sorter_hardware::SimulatedCamera::new(images(cfg)?)))
}

#[cfg(all(feature = "hardware", target_os = "linux"))]
pub fn make_classifier(cfg: &Config) -> BoxedClassifier {
    Box::new(sorter_hardware::CommandClassifier::new(
        cfg.classifier.command.clone(),
        std::time::Duration::from_millis(cfg.classifier.timeout_ms),
    ))
}

#[cfg(not(all(feature = "hardware", target_os = "linux")))]
pub fn make_classifier(cfg: &Config) -> BoxedClassifier {
    let labels = cfg
        .classifier
        .labels
        .clone()
        .unwrap_or_else(|| cfg.categories.keys().cloned().collect());
    Box::new(sorter_hardware::SimulatedClassifier::new(
        cfg.simulation.label.clone(),
        labels,
    ))
}
