//! Drivers for the sorting station's collaborators.
//!
//! Simulated drivers are always available; the Raspberry Pi drivers
//! (HX711 over bit-banged GPIO, indicator LEDs) need the `hardware` feature.
//! Camera and classifier run as external programs on every platform.

pub mod camera;
pub mod classifier;
pub mod error;
pub mod sim;
pub mod util;

#[cfg(all(feature = "hardware", target_os = "linux"))]
pub mod hardware;
#[cfg(all(feature = "hardware", target_os = "linux"))]
pub mod hx711;

pub use camera::{CommandCamera, ImageSequence};
pub use classifier::CommandClassifier;
pub use sim::{SimulatedCamera, SimulatedClassifier, SimulatedLights, SimulatedScale};
