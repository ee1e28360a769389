//! Raspberry Pi drivers: HX711 scale and three-colour indicator LEDs.

use std::sync::Mutex;
use std::time::Duration;

use rppal::gpio::{Gpio, OutputPin};
use sorter_traits::{DriverError, LightChannel, LightColor, LightDriver, WeightSource};

use crate::error::Result;
use crate::hx711::{Hx711, gpio_err};

/// Load cell read through an HX711, reporting grams.
///
/// grams = (raw - zero_value) / reference_unit
pub struct HardwareScale {
    hx711: Hx711,
    reference_unit: f64,
    zero_value: f64,
    samples: u8,
    timeout: Duration,
}

impl HardwareScale {
    pub fn new(
        dt_pin: u8,
        sck_pin: u8,
        reference_unit: f32,
        zero_value: i32,
        samples: u8,
        timeout: Duration,
    ) -> Result<Self> {
        let gpio = Gpio::new().map_err(gpio_err)?;
        let dt = gpio.get(dt_pin).map_err(gpio_err)?.into_input();
        let sck = gpio.get(sck_pin).map_err(gpio_err)?.into_output();
        tracing::info!(dt_pin, sck_pin, reference_unit, zero_value, "hx711 opened");
        Ok(Self {
            hx711: Hx711::new(dt, sck),
            reference_unit: f64::from(reference_unit),
            zero_value: f64::from(zero_value),
            samples,
            timeout,
        })
    }
}

impl WeightSource for HardwareScale {
    fn read_mass(&mut self) -> std::result::Result<f32, DriverError> {
        let mut attempts = 0;
        let max_attempts = 3;
        loop {
            match self.hx711.read_average(self.samples, self.timeout) {
                Ok(raw) => {
                    let grams = ((raw - self.zero_value) / self.reference_unit) as f32;
                    tracing::trace!(raw, grams, "hx711 sample");
                    return Ok(grams);
                }
                Err(crate::error::HwError::DataReadyTimeout) if attempts < max_attempts => {
                    attempts += 1;
                    tracing::warn!(retries = attempts, "scale timeout, retrying");
                }
                Err(e) => {
                    tracing::error!(error = %e, "scale read error");
                    return Err(Box::new(e));
                }
            }
        }
    }

    fn zero(&mut self) -> std::result::Result<(), DriverError> {
        let raw = self.hx711.read_average(self.samples, self.timeout)?;
        self.zero_value = raw;
        tracing::debug!(zero_value = raw, "scale zeroed");
        Ok(())
    }
}

/// Red/green/blue LEDs on three GPIO outputs.
pub struct GpioLights {
    pins: Mutex<[OutputPin; 3]>,
}

impl GpioLights {
    pub fn new(red: u8, green: u8, blue: u8) -> Result<Self> {
        let gpio = Gpio::new().map_err(gpio_err)?;
        let open = |pin: u8| -> Result<OutputPin> {
            Ok(gpio.get(pin).map_err(gpio_err)?.into_output_low())
        };
        Ok(Self {
            pins: Mutex::new([open(red)?, open(green)?, open(blue)?]),
        })
    }

    fn drive(&self, channel: LightChannel, high: bool) {
        let Ok(mut pins) = self.pins.lock() else {
            tracing::error!(%channel, "light pins mutex poisoned");
            return;
        };
        let idx: &[usize] = match channel {
            LightChannel::All => &[0, 1, 2],
            LightChannel::Color(LightColor::Red) => &[0],
            LightChannel::Color(LightColor::Green) => &[1],
            LightChannel::Color(LightColor::Blue) => &[2],
        };
        for &i in idx {
            if high {
                pins[i].set_high();
            } else {
                pins[i].set_low();
            }
        }
    }
}

impl LightDriver for GpioLights {
    fn on(&self, channel: LightChannel) {
        self.drive(channel, true);
    }

    fn off(&self, channel: LightChannel) {
        self.drive(channel, false);
    }
}
