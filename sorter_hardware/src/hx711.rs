//! Bit-banged HX711 load-cell amplifier over rppal GPIO.

use std::time::Duration;
use tracing::trace;

use crate::error::{HwError, Result};
use crate::util::wait_until_low_with_timeout;

/// Clock pulses after the 24 data bits: 25 selects channel A at gain 128.
const GAIN_PULSES_A128: u8 = 25;

pub struct Hx711 {
    dt: rppal::gpio::InputPin,
    sck: rppal::gpio::OutputPin,
    gain_pulses: u8,
}

impl Hx711 {
    pub fn new(dt: rppal::gpio::InputPin, mut sck: rppal::gpio::OutputPin) -> Self {
        sck.set_low(); // clock idle low
        Self {
            dt,
            sck,
            gain_pulses: GAIN_PULSES_A128,
        }
    }

    /// One signed 24-bit conversion.
    pub fn read_with_timeout(&mut self, timeout: Duration) -> Result<i32> {
        // DT goes low when a conversion is ready
        let dt = &self.dt;
        wait_until_low_with_timeout(|| dt.is_high(), timeout, Duration::from_micros(200))?;

        let mut value: i32 = 0;
        for _ in 0..24 {
            self.sck.set_high();
            std::hint::spin_loop();
            value = (value << 1) | i32::from(self.dt.is_high());
            self.sck.set_low();
            std::hint::spin_loop();
        }
        for _ in 0..self.gain_pulses {
            self.sck.set_high();
            std::hint::spin_loop();
            self.sck.set_low();
            std::hint::spin_loop();
        }

        if (value & 0x80_0000) != 0 {
            value |= !0xFF_FFFF;
        }
        trace!(raw = value, "hx711 raw read");
        Ok(value)
    }

    /// Mean of `samples` conversions.
    pub fn read_average(&mut self, samples: u8, timeout: Duration) -> Result<f64> {
        let n = samples.max(1);
        let mut sum = 0i64;
        for _ in 0..n {
            sum += i64::from(self.read_with_timeout(timeout)?);
        }
        Ok(sum as f64 / f64::from(n))
    }
}

pub(crate) fn gpio_err(e: rppal::gpio::Error) -> HwError {
    HwError::Gpio(e.to_string())
}
