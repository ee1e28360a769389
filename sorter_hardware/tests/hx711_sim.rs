#![cfg(all(feature = "hardware", target_os = "linux"))]

use std::time::Duration;

use sorter_hardware::hardware::HardwareScale;
use sorter_traits::WeightSource;

// Needs a Pi with an HX711 on the given pins (or nothing wired, for the timeout path).
const DT_PIN: u8 = 23;
const SCK_PIN: u8 = 24;

#[test]
#[ignore = "requires GPIO access"]
fn unwired_hx711_reports_timeout() {
    let mut scale = HardwareScale::new(DT_PIN, SCK_PIN, -24.0, 0, 1, Duration::from_millis(5))
        .expect("open gpio");
    let err = scale.read_mass().expect_err("expect timeout");
    assert!(format!("{err}").to_lowercase().contains("timeout"));
}
