#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schema and scale calibration parsing for the sorting station.
//!
//! - `Config` and its sections are deserialized from TOML and validated.
//! - The calibration CSV loader enforces headers and fits the HX711
//!   counts-per-gram slope and zero offset by least squares.
use serde::Deserialize;
use std::collections::BTreeMap;

/// Calibration CSV schema.
///
/// Expected headers:
/// raw,grams
///
/// Example:
/// raw,grams
/// 122930,0.0
/// 120530,100.0
#[derive(Debug, Deserialize, Clone, Copy)]
pub struct CalibrationRow {
    pub raw: i64,
    pub grams: f32,
}

/// BCM pin numbers.
#[derive(Debug, Deserialize)]
pub struct Pins {
    pub hx711_dt: u8,
    pub hx711_sck: u8,
    pub led_red: u8,
    pub led_green: u8,
    pub led_blue: u8,
}

impl Default for Pins {
    fn default() -> Self {
        Self {
            hx711_dt: 23,
            hx711_sck: 24,
            led_red: 17,
            led_green: 18,
            led_blue: 22,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ScaleCfg {
    /// Step change (grams) between consecutive polls that counts as placement/removal.
    pub place_threshold_g: f32,
    /// Time an item must sit on the scale before it is considered settled.
    pub settle_ms: u64,
    /// Extra delay between polls; 0 polls as fast as the driver returns.
    pub poll_interval_ms: u64,
    /// Raw conversions averaged per mass reading.
    pub samples_per_read: u8,
    /// Max time to wait for HX711 data-ready before failing a conversion.
    pub read_timeout_ms: u64,
    /// Raw counts per gram (sign follows the load cell wiring).
    pub reference_unit: f32,
    /// Raw counts with an empty platform.
    pub zero_value: i32,
}

impl Default for ScaleCfg {
    fn default() -> Self {
        Self {
            place_threshold_g: 4.0,
            settle_ms: 1000,
            poll_interval_ms: 0,
            samples_per_read: 20,
            read_timeout_ms: 150,
            reference_unit: -24.0,
            zero_value: 122_930,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Pattern {
    Flash,
    #[default]
    Wave,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LightsCfg {
    pub flash_interval_ms: u64,
    pub wave_interval_ms: u64,
    /// Animation shown while the station initialises and before each capture.
    pub processing_pattern: Pattern,
    /// How long the processing animation runs before the photo is taken.
    pub indication_ms: u64,
}

impl Default for LightsCfg {
    fn default() -> Self {
        Self {
            flash_interval_ms: 500,
            wave_interval_ms: 200,
            processing_pattern: Pattern::Wave,
            indication_ms: 3000,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct CameraCfg {
    pub image_dir: String,
    pub device: String,
    /// Capture program and arguments. `{device}` and `{path}` are substituted.
    pub command: Vec<String>,
    /// Release the device after every capture instead of holding it between cycles.
    pub release_after_capture: bool,
    /// A capture program still running after this long is killed.
    pub timeout_ms: u64,
}

impl Default for CameraCfg {
    fn default() -> Self {
        Self {
            image_dir: "images".to_string(),
            device: "/dev/video0".to_string(),
            command: ["fswebcam", "-d", "{device}", "--no-banner", "-r", "1280x720", "{path}"]
                .iter()
                .map(ToString::to_string)
                .collect(),
            release_after_capture: true,
            timeout_ms: 10_000,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ClassifierCfg {
    /// Prediction program and arguments. `{image}` is substituted; stdout must be JSON.
    pub command: Vec<String>,
    /// Labels the model can emit. When set, `[categories]` must cover all of them.
    pub labels: Option<Vec<String>>,
    /// A prediction program still running after this long is killed.
    pub timeout_ms: u64,
}

impl Default for ClassifierCfg {
    fn default() -> Self {
        Self {
            command: vec!["sorter-predict".to_string(), "{image}".to_string()],
            labels: None,
            timeout_ms: 30_000,
        }
    }
}

/// Bin a label is sorted into.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Recycling,
    Compost,
    Trash,
}

/// Label to bin table shipped with the stock garbage model.
pub fn default_categories() -> BTreeMap<String, Category> {
    [
        ("cardboard", Category::Recycling),
        ("compost", Category::Compost),
        ("glass", Category::Recycling),
        ("metal", Category::Recycling),
        ("paper", Category::Compost),
        ("plastic", Category::Recycling),
        ("trash", Category::Trash),
    ]
    .into_iter()
    .map(|(label, cat)| (label.to_string(), cat))
    .collect()
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ShutdownCfg {
    /// Upper bound on waiting for each background task during teardown.
    pub join_timeout_ms: u64,
}

impl Default for ShutdownCfg {
    fn default() -> Self {
        Self {
            join_timeout_ms: 500,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

/// Behaviour of the simulated collaborators used when no hardware is attached.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SimulationCfg {
    /// Mass of the simulated item in grams.
    pub item_g: f32,
    /// Delay after each zero before the item lands on the platform.
    pub place_after_ms: u64,
    /// Label the simulated classifier predicts.
    pub label: String,
}

impl Default for SimulationCfg {
    fn default() -> Self {
        Self {
            item_g: 42.0,
            place_after_ms: 500,
            label: "plastic".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub pins: Pins,
    #[serde(default)]
    pub scale: ScaleCfg,
    #[serde(default)]
    pub lights: LightsCfg,
    #[serde(default)]
    pub camera: CameraCfg,
    #[serde(default)]
    pub classifier: ClassifierCfg,
    #[serde(default = "default_categories")]
    pub categories: BTreeMap<String, Category>,
    #[serde(default)]
    pub shutdown: ShutdownCfg,
    #[serde(default)]
    pub logging: Logging,
    #[serde(default)]
    pub simulation: SimulationCfg,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

impl Config {
    /// Apply a fitted calibration over the `[scale]` values.
    pub fn apply_calibration(&mut self, cal: &ScaleCalibration) {
        self.scale.reference_unit = cal.reference_unit;
        self.scale.zero_value = cal.zero_value;
    }

    pub fn validate(&self) -> eyre::Result<()> {
        // Scale
        if !(self.scale.place_threshold_g.is_finite() && self.scale.place_threshold_g > 0.0) {
            eyre::bail!("scale.place_threshold_g must be > 0");
        }
        if self.scale.settle_ms > 60 * 1000 {
            eyre::bail!("scale.settle_ms is unreasonably large (>60s)");
        }
        if self.scale.samples_per_read == 0 {
            eyre::bail!("scale.samples_per_read must be >= 1");
        }
        if self.scale.read_timeout_ms == 0 {
            eyre::bail!("scale.read_timeout_ms must be >= 1");
        }
        if !self.scale.reference_unit.is_finite() || self.scale.reference_unit == 0.0 {
            eyre::bail!("scale.reference_unit must be non-zero");
        }

        // Lights
        if self.lights.flash_interval_ms == 0 {
            eyre::bail!("lights.flash_interval_ms must be >= 1");
        }
        if self.lights.wave_interval_ms == 0 {
            eyre::bail!("lights.wave_interval_ms must be >= 1");
        }

        // Camera
        if self.camera.command.is_empty() {
            eyre::bail!("camera.command must name a program");
        }
        if !self.camera.command.iter().any(|a| a.contains("{path}")) {
            eyre::bail!("camera.command must contain a {{path}} placeholder");
        }
        if self.camera.image_dir.trim().is_empty() {
            eyre::bail!("camera.image_dir must not be empty");
        }
        if self.camera.timeout_ms == 0 {
            eyre::bail!("camera.timeout_ms must be >= 1");
        }

        // Classifier and category coverage
        if self.classifier.command.is_empty() {
            eyre::bail!("classifier.command must name a program");
        }
        if self.classifier.timeout_ms == 0 {
            eyre::bail!("classifier.timeout_ms must be >= 1");
        }
        if self.categories.is_empty() {
            eyre::bail!("categories must map at least one label");
        }
        if let Some(labels) = &self.classifier.labels {
            let missing: Vec<&str> = labels
                .iter()
                .filter(|l| !self.categories.contains_key(l.as_str()))
                .map(String::as_str)
                .collect();
            if !missing.is_empty() {
                eyre::bail!(
                    "categories does not cover classifier labels: {}",
                    missing.join(", ")
                );
            }
        }

        // Shutdown
        if self.shutdown.join_timeout_ms == 0 {
            eyre::bail!("shutdown.join_timeout_ms must be >= 1");
        }

        // Logging
        if let Some(rot) = self.logging.rotation.as_deref()
            && !matches!(rot, "never" | "daily" | "hourly")
        {
            eyre::bail!("logging.rotation must be one of never|daily|hourly");
        }

        // Simulation
        if !self.simulation.item_g.is_finite() || self.simulation.item_g < 0.0 {
            eyre::bail!("simulation.item_g must be >= 0");
        }

        Ok(())
    }
}

/// HX711 conversion parameters: grams = (raw - zero_value) / reference_unit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaleCalibration {
    pub reference_unit: f32,
    pub zero_value: i32,
}

impl ScaleCalibration {
    /// Least-squares fit of raw = reference_unit * grams + zero_value.
    ///
    /// Requires at least two rows with distinct gram values.
    pub fn from_rows(rows: &[CalibrationRow]) -> eyre::Result<Self> {
        if rows.len() < 2 {
            eyre::bail!("calibration requires at least two rows, got {}", rows.len());
        }
        if let Some(i) = rows.iter().position(|r| !r.grams.is_finite()) {
            eyre::bail!("calibration row {} has a non-finite grams value", i + 2);
        }

        let n = rows.len() as f64;
        let mean_g = rows.iter().map(|r| f64::from(r.grams)).sum::<f64>() / n;
        let mean_raw = rows.iter().map(|r| r.raw as f64).sum::<f64>() / n;
        let (mut sgg, mut sgr) = (0.0f64, 0.0f64);
        for r in rows {
            let g = f64::from(r.grams) - mean_g;
            sgg += g * g;
            sgr += g * (r.raw as f64 - mean_raw);
        }
        if !sgg.is_finite() || sgg == 0.0 {
            eyre::bail!("calibration cannot determine slope (all rows share one grams value)");
        }
        let slope = sgr / sgg;
        #[allow(clippy::cast_possible_truncation)]
        let reference_unit = slope as f32;
        if !reference_unit.is_finite() || reference_unit == 0.0 {
            eyre::bail!("calibration produced an unusable slope (raw counts do not track load)");
        }
        let intercept = mean_raw - slope * mean_g;
        if !intercept.is_finite() || intercept.abs() > f64::from(i32::MAX) {
            eyre::bail!("calibration produced an out-of-range zero value");
        }

        Ok(Self {
            reference_unit,
            zero_value: intercept.round() as i32,
        })
    }
}

pub fn load_calibration_csv(path: &std::path::Path) -> eyre::Result<ScaleCalibration> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)
        .map_err(|e| eyre::eyre!("open calibration CSV {:?}: {}", path, e))?;

    let headers = rdr
        .headers()
        .map_err(|e| eyre::eyre!("read CSV headers {:?}: {}", path, e))?
        .clone();
    let actual: Vec<&str> = headers.iter().map(str::trim).collect();
    if actual != ["raw", "grams"] {
        eyre::bail!(
            "calibration CSV must have headers 'raw,grams', got: {}",
            actual.join(",")
        );
    }

    let mut rows = Vec::new();
    for (idx, rec) in rdr.deserialize::<CalibrationRow>().enumerate() {
        match rec {
            Ok(row) => rows.push(row),
            Err(e) => eyre::bail!("invalid CSV row {}: {}", idx + 2, e),
        }
    }

    ScaleCalibration::from_rows(&rows)
}
