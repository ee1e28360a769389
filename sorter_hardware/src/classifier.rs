//! Classifier adapter that runs an external prediction program.
//!
//! The program receives the image path and must print one JSON object:
//! `{"label": "glass", "probabilities": [{"label": "glass", "probability": 0.91}, ...]}`.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use sorter_traits::{Classifier, DriverError, LabelProbability, Prediction};

use crate::error::{HwError, Result};
use crate::util::{expand_args, output_within};

/// Allowed deviation of the probability sum from 1.0.
const SUM_TOLERANCE: f32 = 0.01;

#[derive(Debug, Deserialize)]
struct WireProbability {
    label: String,
    probability: f32,
}

#[derive(Debug, Deserialize)]
struct WirePrediction {
    label: String,
    probabilities: Vec<WireProbability>,
}

/// Parse and sanity-check the predictor's JSON output.
pub fn parse_prediction(stdout: &str) -> Result<Prediction> {
    let wire: WirePrediction = serde_json::from_str(stdout.trim())
        .map_err(|e| HwError::Protocol(format!("invalid prediction JSON: {e}")))?;
    if wire.probabilities.is_empty() {
        return Err(HwError::Protocol("prediction has no probabilities".into()));
    }
    if !wire.probabilities.iter().any(|p| p.label == wire.label) {
        return Err(HwError::Protocol(format!(
            "predicted label {:?} missing from probability list",
            wire.label
        )));
    }
    let sum: f32 = wire.probabilities.iter().map(|p| p.probability).sum();
    if !sum.is_finite() || (sum - 1.0).abs() > SUM_TOLERANCE {
        return Err(HwError::Protocol(format!(
            "probabilities sum to {sum:.4}, expected 1.0"
        )));
    }
    Ok(Prediction {
        label: wire.label,
        probabilities: wire
            .probabilities
            .into_iter()
            .map(|p| LabelProbability {
                label: p.label,
                probability: p.probability,
            })
            .collect(),
    })
}

pub struct CommandClassifier {
    command: Vec<String>,
    timeout: Duration,
}

impl CommandClassifier {
    pub fn new(command: Vec<String>, timeout: Duration) -> Self {
        Self { command, timeout }
    }

    fn run(&self, image: &Path) -> Result<Prediction> {
        let image_str = image.to_string_lossy();
        let argv = expand_args(&self.command, &[("image", image_str.as_ref())]);
        let (program, args) = argv.split_first().ok_or_else(|| HwError::Command {
            program: String::new(),
            detail: "empty classifier command".into(),
        })?;
        let output = output_within(program, args, self.timeout)?;
        if !output.status.success() {
            return Err(HwError::Command {
                program: program.clone(),
                detail: format!(
                    "{}: {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }
        parse_prediction(&String::from_utf8_lossy(&output.stdout))
    }
}

impl Classifier for CommandClassifier {
    fn predict(&self, image: &Path) -> std::result::Result<Prediction, DriverError> {
        Ok(self.run(image)?)
    }
}
