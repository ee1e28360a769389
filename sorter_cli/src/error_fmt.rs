//! Human-readable error descriptions, exit codes and structured JSON errors.

use serde_json::json;
use sorter_core::{BuildError, SorterError, SupervisorError};

use crate::run::Terminated;

/// Conventional shell status for a process ended by SIGINT.
pub const EXIT_TERMINATED: i32 = 130;

/// First error of type `T` anywhere in the report's chain.
fn find<T: std::error::Error + 'static>(err: &eyre::Report) -> Option<&T> {
    err.chain().find_map(|e| e.downcast_ref::<T>())
}

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    if find::<Terminated>(err).is_some() {
        return "What happened: The station was stopped by a termination signal.\nThe camera was released and the lights were turned off.".to_string();
    }

    if let Some(be) = find::<BuildError>(err) {
        return match be {
            BuildError::MissingScale => {
                "What happened: No scale was provided to the station.\nLikely causes: The HX711 driver failed to initialize or was not wired into the builder.\nHow to fix: Ensure the scale is created successfully and passed via with_scale(...).".to_string()
            }
            BuildError::MissingLights => {
                "What happened: No light driver was provided to the station.\nLikely causes: LED pins failed to open or the driver was not wired into the builder.\nHow to fix: Ensure the lights are created successfully and passed via with_lights(...).".to_string()
            }
            BuildError::MissingCamera => {
                "What happened: No camera was provided to the station.\nLikely causes: The camera backend failed to initialize.\nHow to fix: Check [camera] in the config and that image_dir is writable.".to_string()
            }
            BuildError::MissingClassifier => {
                "What happened: No classifier was provided to the station.\nLikely causes: The classifier backend was not wired into the builder.\nHow to fix: Check [classifier] in the config.".to_string()
            }
            BuildError::InvalidConfig(msg) => format!(
                "What happened: Invalid configuration ({msg}).\nLikely causes: Missing or out-of-range values in the TOML.\nHow to fix: Edit the config file, then rerun. See etc/sorter_config.toml for a sample."
            ),
        };
    }

    if let Some(se) = find::<SorterError>(err) {
        return match se {
            SorterError::SensorTimeout => "What happened: Scale read timed out.\nLikely causes: HX711 not wired correctly, no power/ground, or timeout too low.\nHow to fix: Verify DT/SCK pins and power, and consider increasing scale.read_timeout_ms in the config.".to_string(),
            SorterError::Sensor(msg) => format!(
                "What happened: The scale could not be read ({msg}).\nLikely causes: Wiring fault or a driver error.\nHow to fix: Run `sorter self-check` and inspect the logs."
            ),
            SorterError::Camera(msg) => format!(
                "What happened: The camera failed ({msg}).\nLikely causes: Camera not connected, capture command missing, or image_dir not writable.\nHow to fix: Check [camera] in the config and try `sorter capture`."
            ),
            SorterError::Classifier(msg) => format!(
                "What happened: The classifier failed ({msg}).\nLikely causes: Model command missing or it printed unexpected output.\nHow to fix: Run the classifier command by hand on a saved image and check [classifier] in the config."
            ),
            SorterError::UnmappedLabel(label) => format!(
                "What happened: The classifier returned {label:?}, which has no waste category.\nLikely causes: The model was retrained with new labels.\nHow to fix: Add {label:?} under [categories] in the config."
            ),
            SorterError::Config(msg) => {
                if msg.to_ascii_lowercase().contains("calibration csv must have headers") {
                    return "Invalid headers in calibration CSV. Expected 'raw,grams'.".to_string();
                }
                format!(
                    "What happened: Configuration is invalid or unreadable.\nDetails: {msg}\nHow to fix: Edit the TOML config and try again."
                )
            }
            SorterError::State(msg) => format!(
                "What happened: The station reached an unexpected state ({msg}).\nLikely causes: See logs.\nHow to fix: Re-run with --log-level=debug or set RUST_LOG for more detail."
            ),
        };
    }

    if let Some(sv) = find::<SupervisorError>(err) {
        return format!(
            "What happened: {sv}.\nLikely causes: Shutdown raced with a new cycle, or the system is out of threads.\nHow to fix: Restart the station; check system resource limits if it persists."
        );
    }

    // String-based heuristics for errors coming from init
    let msg = err.to_string();
    let lower = msg.to_ascii_lowercase();

    if lower.contains("open led pins") || lower.contains("open hx711") {
        return "What happened: Failed to initialize hardware pins.\nLikely causes: Incorrect pin numbers or insufficient GPIO permissions.\nHow to fix: Fix the [pins] values in the config; ensure the process has permission to access GPIO.".to_string();
    }

    let mut cause = String::new();
    if let Some(src) = err.source() {
        cause = format!(" Cause: {src}");
    }
    format!(
        "Something went wrong.{cause}\nHow to fix: Re-run with --log-level=debug for details. Original: {msg}"
    )
}

/// Stable process exit codes. Anything unrecognised maps to 1.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    if find::<Terminated>(err).is_some() {
        return EXIT_TERMINATED;
    }
    if let Some(BuildError::InvalidConfig(_)) = find::<BuildError>(err) {
        return 2;
    }
    match find::<SorterError>(err) {
        Some(SorterError::Config(_)) => 2,
        Some(SorterError::Sensor(_) | SorterError::SensorTimeout) => 3,
        Some(SorterError::Camera(_)) => 4,
        Some(SorterError::Classifier(_)) => 5,
        Some(SorterError::UnmappedLabel(_)) => 6,
        Some(SorterError::State(_)) | None => 1,
    }
}

fn reason_name(err: &eyre::Report) -> &'static str {
    if find::<Terminated>(err).is_some() {
        return "Terminated";
    }
    if let Some(be) = find::<BuildError>(err) {
        return match be {
            BuildError::InvalidConfig(_) => "InvalidConfig",
            _ => "MissingCollaborator",
        };
    }
    if find::<SupervisorError>(err).is_some() {
        return "Supervisor";
    }
    match find::<SorterError>(err) {
        Some(SorterError::Sensor(_)) => "Sensor",
        Some(SorterError::SensorTimeout) => "SensorTimeout",
        Some(SorterError::Camera(_)) => "Camera",
        Some(SorterError::Classifier(_)) => "Classifier",
        Some(SorterError::UnmappedLabel(_)) => "UnmappedLabel",
        Some(SorterError::Config(_)) => "Config",
        Some(SorterError::State(_)) => "State",
        None => "Error",
    }
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    let mut obj = json!({ "reason": reason_name(err), "message": humanize(err) });
    if let Some(SorterError::UnmappedLabel(label)) = find::<SorterError>(err) {
        obj["details"] = json!({ "label": label });
    }
    obj.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(SorterError::Config("bad".into()), 2)]
    #[case(SorterError::SensorTimeout, 3)]
    #[case(SorterError::Sensor("wire".into()), 3)]
    #[case(SorterError::Camera("gone".into()), 4)]
    #[case(SorterError::Classifier("bad output".into()), 5)]
    #[case(SorterError::UnmappedLabel("styrofoam".into()), 6)]
    #[case(SorterError::State("huh".into()), 1)]
    fn exit_codes_are_stable(#[case] e: SorterError, #[case] code: i32) {
        assert_eq!(exit_code_for_error(&eyre::Report::new(e)), code);
    }

    #[test]
    fn wrapped_errors_are_still_recognised() {
        let err = eyre::Report::new(SorterError::Camera("gone".into())).wrap_err("capture");
        assert_eq!(exit_code_for_error(&err), 4);
        assert!(humanize(&err).contains("camera failed"));
    }

    #[test]
    fn invalid_build_config_maps_to_config_code() {
        let err = eyre::Report::new(BuildError::InvalidConfig("threshold"));
        assert_eq!(exit_code_for_error(&err), 2);
        assert_eq!(exit_code_for_error(&eyre::Report::new(BuildError::MissingCamera)), 1);
    }

    #[test]
    fn calibration_header_gets_short_message() {
        let err = eyre::Report::new(SorterError::Config(
            "calibration CSV must have headers 'raw,grams'".into(),
        ));
        assert_eq!(
            humanize(&err),
            "Invalid headers in calibration CSV. Expected 'raw,grams'."
        );
    }

    #[test]
    fn json_carries_reason_and_label() {
        let err = eyre::Report::new(SorterError::UnmappedLabel("styrofoam".into()));
        let v: serde_json::Value = serde_json::from_str(&format_error_json(&err)).unwrap();
        assert_eq!(v["reason"], "UnmappedLabel");
        assert_eq!(v["details"]["label"], "styrofoam");
        assert!(v["message"].as_str().unwrap().contains("[categories]"));
    }

    #[test]
    fn termination_exits_like_sigint() {
        let err = eyre::Report::new(Terminated);
        assert_eq!(exit_code_for_error(&err), 130);
        assert!(humanize(&err).contains("termination signal"));
        let v: serde_json::Value = serde_json::from_str(&format_error_json(&err)).unwrap();
        assert_eq!(v["reason"], "Terminated");
    }

    #[test]
    fn unknown_errors_fall_back_to_generic() {
        let err = eyre::eyre!("boom");
        assert_eq!(exit_code_for_error(&err), 1);
        assert!(humanize(&err).starts_with("Something went wrong."));
        let v: serde_json::Value = serde_json::from_str(&format_error_json(&err)).unwrap();
        assert_eq!(v["reason"], "Error");
    }
}
