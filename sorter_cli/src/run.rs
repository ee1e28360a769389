//! Operator-facing commands: the run loop, capture, classify and self-check.

use std::io::{self, BufRead, Write};
use std::path::Path;
use std::time::Duration;

use eyre::WrapErr;
use serde_json::json;
use sorter_config::Config;
use sorter_core::hw_error::{Collaborator, map_hw_error};
use sorter_core::station::outcome_error;
use sorter_core::{
    CategoryTable, Classification, CycleOutcome, MonitorCfg, Station, TeardownCfg, WorkflowCfg,
};
use sorter_traits::{LightChannel, LightColor};
use tracing::info;

use crate::cli::json_mode;
use crate::error_fmt::EXIT_TERMINATED;
use crate::hw;

/// The loop ended because SIGINT or SIGTERM started a teardown.
#[derive(Debug, thiserror::Error)]
#[error("terminated by signal")]
pub struct Terminated;

pub fn build_station(cfg: &Config) -> eyre::Result<Station> {
    let hw::Backends {
        scale,
        lights,
        camera,
        classifier,
    } = hw::make_backends(cfg)?;
    let mut builder = Station::builder()
        .with_scale(scale)
        .with_lights(lights)
        .with_camera(camera)
        .with_classifier(classifier)
        .with_monitor(MonitorCfg::from(&cfg.scale))
        .with_workflow(WorkflowCfg::from(cfg))
        .with_teardown(TeardownCfg::from(&cfg.shutdown))
        .with_categories(CategoryTable::from(cfg));
    if let Some(labels) = &cfg.classifier.labels {
        builder = builder.with_classifier_labels(labels.clone());
    }
    builder.build()
}

/// Operator loop. Each cycle waits for Enter (unless `no_prompt`), then for
/// an item to settle and be classified. EOF, `cycles` or a termination
/// signal ends the loop; the latter returns `Terminated` once teardown is done.
pub fn run(cfg: &Config, cycles: Option<u32>, no_prompt: bool) -> eyre::Result<()> {
    let station = build_station(cfg)?;
    let watcher = station.coordinator().spawn_watcher(|report| {
        info!(?report, "terminated by signal");
        std::process::exit(EXIT_TERMINATED);
    })?;
    let trigger = watcher.trigger();
    ctrlc::set_handler(move || trigger.request()).wrap_err("install termination handler")?;

    station.initialize()?;
    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    let mut done = 0u32;
    let mut last_failure = None;

    while cycles.is_none_or(|max| done < max) {
        if !no_prompt {
            print!("Place an item and press Enter (Ctrl-C to quit): ");
            io::stdout().flush()?;
            match lines.next() {
                None => break,
                Some(line) => {
                    line.wrap_err("read operator input")?;
                }
            }
        }
        let outcome = match station.run_cycle() {
            Ok(Some(outcome)) => outcome,
            Ok(None) => break,
            Err(_) if station.is_shutting_down() => break,
            Err(e) => return Err(e.into()),
        };
        print_outcome(&outcome);
        last_failure = outcome_error(&outcome).cloned();
        done += 1;
    }

    info!(cycles = done, "operator loop finished");
    // Read before our own shutdown raises the flag.
    let signalled = station.is_shutting_down();
    station.shutdown();
    if signalled {
        return Err(Terminated.into());
    }
    match last_failure {
        Some(e) => Err(e.into()),
        None => Ok(()),
    }
}

/// Standalone photo utility.
pub fn capture(cfg: &Config) -> eyre::Result<()> {
    let mut camera = hw::make_camera(cfg)?;
    let stdin = io::stdin();
    let mut taken = 0usize;
    println!("Press Enter to take a photo, type 'exit' to stop.");
    for line in stdin.lock().lines() {
        let line = line.wrap_err("read operator input")?;
        if line.trim().eq_ignore_ascii_case("exit") {
            break;
        }
        let path = camera
            .capture()
            .map_err(|e| map_hw_error(e.as_ref(), Collaborator::Camera))?;
        taken += 1;
        if json_mode() {
            println!("{}", json!({ "event": "capture", "image": path.display().to_string() }));
        } else {
            println!("Saved {}", path.display());
        }
    }
    camera.release();
    info!(taken, "capture session finished");
    Ok(())
}

/// Classify one image without the scale.
pub fn classify(cfg: &Config, image: &Path) -> eyre::Result<()> {
    let classifier = hw::make_classifier(cfg);
    let table = CategoryTable::from(cfg);
    let prediction = classifier
        .predict(image)
        .map_err(|e| map_hw_error(e.as_ref(), Collaborator::Classifier))?;
    let category = table.category(&prediction.label)?;
    print_outcome(&CycleOutcome::Classified(Classification {
        image: image.to_path_buf(),
        prediction,
        category,
        color: category.color(),
    }));
    Ok(())
}

/// Build every collaborator, read the scale once and blink each light.
pub fn self_check(cfg: &Config) -> eyre::Result<()> {
    let hw::Backends {
        mut scale, lights, ..
    } = hw::make_backends(cfg)?;
    let grams = scale
        .read_mass()
        .map_err(|e| map_hw_error(e.as_ref(), Collaborator::Scale))?;
    let blink = Duration::from_millis(cfg.lights.flash_interval_ms.min(250));
    for color in LightColor::ALL {
        lights.on(color.into());
        std::thread::sleep(blink);
        lights.off(color.into());
    }
    lights.off(LightChannel::All);
    if json_mode() {
        println!("{}", json!({ "event": "self_check", "ok": true, "scale_g": grams }));
    } else {
        println!("scale: {grams:.1} g");
        println!("lights: red, green, blue cycled");
        println!("OK");
    }
    Ok(())
}

fn print_outcome(outcome: &CycleOutcome) {
    if json_mode() {
        println!("{}", outcome_json(outcome));
        return;
    }
    match outcome {
        CycleOutcome::Classified(c) => {
            let mut rows: Vec<_> = c.prediction.probabilities.iter().collect();
            rows.sort_by(|a, b| b.probability.total_cmp(&a.probability));
            println!("{:<12} {:>11}", "label", "probability");
            for p in rows {
                println!("{:<12} {:>10.1}%", p.label, p.probability * 100.0);
            }
            println!("Waste belongs in {}.", c.category);
        }
        CycleOutcome::Failed(e) => println!("Cycle failed: {e}"),
        CycleOutcome::Aborted => println!("Cycle aborted."),
    }
}

fn outcome_json(outcome: &CycleOutcome) -> serde_json::Value {
    match outcome {
        CycleOutcome::Classified(c) => {
            let probabilities: serde_json::Map<_, _> = c
                .prediction
                .probabilities
                .iter()
                .map(|p| (p.label.clone(), json!(p.probability)))
                .collect();
            json!({
                "event": "cycle",
                "label": c.prediction.label,
                "category": c.category.name(),
                "color": c.color.name(),
                "image": c.image.display().to_string(),
                "probabilities": probabilities,
            })
        }
        CycleOutcome::Failed(e) => json!({ "event": "cycle", "error": e.to_string() }),
        CycleOutcome::Aborted => json!({ "event": "cycle", "aborted": true }),
    }
}
