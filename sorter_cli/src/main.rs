#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]

mod cli;
mod error_fmt;
mod hw;
mod logging;
mod run;

use std::path::Path;

use clap::Parser;
use eyre::WrapErr;
use sorter_config::Config;
use sorter_core::SorterError;

use crate::cli::{Cli, Commands, JSON_MODE};
use crate::error_fmt::{exit_code_for_error, format_error_json, humanize};

fn main() {
    let cli = Cli::parse();
    let _ = JSON_MODE.set(cli.json);
    let _ = color_eyre::install();

    if let Err(err) = real_main(&cli) {
        if cli.json {
            println!("{}", format_error_json(&err));
        } else {
            eprintln!("{}", humanize(&err));
        }
        std::process::exit(exit_code_for_error(&err));
    }
}

fn real_main(cli: &Cli) -> eyre::Result<()> {
    let cfg = load_config(&cli.config, cli.calibration.as_deref())?;
    logging::init(cli, &cfg.logging)?;
    tracing::debug!(config = %cli.config.display(), "configuration loaded");

    match &cli.cmd {
        Commands::Run { cycles, no_prompt } => run::run(&cfg, *cycles, *no_prompt),
        Commands::Capture => run::capture(&cfg),
        Commands::Classify { image } => run::classify(&cfg, image),
        Commands::SelfCheck => run::self_check(&cfg),
    }
}

/// Read, parse, calibrate and validate. Every failure surfaces as a config error.
fn load_config(path: &Path, calibration: Option<&Path>) -> eyre::Result<Config> {
    let as_config = |e: eyre::Report| SorterError::Config(format!("{e:#}"));

    let text = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("read config {}", path.display()))
        .map_err(as_config)?;
    let mut cfg = sorter_config::load_toml(&text)
        .map_err(|e| SorterError::Config(format!("parse {}: {e}", path.display())))?;
    if let Some(csv) = calibration {
        let cal = sorter_config::load_calibration_csv(csv).map_err(as_config)?;
        cfg.apply_calibration(&cal);
    }
    cfg.validate().map_err(as_config)?;
    Ok(cfg)
}
