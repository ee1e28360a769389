//! CLI argument definitions and shared statics.

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::OnceLock;

pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();
/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();

pub fn json_mode() -> bool {
    JSON_MODE.get().copied().unwrap_or(false)
}

#[derive(Parser, Debug)]
#[command(name = "sorter", version, about = "Waste sorting station CLI")]
pub struct Cli {
    /// Path to config TOML (typed)
    #[arg(long, value_name = "FILE", default_value = "etc/sorter_config.toml")]
    pub config: PathBuf,

    /// Optional calibration CSV (strict header)
    #[arg(long, value_name = "FILE")]
    pub calibration: Option<PathBuf>,

    /// Log and report as JSON lines instead of pretty
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace)
    #[arg(long = "log-level", value_name = "LEVEL", default_value = "info")]
    pub log_level: String,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the station: wait for items, classify them, light the bin
    Run {
        /// Stop after this many cycles
        #[arg(long, value_name = "N")]
        cycles: Option<u32>,
        /// Start each cycle immediately instead of waiting for Enter
        #[arg(long, action = ArgAction::SetTrue)]
        no_prompt: bool,
    },
    /// Take photos on demand (Enter to capture, `exit` to stop)
    Capture,
    /// Classify one image and show which bin it belongs in
    Classify {
        /// Image to classify
        #[arg(value_name = "IMAGE")]
        image: PathBuf,
    },
    /// Quick health check (hardware presence / sim ok)
    SelfCheck,
}
