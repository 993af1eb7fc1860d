//! Command-line entry point.

use clap::Parser;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "diameter-core", version, about = "Diameter front-end core for an HSS")]
pub struct Opts {
    /// Path to the YAML config file.
    #[arg(short, long, default_value = "config.yaml")]
    pub config: PathBuf,

    /// Emit logs as JSON instead of the default human-readable format.
    #[arg(long)]
    pub json_logs: bool,

    /// Minimum log level (error, warn, info, debug, trace).
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

impl Opts {
    pub fn read() -> Opts {
        Opts::parse()
    }
}
