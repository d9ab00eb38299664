//! Command-line interface definitions.
//!
//! The monitor normally runs without arguments: it resumes from `config.json`
//! or walks the operator through a first-run setup.

use std::path::PathBuf;

use clap::Parser;

use crate::config::DEFAULT_SETTINGS_PATH;

/// Main CLI structure for the ETCMC node monitor.
#[derive(Parser)]
#[command(name = "etcmc-monitor", version, about = "Reports an ETCMC node's ETCPOW balance to Discord")]
pub struct Cli {
    /// Settings file, created by the setup wizard if missing
    #[arg(long, default_value = DEFAULT_SETTINGS_PATH)]
    pub config: PathBuf,
    /// Run the setup wizard even if the settings file exists, overwriting it
    #[arg(long)]
    pub setup: bool,
    /// Send a single balance report and exit
    #[arg(long)]
    pub once: bool,
}
