//! ETCMC Node Monitor
//!
//! Reads the ETCPOW balance shown by the ETCMC GETH GUI, prices it in a fiat
//! currency and posts a report to a Discord webhook at a fixed interval.
//!
//! # Usage
//!
//! ```bash
//! # First run: answer the setup questions, then monitoring starts
//! etcmc-monitor
//!
//! # Check the capture and OCR setup with a single report
//! etcmc-monitor --once
//!
//! # Verbose logs
//! RUST_LOG=etcmc_monitor=debug etcmc-monitor
//! ```
//!
//! The GUI must run fullscreen on the primary monitor, and the OCR models
//! (`detection.mnn`, `latin_recognition.mnn`, `latin_charset.txt`) must be in
//! the `ocr/` directory unless `ocr_dir` says otherwise.

mod cli;
mod commands;
mod config;
mod estimate;
mod monitor;
mod notifier;
mod price;
mod reader;
mod utils;

use clap::Parser;
use cli::Cli;

#[tokio::main]
async fn main() {
    pretty_env_logger::init();
    log::info!("Application started version={}", env!("CARGO_PKG_VERSION"));
    let cli = Cli::parse();

    if let Err(e) = commands::run(cli).await {
        log::error!("Application error: {}", e);
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
