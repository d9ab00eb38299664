//! Command execution logic.
//!
//! Resolves the settings, builds the [`Monitor`] and drives it either once or
//! forever.

use crate::cli::Cli;
use crate::config;
use crate::monitor::Monitor;

/// Executes the mode selected on the command line.
///
/// # Errors
///
/// Returns `Err(String)` if:
/// - The settings file is unreadable or invalid, or setup was aborted
/// - The OCR models cannot be loaded
/// - A price lookup or webhook post fails
///
/// A normal run never returns `Ok`; it polls until the process is killed.
pub async fn run(cli: Cli) -> Result<(), String> {
    let settings = config::load_or_create_settings(&cli.config, cli.setup)?;
    log::info!(
        "Settings ready node={} fiat={} delay_secs={} daily_earnings={}",
        settings.node_name,
        settings.fiat,
        settings.delay_secs,
        settings.estimated_daily_earnings
    );

    let monitor = Monitor::new(settings)?;

    if cli.once {
        return monitor.poll_once().await;
    }

    monitor.announce_start().await?;
    monitor.run().await
}
