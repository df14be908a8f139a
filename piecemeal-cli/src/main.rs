//! Piecemeal CLI - Command-line interface
//!
//! Inspects piece layouts and drives simulated downloads against a piece list.

mod commands;
mod simulation;

use std::path::PathBuf;

use clap::Parser;
use piecemeal_core::tracing_setup::{CliLogLevel, init_tracing};

#[derive(Parser)]
#[command(name = "piecemeal")]
#[command(about = "Inspect piece layouts and simulate concurrent piece downloads")]
struct Cli {
    /// Console log level
    #[arg(long, value_enum, default_value_t = CliLogLevel::Info, global = true)]
    log_level: CliLogLevel,
    /// Directory for the full trace log
    #[arg(long, global = true)]
    logs_dir: Option<PathBuf>,
    #[command(subcommand)]
    command: commands::Commands,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let log_file = init_tracing(cli.log_level.as_tracing_level(), cli.logs_dir.as_deref())?;
    tracing::info!("Full trace of this run in {}", log_file.display());

    if let Err(e) = commands::handle_command(cli.command).await {
        eprintln!("{}", e.user_message());
        return Err(e.into());
    }

    Ok(())
}
