//! ELM327 Emulator - Main Entry Point

use anyhow::Context;
use clap::Parser;
use elm_emulator::{init_logging, init_metrics, serve, Settings};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "elm-emulator")]
#[command(about = "ELM327/STN OBD-II adapter emulator")]
struct Args {
    /// Path to configuration file (defaults to ./elm-emulator.toml if present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let settings = Settings::load(args.config.as_deref()).context("Failed to load settings")?;
    init_logging(&settings.log_level, args.verbose)?;
    init_metrics(settings.metrics_listen)?;

    info!("=== ELM327 Emulator v{} ===", env!("CARGO_PKG_VERSION"));
    info!("Transport: {:?}", settings.transport);

    tokio::select! {
        result = serve(settings) => result?,
        _ = tokio::signal::ctrl_c() => info!("Shutting down..."),
    }

    Ok(())
}
