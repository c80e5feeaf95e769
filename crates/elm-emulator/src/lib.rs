//! ELM327 Emulator Service
//!
//! Serves the adapter protocol to OBD-II host applications over TCP or a
//! serial port, backed by a simulated CAN bus with an engine ECU.

pub mod bus;
pub mod config;
pub mod ecu;
pub mod server;

use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

pub use config::Settings;
pub use server::{run_session, serve};

/// Initialize logging. `RUST_LOG` wins over `level`; `verbose` forces debug.
pub fn init_logging(level: &str, verbose: bool) -> anyhow::Result<()> {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
    };

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

/// Start the Prometheus exporter when an address is configured
pub fn init_metrics(listen: Option<SocketAddr>) -> anyhow::Result<()> {
    let Some(addr) = listen else {
        return Ok(());
    };
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    info!("Metrics exported on http://{}/metrics", addr);
    Ok(())
}
