//! Perf Monitor - device performance sampler
//!
//! Samples CPU, FPS, jank and device vitals on a fixed cadence, serves
//! the live view over HTTP and optionally exports aggregated records as
//! CSV on shutdown.

use anyhow::{Context, Result};
use clap::Parser;
use monitor_lib::{health::components, MonitorSession, ProcfsSource};
use perf_monitor::{api, config, export};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Device performance sampler
#[derive(Parser)]
#[command(name = "perf-monitor")]
#[command(author, version, about = "Device performance sampler", long_about = None)]
struct Cli {
    /// Config file (TOML, JSON or YAML); PERFMON_* variables override it
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Package to watch instead of the foreground app
    #[arg(long, short)]
    package: Option<String>,

    /// Write aggregated records to this CSV file on shutdown
    #[arg(long, short)]
    export: Option<PathBuf>,

    /// API server port
    #[arg(long)]
    port: Option<u16>,

    /// Read /proc and /sys below this directory
    #[arg(long)]
    root: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    let cli = Cli::parse();

    let mut config = config::MonitorConfig::load(cli.config.as_deref())?;
    if let Some(package) = cli.package {
        config.package = Some(package);
    }
    if let Some(path) = cli.export {
        config.export_path = Some(path);
    }
    if let Some(port) = cli.port {
        config.api_port = port;
    }
    if let Some(root) = cli.root {
        config.procfs_root = root;
    }

    info!(
        device = %config.device_label,
        root = %config.procfs_root.display(),
        version = env!("CARGO_PKG_VERSION"),
        "Starting perf-monitor"
    );

    let source = Arc::new(
        ProcfsSource::with_root(config.procfs_root.clone())
            .with_power_supply(config.power_supply.clone()),
    );

    let session = MonitorSession::start(source, config.session_config())
        .await
        .context("Failed to start monitoring session")?;
    let view = session.view();
    view.health().register(components::API).await;

    let app_state = Arc::new(api::AppState::new(view.clone()));
    let mut api_handle = tokio::spawn(api::serve(config.api_port, app_state));

    // Wait for shutdown signal, or the API server failing first
    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for shutdown signal")?;
            info!("Shutdown signal received");
        }
        result = &mut api_handle => {
            let message = match result {
                Ok(Ok(())) => "API server exited".to_string(),
                Ok(Err(e)) => format!("API server failed: {:#}", e),
                Err(e) => format!("API server task failed: {}", e),
            };
            error!(error = %message, "Stopping session");
            view.health().set_unhealthy(components::API, message).await;
        }
    }

    session.stop().await?;
    api_handle.abort();

    if let Some(path) = &config.export_path {
        let records = view.records().await;
        if records.is_empty() {
            warn!(path = %path.display(), "No records to export");
        }
        export::write_csv(path, &records).await?;
        info!(path = %path.display(), records = records.len(), "Exported records");
    }

    info!("Shutting down");
    Ok(())
}
