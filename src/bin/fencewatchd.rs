//! fencewatch daemon - Geofence tracking and observer broadcast server
//!
//! Accepts location reports, SOS signals and geofence changes over
//! newline-delimited JSON on TCP, and pushes zone status updates to every
//! connected client.
//!
//! # Usage
//!
//! ```bash
//! # Start on the default address (127.0.0.1:5000)
//! fencewatchd
//!
//! # Custom config file and listen address
//! fencewatchd --config /etc/fencewatch.toml --listen 0.0.0.0:5000
//!
//! # Listen address from the environment
//! FENCEWATCH_ADDR=0.0.0.0:6000 fencewatchd
//!
//! # Enable debug logging
//! RUST_LOG=fencewatchd=debug fencewatchd
//! ```
//!
//! # Signal Handling
//!
//! - SIGTERM/SIGINT: Graceful shutdown

use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use fencewatchd::config::DaemonConfig;
use fencewatchd::hub::BroadcastHub;
use fencewatchd::observer::ObserverRegistry;
use fencewatchd::orchestrator::Orchestrator;
use fencewatchd::server::FenceServer;
use fencewatchd::store::spawn_store;

/// fencewatch daemon - live geofence tracking
#[derive(Parser, Debug)]
#[command(name = "fencewatchd", version, about)]
struct Args {
    /// Config file (default: <config dir>/fencewatch/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen address, overrides the config file and FENCEWATCH_ADDR
    #[arg(short, long)]
    listen: Option<String>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = DaemonConfig::load(args.config.as_deref()).context("Failed to load config")?;
    if let Some(listen) = args.listen {
        config.listen_addr = listen;
        config.validate().context("Invalid --listen address")?;
    }

    run_daemon(config)
}

/// Runs the daemon (async entry point).
#[tokio::main]
async fn run_daemon(config: DaemonConfig) -> Result<()> {
    init_logging(&config)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        pid = process::id(),
        "fencewatch daemon starting"
    );

    // Create cancellation token for graceful shutdown
    let cancel_token = CancellationToken::new();

    // Setup signal handlers
    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        if let Err(e) = wait_for_shutdown_signal().await {
            error!(error = %e, "Error waiting for shutdown signal");
        }
        info!("Shutdown signal received");
        shutdown_token.cancel();
    });

    let store = spawn_store();
    info!("Store started");

    let registry = Arc::new(ObserverRegistry::new(config.max_observers));
    info!(max_observers = registry.max_observers(), "Observer registry ready");
    let hub = BroadcastHub::new(registry);
    let orchestrator = Orchestrator::new(Arc::new(store), hub);

    let server = FenceServer::bind(&config, orchestrator, cancel_token).await?;
    info!(addr = %config.listen_addr, "Starting server");

    if let Err(e) = server.run().await {
        error!(error = %e, "Server error");
        return Err(e.into());
    }

    info!("fencewatch daemon stopped");
    Ok(())
}

fn init_logging(config: &DaemonConfig) -> Result<()> {
    let mut filter = EnvFilter::from_default_env()
        .add_directive("fencewatchd=info".parse()?)
        .add_directive("fencewatch_core=info".parse()?)
        .add_directive("fencewatch_protocol=info".parse()?);

    if let Some(level) = &config.log_level {
        for directive in level.split(',').filter(|d| !d.trim().is_empty()) {
            filter = filter.add_directive(
                directive
                    .trim()
                    .parse()
                    .with_context(|| format!("Invalid log_level directive '{directive}'"))?,
            );
        }
    }

    tracing_subscriber::fmt().with_env_filter(filter).init();
    Ok(())
}

/// Waits for a shutdown signal (SIGTERM or SIGINT).
async fn wait_for_shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("Received Ctrl+C");
    }

    Ok(())
}
