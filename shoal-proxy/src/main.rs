//! Shoal proxy binary.
//!
//! Loads the YAML configuration, initializes logging, starts the proxy,
//! and shuts it down gracefully on SIGINT/SIGTERM.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::info;
use tracing_subscriber::FmtSubscriber;

use shoal_proxy::{Proxy, ProxyConfig};

/// Transparent TCP proxy for a sharded Redis-compatible cluster.
#[derive(Parser, Debug)]
#[command(name = "shoal-proxy")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the YAML configuration file.
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Invalid configuration is the one fatal error class.
    let config = ProxyConfig::load(&args.config)?;
    init_logging(&config)?;

    info!(config = %args.config.display(), "starting shoal proxy");

    let proxy = Proxy::bind(config)?;
    let handle = proxy.shutdown_handle();

    let server = tokio::spawn(proxy.run());

    wait_for_shutdown_signal().await?;
    info!("shutdown signal received");
    handle.stop();

    server.await??;
    Ok(())
}

/// Initializes the global subscriber from the configured level, writing to
/// the configured file or stderr.
fn init_logging(config: &ProxyConfig) -> Result<(), Box<dyn std::error::Error>> {
    let level = config.log_level.as_tracing();

    if config.log_file.is_empty() {
        let subscriber = FmtSubscriber::builder()
            .with_max_level(level)
            .with_target(true)
            .with_writer(std::io::stderr)
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&config.log_file)?;
        let subscriber = FmtSubscriber::builder()
            .with_max_level(level)
            .with_target(true)
            .with_ansi(false)
            .with_writer(Arc::new(file))
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    }

    Ok(())
}

/// Completes when SIGINT or SIGTERM arrives.
#[cfg(unix)]
async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;

    tokio::select! {
        _ = interrupt.recv() => {}
        _ = terminate.recv() => {}
    }
    Ok(())
}

/// Completes when Ctrl-C arrives.
#[cfg(not(unix))]
async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}
