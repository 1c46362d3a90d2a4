//! Logstream ingestion daemon.
//!
//! Connects to the event stream, writes every novel event to the rotating
//! log, and forwards it to a local TCP listener.
//!
//! # Usage
//!
//! ```bash
//! # Credentials from the environment (or a .env file)
//! LOGSTREAM_CLUSTER_ID=acme_hosted LOGSTREAM_ACCESS_TOKEN=... logstream-ingest
//!
//! # Custom paths and forward target
//! logstream-ingest \
//!     --cluster-id acme_hosted \
//!     --log-dir /var/log/logstream \
//!     --forward-host 127.0.0.1 --forward-port 5140
//! ```
//!
//! # Graceful Shutdown
//!
//! The daemon handles SIGINT (Ctrl+C) and SIGTERM:
//! 1. Stops waiting for frames, connections or the reconnect delay
//! 2. Lets the event being routed finish its append
//! 3. Sends a close frame and exits cleanly

use anyhow::{Context, Result};
use clap::Parser;
use logstream_core::metrics::{init_metrics, start_metrics_server};
use logstream_ingest::{Args, IngestConfig};
use metrics::gauge;
use std::sync::Arc;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Install rustls crypto provider (required when both ring and aws-lc-rs are present)
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install rustls crypto provider"))?;

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,logstream_ingest=debug")),
        )
        .init();

    let args = load_args()?;
    let config = IngestConfig::from(&args);

    tracing::info!("Logstream ingestion daemon starting...");
    tracing::info!("Configuration:");
    tracing::info!("  Endpoint: {}", config.stream.endpoint);
    tracing::info!("  Cluster: {}", config.stream.cluster_id);
    tracing::info!("  Stream type: {}", config.stream.stream_type);
    tracing::info!("  Log: {}", config.log.log_dir.join(&config.log.file_name).display());
    tracing::info!(
        "  Rotation: {} bytes, {} slots",
        config.log.max_file_size,
        config.log.backup_count
    );
    tracing::info!("  Forward: {}:{}", config.forward.host, config.forward.port);
    tracing::info!("  Dedupe window: {}", config.dedupe_window);

    let (source, mut router) = config.build().context("Invalid configuration")?;

    // Initialize metrics
    if args.metrics_port > 0 {
        let handle = init_metrics().context("Metrics recorder already installed")?;
        start_metrics_server(args.metrics_port, handle)
            .await
            .context("Failed to start metrics server")?;
        gauge!("ingestion_running").set(1.0);
    }

    // Set up graceful shutdown
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let shutdown_tx = Arc::new(shutdown_tx);
    let handler_tx = Arc::clone(&shutdown_tx);

    ctrlc::set_handler(move || {
        tracing::info!("Shutdown signal received, stopping gracefully...");
        handler_tx.send_replace(true);
    })
    .context("Failed to set Ctrl+C handler")?;

    tracing::info!("Starting live ingestion...");
    let result = source.run(&mut router, shutdown_rx).await;

    gauge!("ingestion_running").set(0.0);

    let source_stats = result.context("Ingestion stopped")?;
    let stats = router.stats();

    // Print summary
    tracing::info!("═══════════════════════════════════════════════════════");
    tracing::info!("SHUTDOWN COMPLETE");
    tracing::info!("═══════════════════════════════════════════════════════");
    tracing::info!("Sessions:             {}", source_stats.sessions);
    tracing::info!("Connect failures:     {}", source_stats.connect_failures);
    tracing::info!("Frames received:      {}", source_stats.frames_received);
    tracing::info!("Frames rejected:      {}", source_stats.frames_rejected);
    tracing::info!("Events persisted:     {}", stats.router.persisted);
    tracing::info!("Events deduplicated:  {}", stats.router.duplicates);
    tracing::info!("Events forwarded:     {}", stats.forward.delivered);
    tracing::info!("Forward failures:     {}", stats.forward.failed);
    tracing::info!("Log rotations:        {}", stats.log.rotations);

    Ok(())
}

/// Parse arguments, loading the dotenv file first when one exists.
///
/// Arguments are parsed twice so that `--dotenv` can point at the file
/// providing the remaining settings.
fn load_args() -> Result<Args> {
    let args = Args::parse();

    match dotenvy::from_path(&args.dotenv_path) {
        Ok(()) => {
            tracing::debug!("Loaded environment from {}", args.dotenv_path.display());
            Ok(Args::parse())
        }
        Err(e) if e.not_found() => Ok(args),
        Err(e) => Err(e).with_context(|| {
            format!("Failed to load environment from {}", args.dotenv_path.display())
        }),
    }
}
