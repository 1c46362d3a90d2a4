//! Prometheus metrics helpers for logstream.
//!
//! Components record through the `metrics` facade; without an installed
//! recorder every call is a no-op, so library code and tests never need to
//! care whether the exporter is running.
//!
//! # Usage
//!
//! ```rust,ignore
//! use logstream_core::metrics::{init_metrics, start_metrics_server};
//!
//! #[tokio::main]
//! async fn main() {
//!     let handle = init_metrics().expect("recorder already installed");
//!     start_metrics_server(9090, handle).await.unwrap();
//!
//!     metrics::counter!("ingest_events_total").increment(1);
//! }
//! ```
//!
//! # Metric Naming Conventions
//!
//! - Prefix: component (`ingest_`, `dedupe_`, `log_`, `forward_`, `stream_`)
//! - Suffix: unit or type (`_total`, `_bytes`, `_seconds`)

use axum::{Router, routing::get};
use metrics::{describe_counter, describe_gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;

/// Install the Prometheus recorder and register metric descriptions.
///
/// Returns `None` if a recorder is already installed for this process.
pub fn init_metrics() -> Option<PrometheusHandle> {
    let handle = try_init_metrics()?;
    register_common_metrics();
    Some(handle)
}

/// Try to install the Prometheus recorder without registering descriptions.
pub fn try_init_metrics() -> Option<PrometheusHandle> {
    PrometheusBuilder::new().install_recorder().ok()
}

/// Start the Prometheus metrics HTTP server.
///
/// Binds `0.0.0.0:<port>` before returning so bind failures surface to the
/// caller, then serves `/metrics` from a background task.
pub async fn start_metrics_server(
    port: u16,
    handle: PrometheusHandle,
) -> Result<SocketAddr, std::io::Error> {
    let app = Router::new().route(
        "/metrics",
        get(move || {
            let handle = handle.clone();
            async move { handle.render() }
        }),
    );

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let local_addr = listener.local_addr()?;
    tracing::info!("Metrics server listening on http://{}/metrics", local_addr);

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "metrics server stopped");
        }
    });

    Ok(local_addr)
}

/// Register descriptions for every metric the ingester records.
fn register_common_metrics() {
    // =========================================================================
    // Router
    // =========================================================================

    describe_counter!("ingest_events_total", "Events received from the stream");
    describe_counter!(
        "ingest_events_duplicate_total",
        "Events dropped by the dedupe window"
    );
    describe_counter!(
        "ingest_events_persisted_total",
        "Novel events appended to the durable log"
    );
    describe_counter!(
        "ingest_persist_errors_total",
        "Failed appends to the durable log"
    );
    describe_counter!(
        "ingest_frames_rejected_total",
        "Frames that could not be turned into events"
    );

    // =========================================================================
    // Dedupe window
    // =========================================================================

    describe_gauge!("dedupe_window_entries", "Fingerprints held by the window");
    describe_counter!(
        "dedupe_evictions_total",
        "Fingerprints evicted from the window (oldest first)"
    );

    // =========================================================================
    // Rotating log
    // =========================================================================

    describe_counter!("log_bytes_written_total", "Bytes appended to the log");
    describe_counter!("log_rotations_total", "Log file rotations performed");

    // =========================================================================
    // Forward sink
    // =========================================================================

    describe_counter!("forward_events_total", "Events delivered to the forward target");
    describe_counter!("forward_errors_total", "Failed forward attempts");

    // =========================================================================
    // Stream connection
    // =========================================================================

    describe_counter!("stream_connects_total", "Successful stream connections");
    describe_counter!(
        "stream_connect_failures_total",
        "Failed stream connection attempts"
    );
    describe_counter!(
        "stream_disconnects_total",
        "Stream sessions that ended (label: reason)"
    );
    describe_gauge!(
        "stream_connected",
        "Whether the stream is connected (1=yes, 0=no)"
    );
    describe_gauge!(
        "ingestion_running",
        "Whether the ingestion daemon is running (1=yes, 0=no)"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Once;

    static INIT: Once = Once::new();

    fn ensure_metrics_init() {
        INIT.call_once(|| {
            let _ = try_init_metrics();
        });
    }

    #[test]
    fn test_try_init_metrics_idempotent() {
        let handle1 = try_init_metrics();
        let handle2 = try_init_metrics();

        // At most one should succeed
        assert!(handle1.is_none() || handle2.is_none());
    }

    #[test]
    fn test_register_common_metrics_does_not_panic() {
        ensure_metrics_init();
        register_common_metrics();
        register_common_metrics();
    }

    #[tokio::test]
    async fn test_metrics_server_binds_ephemeral_port() {
        let handle = PrometheusBuilder::new().build_recorder().handle();
        let addr = start_metrics_server(0, handle).await.unwrap();
        assert_ne!(addr.port(), 0);
    }
}
