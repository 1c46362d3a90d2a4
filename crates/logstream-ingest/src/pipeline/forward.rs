//! Best-effort delivery of events to a local TCP listener.
//!
//! Each event opens its own connection, writes `payload\n`, and closes it.
//! Nothing is read back. Failures are logged and counted but never returned:
//! the durable log already holds the event.

use logstream_core::Event;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::{trace, warn};

/// Configuration for the forward sink.
#[derive(Debug, Clone)]
pub struct ForwardConfig {
    /// Host of the local listener.
    /// Default: 127.0.0.1
    pub host: String,

    /// Port of the local listener.
    /// Default: 12229
    pub port: u16,

    /// Upper bound for connect + send + close of a single event.
    /// Default: 5 seconds
    pub timeout: Duration,
}

impl Default for ForwardConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 12229,
            timeout: Duration::from_secs(5),
        }
    }
}

/// One-shot TCP forwarder.
pub struct ForwardSink {
    config: ForwardConfig,
    delivered: AtomicU64,
    failed: AtomicU64,
}

impl ForwardSink {
    /// Create a forward sink for the configured target.
    pub fn new(config: ForwardConfig) -> Self {
        Self {
            config,
            delivered: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        }
    }

    /// The `host:port` target.
    pub fn target(&self) -> String {
        format!("{}:{}", self.config.host, self.config.port)
    }

    /// Deliver an event, returning whether it reached the listener.
    ///
    /// Never fails: connection, send and timeout errors are logged at warn
    /// level and counted.
    pub async fn forward(&self, event: &Event) -> bool {
        let attempt = tokio::time::timeout(self.config.timeout, self.send(event)).await;

        let error = match attempt {
            Ok(Ok(())) => {
                self.delivered.fetch_add(1, Ordering::Relaxed);
                metrics::counter!("forward_events_total").increment(1);
                trace!(target_addr = %self.target(), len = event.len(), "forwarded event");
                return true;
            }
            Ok(Err(e)) => e.to_string(),
            Err(_) => format!("timed out after {:?}", self.config.timeout),
        };

        self.failed.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("forward_errors_total").increment(1);
        warn!(target_addr = %self.target(), error = %error, "TCP forward failed");
        false
    }

    async fn send(&self, event: &Event) -> std::io::Result<()> {
        let mut stream = TcpStream::connect((self.config.host.as_str(), self.config.port)).await?;
        stream.write_all(&event.to_line()).await?;
        stream.shutdown().await
    }

    /// Get statistics about the sink.
    pub fn stats(&self) -> ForwardStats {
        ForwardStats {
            delivered: self.delivered.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

/// Statistics about the forward sink.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ForwardStats {
    /// Events written to the listener.
    pub delivered: u64,

    /// Events that could not be delivered.
    pub failed: u64,
}
