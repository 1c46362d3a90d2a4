//! Error types for the ingestion pipeline.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during ingestion.
#[derive(Error, Debug)]
pub enum Error {
    /// Event construction error.
    #[error(transparent)]
    Core(#[from] logstream_core::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Durable log append or rotation failed.
    #[error("persistence error at {}: {source}", path.display())]
    Persistence {
        /// File the failing operation touched.
        path: PathBuf,
        /// Underlying filesystem error.
        #[source]
        source: std::io::Error,
    },

    /// WebSocket transport error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Wrap a filesystem error with the path it concerns.
    pub(crate) fn persistence(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Persistence {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_persistence_display_includes_path() {
        let err = Error::persistence(
            "/var/log/stream.log",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        let msg = err.to_string();
        assert!(msg.contains("/var/log/stream.log"));
        assert!(msg.contains("denied"));
    }

    #[test]
    fn test_from_core_error_is_transparent() {
        let err: Error = logstream_core::Error::EmptyPayload.into();
        assert_eq!(err.to_string(), "empty event payload");
    }

    #[test]
    fn test_config_display() {
        let err = Error::Config("cluster id is required".to_string());
        assert!(err.to_string().contains("cluster id is required"));
    }
}
