//! Error types for logstream event handling.

use thiserror::Error;

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while turning stream frames into events.
#[derive(Error, Debug)]
pub enum Error {
    /// The frame carried no payload once line terminators were trimmed.
    #[error("empty event payload")]
    EmptyPayload,

    /// A binary frame was not valid UTF-8 text.
    #[error("event payload is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    // =========================================================================
    // Error Display formatting tests
    // =========================================================================

    #[test]
    fn test_empty_payload_display() {
        let err = Error::EmptyPayload;
        assert_eq!(err.to_string(), "empty event payload");
    }

    #[test]
    fn test_invalid_utf8_display() {
        let utf8_err = String::from_utf8(vec![0xff, 0xfe]).unwrap_err();
        let err: Error = utf8_err.into();
        let msg = err.to_string();
        assert!(msg.contains("not valid UTF-8"));
    }

    // =========================================================================
    // Error From conversions
    // =========================================================================

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_error_debug_format() {
        let debug = format!("{:?}", Error::EmptyPayload);
        assert!(debug.contains("EmptyPayload"));
    }
}
