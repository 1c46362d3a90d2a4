//! Upstream event sources.
//!
//! - [`StreamSource`] - holds the authenticated WebSocket stream open,
//!   reconnecting forever with a fixed delay, and feeds every frame to the
//!   [`EventRouter`](crate::pipeline::EventRouter) in receipt order.

mod stream;

pub use stream::{ConnectionState, StreamConfig, StreamSource};

/// Statistics from running a stream source.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceStats {
    /// Data frames received (text and binary).
    pub frames_received: u64,

    /// Frames that became events and reached the router.
    pub events_received: u64,

    /// Frames rejected before routing (empty, not UTF-8).
    pub frames_rejected: u64,

    /// Sessions that completed the handshake.
    pub sessions: u64,

    /// Connection attempts that failed or timed out.
    pub connect_failures: u64,

    /// Sessions that ended for any reason, shutdown included.
    pub disconnects: u64,
}
