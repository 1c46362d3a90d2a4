//! Streaming event ingester.
//!
//! This crate holds an authenticated WebSocket stream open, suppresses
//! re-delivered events, persists every novel event to a rotating log, and
//! forwards it to a local TCP listener.
//!
//! # Modules
//!
//! - [`config`] - CLI/environment configuration and component assembly
//! - [`pipeline`] - Dedupe window, rotating log, forward sink, event router
//! - [`source`] - Stream connection manager with fixed-delay reconnect
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │  StreamSource   │  WebSocket session, keepalive, reconnect loop
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │   DedupeWindow  │  last N fingerprints, FIFO eviction
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │   RotatingLog   │  one event per line, size-triggered rotation
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │   ForwardSink   │  one TCP connection per event, best effort
//! └─────────────────┘
//! ```
//!
//! The pipeline is log-first: the rotating log is the source of truth, and
//! the forward target is a convenience copy.

pub mod config;
pub mod error;
pub mod pipeline;
pub mod source;

// Re-export commonly used types at crate root
pub use config::{Args, IngestConfig};
pub use error::{Error, Result};

// Re-export pipeline components for convenience
pub use pipeline::{
    DedupeStats, DedupeWindow, EventRouter, ForwardConfig, ForwardSink, ForwardStats,
    PipelineStats, RotatingLog, RotatingLogConfig, RotatingLogStats, RouteOutcome, RouterStats,
};

// Re-export the stream source
pub use source::{ConnectionState, SourceStats, StreamConfig, StreamSource};
