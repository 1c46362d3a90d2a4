//! Core pipeline components for event ingestion.
//!
//! Every event received from the stream flows through the same path:
//!
//! - [`DedupeWindow`] - bounded FIFO window of recent fingerprints
//! - [`RotatingLog`] - durable, size-rotated event log
//! - [`ForwardSink`] - one-shot TCP delivery to a local consumer
//! - [`EventRouter`] - applies the policy tying the three together
//!
//! # Architecture
//!
//! ```text
//! [StreamSource] → [EventRouter] → [DedupeWindow] → [RotatingLog] → [ForwardSink]
//!                                    (drop dups)     (persist)       (best effort)
//! ```
//!
//! The pipeline is log-first: the rotating log is the source of truth, and
//! forwarding is advisory.

mod dedupe;
mod forward;
mod rotating_log;
mod router;

pub use dedupe::{DEFAULT_WINDOW_SIZE, DedupeStats, DedupeWindow};
pub use forward::{ForwardConfig, ForwardSink, ForwardStats};
pub use rotating_log::{RotatingLog, RotatingLogConfig, RotatingLogStats};
pub use router::{
    DEFAULT_MAX_PERSIST_FAILURES, EventRouter, PipelineStats, RouteOutcome, RouterStats,
};
