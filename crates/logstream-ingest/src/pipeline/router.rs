//! Per-event routing policy.
//!
//! For every inbound event: consult the dedupe window; drop duplicates
//! without side effects; persist novel events to the rotating log, then
//! forward them. Persistence errors propagate, forward errors do not.

use super::dedupe::{DedupeStats, DedupeWindow};
use super::forward::{ForwardSink, ForwardStats};
use super::rotating_log::{RotatingLog, RotatingLogStats};
use crate::error::Result;
use logstream_core::Event;
use tracing::{debug, error};

/// Default number of consecutive persistence failures tolerated.
pub const DEFAULT_MAX_PERSIST_FAILURES: u32 = 3;

/// What happened to a routed event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOutcome {
    /// Fingerprint was in the window; nothing was written or sent.
    Duplicate,
    /// Event was appended to the log and handed to the forward sink.
    Persisted {
        /// The log rotated before this append.
        rotated: bool,
        /// The forward target accepted the event.
        forwarded: bool,
    },
}

/// Routes events through dedupe, the durable log, and the forward sink.
///
/// Owns the dedupe window so its state outlives individual stream sessions.
pub struct EventRouter {
    window: DedupeWindow,
    log: RotatingLog,
    forward: ForwardSink,
    max_persist_failures: u32,
    consecutive_failures: u32,
    stats: RouterStats,
}

impl EventRouter {
    /// Create a router from its three components.
    pub fn new(window: DedupeWindow, log: RotatingLog, forward: ForwardSink) -> Self {
        Self {
            window,
            log,
            forward,
            max_persist_failures: DEFAULT_MAX_PERSIST_FAILURES,
            consecutive_failures: 0,
            stats: RouterStats::default(),
        }
    }

    /// Set how many consecutive persistence failures are tolerated before
    /// [`persistence_exhausted`](Self::persistence_exhausted) reports true.
    pub fn with_max_persist_failures(mut self, max: u32) -> Self {
        self.max_persist_failures = max.max(1);
        self
    }

    /// Handle one event.
    ///
    /// # Errors
    ///
    /// Returns the log's error if the event could not be persisted. The
    /// event's fingerprint is removed from the window so a redelivery is
    /// treated as novel, and nothing is forwarded.
    pub async fn handle(&mut self, event: Event) -> Result<RouteOutcome> {
        self.stats.received += 1;
        metrics::counter!("ingest_events_total").increment(1);

        let fingerprint = event.fingerprint();
        if !self.window.check_and_insert(fingerprint) {
            self.stats.duplicates += 1;
            metrics::counter!("ingest_events_duplicate_total").increment(1);
            debug!(fingerprint = %fingerprint, "dropping duplicate event");
            return Ok(RouteOutcome::Duplicate);
        }

        let rotated = match self.log.append(&event) {
            Ok(rotated) => rotated,
            Err(e) => {
                self.window.forget(&fingerprint);
                self.consecutive_failures += 1;
                self.stats.persist_failures += 1;
                metrics::counter!("ingest_persist_errors_total").increment(1);
                error!(
                    fingerprint = %fingerprint,
                    consecutive = self.consecutive_failures,
                    error = %e,
                    "failed to persist event"
                );
                return Err(e);
            }
        };
        self.consecutive_failures = 0;
        self.stats.persisted += 1;
        metrics::counter!("ingest_events_persisted_total").increment(1);

        let forwarded = self.forward.forward(&event).await;

        Ok(RouteOutcome::Persisted { rotated, forwarded })
    }

    /// Handle a raw text payload.
    ///
    /// Convenience wrapper around [`handle`](Self::handle); empty payloads
    /// are rejected before touching the window.
    pub async fn handle_raw(&mut self, payload: &str) -> Result<RouteOutcome> {
        let event = Event::from_text(payload)?;
        self.handle(event).await
    }

    /// Whether consecutive persistence failures reached the configured limit.
    pub fn persistence_exhausted(&self) -> bool {
        self.consecutive_failures >= self.max_persist_failures
    }

    /// Consecutive persistence failures since the last successful append.
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// The dedupe window.
    pub fn window(&self) -> &DedupeWindow {
        &self.window
    }

    /// The durable log.
    pub fn log(&self) -> &RotatingLog {
        &self.log
    }

    /// Get statistics about the router and its components.
    pub fn stats(&self) -> PipelineStats {
        PipelineStats {
            router: self.stats.clone(),
            dedupe: self.window.stats(),
            log: self.log.stats(),
            forward: self.forward.stats(),
        }
    }
}

/// Router counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouterStats {
    /// Events handed to the router.
    pub received: u64,

    /// Events dropped as duplicates.
    pub duplicates: u64,

    /// Events appended to the log.
    pub persisted: u64,

    /// Appends that failed.
    pub persist_failures: u64,
}

/// Snapshot of every pipeline component.
#[derive(Debug, Clone)]
pub struct PipelineStats {
    pub router: RouterStats,
    pub dedupe: DedupeStats,
    pub log: RotatingLogStats,
    pub forward: ForwardStats,
}
