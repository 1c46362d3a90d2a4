//! Bounded, insertion-ordered deduplication window.
//!
//! This module provides the [`DedupeWindow`] which remembers the fingerprints
//! of the most recent `capacity` novel events and reports whether an incoming
//! event was already seen.
//!
//! # Key Design
//!
//! - Keys: 32-byte SHA-256 fingerprints of the raw payload
//! - A ring of fingerprints in insertion order plus a lookup set
//! - Strict FIFO eviction: the oldest inserted fingerprint leaves first
//! - Lives in memory only; its state survives reconnects but not restarts

use logstream_core::{Event, Fingerprint};
use std::collections::{HashSet, VecDeque};
use tracing::trace;

/// Default number of fingerprints kept.
pub const DEFAULT_WINDOW_SIZE: usize = 1000;

/// Fixed-capacity window of recently seen event fingerprints.
///
/// Not internally synchronized: the window is owned by a single router and
/// its check-and-insert sequence must stay atomic if it is ever shared.
#[derive(Debug)]
pub struct DedupeWindow {
    capacity: usize,
    order: VecDeque<Fingerprint>,
    seen: HashSet<Fingerprint>,
    /// Fingerprint evicted by the most recent insertion, for `forget`.
    last_evicted: Option<Fingerprint>,
    hits: u64,
    misses: u64,
    evictions: u64,
}

impl DedupeWindow {
    /// Create an empty window holding at most `capacity` fingerprints.
    ///
    /// A capacity of zero is raised to one; configuration validation rejects
    /// it before it gets here.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            order: VecDeque::with_capacity(capacity + 1),
            seen: HashSet::with_capacity(capacity + 1),
            last_evicted: None,
            hits: 0,
            misses: 0,
            evictions: 0,
        }
    }

    /// Check whether an event is a duplicate, recording it if it is not.
    ///
    /// Returns `true` if the event's fingerprint is in the window (the caller
    /// must drop it), `false` if it was novel and has now been inserted.
    pub fn is_duplicate(&mut self, event: &Event) -> bool {
        !self.check_and_insert(event.fingerprint())
    }

    /// Check and insert a fingerprint in one operation.
    ///
    /// Returns `true` if the fingerprint is new (was not in the window),
    /// `false` if it was already present.
    pub fn check_and_insert(&mut self, fingerprint: Fingerprint) -> bool {
        if self.seen.contains(&fingerprint) {
            self.hits += 1;
            return false;
        }

        self.misses += 1;
        self.seen.insert(fingerprint);
        self.order.push_back(fingerprint);
        self.last_evicted = None;

        if self.order.len() > self.capacity
            && let Some(oldest) = self.order.pop_front()
        {
            self.seen.remove(&oldest);
            self.last_evicted = Some(oldest);
            self.evictions += 1;
            metrics::counter!("dedupe_evictions_total").increment(1);
            trace!(fingerprint = %oldest, "evicted oldest fingerprint");
        }

        metrics::gauge!("dedupe_window_entries").set(self.order.len() as f64);
        true
    }

    /// Remove `fingerprint` if it is the most recent insertion.
    ///
    /// Rolls back a [`check_and_insert`](Self::check_and_insert) whose event
    /// could not be persisted, including any eviction that insertion caused:
    /// the evicted fingerprint returns as the oldest entry. Returns `true` if
    /// the fingerprint was removed.
    pub fn forget(&mut self, fingerprint: &Fingerprint) -> bool {
        if self.order.back() != Some(fingerprint) {
            return false;
        }
        self.order.pop_back();
        self.seen.remove(fingerprint);
        self.misses = self.misses.saturating_sub(1);

        if let Some(evicted) = self.last_evicted.take() {
            self.order.push_front(evicted);
            self.seen.insert(evicted);
            self.evictions = self.evictions.saturating_sub(1);
        }

        metrics::gauge!("dedupe_window_entries").set(self.order.len() as f64);
        true
    }

    /// Whether a fingerprint is currently in the window.
    pub fn contains(&self, fingerprint: &Fingerprint) -> bool {
        self.seen.contains(fingerprint)
    }

    /// Number of fingerprints currently held.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Whether the window is empty.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Maximum number of fingerprints held.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Get statistics about the window.
    pub fn stats(&self) -> DedupeStats {
        DedupeStats {
            entries: self.order.len(),
            capacity: self.capacity,
            hits: self.hits,
            misses: self.misses,
            evictions: self.evictions,
        }
    }
}

impl Default for DedupeWindow {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_SIZE)
    }
}

/// Statistics about the dedupe window.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DedupeStats {
    /// Fingerprints currently held.
    pub entries: usize,

    /// Maximum fingerprints held.
    pub capacity: usize,

    /// Lookups that found a duplicate.
    pub hits: u64,

    /// Lookups that inserted a novel fingerprint.
    pub misses: u64,

    /// Fingerprints evicted to stay within capacity.
    pub evictions: u64,
}
