//! Core types and shared utilities for the logstream ingester.
//!
//! This crate provides:
//! - [`Event`] and its SHA-256 [`Fingerprint`]
//! - Prometheus metrics helpers
//! - Shared error types

mod error;
mod event;
pub mod metrics;

pub use error::{Error, Result};
pub use event::{Event, FINGERPRINT_LEN, Fingerprint};
