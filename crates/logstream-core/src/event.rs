//! Stream events and their fingerprints.
//!
//! An [`Event`] is the opaque text payload of one upstream message frame. The
//! ingester never parses it; it only needs a stable [`Fingerprint`] for
//! deduplication and a single-line representation for the durable log.

use crate::error::{Error, Result};
use sha2::{Digest, Sha256};
use std::fmt;

/// Length of a fingerprint in bytes (SHA-256).
pub const FINGERPRINT_LEN: usize = 32;

/// Deterministic digest of an event's raw bytes.
///
/// Used only as a deduplication key. SHA-256 keeps accidental collisions
/// negligible for any realistic stream volume.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint([u8; FINGERPRINT_LEN]);

impl Fingerprint {
    /// Compute the fingerprint of a raw payload.
    pub fn of(payload: &[u8]) -> Self {
        let digest = Sha256::digest(payload);
        let mut bytes = [0u8; FINGERPRINT_LEN];
        bytes.copy_from_slice(&digest);
        Self(bytes)
    }

    /// Raw digest bytes.
    pub fn as_bytes(&self) -> &[u8; FINGERPRINT_LEN] {
        &self.0
    }

    /// Lowercase hex rendering, for logs.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", self.to_hex())
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// A single event received from the upstream stream.
///
/// The payload is otherwise opaque, with one normalization: trailing `\r`
/// and `\n` characters are stripped on construction. The stored payload is
/// what gets fingerprinted, logged and forwarded, so a frame re-sent with or
/// without a line terminator counts as the same event and always takes
/// exactly one `\n`-terminated line. Frames that are empty after stripping
/// are rejected rather than written as blank lines.
#[derive(Clone, PartialEq, Eq)]
pub struct Event {
    payload: String,
}

impl Event {
    /// Build an event from a text frame.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EmptyPayload`] if nothing is left after trimming
    /// trailing `\r`/`\n` characters.
    pub fn from_text(text: &str) -> Result<Self> {
        let payload = text.trim_end_matches(['\r', '\n']);
        if payload.is_empty() {
            return Err(Error::EmptyPayload);
        }
        Ok(Self {
            payload: payload.to_string(),
        })
    }

    /// Build an event from a binary frame carrying UTF-8 text.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidUtf8`] for non-UTF-8 data and
    /// [`Error::EmptyPayload`] for frames that are empty after trimming.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let text = String::from_utf8(data.to_vec())?;
        Self::from_text(&text)
    }

    /// The event payload, without line terminator.
    pub fn payload(&self) -> &str {
        &self.payload
    }

    /// Payload length in bytes.
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    /// Always false; empty events cannot be constructed.
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Fingerprint of the stored payload, i.e. after line terminators were
    /// stripped, not of the frame as received.
    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::of(self.payload.as_bytes())
    }

    /// The payload followed by a single newline, as written to sinks.
    pub fn to_line(&self) -> Vec<u8> {
        let mut line = Vec::with_capacity(self.payload.len() + 1);
        line.extend_from_slice(self.payload.as_bytes());
        line.push(b'\n');
        line
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("len", &self.payload.len())
            .field("fingerprint", &self.fingerprint())
            .finish()
    }
}
