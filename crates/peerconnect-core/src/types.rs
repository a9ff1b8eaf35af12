//! Core types for PeerConnect
//!
//! Newtypes for the transport-assigned endpoint identifier and for wall-clock
//! timestamps, so neither gets confused with display names or durations.

use core::fmt;
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

// ----------------------------------------------------------------------------
// Endpoint Identifier
// ----------------------------------------------------------------------------

/// Transport-assigned identifier for a discovered or connected peer
///
/// Only valid for the lifetime of that peer's current advertise/discover
/// session; a peer that restarts its radio comes back under a new id.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EndpointId(String);

impl EndpointId {
    pub fn new<T: Into<String>>(id: T) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EndpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EndpointId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for EndpointId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

// ----------------------------------------------------------------------------
// Timestamp
// ----------------------------------------------------------------------------

/// Milliseconds since the Unix epoch
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct Timestamp(u64);

impl Timestamp {
    pub const fn new(millis: u64) -> Self {
        Self(millis)
    }

    /// Current wall-clock time; a clock before the epoch reads as zero
    pub fn now() -> Self {
        Self(
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_millis() as u64)
                .unwrap_or_default(),
        )
    }

    pub fn as_millis(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
