//! Error types for PeerConnect
//!
//! Each collaborator boundary has its own error enum (codec, storage, transport)
//! and `PeerConnectError` unifies them for the state machine and its callers.
//! No error here is fatal to the process: every path either leaves the state
//! machine in its prior stable state or funnels through a full reset.

use thiserror::Error;

// ----------------------------------------------------------------------------
// Specific Error Types
// ----------------------------------------------------------------------------

/// Malformed or unencodable chat payloads
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("Payload truncated: needed {needed} bytes at offset {offset}, got {available}")]
    Truncated {
        offset: usize,
        needed: usize,
        available: usize,
    },
    #[error("Unsupported codec version: {version}")]
    UnsupportedVersion { version: u8 },
    #[error("Field `{field}` too long: {len} bytes (max {max})")]
    FieldTooLong {
        field: &'static str,
        len: usize,
        max: usize,
    },
    #[error("Field `{field}` is not valid UTF-8")]
    InvalidUtf8 { field: &'static str },
    #[error("{count} trailing bytes after message")]
    TrailingBytes { count: usize },
}

/// Peer registry and identity store failures
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Storage not available: {reason}")]
    Unavailable { reason: String },
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Storage serialization error: {reason}")]
    Serialization { reason: String },
}

/// Failures of the transport calls themselves (not of the remote peer)
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("Advertising failed: {reason}")]
    AdvertiseFailed { reason: String },
    #[error("Discovery failed: {reason}")]
    DiscoveryFailed { reason: String },
    #[error("Connection request to {endpoint_id} failed: {reason}")]
    ConnectionFailed { endpoint_id: String, reason: String },
    #[error("Send to {endpoint_id} failed: {reason}")]
    SendFailed { endpoint_id: String, reason: String },
    #[error("Endpoint not found: {endpoint_id}")]
    EndpointNotFound { endpoint_id: String },
    #[error("Transport shut down")]
    Shutdown,
}

// ----------------------------------------------------------------------------
// Unified Error Type
// ----------------------------------------------------------------------------

/// Core error type for PeerConnect
#[derive(Debug, Error)]
pub enum PeerConnectError {
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// The remote side (or the radio stack) refused the handshake
    #[error("Connection to {endpoint_id} rejected with code {code}")]
    ConnectionRejected { endpoint_id: String, code: i32 },

    /// The readiness gate reported the radio unusable
    #[error("Radio unavailable: {reason}")]
    RadioUnavailable { reason: String },

    /// Operation not permitted in the current session state
    #[error("Invalid state: expected {expected}, got {actual}")]
    InvalidState { expected: String, actual: String },

    /// Channel communication error (core task gone or reply dropped)
    #[error("Channel error: {message}")]
    Channel { message: String },

    /// Configuration error
    #[error("Configuration error: {reason}")]
    Configuration { reason: String },

    /// A display name the user supplied was rejected
    #[error("Invalid display name: {reason}")]
    InvalidName { reason: String },
}

// ----------------------------------------------------------------------------
// Convenience Error Constructors
// ----------------------------------------------------------------------------

impl PeerConnectError {
    /// Create a channel error with a message
    pub fn channel_error<T: Into<String>>(message: T) -> Self {
        PeerConnectError::Channel {
            message: message.into(),
        }
    }

    /// Create a configuration error with a reason
    pub fn config_error<T: Into<String>>(reason: T) -> Self {
        PeerConnectError::Configuration {
            reason: reason.into(),
        }
    }

    /// Create an invalid state error
    pub fn invalid_state<E: Into<String>, A: Into<String>>(expected: E, actual: A) -> Self {
        PeerConnectError::InvalidState {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Create a radio unavailable error
    pub fn radio_unavailable<T: Into<String>>(reason: T) -> Self {
        PeerConnectError::RadioUnavailable {
            reason: reason.into(),
        }
    }

    pub fn invalid_name<T: Into<String>>(reason: T) -> Self {
        PeerConnectError::InvalidName {
            reason: reason.into(),
        }
    }

    /// Whether this error was raised by a failing transport call
    pub fn is_transport(&self) -> bool {
        matches!(self, PeerConnectError::Transport(_))
    }
}

impl StorageError {
    /// Create an unavailable error with a reason
    pub fn unavailable<T: Into<String>>(reason: T) -> Self {
        StorageError::Unavailable {
            reason: reason.into(),
        }
    }
}

// ----------------------------------------------------------------------------
// Type Aliases
// ----------------------------------------------------------------------------

pub type Result<T> = core::result::Result<T, PeerConnectError>;
