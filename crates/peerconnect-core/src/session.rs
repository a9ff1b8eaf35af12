//! Session state

use core::fmt;

use serde::{Deserialize, Serialize};

use crate::types::EndpointId;

/// Lifecycle state of the single rendezvous session
///
/// At most one of advertising, discovering and connected is active at any
/// time. Losing or failing a connection is not a resting state; it resets
/// straight back to `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SessionState {
    #[default]
    Idle,
    Advertising,
    Discovering,
    Connecting,
    Connected,
}

impl SessionState {
    /// Whether `host()`/`join()` may be issued from this state
    pub fn is_idle(&self) -> bool {
        matches!(self, SessionState::Idle)
    }

    /// Whether the radio is currently announcing or scanning
    pub fn is_searching(&self) -> bool {
        matches!(self, SessionState::Advertising | SessionState::Discovering)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "Idle",
            SessionState::Advertising => "Advertising",
            SessionState::Discovering => "Discovering",
            SessionState::Connecting => "Connecting",
            SessionState::Connected => "Connected",
        };
        f.write_str(name)
    }
}

/// The single active session, owned by the state machine
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    pub state: SessionState,
    pub peer: Option<EndpointId>,
    pub peer_name: Option<String>,
}

impl Session {
    pub fn idle() -> Self {
        Self::default()
    }

    /// Whether `endpoint_id` is the peer of this session
    pub fn is_with(&self, endpoint_id: &EndpointId) -> bool {
        self.peer.as_ref() == Some(endpoint_id)
    }
}
