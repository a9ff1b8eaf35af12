//! Core Logic State
//!
//! Everything the state machine owns outright: the session, the live peer
//! set, the chat transcript, the active identity and counters.

use peerconnect_core::{ChatMessage, EndpointId, IdentityManager, LivePeer, Session};

// ----------------------------------------------------------------------------
// Live Peers
// ----------------------------------------------------------------------------

/// Peers currently visible through discovery, in discovery order
#[derive(Debug, Clone, Default)]
pub struct LivePeers {
    peers: Vec<LivePeer>,
}

impl LivePeers {
    /// Add a peer; returns `false` if its endpoint is already known
    pub fn insert(&mut self, peer: LivePeer) -> bool {
        if self.contains(&peer.endpoint_id) {
            return false;
        }
        self.peers.push(peer);
        true
    }

    /// Remove a peer; returns `false` if it was not present
    pub fn remove(&mut self, endpoint_id: &EndpointId) -> bool {
        let before = self.peers.len();
        self.peers.retain(|p| &p.endpoint_id != endpoint_id);
        self.peers.len() != before
    }

    pub fn get(&self, endpoint_id: &EndpointId) -> Option<&LivePeer> {
        self.peers.iter().find(|p| &p.endpoint_id == endpoint_id)
    }

    pub fn contains(&self, endpoint_id: &EndpointId) -> bool {
        self.get(endpoint_id).is_some()
    }

    pub fn as_slice(&self) -> &[LivePeer] {
        &self.peers
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    pub fn clear(&mut self) {
        self.peers.clear();
    }
}

// ----------------------------------------------------------------------------
// Transcript
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Outgoing,
    Incoming,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptEntry {
    pub direction: Direction,
    pub message: ChatMessage,
}

/// Messages of the current session
///
/// A line counts as ours when its sender name equals the active identity,
/// which is also how the chat view decides which side to draw it on.
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    entries: Vec<TranscriptEntry>,
}

impl Transcript {
    pub fn record(&mut self, message: ChatMessage, own_name: &str) -> Direction {
        let direction = if message.sender_name() == own_name {
            Direction::Outgoing
        } else {
            Direction::Incoming
        };
        self.entries.push(TranscriptEntry { direction, message });
        direction
    }

    pub fn entries(&self) -> &[TranscriptEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

// ----------------------------------------------------------------------------
// Core Logic State
// ----------------------------------------------------------------------------

/// State owned by the core task
pub struct CoreState {
    pub session: Session,
    /// Bumped by every reset; callbacks tagged with an older value are stale
    pub generation: u64,
    /// False while a reset is settling
    pub ready: bool,
    pub live_peers: LivePeers,
    pub transcript: Transcript,
    pub identity: IdentityManager,
    pub stats: CoreStats,
}

impl CoreState {
    pub fn new(identity: IdentityManager) -> Self {
        Self {
            session: Session::idle(),
            generation: 0,
            ready: true,
            live_peers: LivePeers::default(),
            transcript: Transcript::default(),
            identity,
            stats: CoreStats::default(),
        }
    }

    /// Peers shown as online: the live set plus the session peer
    pub fn online_peers(&self) -> Vec<LivePeer> {
        let mut online = self.live_peers.as_slice().to_vec();
        if let (Some(peer), Some(name)) = (&self.session.peer, &self.session.peer_name) {
            if !self.live_peers.contains(peer) {
                online.push(LivePeer::new(peer.clone(), name.clone()));
            }
        }
        online
    }
}

/// Counters for the core task
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoreStats {
    pub commands_processed: u64,
    pub events_processed: u64,
    pub stale_events_dropped: u64,
    pub state_transitions: u64,
    pub resets: u64,
    pub pulses: u64,
    pub messages_sent: u64,
    pub messages_received: u64,
    pub codec_failures: u64,
    pub storage_failures: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use peerconnect_core::{MemoryIdentityStore, SessionState, Timestamp};
    use std::sync::Arc;

    fn peer(id: &str, name: &str) -> LivePeer {
        LivePeer::new(EndpointId::from(id), name)
    }

    #[test]
    fn test_live_peers_dedupe_by_endpoint() {
        let mut live = LivePeers::default();
        assert!(live.insert(peer("E1", "X")));
        assert!(!live.insert(peer("E1", "X again")));
        assert_eq!(live.len(), 1);
        assert_eq!(live.get(&EndpointId::from("E1")).unwrap().display_name, "X");

        assert!(live.remove(&EndpointId::from("E1")));
        assert!(!live.remove(&EndpointId::from("E1")));
        assert!(live.is_empty());
    }

    #[test]
    fn test_transcript_classifies_by_sender_name() {
        let mut transcript = Transcript::default();
        let mine = ChatMessage::with_timestamp("Me", "hello", Timestamp::new(1));
        let theirs = ChatMessage::with_timestamp("X", "hi", Timestamp::new(2));

        assert_eq!(transcript.record(mine, "Me"), Direction::Outgoing);
        assert_eq!(transcript.record(theirs, "Me"), Direction::Incoming);
        assert_eq!(transcript.len(), 2);

        transcript.clear();
        assert!(transcript.is_empty());
    }

    #[test]
    fn test_online_peers_include_session_peer() {
        let identity = IdentityManager::new(Arc::new(MemoryIdentityStore::new()));
        let mut state = CoreState::new(identity);
        state.live_peers.insert(peer("E1", "X"));
        state.session = Session {
            state: SessionState::Connected,
            peer: Some(EndpointId::from("E2")),
            peer_name: Some("Y".to_string()),
        };

        let names: Vec<String> = state
            .online_peers()
            .into_iter()
            .map(|p| p.display_name)
            .collect();
        assert_eq!(names, vec!["X", "Y"]);
    }
}
