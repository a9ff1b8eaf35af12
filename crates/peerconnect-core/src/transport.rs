//! Radio transport abstraction
//!
//! The state machine drives a short-range radio through [`Transport`] and
//! hears back through an [`EventSink`] handed to each call. Every sink is
//! stamped with the state machine's generation at the time of the call, so a
//! callback that outlives a reset is recognised as stale and dropped.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::channel::{Event, EventSender};
use crate::errors::{PeerConnectError, Result, TransportError};
use crate::identity::Identity;
use crate::types::EndpointId;

// ----------------------------------------------------------------------------
// Transport Callbacks
// ----------------------------------------------------------------------------

/// Outcome reported by the transport once both sides answered a handshake
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionOutcome {
    Ok,
    /// Transport-specific failure code
    Failed(i32),
}

/// Callbacks raised by the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Found {
        endpoint_id: EndpointId,
        name: String,
    },
    Lost {
        endpoint_id: EndpointId,
    },
    Initiated {
        endpoint_id: EndpointId,
        peer_name: String,
    },
    Result {
        endpoint_id: EndpointId,
        outcome: ConnectionOutcome,
    },
    Disconnected {
        endpoint_id: EndpointId,
    },
    Payload {
        endpoint_id: EndpointId,
        bytes: Vec<u8>,
    },
}

impl TransportEvent {
    pub fn endpoint_id(&self) -> &EndpointId {
        match self {
            TransportEvent::Found { endpoint_id, .. }
            | TransportEvent::Lost { endpoint_id }
            | TransportEvent::Initiated { endpoint_id, .. }
            | TransportEvent::Result { endpoint_id, .. }
            | TransportEvent::Disconnected { endpoint_id }
            | TransportEvent::Payload { endpoint_id, .. } => endpoint_id,
        }
    }

    /// Short name for logging
    pub fn kind(&self) -> &'static str {
        match self {
            TransportEvent::Found { .. } => "found",
            TransportEvent::Lost { .. } => "lost",
            TransportEvent::Initiated { .. } => "initiated",
            TransportEvent::Result { .. } => "result",
            TransportEvent::Disconnected { .. } => "disconnected",
            TransportEvent::Payload { .. } => "payload",
        }
    }
}

/// Generation-stamped route from transport callbacks into the core task
#[derive(Debug, Clone)]
pub struct EventSink {
    generation: u64,
    sender: EventSender,
}

impl EventSink {
    pub fn new(generation: u64, sender: EventSender) -> Self {
        Self { generation, sender }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Forward a callback; returns `false` once the core task is gone
    pub fn emit(&self, event: TransportEvent) -> bool {
        let delivered = self
            .sender
            .send(Event::Transport {
                generation: self.generation,
                event,
            })
            .is_ok();
        if !delivered {
            trace!("Core task gone, transport callback discarded");
        }
        delivered
    }
}

// ----------------------------------------------------------------------------
// Transport Trait
// ----------------------------------------------------------------------------

pub type TransportResult<T> = core::result::Result<T, TransportError>;

/// Short-range radio capability consumed by the state machine
///
/// Calls return once the request has been accepted by the radio stack; their
/// asynchronous consequences arrive later through the supplied [`EventSink`].
/// The `stop_*` calls are unconditional and must be safe when nothing is
/// running.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Announce `identity` under `namespace` and accept incoming handshakes
    async fn advertise(
        &self,
        identity: &Identity,
        namespace: &str,
        sink: EventSink,
    ) -> TransportResult<()>;

    /// Open a discovery window for advertisers under `namespace`
    async fn discover(&self, namespace: &str, sink: EventSink) -> TransportResult<()>;

    /// Ask a discovered endpoint for a session
    async fn request_connection(
        &self,
        identity: &Identity,
        endpoint_id: &EndpointId,
        sink: EventSink,
    ) -> TransportResult<()>;

    /// Accept a pending handshake; payloads are routed to `sink`
    async fn accept_connection(
        &self,
        endpoint_id: &EndpointId,
        sink: EventSink,
    ) -> TransportResult<()>;

    async fn send(&self, endpoint_id: &EndpointId, bytes: Vec<u8>) -> TransportResult<()>;

    async fn stop_advertising(&self);

    async fn stop_discovery(&self);

    /// Drop every session and pending handshake
    async fn stop_all_endpoints(&self);
}

// ----------------------------------------------------------------------------
// Radio Readiness
// ----------------------------------------------------------------------------

/// Precondition gate consulted before advertising or discovering
///
/// Fails with [`PeerConnectError::RadioUnavailable`]; the caller decides
/// whether to prompt the user and retry.
#[async_trait]
pub trait RadioGate: Send + Sync {
    async fn ensure_ready(&self) -> Result<()>;
}

/// Gate for hosts without permission or radio-state checks
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysReady;

#[async_trait]
impl RadioGate for AlwaysReady {
    async fn ensure_ready(&self) -> Result<()> {
        Ok(())
    }
}

/// Gate whose readiness can be flipped at runtime
#[derive(Debug)]
pub struct SwitchableRadioGate {
    ready: AtomicBool,
}

impl SwitchableRadioGate {
    pub fn new(ready: bool) -> Self {
        Self {
            ready: AtomicBool::new(ready),
        }
    }

    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }
}

#[async_trait]
impl RadioGate for SwitchableRadioGate {
    async fn ensure_ready(&self) -> Result<()> {
        if self.ready.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(PeerConnectError::radio_unavailable(
                "radio is off or location permission is missing",
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[test]
    fn test_sink_stamps_generation() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sink = EventSink::new(7, tx);
        assert!(sink.emit(TransportEvent::Lost {
            endpoint_id: EndpointId::from("E1"),
        }));

        match rx.try_recv().unwrap() {
            Event::Transport { generation, event } => {
                assert_eq!(generation, 7);
                assert_eq!(event.kind(), "lost");
                assert_eq!(event.endpoint_id().as_str(), "E1");
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_sink_reports_closed_core() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let sink = EventSink::new(0, tx);
        assert!(!sink.emit(TransportEvent::Disconnected {
            endpoint_id: EndpointId::from("E1"),
        }));
    }

    #[tokio::test]
    async fn test_switchable_gate() {
        let gate = SwitchableRadioGate::new(false);
        assert!(matches!(
            gate.ensure_ready().await,
            Err(PeerConnectError::RadioUnavailable { .. })
        ));
        gate.set_ready(true);
        assert!(gate.ensure_ready().await.is_ok());
        assert!(AlwaysReady.ensure_ready().await.is_ok());
    }
}
