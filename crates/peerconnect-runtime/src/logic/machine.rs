//! Connection Lifecycle State Machine
//!
//! `ConnectionLifecycle` owns the session and drives the transport through
//! `Idle → Advertising | Discovering → Connecting → Connected`. Every way out
//! of a session (failed handshake, lost link, user cancel) goes through
//! [`ConnectionLifecycle::reset`].
//!
//! This file holds construction, startup and the shared transition/reset
//! machinery; the per-command and per-callback handlers live in
//! `handlers.rs`.

use std::sync::Arc;

use peerconnect_core::{
    reconcile, AppEvent, AppEventSender, Event, EventSender, EventSink, IdentityManager,
    MessageCodec, PeerConnectError, PeerRecord, PeerStore, RadioGate, RendezvousConfig, Session,
    SessionState, Timestamp, Transport,
};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use super::state::CoreState;
use crate::scheduler::DiscoveryScheduler;

/// External collaborators of the state machine
pub struct Collaborators {
    pub transport: Arc<dyn Transport>,
    pub peer_store: Arc<dyn PeerStore>,
    pub radio_gate: Arc<dyn RadioGate>,
}

pub struct ConnectionLifecycle {
    pub(crate) state: CoreState,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) peer_store: Arc<dyn PeerStore>,
    pub(crate) radio_gate: Arc<dyn RadioGate>,
    pub(crate) scheduler: DiscoveryScheduler,
    pub(crate) codec: MessageCodec,
    pub(crate) config: RendezvousConfig,
    pub(crate) events: EventSender,
    pub(crate) app_events: AppEventSender,
    settle_timer: Option<JoinHandle<()>>,
}

impl ConnectionLifecycle {
    pub fn new(
        collaborators: Collaborators,
        identity: IdentityManager,
        config: RendezvousConfig,
        events: EventSender,
        app_events: AppEventSender,
    ) -> Self {
        let scheduler = DiscoveryScheduler::new(
            collaborators.transport.clone(),
            config.service_namespace.clone(),
            config.pulse_interval,
            events.clone(),
        );
        Self {
            state: CoreState::new(identity),
            transport: collaborators.transport,
            peer_store: collaborators.peer_store,
            radio_gate: collaborators.radio_gate,
            scheduler,
            codec: config.codec(),
            config,
            events,
            app_events,
            settle_timer: None,
        }
    }

    pub fn session(&self) -> &Session {
        &self.state.session
    }

    pub fn state(&self) -> &CoreState {
        &self.state
    }

    /// Process-start work; runs once, before any command is accepted
    pub async fn start(&mut self) {
        if let Err(e) = self.peer_store.mark_all_offline().await {
            self.state.stats.storage_failures += 1;
            warn!("Could not clear stale online flags, continuing without history: {}", e);
        }

        let identity = self.state.identity.current().clone();
        info!("Rendezvous core started as {}", identity);
        self.emit(AppEvent::StatusChanged {
            state: SessionState::Idle,
            text: "Ready".to_string(),
        });
        self.emit(AppEvent::Ready { identity });
        self.refresh_peer_list().await;
    }

    /// Final teardown on shutdown; no settle delay, no new identity
    pub async fn shutdown(&mut self) {
        self.state.generation += 1;
        if let Some(timer) = self.settle_timer.take() {
            timer.abort();
        }
        self.scheduler.stop().await;
        self.stop_radio().await;
        info!("Rendezvous core stopped");
    }

    // ------------------------------------------------------------------------
    // Shared machinery
    // ------------------------------------------------------------------------

    /// Sink for a transport call made now
    pub(crate) fn sink(&self) -> EventSink {
        EventSink::new(self.state.generation, self.events.clone())
    }

    pub(crate) fn emit(&self, event: AppEvent) {
        if self.app_events.send(event).is_err() {
            trace!("No UI subscribers for app event");
        }
    }

    pub(crate) fn emit_error(&self, error: &PeerConnectError) {
        self.emit(AppEvent::Error {
            message: error.to_string(),
        });
    }

    pub(crate) fn transition(&mut self, to: SessionState, text: impl Into<String>) {
        let from = self.state.session.state;
        let text = text.into();
        info!("Session {} -> {} ({})", from, to, text);
        self.state.session.state = to;
        self.state.stats.state_transitions += 1;
        self.emit(AppEvent::StatusChanged { state: to, text });
    }

    /// Recompute the reconciled peer list and publish it
    pub(crate) async fn refresh_peer_list(&mut self) {
        let history = match self.peer_store.list_all().await {
            Ok(history) => history,
            Err(e) => {
                self.state.stats.storage_failures += 1;
                warn!("Peer history unavailable, showing live peers only: {}", e);
                Vec::new()
            }
        };
        let view = reconcile(&self.state.online_peers(), &history);
        debug!(
            "Peer list: {} online, {} offline",
            view.online.len(),
            view.offline.len()
        );
        self.emit(AppEvent::PeerListChanged(view));
    }

    /// Whether a callback raised under `generation` is still relevant
    pub(crate) fn is_current(&self, generation: u64) -> bool {
        generation == self.state.generation
    }

    /// `host()`/`join()` precondition
    pub(crate) fn ensure_idle_and_ready(&self) -> peerconnect_core::Result<()> {
        if !self.state.ready {
            return Err(PeerConnectError::invalid_state(
                "Idle (ready)",
                "Idle (settling after reset)",
            ));
        }
        if !self.state.session.state.is_idle() {
            return Err(PeerConnectError::invalid_state(
                SessionState::Idle.to_string(),
                self.state.session.state.to_string(),
            ));
        }
        Ok(())
    }

    async fn stop_radio(&self) {
        self.transport.stop_advertising().await;
        self.transport.stop_discovery().await;
        self.transport.stop_all_endpoints().await;
    }

    // ------------------------------------------------------------------------
    // Reset
    // ------------------------------------------------------------------------

    /// Tear everything down and return to `Idle`
    ///
    /// Callbacks from before the reset are invalidated by the generation
    /// bump. `ready` stays false until the settle delay has elapsed.
    pub(crate) async fn reset(&mut self, reason: &str) {
        self.state.generation += 1;
        self.state.stats.resets += 1;
        info!("Resetting radio ({})", reason);

        self.scheduler.stop().await;
        self.stop_radio().await;

        let session = &mut self.state.session;
        let previous_peer = session.peer.take().zip(session.peer_name.take());
        if let (SessionState::Connected, Some((peer, name))) = (session.state, previous_peer) {
            let record = PeerRecord {
                endpoint_id: peer,
                name,
                last_seen_at: Timestamp::now(),
                online: false,
            };
            if let Err(e) = self.peer_store.upsert(record).await {
                self.state.stats.storage_failures += 1;
                warn!("Could not mark previous peer offline: {}", e);
            }
        }

        self.state.live_peers.clear();
        self.state.transcript.clear();
        self.state.identity.rotate();
        self.state.ready = false;

        self.transition(SessionState::Idle, "Resetting...");
        self.refresh_peer_list().await;
        self.arm_settle_timer();
    }

    fn arm_settle_timer(&mut self) {
        if let Some(timer) = self.settle_timer.take() {
            timer.abort();
        }
        let generation = self.state.generation;
        let delay = self.config.settle_delay;
        let events = self.events.clone();
        self.settle_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = events.send(Event::Settled { generation });
        }));
    }

    /// The settle delay after a reset elapsed
    pub(crate) fn on_settled(&mut self, generation: u64) {
        if !self.is_current(generation) {
            trace!("Ignoring settle signal from generation {}", generation);
            return;
        }
        self.settle_timer = None;
        self.state.ready = true;
        let identity = self.state.identity.current().clone();
        debug!("Radio settled, ready as {}", identity);
        self.emit(AppEvent::StatusChanged {
            state: SessionState::Idle,
            text: "Ready".to_string(),
        });
        self.emit(AppEvent::Ready { identity });
    }
}
