//! Command and Event Handlers
//!
//! Every handler runs on the core task, one at a time, so none of them needs
//! a lock. Transport calls are awaited inline; a failing call leaves the
//! machine in the state it was in before the command.

use peerconnect_core::{
    AppEvent, ChatMessage, ConnectionOutcome, EndpointId, LivePeer, PeerConnectError, PeerRecord,
    Result, SessionState, TransportError, TransportEvent,
};
use tracing::{debug, info, trace, warn};

use super::machine::ConnectionLifecycle;

impl ConnectionLifecycle {
    // ------------------------------------------------------------------------
    // Commands
    // ------------------------------------------------------------------------

    /// `Idle → Advertising`
    pub async fn handle_host(&mut self) -> Result<()> {
        self.ensure_idle_and_ready()?;
        self.check_radio().await?;

        let identity = self.state.identity.current().clone();
        let sink = self.sink();
        if let Err(e) = self
            .transport
            .advertise(&identity, &self.config.service_namespace, sink)
            .await
        {
            return Err(self.surface_transport_error(e));
        }

        self.transition(
            SessionState::Advertising,
            format!("Advertising as {}...", identity),
        );
        Ok(())
    }

    /// `Idle → Discovering`
    pub async fn handle_join(&mut self) -> Result<()> {
        self.ensure_idle_and_ready()?;
        self.check_radio().await?;

        let sink = self.sink();
        if let Err(e) = self.scheduler.start(sink).await {
            return Err(self.surface_transport_error(e));
        }

        self.transition(SessionState::Discovering, "Searching for peers...");
        self.refresh_peer_list().await;
        Ok(())
    }

    /// `(Advertising | Discovering) → Connecting` toward a discovered peer
    pub async fn handle_select_peer(&mut self, endpoint_id: EndpointId) -> Result<()> {
        let current = self.state.session.state;
        if !current.is_searching() {
            return Err(PeerConnectError::invalid_state(
                "Advertising or Discovering",
                current.to_string(),
            ));
        }
        let peer_name = match self.state.live_peers.get(&endpoint_id) {
            Some(peer) => peer.display_name.clone(),
            None => {
                return Err(TransportError::EndpointNotFound {
                    endpoint_id: endpoint_id.to_string(),
                }
                .into())
            }
        };

        let identity = self.state.identity.current().clone();
        let sink = self.sink();
        if let Err(e) = self
            .transport
            .request_connection(&identity, &endpoint_id, sink)
            .await
        {
            return Err(self.surface_transport_error(e));
        }

        self.stop_searching().await;
        self.state.session.peer = Some(endpoint_id);
        self.state.session.peer_name = Some(peer_name.clone());
        self.transition(
            SessionState::Connecting,
            format!("Connecting to {}...", peer_name),
        );
        Ok(())
    }

    /// Encode and send one chat line over the connected session
    pub async fn handle_send_text(&mut self, body: String) -> Result<()> {
        let peer = match (&self.state.session.state, &self.state.session.peer) {
            (SessionState::Connected, Some(peer)) => peer.clone(),
            (state, _) => {
                return Err(PeerConnectError::invalid_state(
                    SessionState::Connected.to_string(),
                    state.to_string(),
                ))
            }
        };

        let own_name = self.state.identity.current().name().to_string();
        let message = ChatMessage::new(own_name.clone(), body);
        let bytes = self.codec.encode(&message)?;
        if let Err(e) = self.transport.send(&peer, bytes).await {
            return Err(self.surface_transport_error(e));
        }

        self.state.stats.messages_sent += 1;
        self.state.transcript.record(message.clone(), &own_name);
        self.emit(AppEvent::MessageSent(message));
        Ok(())
    }

    /// User cancel; valid from any state
    pub async fn handle_disconnect(&mut self) -> Result<()> {
        self.reset("user cancel").await;
        Ok(())
    }

    /// Persist a display name; applied now when idle, else at the next reset
    pub async fn handle_set_name(&mut self, name: String) -> Result<()> {
        self.state.identity.set_name(&name)?;
        info!("Saved display name '{}'", name.trim());

        if self.state.ready && self.state.session.state.is_idle() {
            let identity = self.state.identity.rotate().clone();
            self.emit(AppEvent::Ready { identity });
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Events
    // ------------------------------------------------------------------------

    /// Route a transport callback, dropping it if it predates the last reset
    pub async fn handle_transport_event(&mut self, generation: u64, event: TransportEvent) {
        if !self.is_current(generation) {
            self.state.stats.stale_events_dropped += 1;
            debug!(
                "Dropping stale {} callback from {} (generation {}, current {})",
                event.kind(),
                event.endpoint_id(),
                generation,
                self.state.generation
            );
            return;
        }

        match event {
            TransportEvent::Found { endpoint_id, name } => self.on_found(endpoint_id, name).await,
            TransportEvent::Lost { endpoint_id } => self.on_lost(endpoint_id).await,
            TransportEvent::Initiated {
                endpoint_id,
                peer_name,
            } => self.on_initiated(endpoint_id, peer_name).await,
            TransportEvent::Result {
                endpoint_id,
                outcome,
            } => self.on_result(endpoint_id, outcome).await,
            TransportEvent::Disconnected { endpoint_id } => self.on_disconnected(endpoint_id).await,
            TransportEvent::Payload { endpoint_id, bytes } => self.on_payload(endpoint_id, bytes),
        }
    }

    /// A pulse timer fired
    pub async fn handle_pulse(&mut self, pulse: u64) {
        if self.state.session.state != SessionState::Discovering || !self.scheduler.is_current(pulse)
        {
            trace!("Ignoring pulse {} in state {}", pulse, self.state.session.state);
            return;
        }

        self.state.stats.pulses += 1;
        let sink = self.sink();
        if let Err(e) = self.scheduler.pulse(sink).await {
            warn!("Discovery pulse failed, retrying on next pulse: {}", e);
            self.emit_error(&PeerConnectError::from(e));
        }
    }

    async fn on_found(&mut self, endpoint_id: EndpointId, name: String) {
        if self.state.session.state != SessionState::Discovering {
            trace!("Ignoring found {} outside discovery", endpoint_id);
            return;
        }
        if self.state.live_peers.insert(LivePeer::new(endpoint_id.clone(), name.clone())) {
            info!("Found peer {} ({})", name, endpoint_id);
            self.refresh_peer_list().await;
        }
    }

    async fn on_lost(&mut self, endpoint_id: EndpointId) {
        if self.state.live_peers.remove(&endpoint_id) {
            info!("Lost peer {}", endpoint_id);
            self.refresh_peer_list().await;
        }
    }

    async fn on_initiated(&mut self, endpoint_id: EndpointId, peer_name: String) {
        match self.state.session.state {
            SessionState::Advertising => {
                // Incoming request while hosting
                self.stop_searching().await;
                self.state.session.peer = Some(endpoint_id.clone());
                self.state.session.peer_name = Some(peer_name.clone());
                self.transition(
                    SessionState::Connecting,
                    format!("Connecting to {}...", peer_name),
                );
            }
            SessionState::Connecting if self.state.session.is_with(&endpoint_id) => {
                self.state.session.peer_name = Some(peer_name);
            }
            state => {
                debug!(
                    "Ignoring connection initiated by {} in state {}",
                    endpoint_id, state
                );
                return;
            }
        }
        self.accept(endpoint_id).await;
    }

    /// Auto-accept; the one place an accept/reject decision would go
    async fn accept(&mut self, endpoint_id: EndpointId) {
        let sink = self.sink();
        if let Err(e) = self.transport.accept_connection(&endpoint_id, sink).await {
            let error = PeerConnectError::from(e);
            warn!("Accepting {} failed: {}", endpoint_id, error);
            self.emit_error(&error);
            self.reset("accept failed").await;
        }
    }

    async fn on_result(&mut self, endpoint_id: EndpointId, outcome: ConnectionOutcome) {
        if self.state.session.state != SessionState::Connecting
            || !self.state.session.is_with(&endpoint_id)
        {
            debug!("Ignoring connection result from {}", endpoint_id);
            return;
        }

        match outcome {
            ConnectionOutcome::Ok => self.on_connected(endpoint_id).await,
            ConnectionOutcome::Failed(code) => {
                let error = PeerConnectError::ConnectionRejected {
                    endpoint_id: endpoint_id.to_string(),
                    code,
                };
                warn!("{}", error);
                self.emit_error(&error);
                self.reset("connection rejected").await;
            }
        }
    }

    /// `Connecting → Connected`; the registry write completes first
    async fn on_connected(&mut self, endpoint_id: EndpointId) {
        let peer_name = self
            .state
            .session
            .peer_name
            .clone()
            .unwrap_or_else(|| endpoint_id.to_string());

        match self.peer_store.exists(&endpoint_id).await {
            Ok(true) => info!("Reconnected with known peer {}", peer_name),
            Ok(false) => debug!("First session with {}", peer_name),
            Err(e) => debug!("Registry lookup failed: {}", e),
        }
        let record = PeerRecord::connected(endpoint_id.clone(), peer_name.clone());
        if let Err(e) = self.peer_store.upsert(record).await {
            self.state.stats.storage_failures += 1;
            warn!("Could not record peer {}: {}", peer_name, e);
            self.emit_error(&PeerConnectError::from(e));
        }

        self.transition(
            SessionState::Connected,
            format!("Connected to {}", peer_name),
        );
        self.emit(AppEvent::SessionStarted {
            endpoint_id,
            peer_name,
        });
        self.refresh_peer_list().await;
    }

    async fn on_disconnected(&mut self, endpoint_id: EndpointId) {
        let state = self.state.session.state;
        if !matches!(state, SessionState::Connecting | SessionState::Connected)
            || !self.state.session.is_with(&endpoint_id)
        {
            debug!("Ignoring disconnect of {} in state {}", endpoint_id, state);
            return;
        }
        info!("Peer {} disconnected", endpoint_id);
        self.reset("peer disconnected").await;
    }

    fn on_payload(&mut self, endpoint_id: EndpointId, bytes: Vec<u8>) {
        if self.state.session.state != SessionState::Connected
            || !self.state.session.is_with(&endpoint_id)
        {
            debug!("Dropping payload from {} outside the session", endpoint_id);
            return;
        }

        match self.codec.decode(&bytes) {
            Ok(message) => {
                self.state.stats.messages_received += 1;
                let own_name = self.state.identity.current().name().to_string();
                self.state.transcript.record(message.clone(), &own_name);
                self.emit(AppEvent::MessageReceived(message));
            }
            Err(e) => {
                self.state.stats.codec_failures += 1;
                warn!(
                    "Dropping malformed payload ({} bytes) from {}: {}",
                    bytes.len(),
                    endpoint_id,
                    e
                );
            }
        }
    }

    // ------------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------------

    async fn check_radio(&mut self) -> Result<()> {
        if let Err(e) = self.radio_gate.ensure_ready().await {
            warn!("Radio not ready: {}", e);
            self.emit_error(&e);
            return Err(e);
        }
        Ok(())
    }

    /// Leave advertising and discovery before a handshake
    ///
    /// Found peers are only live while discovery runs; the session peer stays
    /// listed through the session itself.
    async fn stop_searching(&mut self) {
        self.scheduler.stop().await;
        self.transport.stop_advertising().await;
        self.transport.stop_discovery().await;
        self.state.live_peers.clear();
    }

    /// Log and publish a failed transport call; the state is left unchanged
    fn surface_transport_error(&self, error: TransportError) -> PeerConnectError {
        let error = PeerConnectError::from(error);
        warn!("{} (staying {})", error, self.state.session.state);
        self.emit_error(&error);
        self.emit(AppEvent::StatusChanged {
            state: self.state.session.state,
            text: error.to_string(),
        });
        error
    }
}
