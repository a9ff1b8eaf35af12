//! Runtime Builder API
//!
//! Builder-style entry point for hosts (CLI, tests): plug in a transport and
//! optional stores, get back a handle with the imperative entry points and
//! the app event stream.

use std::sync::Arc;
use std::time::Duration;

use peerconnect_core::{
    create_app_event_channel, create_command_channel, create_event_channel, AlwaysReady,
    AppEventReceiver, AppEventSender, Command, CommandSender, EndpointId, IdentityManager,
    IdentityStore, MemoryIdentityStore, MemoryPeerStore, PeerConnectError, PeerStore, RadioGate,
    RendezvousConfig, Reply, Result, Transport,
};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::info;

use crate::logic::{Collaborators, ConnectionLifecycle, CoreTask};

// ----------------------------------------------------------------------------
// Runtime Builder
// ----------------------------------------------------------------------------

/// Builder for a rendezvous runtime
pub struct RuntimeBuilder {
    transport: Arc<dyn Transport>,
    config: RendezvousConfig,
    peer_store: Option<Arc<dyn PeerStore>>,
    identity_store: Option<Arc<dyn IdentityStore>>,
    radio_gate: Option<Arc<dyn RadioGate>>,
}

impl RuntimeBuilder {
    /// Create a builder around the radio transport
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            config: RendezvousConfig::default(),
            peer_store: None,
            identity_store: None,
            radio_gate: None,
        }
    }

    pub fn with_config(mut self, config: RendezvousConfig) -> Self {
        self.config = config;
        self
    }

    /// Persistent peer history; defaults to an in-memory store
    pub fn with_peer_store(mut self, store: Arc<dyn PeerStore>) -> Self {
        self.peer_store = Some(store);
        self
    }

    /// Saved display name; defaults to an empty in-memory store
    pub fn with_identity_store(mut self, store: Arc<dyn IdentityStore>) -> Self {
        self.identity_store = Some(store);
        self
    }

    /// Radio readiness check; defaults to always ready
    pub fn with_radio_gate(mut self, gate: Arc<dyn RadioGate>) -> Self {
        self.radio_gate = Some(gate);
        self
    }

    /// Build the core task and spawn it on the current tokio runtime
    pub async fn build_and_start(self) -> Result<RendezvousHandle> {
        self.config.validate()?;
        info!(
            "Starting rendezvous runtime under '{}'",
            self.config.service_namespace
        );

        let (command_sender, command_receiver) = create_command_channel(&self.config.channels);
        let (event_sender, event_receiver) = create_event_channel();
        let (app_event_sender, app_event_receiver) =
            create_app_event_channel(&self.config.channels);

        let identity_store = self
            .identity_store
            .unwrap_or_else(|| Arc::new(MemoryIdentityStore::new()));
        let collaborators = Collaborators {
            transport: self.transport,
            peer_store: self
                .peer_store
                .unwrap_or_else(|| Arc::new(MemoryPeerStore::new())),
            radio_gate: self.radio_gate.unwrap_or_else(|| Arc::new(AlwaysReady)),
        };

        let lifecycle = ConnectionLifecycle::new(
            collaborators,
            IdentityManager::new(identity_store),
            self.config,
            event_sender,
            app_event_sender.clone(),
        );
        let task = CoreTask::new(lifecycle, command_receiver, event_receiver);
        let core_handle = tokio::spawn(task.run());

        Ok(RendezvousHandle {
            command_sender,
            app_event_sender,
            app_event_receiver: Some(app_event_receiver),
            core_handle: Some(core_handle),
        })
    }
}

// ----------------------------------------------------------------------------
// Rendezvous Handle
// ----------------------------------------------------------------------------

/// Handle to a running rendezvous core
pub struct RendezvousHandle {
    command_sender: CommandSender,
    app_event_sender: AppEventSender,
    app_event_receiver: Option<AppEventReceiver>,
    core_handle: Option<JoinHandle<Result<()>>>,
}

impl RendezvousHandle {
    /// Take the receiver subscribed before the core started (only once)
    ///
    /// It sees every event, including the startup `Ready`.
    pub fn take_app_event_receiver(&mut self) -> Option<AppEventReceiver> {
        self.app_event_receiver.take()
    }

    /// Additional subscriber; sees events from now on
    pub fn subscribe(&self) -> AppEventReceiver {
        self.app_event_sender.subscribe()
    }

    pub fn command_sender(&self) -> CommandSender {
        self.command_sender.clone()
    }

    pub async fn host(&self) -> Result<()> {
        self.request(|reply| Command::Host { reply }).await
    }

    pub async fn join(&self) -> Result<()> {
        self.request(|reply| Command::Join { reply }).await
    }

    pub async fn select_peer(&self, endpoint_id: EndpointId) -> Result<()> {
        self.request(|reply| Command::SelectPeer { endpoint_id, reply })
            .await
    }

    pub async fn send_text<T: Into<String>>(&self, body: T) -> Result<()> {
        let body = body.into();
        self.request(|reply| Command::SendText { body, reply }).await
    }

    pub async fn disconnect(&self) -> Result<()> {
        self.request(|reply| Command::Disconnect { reply }).await
    }

    pub async fn set_name<T: Into<String>>(&self, name: T) -> Result<()> {
        let name = name.into();
        self.request(|reply| Command::SetName { name, reply }).await
    }

    pub fn is_running(&self) -> bool {
        self.core_handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stop the core task and wait for its radio teardown
    pub async fn shutdown(&mut self) -> Result<()> {
        info!("Shutting down rendezvous runtime");
        let _ = self.command_sender.send(Command::Shutdown).await;

        if let Some(handle) = self.core_handle.take() {
            match tokio::time::timeout(Duration::from_secs(10), handle).await {
                Ok(Ok(result)) => result?,
                Ok(Err(e)) => {
                    return Err(PeerConnectError::channel_error(format!(
                        "Core task panicked: {}",
                        e
                    )))
                }
                Err(_) => return Err(PeerConnectError::channel_error("Core task did not stop")),
            }
        }
        Ok(())
    }

    async fn request<F>(&self, build: F) -> Result<()>
    where
        F: FnOnce(Reply) -> Command,
    {
        let (reply, response) = oneshot::channel();
        self.command_sender
            .send(build(reply))
            .await
            .map_err(|_| PeerConnectError::channel_error("Core task is not running"))?;
        response
            .await
            .map_err(|_| PeerConnectError::channel_error("Core task dropped the reply"))?
    }
}
