//! Command handlers for the PeerConnect CLI

use std::sync::Arc;
use std::time::Duration;

use peerconnect_core::{
    reconcile, AppEvent, AppEventReceiver, ChatMessage, IdentityManager, IdentityStore,
    MemoryIdentityStore, MemoryPeerStore, PeerRecord, PeerStore, PeerView, RendezvousConfig,
};
use peerconnect_runtime::{LoopbackMedium, LoopbackTransport, RendezvousHandle, RuntimeBuilder};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info};

use crate::cli::{Commands, ConfigAction, IdentityAction};
use crate::config::AppConfig;
use crate::error::{CliError, Result};
use crate::storage::{FileIdentityStore, JsonPeerStore};

/// How long the demo waits for any single step
const DEMO_STEP_TIMEOUT: Duration = Duration::from_secs(30);

/// Command dispatcher for handling CLI commands
pub struct CommandDispatcher;

impl CommandDispatcher {
    /// Execute a CLI command
    pub async fn execute(command: Commands, config: AppConfig) -> Result<()> {
        match command {
            Commands::Demo {
                host_name,
                joiner_name,
                message,
            } => {
                let history = Arc::new(JsonPeerStore::open(config.peers_path())?);
                let outcome = run_demo(
                    &config.rendezvous,
                    &host_name,
                    &joiner_name,
                    &message,
                    history,
                )
                .await?;
                println!(
                    "{} received \"{}\" from {}",
                    joiner_name,
                    outcome.received.body(),
                    outcome.received.sender_name()
                );
                println!("{} now remembers {} peer(s)", joiner_name, outcome.history.len());
                Ok(())
            }
            Commands::Peers { reset_online } => {
                let store = JsonPeerStore::open(config.peers_path())?;
                let view = list_peers(&store, reset_online).await?;
                print_peer_view(&view);
                Ok(())
            }
            Commands::Identity { action } => {
                let store = FileIdentityStore::new(config.identity_path());
                handle_identity(action, Arc::new(store))
            }
            Commands::Config {
                action: ConfigAction::Example,
            } => {
                print!("{}", AppConfig::example_config()?);
                Ok(())
            }
        }
    }
}

// ----------------------------------------------------------------------------
// Demo
// ----------------------------------------------------------------------------

/// What the joining device ended up with after the demo
#[derive(Debug, Clone)]
pub struct DemoOutcome {
    pub received: ChatMessage,
    pub history: Vec<PeerRecord>,
}

struct DemoDevice {
    label: &'static str,
    radio: LoopbackTransport,
    handle: RendezvousHandle,
    events: AppEventReceiver,
}

impl DemoDevice {
    async fn start(
        label: &'static str,
        medium: &LoopbackMedium,
        config: &RendezvousConfig,
        name: &str,
        peer_store: Arc<dyn PeerStore>,
    ) -> Result<Self> {
        let radio = medium.station();
        let mut handle = RuntimeBuilder::new(Arc::new(radio.clone()))
            .with_config(config.clone())
            .with_peer_store(peer_store)
            .with_identity_store(Arc::new(MemoryIdentityStore::with_name(name)))
            .build_and_start()
            .await?;
        let events = handle
            .take_app_event_receiver()
            .ok_or_else(|| CliError::Demo("app event stream already taken".to_string()))?;

        let mut device = Self {
            label,
            radio,
            handle,
            events,
        };
        device
            .wait_for("ready", |e| matches!(e, AppEvent::Ready { .. }))
            .await?;
        Ok(device)
    }

    /// Wait for an app event, echoing status changes along the way
    async fn wait_for<F>(&mut self, step: &str, mut predicate: F) -> Result<AppEvent>
    where
        F: FnMut(&AppEvent) -> bool,
    {
        let label = self.label;
        let events = &mut self.events;
        let wait = async {
            loop {
                match events.recv().await {
                    Ok(event) => {
                        match &event {
                            AppEvent::StatusChanged { text, .. } => println!("[{}] {}", label, text),
                            AppEvent::Error { message } => println!("[{}] error: {}", label, message),
                            _ => debug!("[{}] {:?}", label, event),
                        }
                        if predicate(&event) {
                            return Ok(event);
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        debug!("[{}] skipped {} app events", label, skipped)
                    }
                    Err(RecvError::Closed) => {
                        return Err(CliError::Demo(format!("{} stopped before {}", label, step)))
                    }
                }
            }
        };

        tokio::time::timeout(DEMO_STEP_TIMEOUT, wait)
            .await
            .map_err(|_| CliError::Demo(format!("{} timed out waiting for {}", label, step)))?
    }
}

/// Run the two-device rendezvous over the in-process radio
///
/// The joiner's peer history goes to `history`, so the host shows up there
/// afterwards.
pub async fn run_demo(
    config: &RendezvousConfig,
    host_name: &str,
    joiner_name: &str,
    message: &str,
    history: Arc<dyn PeerStore>,
) -> Result<DemoOutcome> {
    info!("Running demo: {} hosts, {} joins", host_name, joiner_name);
    let medium = LoopbackMedium::new();
    let mut host = DemoDevice::start(
        "host",
        &medium,
        config,
        host_name,
        Arc::new(MemoryPeerStore::new()),
    )
    .await?;
    let mut joiner = DemoDevice::start("joiner", &medium, config, joiner_name, history.clone()).await?;

    host.handle.host().await?;
    joiner.handle.join().await?;

    joiner
        .wait_for("host to be discovered", |e| {
            matches!(e, AppEvent::PeerListChanged(view)
                if view.online.iter().any(|p| p.display_name == host_name))
        })
        .await?;
    let host_endpoint = host
        .radio
        .endpoint_id()
        .ok_or_else(|| CliError::Demo("host has no endpoint id".to_string()))?;
    joiner.handle.select_peer(host_endpoint).await?;

    host.wait_for("session", |e| matches!(e, AppEvent::SessionStarted { .. }))
        .await?;
    joiner
        .wait_for("session", |e| matches!(e, AppEvent::SessionStarted { .. }))
        .await?;

    host.handle.send_text(message).await?;
    let received = match joiner
        .wait_for("message", |e| matches!(e, AppEvent::MessageReceived(_)))
        .await?
    {
        AppEvent::MessageReceived(received) => received,
        other => return Err(CliError::Demo(format!("unexpected event {:?}", other))),
    };

    joiner.handle.disconnect().await?;
    host.wait_for("peer to leave", |e| matches!(e, AppEvent::Ready { .. }))
        .await?;

    joiner.handle.shutdown().await?;
    host.handle.shutdown().await?;

    Ok(DemoOutcome {
        received,
        history: history.list_all().await?,
    })
}

// ----------------------------------------------------------------------------
// Peer History
// ----------------------------------------------------------------------------

/// Reconciled view of the stored history, with nothing live
pub async fn list_peers(store: &dyn PeerStore, reset_online: bool) -> Result<PeerView> {
    if reset_online {
        store.mark_all_offline().await?;
        info!("Cleared online flags");
    }
    let history = store.list_all().await?;
    Ok(reconcile(&[], &history))
}

fn print_peer_view(view: &PeerView) {
    if view.is_empty() {
        println!("No known peers");
        return;
    }
    println!("Known peers:");
    for entry in view.entries() {
        let last_seen = entry
            .last_seen_at
            .map(|at| at.to_string())
            .unwrap_or_else(|| "now".to_string());
        println!(
            "  {:<20} {:<8} {} (last seen {})",
            entry.name,
            if entry.online { "online" } else { "offline" },
            entry.endpoint_id,
            last_seen
        );
    }
}

// ----------------------------------------------------------------------------
// Identity
// ----------------------------------------------------------------------------

pub fn handle_identity(action: IdentityAction, store: Arc<dyn IdentityStore>) -> Result<()> {
    match action {
        IdentityAction::Show => match store.get_saved_name()? {
            Some(name) if !name.trim().is_empty() => println!("Saved name: {}", name),
            _ => println!("No saved name; each session uses a generated User-NNNN name"),
        },
        IdentityAction::Set { name } => {
            let mut manager = IdentityManager::new(store);
            manager.set_name(&name)?;
            println!("Saved name: {}", manager.rotate());
        }
    }
    Ok(())
}
