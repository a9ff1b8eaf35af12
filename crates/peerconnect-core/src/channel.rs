//! Channel message schema
//!
//! All traffic into and out of the rendezvous core flows through these
//! types:
//! - `Command`: UI → core, each with a reply slot
//! - `Event`: transport callbacks and timers → core
//! - `AppEvent`: core → UI
//!
//! The core task consumes commands and events one at a time, which is what
//! serializes every transition.

use tokio::sync::{broadcast, mpsc, oneshot};

use crate::config::ChannelConfig;
use crate::errors::Result;
use crate::identity::Identity;
use crate::protocol::ChatMessage;
use crate::session::SessionState;
use crate::transport::TransportEvent;
use crate::types::EndpointId;
use crate::view::PeerView;

/// Reply slot for a command
pub type Reply = oneshot::Sender<Result<()>>;

// ----------------------------------------------------------------------------
// Command: UI → Core
// ----------------------------------------------------------------------------

#[derive(Debug)]
pub enum Command {
    /// Start advertising the current identity
    Host { reply: Reply },
    /// Start pulsed discovery
    Join { reply: Reply },
    /// Request a session with a discovered peer
    SelectPeer { endpoint_id: EndpointId, reply: Reply },
    /// Send a chat line over the established session
    SendText { body: String, reply: Reply },
    /// Tear everything down and return to idle
    Disconnect { reply: Reply },
    /// Persist a user-chosen display name
    SetName { name: String, reply: Reply },
    /// Stop the core task
    Shutdown,
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Host { .. } => "host",
            Command::Join { .. } => "join",
            Command::SelectPeer { .. } => "select_peer",
            Command::SendText { .. } => "send_text",
            Command::Disconnect { .. } => "disconnect",
            Command::SetName { .. } => "set_name",
            Command::Shutdown => "shutdown",
        }
    }
}

// ----------------------------------------------------------------------------
// Event: Transport / Timers → Core
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Transport callback tagged with the generation of the call that raised it
    Transport { generation: u64, event: TransportEvent },
    /// The discovery pulse timer fired
    PulseFired { pulse: u64 },
    /// The post-reset settle delay elapsed
    Settled { generation: u64 },
}

// ----------------------------------------------------------------------------
// AppEvent: Core → UI
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum AppEvent {
    StatusChanged { state: SessionState, text: String },
    /// Reconciled online + history list
    PeerListChanged(PeerView),
    MessageReceived(ChatMessage),
    /// Echo of a line we sent
    MessageSent(ChatMessage),
    SessionStarted { endpoint_id: EndpointId, peer_name: String },
    /// Reset finished settling; `host()`/`join()` are accepted again
    Ready { identity: Identity },
    Error { message: String },
}

// ----------------------------------------------------------------------------
// Channel Types and Creation
// ----------------------------------------------------------------------------

pub type CommandSender = mpsc::Sender<Command>;
pub type CommandReceiver = mpsc::Receiver<Command>;
pub type EventSender = mpsc::UnboundedSender<Event>;
pub type EventReceiver = mpsc::UnboundedReceiver<Event>;
pub type AppEventSender = broadcast::Sender<AppEvent>;
pub type AppEventReceiver = broadcast::Receiver<AppEvent>;

/// Bounded command channel
pub fn create_command_channel(config: &ChannelConfig) -> (CommandSender, CommandReceiver) {
    mpsc::channel(config.command_buffer_size.max(1))
}

/// Event channel; unbounded so transport callbacks never block the radio stack
pub fn create_event_channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

/// Broadcast channel for UI subscribers
pub fn create_app_event_channel(config: &ChannelConfig) -> (AppEventSender, AppEventReceiver) {
    broadcast::channel(config.app_event_buffer_size.max(1))
}
