//! PeerConnect Core
//!
//! Stable API for the PeerConnect nearby chat: domain types, the chat message
//! wire codec, the peer registry and its reconciliation into a displayable
//! peer list, identity handling, the radio transport abstraction and the
//! channel schema the runtime's core task speaks.

// ----------------------------------------------------------------------------
// Module Declarations
// ----------------------------------------------------------------------------

pub mod channel;
pub mod config;
pub mod errors;
pub mod identity;
pub mod protocol;
pub mod registry;
pub mod session;
pub mod transport;
pub mod types;
pub mod view;

// ----------------------------------------------------------------------------
// Public API
// ----------------------------------------------------------------------------

pub use channel::{
    create_app_event_channel, create_command_channel, create_event_channel, AppEvent,
    AppEventReceiver, AppEventSender, Command, CommandReceiver, CommandSender, Event,
    EventReceiver, EventSender, Reply,
};
pub use config::{ChannelConfig, RendezvousConfig, DEFAULT_SERVICE_NAMESPACE};
pub use errors::{CodecError, PeerConnectError, Result, StorageError, TransportError};
pub use identity::{Identity, IdentityManager, IdentityStore, MemoryIdentityStore};
pub use protocol::{ChatMessage, MessageCodec, WIRE_VERSION};
pub use registry::{sort_by_relevance, MemoryPeerStore, PeerRecord, PeerStore};
pub use session::{Session, SessionState};
pub use transport::{
    AlwaysReady, ConnectionOutcome, EventSink, RadioGate, SwitchableRadioGate, Transport,
    TransportEvent, TransportResult,
};
pub use types::{EndpointId, Timestamp};
pub use view::{reconcile, LivePeer, PeerEntry, PeerView};
