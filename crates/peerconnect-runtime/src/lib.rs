//! PeerConnect Runtime Engine
//!
//! The rendezvous engine on top of `peerconnect-core`:
//! - `DiscoveryScheduler`: keeps discovery alive with periodic pulses
//! - `ConnectionLifecycle`: the session state machine and its reset
//! - `CoreTask`: the loop serializing commands, callbacks and timers
//! - `RuntimeBuilder` / `RendezvousHandle`: the API hosts use
//! - `LoopbackMedium`: an in-process radio for tests and demos

pub mod builder;
pub mod logic;
pub mod loopback;
pub mod scheduler;

pub use builder::{RendezvousHandle, RuntimeBuilder};
pub use logic::{ConnectionLifecycle, CoreStats, CoreTask, Direction, Transcript};
pub use loopback::{LoopbackMedium, LoopbackTransport, STATUS_CONNECTION_REJECTED};
pub use scheduler::DiscoveryScheduler;

// Re-export core types for convenience
pub use peerconnect_core::{
    AppEvent, AppEventReceiver, ChatMessage, EndpointId, Identity, PeerConnectError, PeerView,
    RendezvousConfig, Result, SessionState,
};
