//! Core Logic Module
//!
//! - `state`: session, live peers, transcript and counters
//! - `machine`: the connection lifecycle state machine and its reset
//! - `handlers`: command and transport callback handlers
//! - `task`: the loop that serializes everything onto the state machine
//!
//! All state is owned by one task. Transport callbacks and timer fires are
//! queued as events and handled strictly one after another, so the session,
//! the live peer set and the discovery flag never need a lock.

mod handlers;
pub mod machine;
pub mod state;
pub mod task;

pub use machine::{Collaborators, ConnectionLifecycle};
pub use state::{CoreState, CoreStats, Direction, LivePeers, Transcript, TranscriptEntry};
pub use task::CoreTask;
