//! PeerConnect CLI library
//!
//! Configuration, file-backed stores and command handlers for the
//! `peerconnect` binary.

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod storage;

pub use cli::{Cli, Commands, ConfigAction, IdentityAction};
pub use commands::{list_peers, run_demo, CommandDispatcher, DemoOutcome};
pub use config::AppConfig;
pub use error::{CliError, Result};
pub use storage::{FileIdentityStore, JsonPeerStore};
