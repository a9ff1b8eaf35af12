//! Error handling for the PeerConnect CLI

use thiserror::Error;

/// CLI-specific error types
#[derive(Error, Debug)]
pub enum CliError {
    #[error("PeerConnect error: {0}")]
    Core(#[from] peerconnect_core::PeerConnectError),

    #[error("Storage error: {0}")]
    Storage(#[from] peerconnect_core::StorageError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Demo failed: {0}")]
    Demo(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlParsing(#[from] toml::de::Error),

    #[error("TOML serialization error: {0}")]
    TomlSerialization(#[from] toml::ser::Error),
}

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;
