//! PeerConnect CLI Configuration Management
//!
//! Configuration comes from, lowest priority first:
//! - Default values
//! - A TOML file (`--config`)
//! - Environment variables (`PEERCONNECT_DATA_DIR`, `PEERCONNECT_NAMESPACE`)
//! - Command line arguments

use std::path::{Path, PathBuf};

use peerconnect_core::RendezvousConfig;
use serde::{Deserialize, Serialize};

use crate::error::{CliError, Result};

pub const DATA_DIR_ENV: &str = "PEERCONNECT_DATA_DIR";
pub const NAMESPACE_ENV: &str = "PEERCONNECT_NAMESPACE";

const PEERS_FILE: &str = "peers.json";
const IDENTITY_FILE: &str = "identity.json";

// ----------------------------------------------------------------------------
// CLI Application Configuration
// ----------------------------------------------------------------------------

/// Complete configuration for the PeerConnect CLI
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Rendezvous policy handed to the runtime
    pub rendezvous: RendezvousConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding the peer history and saved name
    ///
    /// Defaults to the platform data directory.
    pub data_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub verbose: bool,
}

impl AppConfig {
    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        let config: AppConfig = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `PEERCONNECT_*` variables from the process environment
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from any key lookup; empty values are ignored
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let value_of = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        if let Some(dir) = value_of(DATA_DIR_ENV) {
            self.storage.data_dir = Some(PathBuf::from(dir));
        }
        if let Some(namespace) = value_of(NAMESPACE_ENV) {
            self.rendezvous.service_namespace = namespace;
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.rendezvous
            .validate()
            .map_err(|e| CliError::Config(e.to_string()))
    }

    /// Effective data directory
    pub fn data_dir(&self) -> PathBuf {
        self.storage.data_dir.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .map(|dir| dir.join("peerconnect"))
                .unwrap_or_else(|| PathBuf::from(".peerconnect"))
        })
    }

    pub fn peers_path(&self) -> PathBuf {
        self.data_dir().join(PEERS_FILE)
    }

    pub fn identity_path(&self) -> PathBuf {
        self.data_dir().join(IDENTITY_FILE)
    }

    /// Example configuration file content
    pub fn example_config() -> Result<String> {
        let example = AppConfig {
            storage: StorageConfig {
                data_dir: Some(PathBuf::from("/var/lib/peerconnect")),
            },
            ..Default::default()
        };
        Ok(toml::to_string_pretty(&example)?)
    }
}
