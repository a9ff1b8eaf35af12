//! File-backed persistence for the CLI
//!
//! The peer history is a JSON array of records and the saved name a small
//! JSON object, both under the data directory. Writes go to a temporary file
//! that is then renamed over the target.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use peerconnect_core::{
    sort_by_relevance, EndpointId, IdentityStore, PeerRecord, PeerStore, StorageError,
};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;

fn write_atomically(path: &Path, contents: &[u8]) -> Result<(), StorageError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, contents)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

fn read_optional(path: &Path) -> Result<Option<String>, StorageError> {
    match std::fs::read_to_string(path) {
        Ok(contents) => Ok(Some(contents)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn serialization_error(e: serde_json::Error) -> StorageError {
    StorageError::Serialization {
        reason: e.to_string(),
    }
}

// ----------------------------------------------------------------------------
// Peer History
// ----------------------------------------------------------------------------

/// Peer history kept in memory and written through to a JSON file
#[derive(Debug)]
pub struct JsonPeerStore {
    path: PathBuf,
    records: RwLock<BTreeMap<EndpointId, PeerRecord>>,
}

impl JsonPeerStore {
    /// Open the store, starting empty when the file does not exist yet
    pub fn open<P: Into<PathBuf>>(path: P) -> Result<Self, StorageError> {
        let path = path.into();
        let records: Vec<PeerRecord> = match read_optional(&path)? {
            Some(contents) => serde_json::from_str(&contents).map_err(serialization_error)?,
            None => Vec::new(),
        };
        debug!("Loaded {} peer records from {}", records.len(), path.display());

        Ok(Self {
            path,
            records: RwLock::new(
                records
                    .into_iter()
                    .map(|record| (record.endpoint_id.clone(), record))
                    .collect(),
            ),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, records: &BTreeMap<EndpointId, PeerRecord>) -> Result<(), StorageError> {
        let list: Vec<&PeerRecord> = records.values().collect();
        let json = serde_json::to_vec_pretty(&list).map_err(serialization_error)?;
        write_atomically(&self.path, &json)
    }
}

#[async_trait]
impl PeerStore for JsonPeerStore {
    async fn upsert(&self, record: PeerRecord) -> Result<(), StorageError> {
        let mut records = self.records.write().await;
        records.insert(record.endpoint_id.clone(), record);
        self.persist(&records)
    }

    async fn list_all(&self) -> Result<Vec<PeerRecord>, StorageError> {
        let mut list: Vec<PeerRecord> = self.records.read().await.values().cloned().collect();
        sort_by_relevance(&mut list);
        Ok(list)
    }

    async fn mark_all_offline(&self) -> Result<(), StorageError> {
        let mut records = self.records.write().await;
        for record in records.values_mut() {
            record.online = false;
        }
        self.persist(&records)
    }

    async fn exists(&self, endpoint_id: &EndpointId) -> Result<bool, StorageError> {
        Ok(self.records.read().await.contains_key(endpoint_id))
    }
}

// ----------------------------------------------------------------------------
// Saved Name
// ----------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
struct SavedIdentity {
    name: String,
}

/// Saved display name in a JSON file
#[derive(Debug, Clone)]
pub struct FileIdentityStore {
    path: PathBuf,
}

impl FileIdentityStore {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }
}

impl IdentityStore for FileIdentityStore {
    fn get_saved_name(&self) -> Result<Option<String>, StorageError> {
        match read_optional(&self.path)? {
            Some(contents) => {
                let saved: SavedIdentity =
                    serde_json::from_str(&contents).map_err(serialization_error)?;
                Ok(Some(saved.name))
            }
            None => Ok(None),
        }
    }

    fn save_name(&self, name: &str) -> Result<(), StorageError> {
        let saved = SavedIdentity {
            name: name.to_string(),
        };
        let json = serde_json::to_vec_pretty(&saved).map_err(serialization_error)?;
        write_atomically(&self.path, &json)
    }
}
