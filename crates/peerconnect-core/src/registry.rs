//! Peer Registry
//!
//! Durable history of every peer a session was ever established with, keyed
//! by endpoint id. The registry is advisory: callers log and continue when an
//! operation fails, so the rendezvous keeps working without history.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::errors::StorageError;
use crate::types::{EndpointId, Timestamp};

// ----------------------------------------------------------------------------
// Peer Record
// ----------------------------------------------------------------------------

/// A peer we have held a session with
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerRecord {
    pub endpoint_id: EndpointId,
    pub name: String,
    pub last_seen_at: Timestamp,
    pub online: bool,
}

impl PeerRecord {
    /// Record for a peer whose session just came up
    pub fn connected<T: Into<String>>(endpoint_id: EndpointId, name: T) -> Self {
        Self {
            endpoint_id,
            name: name.into(),
            last_seen_at: Timestamp::now(),
            online: true,
        }
    }
}

/// Order records most relevant first: online before offline, then newest
pub fn sort_by_relevance(records: &mut [PeerRecord]) {
    records.sort_by(|a, b| {
        b.online
            .cmp(&a.online)
            .then_with(|| b.last_seen_at.cmp(&a.last_seen_at))
    });
}

// ----------------------------------------------------------------------------
// Peer Store Trait
// ----------------------------------------------------------------------------

/// Persistence backend for [`PeerRecord`]s
///
/// Every operation is idempotent. Failures are reported, never swallowed.
#[async_trait]
pub trait PeerStore: Send + Sync {
    /// Insert or fully replace the record with the same endpoint id
    async fn upsert(&self, record: PeerRecord) -> Result<(), StorageError>;

    /// All records, ordered by [`sort_by_relevance`]
    async fn list_all(&self) -> Result<Vec<PeerRecord>, StorageError>;

    /// Clear `online` on every record
    async fn mark_all_offline(&self) -> Result<(), StorageError>;

    async fn exists(&self, endpoint_id: &EndpointId) -> Result<bool, StorageError>;
}

// ----------------------------------------------------------------------------
// In-Memory Peer Store
// ----------------------------------------------------------------------------

/// In-memory [`PeerStore`] with switchable availability for failure tests
#[derive(Debug)]
pub struct MemoryPeerStore {
    records: RwLock<BTreeMap<EndpointId, PeerRecord>>,
    available: AtomicBool,
}

impl Default for MemoryPeerStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryPeerStore {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(BTreeMap::new()),
            available: AtomicBool::new(true),
        }
    }

    /// Seed the store with existing history
    pub fn with_records<I: IntoIterator<Item = PeerRecord>>(records: I) -> Self {
        let map = records
            .into_iter()
            .map(|record| (record.endpoint_id.clone(), record))
            .collect();
        Self {
            records: RwLock::new(map),
            available: AtomicBool::new(true),
        }
    }

    /// Make every subsequent operation fail (or succeed again)
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    fn check_available(&self) -> Result<(), StorageError> {
        if self.is_available() {
            Ok(())
        } else {
            Err(StorageError::unavailable("Storage not available"))
        }
    }
}

#[async_trait]
impl PeerStore for MemoryPeerStore {
    async fn upsert(&self, record: PeerRecord) -> Result<(), StorageError> {
        self.check_available()?;
        self.records
            .write()
            .await
            .insert(record.endpoint_id.clone(), record);
        Ok(())
    }

    async fn list_all(&self) -> Result<Vec<PeerRecord>, StorageError> {
        self.check_available()?;
        let mut records: Vec<PeerRecord> = self.records.read().await.values().cloned().collect();
        sort_by_relevance(&mut records);
        Ok(records)
    }

    async fn mark_all_offline(&self) -> Result<(), StorageError> {
        self.check_available()?;
        for record in self.records.write().await.values_mut() {
            record.online = false;
        }
        Ok(())
    }

    async fn exists(&self, endpoint_id: &EndpointId) -> Result<bool, StorageError> {
        self.check_available()?;
        Ok(self.records.read().await.contains_key(endpoint_id))
    }
}
