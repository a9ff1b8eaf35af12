//! Peer View Model
//!
//! Merges the peers currently visible through discovery with the persisted
//! history into the single list the UI renders. Endpoint ids change every
//! time a peer restarts its radio, so de-duplication is by display name.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::registry::PeerRecord;
use crate::types::{EndpointId, Timestamp};

/// A peer currently visible through active discovery (never persisted)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LivePeer {
    pub endpoint_id: EndpointId,
    pub display_name: String,
}

impl LivePeer {
    pub fn new<T: Into<String>>(endpoint_id: EndpointId, display_name: T) -> Self {
        Self {
            endpoint_id,
            display_name: display_name.into(),
        }
    }
}

/// One row of the reconciled list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerEntry {
    pub endpoint_id: EndpointId,
    pub name: String,
    pub online: bool,
    /// Only known for history entries
    pub last_seen_at: Option<Timestamp>,
}

/// The reconciled peer list: online peers, then history
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerView {
    pub online: Vec<LivePeer>,
    pub offline: Vec<PeerRecord>,
}

impl PeerView {
    /// Flattened rows in display order
    pub fn entries(&self) -> Vec<PeerEntry> {
        let online = self.online.iter().map(|peer| PeerEntry {
            endpoint_id: peer.endpoint_id.clone(),
            name: peer.display_name.clone(),
            online: true,
            last_seen_at: None,
        });
        let offline = self.offline.iter().map(|record| PeerEntry {
            endpoint_id: record.endpoint_id.clone(),
            name: record.name.clone(),
            online: false,
            last_seen_at: Some(record.last_seen_at),
        });
        online.chain(offline).collect()
    }

    pub fn len(&self) -> usize {
        self.online.len() + self.offline.len()
    }

    pub fn is_empty(&self) -> bool {
        self.online.is_empty() && self.offline.is_empty()
    }
}

/// Build the unified peer list from the live set and a registry snapshot
///
/// History records whose name matches an online peer are hidden, and within
/// the history the first record for a name wins. Pure: the same inputs always
/// give the same output.
pub fn reconcile(live: &[LivePeer], history: &[PeerRecord]) -> PeerView {
    let online_names: HashSet<&str> = live.iter().map(|p| p.display_name.as_str()).collect();
    let mut seen: HashSet<&str> = HashSet::new();

    let offline = history
        .iter()
        .filter(|record| !online_names.contains(record.name.as_str()))
        .filter(|record| seen.insert(record.name.as_str()))
        .map(|record| PeerRecord {
            online: false,
            ..record.clone()
        })
        .collect();

    PeerView {
        online: live.to_vec(),
        offline,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn history(names: &[&str]) -> Vec<PeerRecord> {
        names
            .iter()
            .enumerate()
            .map(|(i, name)| PeerRecord {
                endpoint_id: EndpointId::new(format!("h{}", i)),
                name: name.to_string(),
                last_seen_at: Timestamp::new(100 - i as u64),
                online: false,
            })
            .collect()
    }

    #[test]
    fn test_entries_keep_display_order() {
        let live = vec![LivePeer::new(EndpointId::from("E1"), "X")];
        let view = reconcile(&live, &history(&["Y"]));
        let entries = view.entries();
        assert_eq!(entries.len(), 2);
        assert!(entries[0].online);
        assert_eq!(entries[0].name, "X");
        assert_eq!(entries[0].last_seen_at, None);
        assert!(!entries[1].online);
        assert_eq!(entries[1].last_seen_at, Some(Timestamp::new(100)));
    }

    #[test]
    fn test_stale_online_flag_is_not_shown_as_online() {
        let mut records = history(&["A"]);
        records[0].online = true;
        let view = reconcile(&[], &records);
        assert!(!view.offline[0].online);
    }

    #[test]
    fn test_empty_inputs() {
        let view = reconcile(&[], &[]);
        assert!(view.is_empty());
        assert_eq!(view.len(), 0);
    }
}
