//! Sync status tracking.
//!
//! The tracker remembers, per (server, kind, local id), the remote identifier
//! an entity is linked to and the content hash of the last successful sync.
//! Recording a hash is the only way to advance status, and a linked remote
//! identifier can never be replaced.

use crate::error::{CoreError, CoreResult};
use crate::record::ContentHash;
use crate::types::{EntityKey, EntityKind};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Persistent sync metadata for one entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncableEntity {
    key: EntityKey,
    remote_id: Option<String>,
    last_synced_hash: Option<ContentHash>,
    last_synced_at: Option<DateTime<Utc>>,
}

impl SyncableEntity {
    fn new(key: EntityKey) -> Self {
        Self {
            key,
            remote_id: None,
            last_synced_hash: None,
            last_synced_at: None,
        }
    }

    /// Entity key.
    pub fn key(&self) -> &EntityKey {
        &self.key
    }

    /// Linked remote identifier, if any.
    pub fn remote_id(&self) -> Option<&str> {
        self.remote_id.as_deref()
    }

    /// Hash recorded by the last successful sync.
    pub fn last_synced_hash(&self) -> Option<ContentHash> {
        self.last_synced_hash
    }

    /// Time of the last successful sync.
    pub fn last_synced_at(&self) -> Option<DateTime<Utc>> {
        self.last_synced_at
    }

    fn view(&self) -> SyncStatusView {
        match (self.last_synced_hash, self.last_synced_at) {
            (Some(hash), Some(synced_at)) => SyncStatusView::Synced {
                remote_id: self.remote_id.clone(),
                hash,
                synced_at,
            },
            _ => SyncStatusView::NeverSynced {
                remote_id: self.remote_id.clone(),
            },
        }
    }
}

/// Read-only snapshot of an entity's sync status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncStatusView {
    /// No successful sync has been recorded.
    NeverSynced {
        /// Linked remote identifier, if one was assigned.
        remote_id: Option<String>,
    },
    /// At least one successful sync has been recorded.
    Synced {
        /// Linked remote identifier.
        remote_id: Option<String>,
        /// Hash of the merged record after the last sync.
        hash: ContentHash,
        /// When the last sync completed.
        synced_at: DateTime<Utc>,
    },
}

impl SyncStatusView {
    /// Linked remote identifier.
    pub fn remote_id(&self) -> Option<&str> {
        match self {
            SyncStatusView::NeverSynced { remote_id } | SyncStatusView::Synced { remote_id, .. } => {
                remote_id.as_deref()
            }
        }
    }

    /// Hash of the last successful sync.
    pub fn last_hash(&self) -> Option<ContentHash> {
        match self {
            SyncStatusView::Synced { hash, .. } => Some(*hash),
            SyncStatusView::NeverSynced { .. } => None,
        }
    }

    /// Returns true if the entity has been synced at least once.
    pub fn is_synced(&self) -> bool {
        matches!(self, SyncStatusView::Synced { .. })
    }
}

/// Thread-safe store of [`SyncableEntity`] records.
#[derive(Debug, Default)]
pub struct StatusTracker {
    entities: RwLock<HashMap<EntityKey, SyncableEntity>>,
}

impl StatusTracker {
    /// Creates an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of the entity's status.
    pub fn get_status(&self, key: &EntityKey) -> SyncStatusView {
        let mut view = self
            .entities
            .read()
            .get(key)
            .map(SyncableEntity::view)
            .unwrap_or(SyncStatusView::NeverSynced { remote_id: None });
        // Stock and price report the id of the item they belong to
        if view.remote_id().is_none() && key.kind != key.kind.identity_kind() {
            if let Some(id) = self.remote_id(key) {
                view = match view {
                    SyncStatusView::NeverSynced { .. } => SyncStatusView::NeverSynced { remote_id: Some(id) },
                    SyncStatusView::Synced { hash, synced_at, .. } => SyncStatusView::Synced {
                        remote_id: Some(id),
                        hash,
                        synced_at,
                    },
                };
            }
        }
        view
    }

    /// Returns the remote identifier linked to this entity (or to the item
    /// it belongs to, for stock and price).
    pub fn remote_id(&self, key: &EntityKey) -> Option<String> {
        let identity = key.identity_key();
        self.entities
            .read()
            .get(&identity)
            .and_then(|e| e.remote_id.clone())
    }

    /// Links a remote identifier to an entity.
    ///
    /// Assigning the same id again is a no-op. Assigning a different id to an
    /// already linked entity fails and leaves the link untouched.
    pub fn assign_remote_id(&self, key: &EntityKey, remote_id: impl Into<String>) -> CoreResult<()> {
        let remote_id = remote_id.into();
        if remote_id.is_empty() {
            return Err(CoreError::validation("remote_id", "must not be empty"));
        }
        let identity = key.identity_key();
        let mut entities = self.entities.write();
        let entry = entities
            .entry(identity.clone())
            .or_insert_with(|| SyncableEntity::new(identity.clone()));
        match &entry.remote_id {
            Some(existing) if *existing == remote_id => Ok(()),
            Some(existing) => Err(CoreError::RemoteIdReassigned {
                key: identity.to_string(),
                existing: existing.clone(),
                attempted: remote_id,
            }),
            None => {
                entry.remote_id = Some(remote_id);
                Ok(())
            }
        }
    }

    /// Finds the entity linked to a remote id on a server.
    pub fn find_by_remote_id(&self, server: &str, kind: EntityKind, remote_id: &str) -> Option<EntityKey> {
        self.entities
            .read()
            .values()
            .find(|e| {
                e.key.server == server
                    && e.key.kind == kind
                    && e.remote_id.as_deref() == Some(remote_id)
            })
            .map(|e| e.key.clone())
    }

    /// Records a successful sync. This is the only operation that advances
    /// an entity's status.
    pub fn record(&self, key: &EntityKey, hash: ContentHash, synced_at: DateTime<Utc>) {
        let mut entities = self.entities.write();
        let entry = entities
            .entry(key.clone())
            .or_insert_with(|| SyncableEntity::new(key.clone()));
        entry.last_synced_hash = Some(hash);
        entry.last_synced_at = Some(synced_at);
    }

    /// Returns true if `current` differs from the last recorded hash, or if
    /// the entity was never synced.
    pub fn has_drifted(&self, key: &EntityKey, current: &ContentHash) -> bool {
        self.entities
            .read()
            .get(key)
            .and_then(|e| e.last_synced_hash)
            .map_or(true, |recorded| recorded != *current)
    }

    /// Number of tracked entities.
    pub fn len(&self) -> usize {
        self.entities.read().len()
    }

    /// Returns true if nothing is tracked.
    pub fn is_empty(&self) -> bool {
        self.entities.read().is_empty()
    }

    /// Exports all tracked entities, sorted by key.
    pub fn export(&self) -> Vec<SyncableEntity> {
        let mut all: Vec<SyncableEntity> = self.entities.read().values().cloned().collect();
        all.sort_by(|a, b| a.key.cmp(&b.key));
        all
    }

    /// Imports previously exported entities.
    ///
    /// Fails without changes if any entry would relink an already linked
    /// entity to a different remote id.
    pub fn import(&self, entries: Vec<SyncableEntity>) -> CoreResult<()> {
        let mut entities = self.entities.write();
        for entry in &entries {
            if let (Some(existing), Some(incoming)) = (
                entities.get(&entry.key).and_then(|e| e.remote_id.as_ref()),
                entry.remote_id.as_ref(),
            ) {
                if existing != incoming {
                    return Err(CoreError::RemoteIdReassigned {
                        key: entry.key.to_string(),
                        existing: existing.clone(),
                        attempted: incoming.clone(),
                    });
                }
            }
        }
        for mut entry in entries {
            if let Some(current) = entities.get(&entry.key) {
                if entry.remote_id.is_none() {
                    entry.remote_id = current.remote_id.clone();
                }
            }
            entities.insert(entry.key.clone(), entry);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Record;

    fn item(id: &str) -> EntityKey {
        EntityKey::new("shop.example.com", EntityKind::Item, id)
    }

    #[test]
    fn unknown_entity_is_never_synced() {
        let tracker = StatusTracker::new();
        let status = tracker.get_status(&item("ITEM-001"));
        assert!(!status.is_synced());
        assert_eq!(status.remote_id(), None);
    }

    #[test]
    fn remote_id_is_immutable() {
        let tracker = StatusTracker::new();
        let key = item("ITEM-001");
        tracker.assign_remote_id(&key, "42").unwrap();
        tracker.assign_remote_id(&key, "42").unwrap();

        let err = tracker.assign_remote_id(&key, "43").unwrap_err();
        assert!(matches!(err, CoreError::RemoteIdReassigned { .. }));
        assert_eq!(tracker.remote_id(&key).as_deref(), Some("42"));
        assert_eq!(
            tracker.find_by_remote_id("shop.example.com", EntityKind::Item, "42"),
            Some(key)
        );
        assert_eq!(tracker.find_by_remote_id("other.example.com", EntityKind::Item, "42"), None);
    }

    #[test]
    fn stock_shares_item_remote_id() {
        let tracker = StatusTracker::new();
        tracker.assign_remote_id(&item("ITEM-002"), "77").unwrap();
        let stock = EntityKey::new("shop.example.com", EntityKind::StockLevel, "ITEM-002");
        assert_eq!(tracker.remote_id(&stock).as_deref(), Some("77"));
        assert_eq!(tracker.get_status(&stock).remote_id(), Some("77"));
    }

    #[test]
    fn record_advances_status() {
        let tracker = StatusTracker::new();
        let key = item("ITEM-001");
        let hash = Record::new().with("name", "Mug").content_hash();

        assert!(tracker.has_drifted(&key, &hash));
        tracker.record(&key, hash, Utc::now());
        assert!(!tracker.has_drifted(&key, &hash));
        assert_eq!(tracker.get_status(&key).last_hash(), Some(hash));

        let other = Record::new().with("name", "Cup").content_hash();
        assert!(tracker.has_drifted(&key, &other));
    }

    #[test]
    fn status_view_is_a_snapshot() {
        let tracker = StatusTracker::new();
        let key = item("ITEM-001");
        let first = Record::new().with("v", 1).content_hash();
        tracker.record(&key, first, Utc::now());
        let view = tracker.get_status(&key);

        tracker.record(&key, Record::new().with("v", 2).content_hash(), Utc::now());
        assert_eq!(view.last_hash(), Some(first));
    }

    #[test]
    fn export_import_roundtrip() {
        let source = StatusTracker::new();
        let key = item("ITEM-001");
        source.assign_remote_id(&key, "42").unwrap();
        source.record(&key, Record::new().content_hash(), Utc::now());

        let json = serde_json::to_string(&source.export()).unwrap();
        let restored = StatusTracker::new();
        restored.import(serde_json::from_str(&json).unwrap()).unwrap();
        assert_eq!(restored.get_status(&key), source.get_status(&key));
    }

    #[test]
    fn import_refuses_relink() {
        let tracker = StatusTracker::new();
        let key = item("ITEM-001");
        tracker.assign_remote_id(&key, "42").unwrap();

        let other = StatusTracker::new();
        other.assign_remote_id(&key, "99").unwrap();
        assert!(tracker.import(other.export()).is_err());
        assert_eq!(tracker.remote_id(&key).as_deref(), Some("42"));
    }
}
