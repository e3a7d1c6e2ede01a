//! Per-entity leases.
//!
//! At most one sync attempt per (entity kind, local id) is in flight at a
//! time, across all servers. A second caller is rejected with
//! [`SyncError::InProgress`]; it never waits.

use crate::error::{EngineResult, SyncError};
use crate::state::SyncPhase;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use storesync_core::LockKey;

/// Table of held leases and the phase each attempt is in.
#[derive(Debug, Default)]
pub struct LeaseTable {
    held: Mutex<HashMap<LockKey, SyncPhase>>,
}

impl LeaseTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquires the lease for `key`, or fails if it is held.
    pub fn try_acquire(self: &Arc<Self>, key: LockKey) -> EngineResult<Lease> {
        let mut held = self.held.lock();
        if held.contains_key(&key) {
            return Err(SyncError::InProgress(key.to_string()));
        }
        held.insert(key.clone(), SyncPhase::Pending);
        Ok(Lease {
            table: Arc::clone(self),
            key,
        })
    }

    /// Returns true if the lease for `key` is held.
    pub fn is_held(&self, key: &LockKey) -> bool {
        self.held.lock().contains_key(key)
    }

    /// Phase of the attempt holding `key`, if any.
    pub fn phase(&self, key: &LockKey) -> Option<SyncPhase> {
        self.held.lock().get(key).copied()
    }

    /// Number of leases held.
    pub fn len(&self) -> usize {
        self.held.lock().len()
    }

    /// Returns true if no lease is held.
    pub fn is_empty(&self) -> bool {
        self.held.lock().is_empty()
    }
}

/// A held lease; released when dropped, on every exit path.
#[derive(Debug)]
pub struct Lease {
    table: Arc<LeaseTable>,
    key: LockKey,
}

impl Lease {
    /// The leased key.
    pub fn key(&self) -> &LockKey {
        &self.key
    }

    pub(crate) fn set_phase(&self, phase: SyncPhase) {
        if let Some(slot) = self.table.held.lock().get_mut(&self.key) {
            *slot = phase;
        }
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        self.table.held.lock().remove(&self.key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use storesync_core::{EntityKey, EntityKind};

    fn key(id: &str) -> LockKey {
        EntityKey::new("shop.example.com", EntityKind::Item, id).lock_key()
    }

    #[test]
    fn second_acquire_is_rejected() {
        let table = Arc::new(LeaseTable::new());
        let lease = table.try_acquire(key("ITEM-001")).unwrap();
        assert!(matches!(
            table.try_acquire(key("ITEM-001")),
            Err(SyncError::InProgress(_))
        ));
        assert!(table.try_acquire(key("ITEM-002")).is_ok());

        drop(lease);
        assert!(!table.is_held(&key("ITEM-001")));
        assert!(table.try_acquire(key("ITEM-001")).is_ok());
    }

    #[test]
    fn lease_is_shared_across_servers() {
        let table = Arc::new(LeaseTable::new());
        let a = EntityKey::new("a.example.com", EntityKind::Item, "ITEM-001");
        let b = EntityKey::new("b.example.com", EntityKind::Item, "ITEM-001");
        let _lease = table.try_acquire(a.lock_key()).unwrap();
        assert!(table.try_acquire(b.lock_key()).is_err());
    }

    #[test]
    fn phase_is_visible_while_held() {
        let table = Arc::new(LeaseTable::new());
        let lease = table.try_acquire(key("ITEM-001")).unwrap();
        lease.set_phase(SyncPhase::Writing);
        assert_eq!(table.phase(&key("ITEM-001")), Some(SyncPhase::Writing));
        drop(lease);
        assert_eq!(table.phase(&key("ITEM-001")), None);
        assert!(table.is_empty());
    }
}
