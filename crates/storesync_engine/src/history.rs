//! Bounded history of finished sync attempts.

use parking_lot::RwLock;
use std::collections::VecDeque;
use storesync_core::SyncResult;

/// Keeps the most recent results, oldest first.
#[derive(Debug)]
pub struct SyncHistory {
    capacity: usize,
    entries: RwLock<VecDeque<SyncResult>>,
}

impl SyncHistory {
    /// Creates a history holding at most `capacity` results.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: RwLock::new(VecDeque::with_capacity(capacity.min(1024))),
        }
    }

    /// Appends a result, evicting the oldest when full.
    pub fn push(&self, result: SyncResult) {
        if self.capacity == 0 {
            return;
        }
        let mut entries = self.entries.write();
        while entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(result);
    }

    /// Snapshot of the retained results, oldest first.
    pub fn recent(&self) -> Vec<SyncResult> {
        self.entries.read().iter().cloned().collect()
    }

    /// Most recent result.
    pub fn last(&self) -> Option<SyncResult> {
        self.entries.read().back().cloned()
    }

    /// Number of retained results.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns true if nothing is retained.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Maximum number of retained results.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for SyncHistory {
    fn default() -> Self {
        Self::new(100)
    }
}
