//! Sync attempt state machine.
//!
//! Every attempt moves forward through
//! `Pending → Fetching → Mapping → Diffing → Writing → Completed`, or to
//! `Failed` from any non-terminal phase. Phases may be skipped (a no-op
//! attempt completes straight from `Diffing`) but never revisited.

use crate::error::{EngineResult, SyncError};
use crate::lock::Lease;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use storesync_core::{Direction, EntityKey};
use tracing::debug;

/// Phase of one sync attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SyncPhase {
    /// Lease acquired, nothing fetched yet.
    Pending,
    /// Reading the local record and the remote record.
    Fetching,
    /// Translating both sides into the remote schema.
    Mapping,
    /// Comparing against the last synced hash and resolving authority.
    Diffing,
    /// Applying remote and local writes.
    Writing,
    /// Finished; the tracker holds the post-write hash if every write applied.
    Completed,
    /// Aborted before or during the attempt.
    Failed,
}

impl SyncPhase {
    /// Returns true for `Completed` and `Failed`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SyncPhase::Completed | SyncPhase::Failed)
    }

    /// Returns true once writes may have been issued.
    pub fn is_writing(&self) -> bool {
        matches!(self, SyncPhase::Writing)
    }

    /// Returns true if `next` may follow this phase.
    pub fn can_transition_to(&self, next: SyncPhase) -> bool {
        !self.is_terminal() && next > *self
    }
}

impl fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Cooperative cancellation flag shared with a running attempt.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    /// Creates an unset handle.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Clears a previous request.
    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    /// Returns true if cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Options for one sync attempt.
#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
    /// Ignore the last synced hash.
    pub force: bool,
    /// Which sides may be written.
    pub direction: Direction,
    /// Cancellation flag, checked between phases.
    pub cancel: Option<CancelHandle>,
}

impl SyncOptions {
    /// Bidirectional, unforced, uncancellable.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the direction.
    pub fn with_direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    /// Forces a full comparison.
    pub fn forced(mut self) -> Self {
        self.force = true;
        self
    }

    /// Attaches a cancellation handle.
    pub fn with_cancel(mut self, cancel: CancelHandle) -> Self {
        self.cancel = Some(cancel);
        self
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancelHandle::is_cancelled)
    }
}

/// One running attempt: its key, phase and lease.
#[derive(Debug)]
pub(crate) struct SyncAttempt {
    key: EntityKey,
    phase: SyncPhase,
    lease: Lease,
    started: Instant,
}

impl SyncAttempt {
    pub(crate) fn new(key: EntityKey, lease: Lease) -> Self {
        Self {
            key,
            phase: SyncPhase::Pending,
            lease,
            started: Instant::now(),
        }
    }

    #[cfg(test)]
    pub(crate) fn phase(&self) -> SyncPhase {
        self.phase
    }

    /// Moves to `next`, refusing backward or post-terminal transitions.
    pub(crate) fn advance(&mut self, next: SyncPhase) -> EngineResult<()> {
        if !self.phase.can_transition_to(next) {
            return Err(SyncError::InvalidStateTransition {
                from: self.phase.to_string(),
                to: next.to_string(),
            });
        }
        debug!(
            server = %self.key.server,
            kind = %self.key.kind,
            local_id = %self.key.local_id,
            phase = %next,
            "sync phase"
        );
        self.phase = next;
        self.lease.set_phase(next);
        Ok(())
    }

    /// Advances to the next phase unless cancellation was requested.
    ///
    /// Once `Writing` has begun, cancellation is no longer honored.
    pub(crate) fn enter(&mut self, next: SyncPhase, options: &SyncOptions) -> EngineResult<()> {
        if !self.phase.is_writing() && options.is_cancelled() {
            return Err(SyncError::Cancelled);
        }
        self.advance(next)
    }

    /// Marks the attempt failed if it has not already finished.
    pub(crate) fn fail(&mut self) {
        if !self.phase.is_terminal() {
            // Failed follows every non-terminal phase
            let _ = self.advance(SyncPhase::Failed);
        }
    }

    pub(crate) fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lock::LeaseTable;
    use storesync_core::EntityKind;

    fn attempt() -> SyncAttempt {
        let key = EntityKey::new("shop.example.com", EntityKind::Item, "ITEM-001");
        let table = Arc::new(LeaseTable::new());
        let lease = table.try_acquire(key.lock_key()).unwrap();
        SyncAttempt::new(key, lease)
    }

    #[test]
    fn phases_move_forward_only() {
        let mut a = attempt();
        a.advance(SyncPhase::Fetching).unwrap();
        a.advance(SyncPhase::Mapping).unwrap();
        assert!(matches!(
            a.advance(SyncPhase::Fetching),
            Err(SyncError::InvalidStateTransition { .. })
        ));
        a.advance(SyncPhase::Completed).unwrap();
        assert!(a.advance(SyncPhase::Failed).is_err());
        assert_eq!(a.phase(), SyncPhase::Completed);
    }

    #[test]
    fn terminal_phases() {
        assert!(SyncPhase::Completed.is_terminal());
        assert!(SyncPhase::Failed.is_terminal());
        assert!(!SyncPhase::Writing.is_terminal());
        assert!(SyncPhase::Diffing.can_transition_to(SyncPhase::Failed));
        assert!(!SyncPhase::Failed.can_transition_to(SyncPhase::Completed));
    }

    #[test]
    fn cancellation_checked_before_writing_only() {
        let cancel = CancelHandle::new();
        let options = SyncOptions::new().with_cancel(cancel.clone());
        let mut a = attempt();
        a.enter(SyncPhase::Fetching, &options).unwrap();
        a.enter(SyncPhase::Writing, &options).unwrap();

        cancel.cancel();
        a.enter(SyncPhase::Completed, &options).unwrap();

        let mut b = attempt();
        assert_eq!(b.enter(SyncPhase::Fetching, &options), Err(SyncError::Cancelled));
        b.fail();
        assert_eq!(b.phase(), SyncPhase::Failed);
    }
}
