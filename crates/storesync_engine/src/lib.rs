//! # storesync engine
//!
//! Sync engine for storesync.
//!
//! This crate provides:
//! - The per-entity sync state machine (pending → fetching → mapping → diffing → writing)
//! - Field-level diffing against the last synced hash, with authority resolution
//! - Per-entity leases so that one entity never syncs twice at once
//! - The [`LocalStore`] capability and an in-memory implementation
//! - Tax rule and shipping method reconciliation
//! - Product image resolution and variant attribute import
//! - [`SyncService`]: the trigger surface the local system calls
//!
//! ## Key Invariants
//!
//! - A sync status only advances once every write of an attempt applied
//! - A second attempt on an entity in flight is rejected, never queued
//! - Stock and price never create remote records
//! - Tax accounts are never overwritten from the remote side
//! - Transient remote failures are retried below the engine

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod catalog;
mod config;
mod diff;
mod engine;
mod error;
mod history;
mod lock;
mod reconciler;
mod service;
mod state;
mod store;

pub use config::{
    AuthorityOverride, EngineSettings, NameBy, ServerConfig, StoresyncConfig, SyncConfig,
};
pub use diff::{plan, DiffInput, FieldDecision, SyncPlan};
pub use engine::{check_price_row, failed_result, SharedState, SyncEngine, SERVERS_FIELD};
pub use error::{EngineResult, SyncError};
pub use history::SyncHistory;
pub use lock::{Lease, LeaseTable};
pub use reconciler::{Reconciler, RemoteTaxes, PUSHED_TAX_FIELDS};
pub use service::SyncService;
pub use state::{CancelHandle, SyncOptions, SyncPhase};
pub use store::{LocalRecord, LocalStore, MemoryStore, StoreError, StoreFilter, StoreResult};
