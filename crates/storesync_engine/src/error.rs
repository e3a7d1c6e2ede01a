//! Error types for the sync engine.

use crate::store::StoreError;
use storesync_core::{CoreError, EntityKey, IssueClass, SyncIssue};
use storesync_remote::RemoteError;
use thiserror::Error;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, SyncError>;

/// Errors that can occur during sync operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SyncError {
    /// Another sync of the same entity is in flight.
    #[error("sync already in progress for {0}")]
    InProgress(String),

    /// Sync was cancelled between phases.
    #[error("sync cancelled")]
    Cancelled,

    /// Invalid phase transition.
    #[error("invalid state transition from {from} to {to}")]
    InvalidStateTransition {
        /// Current phase.
        from: String,
        /// Attempted target phase.
        to: String,
    },

    /// Remote API failure (after retries).
    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// Local store failure.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Mapping, validation or tracker failure.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// No server with this name is configured.
    #[error("unknown server: {0}")]
    UnknownServer(String),

    /// The requested feature is switched off for the server.
    #[error("{feature} is disabled for server {server}")]
    SyncDisabled {
        /// Server name.
        server: String,
        /// Feature flag name.
        feature: &'static str,
    },

    /// The operation is not defined for this entity kind.
    #[error("{operation} is not supported for {kind}")]
    Unsupported {
        /// Entity kind.
        kind: String,
        /// Operation name.
        operation: &'static str,
    },

    /// The item is not published to any server.
    #[error("No remote servers defined for item {0}")]
    NoLinkedServers(String),

    /// Configuration could not be loaded or is invalid.
    #[error("configuration error: {0}")]
    Config(String),
}

impl SyncError {
    /// Maps the error onto the issue taxonomy reported in results.
    pub fn class(&self) -> IssueClass {
        match self {
            SyncError::InProgress(_) => IssueClass::Conflict,
            SyncError::Remote(e) if e.is_retryable() => IssueClass::TransientNetwork,
            SyncError::Remote(_) => IssueClass::PermanentRemote,
            _ => IssueClass::LocalValidation,
        }
    }

    /// Returns true if this error can be retried.
    pub fn is_retryable(&self) -> bool {
        self.class() == IssueClass::TransientNetwork
    }

    /// Returns the field this error is attributed to, if any.
    pub fn field(&self) -> Option<&str> {
        match self {
            SyncError::Remote(e) => e.field(),
            SyncError::Store(e) => e.field(),
            SyncError::Core(e) => e.field(),
            _ => None,
        }
    }

    /// Converts the error into a reportable issue for `key`.
    pub fn to_issue(&self, key: &EntityKey) -> SyncIssue {
        SyncIssue::new(self.class(), self.to_string())
            .for_entity(key.clone())
            .on_field(self.field())
    }
}
