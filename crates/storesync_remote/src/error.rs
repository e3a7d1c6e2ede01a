//! Error types for remote API calls.

use std::time::Duration;
use thiserror::Error;

/// Result type for remote operations.
pub type RemoteResult<T> = Result<T, RemoteError>;

/// Errors returned by the remote commerce API.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RemoteError {
    /// Network failure or 5xx response.
    #[error("remote unavailable: {0}")]
    Unavailable(String),

    /// Credentials were rejected (401/403).
    #[error("remote authentication failed: {0}")]
    Auth(String),

    /// The remote rejected the request contents (400/422).
    #[error("remote validation error{}: {reason}", field_suffix(.field))]
    Validation {
        /// Offending field, if the remote named one.
        field: Option<String>,
        /// Remote message.
        reason: String,
    },

    /// Too many requests (429).
    #[error("remote rate limited, retry after {retry_after:?}")]
    RateLimited {
        /// How long the remote asked us to wait.
        retry_after: Duration,
    },

    /// The call did not complete within the per-call timeout.
    #[error("remote call timed out")]
    Timeout,

    /// The requested record does not exist (404).
    #[error("remote {resource} '{id}' not found")]
    NotFound {
        /// Resource path.
        resource: String,
        /// Record id.
        id: String,
    },

    /// The response could not be understood.
    #[error("remote protocol error: {0}")]
    Protocol(String),
}

fn field_suffix(field: &Option<String>) -> String {
    field
        .as_ref()
        .map(|f| format!(" on field '{f}'"))
        .unwrap_or_default()
}

impl RemoteError {
    /// Creates a validation error attributed to a field.
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            field: Some(field.into()),
            reason: reason.into(),
        }
    }

    /// Returns true if this error can be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RemoteError::Unavailable(_) | RemoteError::RateLimited { .. } | RemoteError::Timeout
        )
    }

    /// Returns the field this error is attributed to, if any.
    pub fn field(&self) -> Option<&str> {
        match self {
            RemoteError::Validation { field, .. } => field.as_deref(),
            _ => None,
        }
    }
}
