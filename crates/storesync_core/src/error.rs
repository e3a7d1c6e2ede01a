//! Error types for storesync core.

use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in core model operations.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CoreError {
    /// A required field is missing or malformed in a record.
    #[error("validation error on field '{field}': {reason}")]
    Validation {
        /// Name of the offending field.
        field: String,
        /// Why the field was rejected.
        reason: String,
    },

    /// A mapping declares the same field name twice.
    #[error("duplicate {side} field '{field}' in {kind} mapping")]
    DuplicateField {
        /// Entity kind of the mapping.
        kind: String,
        /// Which side the duplicate is on ("local" or "remote").
        side: &'static str,
        /// The duplicated field name.
        field: String,
    },

    /// A mapping omits a field the entity schema requires.
    #[error("{kind} mapping does not map required field '{field}'")]
    MissingRequiredMapping {
        /// Entity kind of the mapping.
        kind: String,
        /// The required local field.
        field: String,
    },

    /// A transform could not convert a value.
    #[error("cannot apply {transform} to field '{field}': {reason}")]
    Transform {
        /// Transform name.
        transform: &'static str,
        /// Field being converted.
        field: String,
        /// Conversion failure.
        reason: String,
    },

    /// Attempt to change an already assigned remote identifier.
    #[error("remote id for {key} is already {existing}, refusing to reassign to {attempted}")]
    RemoteIdReassigned {
        /// Entity whose link was touched.
        key: String,
        /// The id currently linked.
        existing: String,
        /// The id that was rejected.
        attempted: String,
    },

    /// Invalid configuration value.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Unknown entity kind name.
    #[error("unknown entity kind: {0}")]
    UnknownKind(String),
}

impl CoreError {
    /// Creates a validation error for a named field.
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Returns the field this error is attributed to, if any.
    pub fn field(&self) -> Option<&str> {
        match self {
            CoreError::Validation { field, .. }
            | CoreError::DuplicateField { field, .. }
            | CoreError::MissingRequiredMapping { field, .. }
            | CoreError::Transform { field, .. } => Some(field),
            _ => None,
        }
    }
}
