//! Sync outcomes.
//!
//! A [`SyncResult`] is created once per sync attempt through
//! [`SyncResultBuilder`] and has no mutating methods afterwards.

use crate::types::EntityKey;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Overall status of a sync attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    /// Every write applied, or nothing needed writing.
    Success,
    /// Some writes applied and some failed.
    Partial,
    /// Nothing was applied.
    Failed,
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SyncStatus::Success => "success",
            SyncStatus::Partial => "partial",
            SyncStatus::Failed => "failed",
        })
    }
}

/// Error class of a reported issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueClass {
    /// Rate limits, timeouts, 5xx; retried before being reported.
    TransientNetwork,
    /// Auth failures and rejected requests.
    PermanentRemote,
    /// Missing required fields or malformed local data.
    LocalValidation,
    /// Another sync for the same entity was in flight.
    Conflict,
}

/// A single failed write or validation problem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncIssue {
    /// Entity the issue belongs to.
    pub entity: Option<EntityKey>,
    /// Field the issue is attributed to, when known.
    pub field: Option<String>,
    /// Error class.
    pub class: IssueClass,
    /// Human-readable message.
    pub message: String,
}

impl SyncIssue {
    /// Creates an issue.
    pub fn new(class: IssueClass, message: impl Into<String>) -> Self {
        Self {
            entity: None,
            field: None,
            class,
            message: message.into(),
        }
    }

    /// Attributes the issue to an entity.
    #[must_use]
    pub fn for_entity(mut self, key: EntityKey) -> Self {
        self.entity = Some(key);
        self
    }

    /// Attributes the issue to a field.
    #[must_use]
    pub fn on_field(mut self, field: Option<impl Into<String>>) -> Self {
        self.field = field.map(Into::into);
        self
    }
}

impl fmt::Display for SyncIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(entity) = &self.entity {
            write!(f, "{entity}: ")?;
        }
        if let Some(field) = &self.field {
            write!(f, "[{field}] ")?;
        }
        f.write_str(&self.message)
    }
}

/// Outcome of one entity within a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityOutcome {
    /// Entity.
    pub key: EntityKey,
    /// Entity status.
    pub status: SyncStatus,
    /// Writes applied for this entity.
    pub writes: u32,
    /// Issues for this entity.
    pub issues: Vec<SyncIssue>,
}

/// Immutable record of one sync attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncResult {
    id: Uuid,
    status: SyncStatus,
    message: String,
    writes: u32,
    issues: Vec<SyncIssue>,
    outcomes: Vec<EntityOutcome>,
    timestamp: DateTime<Utc>,
}

impl SyncResult {
    /// Unique id of this attempt.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Overall status.
    pub fn status(&self) -> SyncStatus {
        self.status
    }

    /// Summary message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Number of writes applied.
    pub fn writes(&self) -> u32 {
        self.writes
    }

    /// Every issue, including those of batch members.
    pub fn issues(&self) -> &[SyncIssue] {
        &self.issues
    }

    /// Per-entity outcomes (empty for a single-entity attempt).
    pub fn outcomes(&self) -> &[EntityOutcome] {
        &self.outcomes
    }

    /// When the attempt finished.
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Returns true for full success.
    pub fn is_success(&self) -> bool {
        self.status == SyncStatus::Success
    }

    /// Counts batch members with the given status.
    pub fn count(&self, status: SyncStatus) -> usize {
        self.outcomes.iter().filter(|o| o.status == status).count()
    }

    /// Converts the result into the payload returned to callers.
    pub fn to_payload(&self) -> SyncPayload {
        SyncPayload {
            status: self.status,
            message: self.message.clone(),
            errors: self.issues.iter().map(ToString::to_string).collect(),
        }
    }
}

/// Collects writes and issues for one attempt, then freezes them.
#[derive(Debug, Default)]
pub struct SyncResultBuilder {
    message: Option<String>,
    writes: u32,
    issues: Vec<SyncIssue>,
    outcomes: Vec<EntityOutcome>,
}

impl SyncResultBuilder {
    /// Creates an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts one applied write.
    pub fn write_applied(&mut self) -> &mut Self {
        self.writes += 1;
        self
    }

    /// Adds an issue.
    pub fn issue(&mut self, issue: SyncIssue) -> &mut Self {
        self.issues.push(issue);
        self
    }

    /// Folds a finished entity result into this (batch) result.
    pub fn outcome(&mut self, key: EntityKey, result: &SyncResult) -> &mut Self {
        self.writes += result.writes;
        self.issues.extend(result.issues.iter().cloned());
        self.outcomes.push(EntityOutcome {
            key,
            status: result.status,
            writes: result.writes,
            issues: result.issues.clone(),
        });
        self
    }

    /// Sets the summary message.
    pub fn message(&mut self, message: impl Into<String>) -> &mut Self {
        self.message = Some(message.into());
        self
    }

    /// Number of writes counted so far.
    pub fn writes(&self) -> u32 {
        self.writes
    }

    /// Returns true if any issue was added.
    pub fn has_issues(&self) -> bool {
        !self.issues.is_empty()
    }

    fn status(&self) -> SyncStatus {
        if !self.outcomes.is_empty() {
            let ok = self
                .outcomes
                .iter()
                .filter(|o| o.status == SyncStatus::Success)
                .count();
            return if ok == self.outcomes.len() {
                SyncStatus::Success
            } else if ok == 0 && self.writes == 0 {
                SyncStatus::Failed
            } else {
                SyncStatus::Partial
            };
        }
        match (self.issues.is_empty(), self.writes) {
            (true, _) => SyncStatus::Success,
            (false, 0) => SyncStatus::Failed,
            (false, _) => SyncStatus::Partial,
        }
    }

    /// Freezes the result.
    pub fn build(self) -> SyncResult {
        let status = self.status();
        let message = self.message.unwrap_or_else(|| match status {
            SyncStatus::Success if self.outcomes.is_empty() && self.writes == 0 => {
                "already in sync".to_string()
            }
            SyncStatus::Success => format!("synced ({} writes)", self.writes),
            SyncStatus::Partial => format!(
                "partially synced ({} writes, {} errors)",
                self.writes,
                self.issues.len()
            ),
            SyncStatus::Failed => format!("sync failed ({} errors)", self.issues.len()),
        });
        SyncResult {
            id: Uuid::new_v4(),
            status,
            message,
            writes: self.writes,
            issues: self.issues,
            outcomes: self.outcomes,
            timestamp: Utc::now(),
        }
    }
}

/// Result shape returned by the trigger surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncPayload {
    /// Overall status.
    pub status: SyncStatus,
    /// Summary message.
    pub message: String,
    /// One line per issue.
    pub errors: Vec<String>,
}

impl SyncPayload {
    /// A failed payload with a single error.
    pub fn failed(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            status: SyncStatus::Failed,
            errors: vec![message.clone()],
            message,
        }
    }
}
