//! Local Store capability.
//!
//! The engine reads and writes local records only through [`LocalStore`].
//! [`MemoryStore`] is the in-process implementation used by the CLI and by
//! tests; production deployments plug in their own backend.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use storesync_core::{values_equal, EntityKind, Record};
use thiserror::Error;

/// Result type for local store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors returned by the local store.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    /// No record with this id.
    #[error("{kind} '{id}' not found")]
    NotFound {
        /// Entity kind.
        kind: EntityKind,
        /// Local id.
        id: String,
    },

    /// The store rejected the written values.
    #[error("local validation error on field '{field}': {reason}")]
    Validation {
        /// Offending field.
        field: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Backend failure.
    #[error("local store error: {0}")]
    Backend(String),
}

impl StoreError {
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
            StoreError::Validation { field, .. } => Some(field),
            _ => None,
        }
    }
}

/// A local record together with its id and last modification time.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalRecord {
    /// Local id (item code, tax id, shipping rule name).
    pub id: String,
    /// Field values in the local schema.
    pub fields: Record,
    /// When the record was last written.
    pub modified_at: DateTime<Utc>,
}

/// Filter for [`LocalStore::query`].
///
/// An `equals` condition on an array field matches when any element is equal.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoreFilter {
    /// Field equality conditions, all of which must hold.
    pub equals: Vec<(String, Value)>,
    /// Only records modified strictly after this instant.
    pub modified_after: Option<DateTime<Utc>>,
}

impl StoreFilter {
    /// Matches every record.
    pub fn all() -> Self {
        Self::default()
    }

    /// Adds a field equality condition.
    #[must_use]
    pub fn with_equals(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.equals.push((field.into(), value.into()));
        self
    }

    /// Restricts to records modified after `since`.
    #[must_use]
    pub fn with_modified_after(mut self, since: DateTime<Utc>) -> Self {
        self.modified_after = Some(since);
        self
    }

    /// Returns true if `record` satisfies the filter.
    pub fn matches(&self, record: &LocalRecord) -> bool {
        if let Some(since) = self.modified_after {
            if record.modified_at <= since {
                return false;
            }
        }
        self.equals.iter().all(|(field, expected)| {
            match record.fields.get(field) {
                Some(Value::Array(items)) => items.iter().any(|v| values_equal(v, expected)),
                Some(value) => values_equal(value, expected),
                None => false,
            }
        })
    }
}

/// Access to the local inventory system.
#[async_trait]
pub trait LocalStore: Send + Sync {
    /// Reads one record.
    async fn read(&self, kind: EntityKind, id: &str) -> StoreResult<LocalRecord>;

    /// Writes fields onto a record, creating it if absent. Fields not named
    /// in `fields` are left as they are.
    async fn write(&self, kind: EntityKind, id: &str, fields: &Record) -> StoreResult<()>;

    /// Lists records matching `filter`, ordered by id.
    async fn query(&self, kind: EntityKind, filter: &StoreFilter) -> StoreResult<Vec<LocalRecord>>;
}

/// In-memory [`LocalStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<HashMap<EntityKind, BTreeMap<String, LocalRecord>>>,
    write_failures: Mutex<HashMap<(EntityKind, String), StoreError>>,
    writes: Mutex<u64>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a record with an explicit modification time, bypassing write
    /// accounting.
    pub fn seed(&self, kind: EntityKind, id: &str, fields: Record, modified_at: DateTime<Utc>) {
        self.tables.write().entry(kind).or_default().insert(
            id.to_string(),
            LocalRecord {
                id: id.to_string(),
                fields,
                modified_at,
            },
        );
    }

    /// Returns a record without going through the async interface.
    pub fn get(&self, kind: EntityKind, id: &str) -> Option<LocalRecord> {
        self.tables
            .read()
            .get(&kind)
            .and_then(|t| t.get(id))
            .cloned()
    }

    /// Number of records of `kind`.
    pub fn count(&self, kind: EntityKind) -> usize {
        self.tables.read().get(&kind).map_or(0, BTreeMap::len)
    }

    /// Makes every write to this record fail with `error`.
    pub fn fail_writes(&self, kind: EntityKind, id: &str, error: StoreError) {
        self.write_failures
            .lock()
            .insert((kind, id.to_string()), error);
    }

    /// Number of successful writes since creation.
    pub fn writes(&self) -> u64 {
        *self.writes.lock()
    }
}

#[async_trait]
impl LocalStore for MemoryStore {
    async fn read(&self, kind: EntityKind, id: &str) -> StoreResult<LocalRecord> {
        self.get(kind, id).ok_or_else(|| StoreError::NotFound {
            kind,
            id: id.to_string(),
        })
    }

    async fn write(&self, kind: EntityKind, id: &str, fields: &Record) -> StoreResult<()> {
        if let Some(err) = self.write_failures.lock().get(&(kind, id.to_string())) {
            return Err(err.clone());
        }
        let mut tables = self.tables.write();
        let record = tables
            .entry(kind)
            .or_default()
            .entry(id.to_string())
            .or_insert_with(|| LocalRecord {
                id: id.to_string(),
                fields: Record::new(),
                modified_at: Utc::now(),
            });
        record.fields.merge_from(fields);
        record.modified_at = Utc::now();
        *self.writes.lock() += 1;
        Ok(())
    }

    async fn query(&self, kind: EntityKind, filter: &StoreFilter) -> StoreResult<Vec<LocalRecord>> {
        Ok(self
            .tables
            .read()
            .get(&kind)
            .map(|t| t.values().filter(|r| filter.matches(r)).cloned().collect())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    #[tokio::test]
    async fn write_merges_fields() {
        let store = MemoryStore::new();
        store
            .write(EntityKind::Item, "ITEM-001", &Record::new().with("item_name", "Mug"))
            .await
            .unwrap();
        store
            .write(EntityKind::Item, "ITEM-001", &Record::new().with("description", "Blue"))
            .await
            .unwrap();

        let item = store.read(EntityKind::Item, "ITEM-001").await.unwrap();
        assert_eq!(item.fields.get_str("item_name"), Some("Mug"));
        assert_eq!(item.fields.get_str("description"), Some("Blue"));
        assert_eq!(store.writes(), 2);
    }

    #[tokio::test]
    async fn missing_record_is_not_found() {
        let store = MemoryStore::new();
        assert!(matches!(
            store.read(EntityKind::Price, "X").await,
            Err(StoreError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn query_filters_arrays_and_time() {
        let store = MemoryStore::new();
        let old = Utc::now() - Duration::days(2);
        store.seed(
            EntityKind::Item,
            "A",
            Record::from_json(json!({"woocommerce_servers": ["shop.example.com"]})),
            old,
        );
        store.seed(
            EntityKind::Item,
            "B",
            Record::from_json(json!({"woocommerce_servers": ["other.example.com"]})),
            Utc::now(),
        );

        let linked = store
            .query(
                EntityKind::Item,
                &StoreFilter::all().with_equals("woocommerce_servers", "shop.example.com"),
            )
            .await
            .unwrap();
        assert_eq!(linked.len(), 1);
        assert_eq!(linked[0].id, "A");

        let recent = store
            .query(
                EntityKind::Item,
                &StoreFilter::all().with_modified_after(Utc::now() - Duration::days(1)),
            )
            .await
            .unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].id, "B");
    }

    #[tokio::test]
    async fn scripted_write_failure() {
        let store = MemoryStore::new();
        store.fail_writes(
            EntityKind::Item,
            "ITEM-001",
            StoreError::validation("item_name", "too long"),
        );
        let err = store
            .write(EntityKind::Item, "ITEM-001", &Record::new())
            .await
            .unwrap_err();
        assert_eq!(err.field(), Some("item_name"));
        assert_eq!(store.count(EntityKind::Item), 0);
    }
}
