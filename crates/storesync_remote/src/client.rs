//! Remote API capability.

use crate::error::RemoteResult;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use storesync_core::Record;

/// Page size used when walking a paginated resource.
pub const DEFAULT_PAGE_SIZE: u32 = 100;

/// Field the remote stamps on every create and update (UTC, no offset).
pub const MODIFIED_FIELD: &str = "date_modified_gmt";

/// Media library resource; its records carry a `source_url`.
pub const MEDIA_RESOURCE: &str = "media";

/// Format of [`MODIFIED_FIELD`] values.
pub const MODIFIED_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Parses a remote modification timestamp.
pub fn parse_modified(value: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(value, MODIFIED_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}

/// Renders a remote modification timestamp.
pub fn format_modified(at: DateTime<Utc>) -> String {
    at.naive_utc().format(MODIFIED_FORMAT).to_string()
}

/// Query parameters for listing a resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListQuery {
    /// 1-based page number.
    pub page: u32,
    /// Records per page.
    pub per_page: u32,
    /// Only records modified after this instant.
    pub modified_after: Option<DateTime<Utc>>,
    /// Additional resource-specific filters.
    pub params: BTreeMap<String, String>,
}

impl ListQuery {
    /// First page with the default page size.
    pub fn new() -> Self {
        Self {
            page: 1,
            per_page: DEFAULT_PAGE_SIZE,
            modified_after: None,
            params: BTreeMap::new(),
        }
    }

    /// Sets the page number.
    #[must_use]
    pub fn with_page(mut self, page: u32) -> Self {
        self.page = page;
        self
    }

    /// Sets the page size.
    #[must_use]
    pub fn with_per_page(mut self, per_page: u32) -> Self {
        self.per_page = per_page;
        self
    }

    /// Filters on modification time.
    #[must_use]
    pub fn modified_after(mut self, since: DateTime<Utc>) -> Self {
        self.modified_after = Some(since);
        self
    }

    /// Adds a filter parameter.
    #[must_use]
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// The query for the following page.
    #[must_use]
    pub fn next_page(&self) -> Self {
        Self {
            page: self.page + 1,
            ..self.clone()
        }
    }
}

impl Default for ListQuery {
    fn default() -> Self {
        Self::new()
    }
}

/// Authenticated access to the remote commerce platform.
///
/// Resources are REST paths relative to the API root (`products`, `taxes`,
/// `shipping/zones/3/methods`).
#[async_trait]
pub trait RemoteApi: Send + Sync {
    /// Fetches one record.
    async fn get(&self, resource: &str, id: &str) -> RemoteResult<Record>;

    /// Lists one page of a resource.
    async fn list(&self, resource: &str, query: &ListQuery) -> RemoteResult<Vec<Record>>;

    /// Creates a record and returns its new id.
    async fn create(&self, resource: &str, record: &Record) -> RemoteResult<String>;

    /// Updates fields of an existing record.
    async fn update(&self, resource: &str, id: &str, fields: &Record) -> RemoteResult<()>;

    /// Lists every page of a resource, stopping at the first short page.
    async fn list_all(&self, resource: &str, query: &ListQuery) -> RemoteResult<Vec<Record>> {
        let mut out = Vec::new();
        let mut query = query.clone();
        loop {
            let page = self.list(resource, &query).await?;
            let len = page.len();
            out.extend(page);
            if len < query.per_page as usize || len == 0 {
                return Ok(out);
            }
            query = query.next_page();
        }
    }
}

#[async_trait]
impl<T: RemoteApi + ?Sized> RemoteApi for Arc<T> {
    async fn get(&self, resource: &str, id: &str) -> RemoteResult<Record> {
        (**self).get(resource, id).await
    }

    async fn list(&self, resource: &str, query: &ListQuery) -> RemoteResult<Vec<Record>> {
        (**self).list(resource, query).await
    }

    async fn create(&self, resource: &str, record: &Record) -> RemoteResult<String> {
        (**self).create(resource, record).await
    }

    async fn update(&self, resource: &str, id: &str, fields: &Record) -> RemoteResult<()> {
        (**self).update(resource, id, fields).await
    }
}

/// Extracts a record's id as a string, accepting numeric ids.
pub fn record_id(record: &Record) -> Option<String> {
    match record.get("id")? {
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn query_builder() {
        let q = ListQuery::new().with_per_page(10).with_param("sku", "W-1");
        assert_eq!(q.page, 1);
        assert_eq!(q.next_page().page, 2);
        assert_eq!(q.next_page().params.get("sku").map(String::as_str), Some("W-1"));
    }

    #[test]
    fn ids_accept_numbers_and_strings() {
        assert_eq!(record_id(&Record::from_json(json!({"id": 42}))).as_deref(), Some("42"));
        assert_eq!(record_id(&Record::from_json(json!({"id": "flat_rate"}))).as_deref(), Some("flat_rate"));
        assert_eq!(record_id(&Record::new()), None);
    }
}
