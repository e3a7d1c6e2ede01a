//! In-memory remote for tests.

use crate::client::{format_modified, parse_modified, ListQuery, RemoteApi, MODIFIED_FIELD};
use crate::error::{RemoteError, RemoteResult};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use storesync_core::Record;

/// Remote operation kinds, for scripting failures and counting calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockOp {
    /// `get`
    Get,
    /// `list`
    List,
    /// `create`
    Create,
    /// `update`
    Update,
}

/// One recorded call.
#[derive(Debug, Clone, PartialEq)]
pub struct MockCall {
    /// Operation.
    pub op: MockOp,
    /// Resource path.
    pub resource: String,
    /// Record id, for get/update.
    pub id: Option<String>,
    /// Body, for create/update.
    pub body: Option<Record>,
}

/// A mock remote store.
///
/// Records live in per-resource tables in insertion order. Failures can be
/// scripted per operation (consumed one per call) or pinned to a resource.
#[derive(Debug, Default)]
pub struct MockRemote {
    tables: Mutex<HashMap<String, Vec<(String, Record)>>>,
    next_id: AtomicU64,
    failures: Mutex<HashMap<MockOp, VecDeque<RemoteError>>>,
    resource_failures: Mutex<HashMap<String, RemoteError>>,
    calls: Mutex<Vec<MockCall>>,
    latency: Duration,
    op_latency: Mutex<HashMap<MockOp, Duration>>,
}

impl MockRemote {
    /// Creates an empty mock remote.
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            ..Self::default()
        }
    }

    /// Delays every call by `latency`.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Delays every call of `op` by `latency`, replacing the default delay.
    pub fn delay(&self, op: MockOp, latency: Duration) {
        self.op_latency.lock().insert(op, latency);
    }

    /// Seeds a record. The `id` field is set from `id`.
    pub fn insert(&self, resource: &str, id: &str, record: Record) {
        let mut record = record;
        record.insert("id", id_value(id));
        let mut tables = self.tables.lock();
        let table = tables.entry(resource.to_string()).or_default();
        match table.iter_mut().find(|(k, _)| k == id) {
            Some(slot) => slot.1 = record,
            None => table.push((id.to_string(), record)),
        }
    }

    /// Returns a stored record.
    pub fn record(&self, resource: &str, id: &str) -> Option<Record> {
        self.tables
            .lock()
            .get(resource)
            .and_then(|t| t.iter().find(|(k, _)| k == id))
            .map(|(_, r)| r.clone())
    }

    /// Returns every record of a resource.
    pub fn records(&self, resource: &str) -> Vec<Record> {
        self.tables
            .lock()
            .get(resource)
            .map(|t| t.iter().map(|(_, r)| r.clone()).collect())
            .unwrap_or_default()
    }

    /// Makes the next call of `op` fail with `error`.
    pub fn fail_next(&self, op: MockOp, error: RemoteError) {
        self.failures.lock().entry(op).or_default().push_back(error);
    }

    /// Makes every call on `resource` fail with `error`.
    pub fn fail_resource(&self, resource: &str, error: RemoteError) {
        self.resource_failures
            .lock()
            .insert(resource.to_string(), error);
    }

    /// Number of calls made for `op`.
    pub fn calls(&self, op: MockOp) -> usize {
        self.calls.lock().iter().filter(|c| c.op == op).count()
    }

    /// Number of create and update calls.
    pub fn writes(&self) -> usize {
        self.calls(MockOp::Create) + self.calls(MockOp::Update)
    }

    /// Every recorded call in order.
    pub fn call_log(&self) -> Vec<MockCall> {
        self.calls.lock().clone()
    }

    async fn enter(
        &self,
        op: MockOp,
        resource: &str,
        id: Option<&str>,
        body: Option<&Record>,
    ) -> RemoteResult<()> {
        self.calls.lock().push(MockCall {
            op,
            resource: resource.to_string(),
            id: id.map(str::to_string),
            body: body.cloned(),
        });
        let latency = self
            .op_latency
            .lock()
            .get(&op)
            .copied()
            .unwrap_or(self.latency);
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        if let Some(err) = self.resource_failures.lock().get(resource) {
            return Err(err.clone());
        }
        match self.failures.lock().get_mut(&op).and_then(VecDeque::pop_front) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

fn id_value(id: &str) -> Value {
    id.parse::<u64>().map_or_else(|_| Value::from(id), Value::from)
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Case-insensitive substring match on any string field.
fn matches_search(record: &Record, term: &str) -> bool {
    let term = term.to_lowercase();
    record
        .iter()
        .any(|(_, value)| value.as_str().is_some_and(|s| s.to_lowercase().contains(&term)))
}

#[async_trait]
impl RemoteApi for MockRemote {
    async fn get(&self, resource: &str, id: &str) -> RemoteResult<Record> {
        self.enter(MockOp::Get, resource, Some(id), None).await?;
        self.record(resource, id).ok_or_else(|| RemoteError::NotFound {
            resource: resource.to_string(),
            id: id.to_string(),
        })
    }

    async fn list(&self, resource: &str, query: &ListQuery) -> RemoteResult<Vec<Record>> {
        self.enter(MockOp::List, resource, None, None).await?;
        let matching: Vec<Record> = self
            .records(resource)
            .into_iter()
            .filter(|r| match query.modified_after {
                Some(since) => r
                    .get_str(MODIFIED_FIELD)
                    .and_then(parse_modified)
                    .is_some_and(|at| at > since),
                None => true,
            })
            .filter(|r| {
                query
                    .params
                    .iter()
                    .all(|(k, v)| match k.as_str() {
                        "search" => matches_search(r, v),
                        _ => r.get(k).is_some_and(|value| value_text(value) == *v),
                    })
            })
            .collect();

        let per_page = query.per_page.max(1) as usize;
        let skip = (query.page.max(1) as usize - 1) * per_page;
        Ok(matching.into_iter().skip(skip).take(per_page).collect())
    }

    async fn create(&self, resource: &str, record: &Record) -> RemoteResult<String> {
        self.enter(MockOp::Create, resource, None, Some(record)).await?;
        let id = self.next_id.fetch_add(1, Ordering::SeqCst).to_string();
        let stored = record
            .clone()
            .with(MODIFIED_FIELD, format_modified(Utc::now()));
        self.insert(resource, &id, stored);
        Ok(id)
    }

    async fn update(&self, resource: &str, id: &str, fields: &Record) -> RemoteResult<()> {
        self.enter(MockOp::Update, resource, Some(id), Some(fields)).await?;
        let mut tables = self.tables.lock();
        let slot = tables
            .get_mut(resource)
            .and_then(|t| t.iter_mut().find(|(k, _)| k == id))
            .ok_or_else(|| RemoteError::NotFound {
                resource: resource.to_string(),
                id: id.to_string(),
            })?;
        slot.1.merge_from(fields);
        slot.1.insert(MODIFIED_FIELD, format_modified(Utc::now()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::record_id;

    #[tokio::test]
    async fn crud_roundtrip() {
        let remote = MockRemote::new();
        let id = remote
            .create("products", &Record::new().with("name", "Mug"))
            .await
            .unwrap();
        assert_eq!(id, "1");

        remote
            .update("products", &id, &Record::new().with("stock_quantity", 5))
            .await
            .unwrap();
        let stored = remote.get("products", &id).await.unwrap();
        assert_eq!(stored.get_str("name"), Some("Mug"));
        assert_eq!(stored.get_f64("stock_quantity"), Some(5.0));
        assert_eq!(record_id(&stored).as_deref(), Some("1"));
        assert_eq!(remote.writes(), 2);
    }

    #[tokio::test]
    async fn missing_records_are_not_found() {
        let remote = MockRemote::new();
        assert!(matches!(
            remote.get("products", "9").await,
            Err(RemoteError::NotFound { .. })
        ));
        assert!(remote.update("products", "9", &Record::new()).await.is_err());
    }

    #[tokio::test]
    async fn list_pages_and_filters() {
        let remote = MockRemote::new();
        for i in 1..=5 {
            let at = format!("2024-01-0{i}T00:00:00");
            remote.insert(
                "products",
                &i.to_string(),
                Record::new().with(MODIFIED_FIELD, at).with("sku", format!("S-{i}")),
            );
        }
        let page2 = remote
            .list("products", &ListQuery::new().with_per_page(2).with_page(2))
            .await
            .unwrap();
        assert_eq!(page2.len(), 2);
        assert_eq!(record_id(&page2[0]).as_deref(), Some("3"));

        let since = parse_modified("2024-01-03T00:00:00").unwrap();
        let recent = remote
            .list("products", &ListQuery::new().modified_after(since))
            .await
            .unwrap();
        assert_eq!(recent.len(), 2);

        let by_sku = remote
            .list("products", &ListQuery::new().with_param("sku", "S-4"))
            .await
            .unwrap();
        assert_eq!(by_sku.len(), 1);

        let by_search = remote
            .list("products", &ListQuery::new().with_param("search", "s-4"))
            .await
            .unwrap();
        assert_eq!(by_search.len(), 1);

        let all = remote
            .list_all("products", &ListQuery::new().with_per_page(2))
            .await
            .unwrap();
        assert_eq!(all.len(), 5);
    }

    #[tokio::test]
    async fn scripted_failures_are_consumed() {
        let remote = MockRemote::new();
        remote.insert("taxes", "1", Record::new());
        remote.fail_next(MockOp::Get, RemoteError::Timeout);
        assert_eq!(remote.get("taxes", "1").await, Err(RemoteError::Timeout));
        assert!(remote.get("taxes", "1").await.is_ok());

        remote.fail_resource("shipping/zones/2/methods", RemoteError::Unavailable("500".into()));
        assert!(remote
            .list("shipping/zones/2/methods", &ListQuery::new())
            .await
            .is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn delay_applies_to_one_operation() {
        let remote = MockRemote::new();
        remote.insert("products", "1", Record::new());
        remote.delay(MockOp::Update, Duration::from_secs(10));

        let started = tokio::time::Instant::now();
        remote.get("products", "1").await.unwrap();
        assert!(started.elapsed() < Duration::from_secs(1));
        remote.update("products", "1", &Record::new()).await.unwrap();
        assert!(started.elapsed() >= Duration::from_secs(10));
    }
}
