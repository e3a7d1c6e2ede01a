//! The sync engine.
//!
//! One [`SyncEngine`] serves one remote server. Engines built for the same
//! local system share a [`SharedState`] so that per-entity leases, sync
//! status and history span every server.

use crate::config::{NameBy, ServerConfig, SyncConfig};
use crate::diff::{self, DiffInput, SyncPlan};
use crate::error::{EngineResult, SyncError};
use crate::history::SyncHistory;
use crate::lock::LeaseTable;
use crate::reconciler::Reconciler;
use crate::state::{SyncAttempt, SyncOptions, SyncPhase};
use crate::store::{LocalRecord, LocalStore, StoreError, StoreFilter};
use chrono::{DateTime, NaiveDate, Utc};
use futures::stream::{self, StreamExt};
use serde_json::{json, Value};
use std::sync::Arc;
use storesync_core::{
    align_images, prune_images, AuthorityTable, CoreError, Direction, EntityKey, EntityKind,
    FieldMapper, FieldMapping, Record, StatusTracker, SyncResult, SyncResultBuilder, SyncStatus,
    SyncStatusView,
};
use storesync_remote::{
    parse_modified, record_id, ListQuery, RemoteApi, RetryingRemote, MODIFIED_FIELD,
};
use tracing::{debug, info, warn};

/// Local field listing the servers an item is published to.
pub const SERVERS_FIELD: &str = "woocommerce_servers";

/// State shared by every engine of one local system.
#[derive(Debug, Clone)]
pub struct SharedState {
    /// Sync status per (server, kind, local id).
    pub tracker: Arc<StatusTracker>,
    /// In-flight attempts per (kind, local id).
    pub leases: Arc<LeaseTable>,
    /// Recent results.
    pub history: Arc<SyncHistory>,
}

impl SharedState {
    /// Creates empty shared state.
    pub fn new(history_capacity: usize) -> Self {
        Self {
            tracker: Arc::new(StatusTracker::new()),
            leases: Arc::new(LeaseTable::new()),
            history: Arc::new(SyncHistory::new(history_capacity)),
        }
    }
}

impl Default for SharedState {
    fn default() -> Self {
        Self::new(SyncConfig::default().history_capacity)
    }
}

/// Builds a failed single-entity result from an error.
pub fn failed_result(key: &EntityKey, error: &SyncError) -> SyncResult {
    let mut out = SyncResultBuilder::new();
    out.issue(error.to_issue(key));
    out.build()
}

/// Synchronizes entities between the local store and one remote server.
pub struct SyncEngine {
    config: SyncConfig,
    server: ServerConfig,
    server_name: String,
    mapper: FieldMapper,
    authority: AuthorityTable,
    pub(crate) remote: RetryingRemote<Arc<dyn RemoteApi>>,
    pub(crate) store: Arc<dyn LocalStore>,
    shared: SharedState,
}

impl SyncEngine {
    /// Creates an engine with its own shared state.
    pub fn new(
        config: SyncConfig,
        server: ServerConfig,
        remote: Arc<dyn RemoteApi>,
        store: Arc<dyn LocalStore>,
    ) -> EngineResult<Self> {
        let shared = SharedState::new(config.history_capacity);
        Self::with_shared(config, server, remote, store, shared)
    }

    /// Creates an engine that shares leases, status and history with others.
    pub fn with_shared(
        config: SyncConfig,
        server: ServerConfig,
        remote: Arc<dyn RemoteApi>,
        store: Arc<dyn LocalStore>,
        shared: SharedState,
    ) -> EngineResult<Self> {
        server.validate()?;
        let mapper = server.field_mapper()?;
        let authority = server.authority_table();
        let remote = RetryingRemote::new(remote, config.retry.clone(), config.timeout);
        Ok(Self {
            server_name: server.server_name(),
            config,
            server,
            mapper,
            authority,
            remote,
            store,
            shared,
        })
    }

    /// Server identifier.
    pub fn server_name(&self) -> &str {
        &self.server_name
    }

    /// Server configuration.
    pub fn server_config(&self) -> &ServerConfig {
        &self.server
    }

    /// Engine configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Active field mapper.
    pub fn mapper(&self) -> &FieldMapper {
        &self.mapper
    }

    /// Shared state.
    pub fn shared(&self) -> &SharedState {
        &self.shared
    }

    /// Status of one entity on this server.
    pub fn status(&self, kind: EntityKind, local_id: &str) -> SyncStatusView {
        self.shared
            .tracker
            .get_status(&EntityKey::new(self.server_name.clone(), kind, local_id))
    }

    /// Phase of the in-flight attempt for an entity, if any.
    pub fn phase(&self, kind: EntityKind, local_id: &str) -> Option<SyncPhase> {
        self.shared
            .leases
            .phase(&EntityKey::new(self.server_name.clone(), kind, local_id).lock_key())
    }

    /// Remote calls retried so far.
    pub fn retries(&self) -> u64 {
        self.remote.retries()
    }

    /// Tax and shipping reconciliation for this server.
    pub fn reconciler(&self) -> Reconciler<'_> {
        Reconciler::new(self)
    }

    /// Returns true if `kind` may be synced on this server.
    pub fn is_enabled(&self, kind: EntityKind) -> bool {
        self.ensure_enabled(kind).is_ok()
    }

    fn ensure_enabled(&self, kind: EntityKind) -> EngineResult<()> {
        let disabled = |feature: &'static str| -> EngineResult<()> {
            Err(SyncError::SyncDisabled {
                server: self.server_name.clone(),
                feature,
            })
        };
        match kind {
            EntityKind::TaxRule | EntityKind::ShippingMethod | EntityKind::ItemAttribute => {
                Err(SyncError::Unsupported {
                    kind: kind.to_string(),
                    operation: "entity sync",
                })
            }
            _ if !self.server.enable_sync => disabled("enable_sync"),
            EntityKind::StockLevel if !self.server.enable_stock_sync => disabled("enable_stock_sync"),
            EntityKind::Price if !self.server.enable_price_list_sync => {
                disabled("enable_price_list_sync")
            }
            _ => Ok(()),
        }
    }

    /// Synchronizes one entity.
    ///
    /// Fails outright only when the attempt could not run at all: another
    /// attempt holds the entity, the attempt was cancelled, or the kind is
    /// disabled. Every other problem is reported in the returned result.
    pub async fn sync_entity(
        &self,
        kind: EntityKind,
        local_id: &str,
        options: &SyncOptions,
    ) -> EngineResult<SyncResult> {
        self.ensure_enabled(kind)?;
        let key = EntityKey::new(self.server_name.clone(), kind, local_id);
        let lease = self.shared.leases.try_acquire(key.lock_key())?;
        let mut attempt = SyncAttempt::new(key.clone(), lease);

        let result = match self.run(&key, options, &mut attempt).await {
            Ok(result) => {
                let end = if result.status() == SyncStatus::Failed {
                    SyncPhase::Failed
                } else {
                    SyncPhase::Completed
                };
                attempt.advance(end)?;
                result
            }
            Err(e @ (SyncError::Cancelled | SyncError::InvalidStateTransition { .. })) => {
                attempt.fail();
                info!(
                    server = %key.server,
                    kind = %key.kind,
                    local_id = %key.local_id,
                    error = %e,
                    "sync aborted"
                );
                return Err(e);
            }
            Err(e) => {
                attempt.fail();
                failed_result(&key, &e)
            }
        };

        info!(
            server = %key.server,
            kind = %key.kind,
            local_id = %key.local_id,
            status = %result.status(),
            writes = result.writes(),
            elapsed_ms = attempt.elapsed_ms(),
            "sync finished"
        );
        self.shared.history.push(result.clone());
        Ok(result)
    }

    async fn run(
        &self,
        key: &EntityKey,
        options: &SyncOptions,
        attempt: &mut SyncAttempt,
    ) -> EngineResult<SyncResult> {
        attempt.enter(SyncPhase::Fetching, options)?;
        let local = self.load_local(key).await?;
        let mapping = self.mapper.resolve(key.kind, Direction::LocalToRemote);

        let Some(remote_id) = self.shared.tracker.remote_id(key) else {
            return self.create_remote(key, &mapping, &local, options, attempt).await;
        };

        let last_hash = if options.force {
            None
        } else {
            self.shared.tracker.get_status(key).last_hash()
        };
        if options.direction == Direction::LocalToRemote && last_hash.is_some() {
            let local_mapped = map_local(&mapping, &local.fields)?;
            if last_hash == Some(local_mapped.content_hash()) {
                debug!(
                    server = %key.server,
                    kind = %key.kind,
                    local_id = %key.local_id,
                    "local side unchanged"
                );
                return Ok(SyncResultBuilder::new().build());
            }
        }
        let remote = self
            .remote
            .get(key.kind.remote_resource(), &remote_id)
            .await?;

        attempt.enter(SyncPhase::Mapping, options)?;
        let local_mapped = map_local(&mapping, &local.fields)?;
        let mut remote_projected = remote.project(mapping.target_fields());
        align_images(&mut remote_projected, &local_mapped);
        let remote_modified = remote.get_str(MODIFIED_FIELD).and_then(parse_modified);

        attempt.enter(SyncPhase::Diffing, options)?;
        let plan = diff::plan(&DiffInput {
            mapping: &mapping,
            local: &local_mapped,
            remote: &remote_projected,
            last_hash,
            local_modified: Some(local.modified_at),
            remote_modified,
            direction: options.direction,
            authority: &self.authority,
        });
        debug!(
            server = %key.server,
            kind = %key.kind,
            local_id = %key.local_id,
            local_changed = plan.local_changed,
            remote_changed = plan.remote_changed,
            remote_fields = plan.remote_update.len(),
            local_fields = plan.local_update.len(),
            "diff computed"
        );

        if plan.is_noop() {
            let hash = plan.merged_hash();
            if last_hash != Some(hash) {
                self.shared.tracker.record(key, hash, Utc::now());
            }
            return Ok(SyncResultBuilder::new().build());
        }

        attempt.enter(SyncPhase::Writing, options)?;
        let mut out = SyncResultBuilder::new();
        self.apply_plan(key, &remote_id, &remote, &mapping, &plan, &mut out)
            .await;
        if !out.has_issues() {
            self.shared
                .tracker
                .record(key, plan.merged_hash(), Utc::now());
        }
        Ok(out.build())
    }

    /// Applies the remote and local halves of a plan independently.
    async fn apply_plan(
        &self,
        key: &EntityKey,
        remote_id: &str,
        remote: &Record,
        mapping: &FieldMapping,
        plan: &SyncPlan,
        out: &mut SyncResultBuilder,
    ) {
        if !plan.remote_update.is_empty() {
            let mut body = plan.remote_update.clone();
            self.resolve_images(key, Some(remote), &mut body).await;
            let written = self
                .remote
                .update(key.kind.remote_resource(), remote_id, &body)
                .await
                .map_err(SyncError::from);
            self.note_write(key, "remote", written, out);
        }
        if !plan.local_update.is_empty() {
            let written = async {
                let fields = mapping.inverse().apply_partial(&plan.local_update)?;
                self.store.write(key.kind, &key.local_id, &fields).await?;
                Ok::<(), SyncError>(())
            }
            .await;
            self.note_write(key, "local", written, out);
        }
    }

    fn note_write(
        &self,
        key: &EntityKey,
        side: &'static str,
        written: EngineResult<()>,
        out: &mut SyncResultBuilder,
    ) {
        match written {
            Ok(()) => {
                out.write_applied();
            }
            Err(e) => {
                warn!(
                    server = %key.server,
                    kind = %key.kind,
                    local_id = %key.local_id,
                    side,
                    error = %e,
                    "write failed"
                );
                out.issue(e.to_issue(key));
            }
        }
    }

    async fn create_remote(
        &self,
        key: &EntityKey,
        mapping: &FieldMapping,
        local: &LocalRecord,
        options: &SyncOptions,
        attempt: &mut SyncAttempt,
    ) -> EngineResult<SyncResult> {
        if !key.kind.creates_remotely() {
            return Err(CoreError::validation(
                "item",
                format!(
                    "item {} has no remote product on {}",
                    key.local_id, self.server_name
                ),
            )
            .into());
        }
        if !options.direction.writes_remote() {
            return Err(CoreError::validation(
                "direction",
                "no remote record is linked and the direction does not write remotely",
            )
            .into());
        }

        attempt.enter(SyncPhase::Mapping, options)?;
        let local_mapped = map_local(mapping, &local.fields)?;
        let mut body = self
            .new_product(&key.local_id, &local.fields, &local_mapped)
            .await?;
        self.resolve_images(key, None, &mut body).await;

        attempt.enter(SyncPhase::Writing, options)?;
        let mut out = SyncResultBuilder::new();
        match self.remote.create(key.kind.remote_resource(), &body).await {
            Ok(remote_id) => {
                out.write_applied();
                match self.shared.tracker.assign_remote_id(key, remote_id.clone()) {
                    Ok(()) => {
                        self.shared
                            .tracker
                            .record(key, local_mapped.content_hash(), Utc::now());
                        info!(
                            server = %key.server,
                            kind = %key.kind,
                            local_id = %key.local_id,
                            remote_id = %remote_id,
                            "created remote record"
                        );
                    }
                    Err(e) => {
                        out.issue(SyncError::from(e).to_issue(key));
                    }
                }
            }
            Err(e) => {
                let e = SyncError::from(e);
                warn!(
                    server = %key.server,
                    kind = %key.kind,
                    local_id = %key.local_id,
                    error = %e,
                    "create failed"
                );
                out.issue(e.to_issue(key));
            }
        }
        Ok(out.build())
    }

    /// Adds product defaults and variant fields to a mapped item.
    async fn new_product(
        &self,
        item_code: &str,
        local: &Record,
        mapped: &Record,
    ) -> EngineResult<Record> {
        let mut body = mapped.clone();
        body.insert("type", "simple");
        body.insert("status", self.server.default_product_status.clone());
        if self.server.enable_price_list_sync {
            let price = self
                .current_price(item_code)
                .await
                .unwrap_or_else(|| Value::from("0"));
            body.insert("regular_price", price);
        }
        self.add_variant_fields(local, &mut body).await?;
        Ok(body)
    }

    /// The item's currently valid price, in the remote schema.
    async fn current_price(&self, item_code: &str) -> Option<Value> {
        let record = self.store.read(EntityKind::Price, item_code).await.ok()?;
        self.check_price(&record.fields).ok()?;
        self.mapper
            .resolve(EntityKind::Price, Direction::LocalToRemote)
            .apply(&record.fields)
            .ok()?
            .get("regular_price")
            .cloned()
    }

    async fn load_local(&self, key: &EntityKey) -> EngineResult<LocalRecord> {
        let record = self.store.read(key.kind, &key.local_id).await?;
        if key.kind == EntityKind::Price {
            self.check_price(&record.fields)?;
        }
        Ok(record)
    }

    /// Rejects price rows of another price list or past their `valid_upto`.
    fn check_price(&self, fields: &Record) -> Result<(), CoreError> {
        check_price_row(
            fields,
            self.server.price_list.as_deref(),
            Utc::now().date_naive(),
        )
    }

    /// Synchronizes every local record of `kind` matching `filter`.
    ///
    /// Entities run concurrently on at most `pool_size` workers. A failing
    /// entity never stops the batch; the result lists every outcome.
    pub async fn sync_many(
        &self,
        kind: EntityKind,
        filter: &StoreFilter,
        options: &SyncOptions,
    ) -> EngineResult<SyncResult> {
        self.ensure_enabled(kind)?;
        let ids: Vec<String> = self
            .store
            .query(kind, filter)
            .await?
            .into_iter()
            .map(|r| r.id)
            .collect();
        info!(
            server = %self.server_name,
            kind = %kind,
            candidates = ids.len(),
            pool_size = self.config.pool_size,
            "batch sync started"
        );

        let results: Vec<(String, EngineResult<SyncResult>)> = stream::iter(ids)
            .map(|id| async move {
                let result = self.sync_entity(kind, &id, options).await;
                (id, result)
            })
            .buffered(self.config.pool_size.max(1))
            .collect()
            .await;

        let mut batch = SyncResultBuilder::new();
        for (id, result) in results {
            let key = EntityKey::new(self.server_name.clone(), kind, id);
            let result = result.unwrap_or_else(|e| failed_result(&key, &e));
            batch.outcome(key, &result);
        }
        let result = batch.build();
        info!(
            server = %self.server_name,
            kind = %kind,
            status = %result.status(),
            succeeded = result.count(SyncStatus::Success),
            failed = result.count(SyncStatus::Failed),
            "batch sync finished"
        );
        Ok(result)
    }

    /// Pulls remote records modified after `since`.
    ///
    /// Linked records are synced; unlinked products become new local items.
    /// Returns the aggregate result and the newest modification time seen.
    pub async fn sync_modified_since(
        &self,
        kind: EntityKind,
        since: DateTime<Utc>,
    ) -> EngineResult<(SyncResult, DateTime<Utc>)> {
        if kind != EntityKind::Item {
            return Err(SyncError::Unsupported {
                kind: kind.to_string(),
                operation: "modified-since sweep",
            });
        }
        self.ensure_enabled(kind)?;

        let query = ListQuery::new().modified_after(since);
        let records = self.remote.list_all(kind.remote_resource(), &query).await?;
        info!(
            server = %self.server_name,
            kind = %kind,
            since = %since,
            modified = records.len(),
            "modified-since sweep"
        );

        let mut high_water = since;
        let mut batch = SyncResultBuilder::new();
        for record in records {
            if let Some(at) = record.get_str(MODIFIED_FIELD).and_then(parse_modified) {
                high_water = high_water.max(at);
            }
            let Some(remote_id) = record_id(&record) else {
                warn!(server = %self.server_name, "remote record without id skipped");
                continue;
            };
            let (key, result) = self.sweep_one(&remote_id, &record).await;
            batch.outcome(key, &result);
        }
        Ok((batch.build(), high_water))
    }

    async fn sweep_one(&self, remote_id: &str, product: &Record) -> (EntityKey, SyncResult) {
        let linked = self
            .shared
            .tracker
            .find_by_remote_id(&self.server_name, EntityKind::Item, remote_id);
        if let Some(key) = linked {
            let result = self
                .sync_entity(EntityKind::Item, &key.local_id, &SyncOptions::new())
                .await
                .unwrap_or_else(|e| failed_result(&key, &e));
            return (key, result);
        }

        let item_code = self.item_code_for(remote_id, product);
        let key = EntityKey::new(self.server_name.clone(), EntityKind::Item, item_code);
        let result = self
            .import_product(&key, remote_id, product)
            .await
            .unwrap_or_else(|e| failed_result(&key, &e));
        (key, result)
    }

    fn item_code_for(&self, remote_id: &str, product: &Record) -> String {
        match self.server.name_by {
            NameBy::Sku => product
                .get_str("sku")
                .map(str::trim)
                .filter(|sku| !sku.is_empty())
                .unwrap_or(remote_id)
                .to_string(),
            NameBy::RemoteId => remote_id.to_string(),
        }
    }

    /// Links or creates the local item for an unlinked remote product.
    async fn import_product(
        &self,
        key: &EntityKey,
        remote_id: &str,
        product: &Record,
    ) -> EngineResult<SyncResult> {
        match self.store.read(EntityKind::Item, &key.local_id).await {
            Ok(_) => {
                self.shared.tracker.assign_remote_id(key, remote_id)?;
                return self
                    .sync_entity(EntityKind::Item, &key.local_id, &SyncOptions::new())
                    .await;
            }
            Err(StoreError::NotFound { .. }) => {}
            Err(e) => return Err(e.into()),
        }

        let _lease = self.shared.leases.try_acquire(key.lock_key())?;
        let mapping = self.mapper.resolve(EntityKind::Item, Direction::LocalToRemote);
        let mut projected = product.project(mapping.target_fields());
        align_images(&mut projected, &Record::new());
        let mut fields = mapping.inverse().apply(&projected)?;
        let mut out = SyncResultBuilder::new();
        self.import_variant_fields(product, &mut fields, &mut out)
            .await?;
        fields.insert(SERVERS_FIELD, json!([self.server_name]));

        self.store
            .write(EntityKind::Item, &key.local_id, &fields)
            .await?;
        self.shared.tracker.assign_remote_id(key, remote_id)?;
        self.shared
            .tracker
            .record(key, projected.content_hash(), Utc::now());
        info!(
            server = %key.server,
            local_id = %key.local_id,
            remote_id,
            "created local item from remote product"
        );

        out.write_applied()
            .message(format!("created local item {}", key.local_id));
        let result = out.build();
        self.shared.history.push(result.clone());
        Ok(result)
    }
}

/// Maps a local record, dropping an empty image list.
fn map_local(mapping: &FieldMapping, fields: &Record) -> Result<Record, CoreError> {
    let mut mapped = mapping.apply(fields)?;
    prune_images(&mut mapped);
    Ok(mapped)
}

/// Checks that a price row belongs to `price_list` and has not expired.
pub fn check_price_row(
    fields: &Record,
    price_list: Option<&str>,
    today: NaiveDate,
) -> Result<(), CoreError> {
    if let (Some(expected), Some(actual)) = (price_list, fields.get_str("price_list")) {
        if expected != actual {
            return Err(CoreError::validation(
                "price_list",
                format!("price belongs to '{actual}', not '{expected}'"),
            ));
        }
    }
    if let Some(upto) = fields.get_str("valid_upto").filter(|s| !s.is_empty()) {
        let date = NaiveDate::parse_from_str(upto, "%Y-%m-%d")
            .map_err(|e| CoreError::validation("valid_upto", e.to_string()))?;
        if date < today {
            return Err(CoreError::validation(
                "valid_upto",
                format!("price expired on {upto}"),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use serde_json::json;
    use storesync_remote::{MockOp, MockRemote, RetryConfig};

    const SERVER: &str = "shop.example.com";

    fn engine(server: ServerConfig) -> (SyncEngine, Arc<MockRemote>, Arc<MemoryStore>) {
        let remote = Arc::new(MockRemote::new());
        let store = Arc::new(MemoryStore::new());
        let config = SyncConfig::new().with_retry(RetryConfig::no_retry());
        let engine = SyncEngine::new(
            config,
            server,
            remote.clone() as Arc<dyn RemoteApi>,
            store.clone() as Arc<dyn LocalStore>,
        )
        .unwrap();
        (engine, remote, store)
    }

    fn server() -> ServerConfig {
        ServerConfig::new(format!("https://{SERVER}"))
    }

    fn mug() -> Record {
        Record::from_json(json!({
            "item_name": "Mug",
            "description": "Blue",
            "is_stock_item": 1,
            SERVERS_FIELD: [SERVER],
        }))
    }

    #[test]
    fn price_row_checks() {
        let today = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        let row = Record::from_json(json!({"price_list": "Retail", "valid_upto": "2024-05-31"}));
        let err = check_price_row(&row, Some("Retail"), today).unwrap_err();
        assert_eq!(err.field(), Some("valid_upto"));

        let row = Record::from_json(json!({"price_list": "Retail", "valid_upto": "2024-06-01"}));
        assert!(check_price_row(&row, Some("Retail"), today).is_ok());
        assert!(check_price_row(&row, Some("Wholesale"), today).is_err());
        assert!(check_price_row(&Record::new(), Some("Retail"), today).is_ok());
    }

    #[tokio::test]
    async fn create_applies_product_defaults() {
        let (engine, remote, store) = engine(server().with_price_list("Retail"));
        store.seed(EntityKind::Item, "ITEM-001", mug(), Utc::now());
        store.seed(
            EntityKind::Price,
            "ITEM-001",
            Record::from_json(json!({"price_list": "Retail", "price_list_rate": 12.5})),
            Utc::now(),
        );

        let result = engine
            .sync_entity(EntityKind::Item, "ITEM-001", &SyncOptions::new())
            .await
            .unwrap();
        assert!(result.is_success());

        let product = remote.record("products", "1").unwrap();
        assert_eq!(product.get_str("type"), Some("simple"));
        assert_eq!(product.get_str("status"), Some("draft"));
        assert_eq!(product.get_str("regular_price"), Some("12.5"));
        assert_eq!(product.get_bool("manage_stock"), Some(true));
        assert_eq!(engine.status(EntityKind::Item, "ITEM-001").remote_id(), Some("1"));
    }

    #[tokio::test]
    async fn expired_price_creates_zero_price() {
        let (engine, remote, store) = engine(server().with_price_list("Retail"));
        store.seed(EntityKind::Item, "ITEM-001", mug(), Utc::now());
        store.seed(
            EntityKind::Price,
            "ITEM-001",
            Record::from_json(json!({
                "price_list": "Retail",
                "price_list_rate": 9,
                "valid_upto": "2000-01-01",
            })),
            Utc::now(),
        );
        engine
            .sync_entity(EntityKind::Item, "ITEM-001", &SyncOptions::new())
            .await
            .unwrap();
        assert_eq!(
            remote.record("products", "1").unwrap().get_str("regular_price"),
            Some("0")
        );
    }

    #[tokio::test]
    async fn remote_edit_flows_back_locally() {
        let (engine, remote, store) = engine(server());
        store.seed(EntityKind::Item, "ITEM-001", mug(), Utc::now());
        engine
            .sync_entity(EntityKind::Item, "ITEM-001", &SyncOptions::new())
            .await
            .unwrap();

        remote.insert(
            "products",
            "1",
            Record::from_json(json!({"name": "Mug", "description": "Red", "manage_stock": true})),
        );
        let result = engine
            .sync_entity(EntityKind::Item, "ITEM-001", &SyncOptions::new())
            .await
            .unwrap();
        assert!(result.is_success());
        assert_eq!(result.writes(), 1);
        let local = store.get(EntityKind::Item, "ITEM-001").unwrap();
        assert_eq!(local.fields.get_str("description"), Some("Red"));
        assert_eq!(remote.calls(MockOp::Update), 0);
    }

    #[tokio::test]
    async fn stock_without_item_link_fails_naming_item() {
        let (engine, remote, store) = engine(server().with_stock_sync());
        store.seed(
            EntityKind::StockLevel,
            "ITEM-002",
            Record::new().with("actual_qty", 4),
            Utc::now(),
        );
        let result = engine
            .sync_entity(EntityKind::StockLevel, "ITEM-002", &SyncOptions::new())
            .await
            .unwrap();
        assert_eq!(result.status(), SyncStatus::Failed);
        assert!(result.issues()[0].message.contains("ITEM-002"));
        assert_eq!(remote.writes(), 0);
    }

    #[tokio::test]
    async fn disabled_kinds_are_refused() {
        let (engine, _, _) = engine(server());
        assert!(matches!(
            engine
                .sync_entity(EntityKind::StockLevel, "ITEM-001", &SyncOptions::new())
                .await,
            Err(SyncError::SyncDisabled { feature: "enable_stock_sync", .. })
        ));
        assert!(matches!(
            engine
                .sync_entity(EntityKind::TaxRule, "1", &SyncOptions::new())
                .await,
            Err(SyncError::Unsupported { .. })
        ));
    }

    #[tokio::test]
    async fn failed_local_write_keeps_status() {
        let (engine, remote, store) = engine(server());
        store.seed(EntityKind::Item, "ITEM-001", mug(), Utc::now());
        engine
            .sync_entity(EntityKind::Item, "ITEM-001", &SyncOptions::new())
            .await
            .unwrap();
        let before = engine.status(EntityKind::Item, "ITEM-001").last_hash();

        remote.insert(
            "products",
            "1",
            Record::from_json(json!({"name": "Cup", "description": "Blue", "manage_stock": true})),
        );
        store.fail_writes(
            EntityKind::Item,
            "ITEM-001",
            StoreError::validation("item_name", "locked"),
        );
        let result = engine
            .sync_entity(EntityKind::Item, "ITEM-001", &SyncOptions::new())
            .await
            .unwrap();
        assert_eq!(result.status(), SyncStatus::Failed);
        assert_eq!(result.issues()[0].field.as_deref(), Some("item_name"));
        assert_eq!(engine.status(EntityKind::Item, "ITEM-001").last_hash(), before);
    }

    #[tokio::test]
    async fn cancelled_before_writing() {
        let (engine, remote, store) = engine(server());
        store.seed(EntityKind::Item, "ITEM-001", mug(), Utc::now());
        let cancel = crate::state::CancelHandle::new();
        cancel.cancel();
        let result = engine
            .sync_entity(
                EntityKind::Item,
                "ITEM-001",
                &SyncOptions::new().with_cancel(cancel),
            )
            .await;
        assert_eq!(result, Err(SyncError::Cancelled));
        assert_eq!(remote.writes(), 0);
        assert!(engine.phase(EntityKind::Item, "ITEM-001").is_none());
    }

    #[tokio::test]
    async fn history_records_attempts() {
        let (engine, _, store) = engine(server());
        store.seed(EntityKind::Item, "ITEM-001", mug(), Utc::now());
        engine
            .sync_entity(EntityKind::Item, "ITEM-001", &SyncOptions::new())
            .await
            .unwrap();
        engine
            .sync_entity(EntityKind::Item, "ITEM-001", &SyncOptions::new())
            .await
            .unwrap();
        let history = engine.shared().history.recent();
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].writes(), 0);
    }
}
