//! Trigger surface.
//!
//! [`SyncService`] owns one engine per configured server and answers the
//! calls the local system makes when an item, its stock or its price is
//! saved, plus the tax, shipping and order status lookups.

use crate::config::{ServerConfig, StoresyncConfig};
use crate::engine::{failed_result, SharedState, SyncEngine, SERVERS_FIELD};
use crate::error::{EngineResult, SyncError};
use crate::state::SyncOptions;
use crate::store::{LocalStore, StoreError};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use storesync_core::{
    Direction, EntityKey, EntityKind, ShippingMethod, SyncPayload, SyncResult, SyncResultBuilder,
    SyncStatusView, SyncableEntity, TaxClass, TaxRule, ORDER_STATUS_TABLE,
};
use storesync_remote::RemoteApi;
use tracing::{debug, info};

/// Entry point for the local system.
pub struct SyncService {
    engines: BTreeMap<String, SyncEngine>,
    store: Arc<dyn LocalStore>,
    shared: SharedState,
}

impl SyncService {
    /// Builds one engine per configured server.
    ///
    /// `connect` supplies the remote for each server.
    pub fn new<F>(
        config: &StoresyncConfig,
        store: Arc<dyn LocalStore>,
        mut connect: F,
    ) -> EngineResult<Self>
    where
        F: FnMut(&ServerConfig) -> EngineResult<Arc<dyn RemoteApi>>,
    {
        config.validate()?;
        let sync = config.engine.to_sync_config();
        let shared = SharedState::new(sync.history_capacity);
        let mut engines = BTreeMap::new();
        for server in &config.servers {
            let remote = connect(server)?;
            let engine = SyncEngine::with_shared(
                sync.clone(),
                server.clone(),
                remote,
                Arc::clone(&store),
                shared.clone(),
            )?;
            engines.insert(engine.server_name().to_string(), engine);
        }
        info!(servers = engines.len(), "sync service ready");
        Ok(Self {
            engines,
            store,
            shared,
        })
    }

    /// Builds the service over real HTTP connections.
    #[cfg(feature = "reqwest")]
    pub fn connect(config: &StoresyncConfig, store: Arc<dyn LocalStore>) -> EngineResult<Self> {
        use storesync_remote::{ReqwestClient, RestClient};

        let timeout = config.engine.to_sync_config().timeout;
        Self::new(config, store, |server| {
            let client = ReqwestClient::new(timeout).map_err(SyncError::Config)?;
            let remote = RestClient::new(
                &server.url,
                server.consumer_key.clone(),
                server.consumer_secret.clone(),
                client,
            )?;
            Ok(Arc::new(remote) as Arc<dyn RemoteApi>)
        })
    }

    /// The engine serving `server`.
    pub fn engine(&self, server: &str) -> EngineResult<&SyncEngine> {
        self.engines
            .get(server)
            .ok_or_else(|| SyncError::UnknownServer(server.to_string()))
    }

    /// Configured server names.
    pub fn servers(&self) -> impl Iterator<Item = &str> {
        self.engines.keys().map(String::as_str)
    }

    /// State shared by every engine.
    pub fn shared(&self) -> &SharedState {
        &self.shared
    }

    /// Called when an item is saved.
    pub async fn sync_item(&self, item_code: &str) -> SyncPayload {
        self.payload(EntityKind::Item, item_code, &SyncOptions::new())
            .await
    }

    /// Called when a stock level changes. Local stock always wins.
    pub async fn sync_item_stock(&self, item_code: &str) -> SyncPayload {
        let options = SyncOptions::new().with_direction(Direction::LocalToRemote);
        self.payload(EntityKind::StockLevel, item_code, &options)
            .await
    }

    /// Called when an item price changes. Local prices always win.
    pub async fn sync_item_price(&self, item_code: &str) -> SyncPayload {
        let options = SyncOptions::new().with_direction(Direction::LocalToRemote);
        self.payload(EntityKind::Price, item_code, &options).await
    }

    async fn payload(&self, kind: EntityKind, item_code: &str, options: &SyncOptions) -> SyncPayload {
        match self.trigger(kind, item_code, options).await {
            Ok(result) => result.to_payload(),
            Err(e) => SyncPayload::failed(e.to_string()),
        }
    }

    /// Syncs `kind` of one item on every server the item is published to.
    ///
    /// Servers where the kind is disabled are skipped. Each server's attempt
    /// is reported as one outcome of the returned batch.
    pub async fn trigger(
        &self,
        kind: EntityKind,
        item_code: &str,
        options: &SyncOptions,
    ) -> EngineResult<SyncResult> {
        let servers = self.linked_servers(item_code).await?;
        if servers.is_empty() {
            return Err(SyncError::NoLinkedServers(item_code.to_string()));
        }

        let mut batch = SyncResultBuilder::new();
        let mut attempted = 0usize;
        for server in servers {
            let engine = match self.engine(&server) {
                Ok(engine) => engine,
                Err(e) => {
                    let key = EntityKey::new(server, kind, item_code);
                    batch.outcome(key.clone(), &failed_result(&key, &e));
                    continue;
                }
            };
            if !engine.is_enabled(kind) {
                debug!(server = %server, kind = %kind, item_code, "sync disabled, skipped");
                continue;
            }
            attempted += 1;
            let key = EntityKey::new(server, kind, item_code);
            let result = engine
                .sync_entity(kind, item_code, options)
                .await
                .unwrap_or_else(|e| failed_result(&key, &e));
            batch.outcome(key, &result);
        }
        if attempted == 0 {
            batch.message(format!("{kind} sync is disabled on every server of {item_code}"));
        }
        Ok(batch.build())
    }

    async fn linked_servers(&self, item_code: &str) -> EngineResult<Vec<String>> {
        let item = match self.store.read(EntityKind::Item, item_code).await {
            Ok(item) => item,
            Err(StoreError::NotFound { .. }) => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let servers = match item.fields.get(SERVERS_FIELD) {
            Some(Value::Array(values)) => values
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect(),
            Some(Value::String(server)) if !server.is_empty() => vec![server.clone()],
            _ => Vec::new(),
        };
        Ok(servers)
    }

    /// Pulls remote products modified after `since` from one server.
    pub async fn sync_modified_since(
        &self,
        server: &str,
        kind: EntityKind,
        since: DateTime<Utc>,
    ) -> EngineResult<(SyncResult, DateTime<Utc>)> {
        self.engine(server)?.sync_modified_since(kind, since).await
    }

    /// Remote tax classes of one server.
    pub async fn get_tax_classes(&self, server: &str) -> EngineResult<Vec<TaxClass>> {
        self.engine(server)?
            .reconciler()
            .fetch_remote_tax_classes()
            .await
    }

    /// Pulls one server's tax rules into the local tax table.
    pub async fn sync_taxes(&self, server: &str) -> SyncPayload {
        match self.engine(server) {
            Ok(engine) => engine.reconciler().sync_taxes().await.to_payload(),
            Err(e) => SyncPayload::failed(e.to_string()),
        }
    }

    /// Pushes edited tax rows back to one server.
    pub async fn update_taxes(&self, server: &str, rows: &[TaxRule]) -> SyncPayload {
        match self.engine(server) {
            Ok(engine) => engine
                .reconciler()
                .push_local_taxes(rows)
                .await
                .to_payload(),
            Err(e) => SyncPayload::failed(e.to_string()),
        }
    }

    /// Every shipping method one server offers.
    pub async fn get_shipping_methods(&self, server: &str) -> EngineResult<Vec<ShippingMethod>> {
        self.engine(server)?
            .reconciler()
            .fetch_shipping_methods()
            .await
    }

    /// Re-derives shipping method ids from titles on one server.
    pub async fn update_shipping_method_ids(&self, server: &str) -> SyncPayload {
        let result = match self.engine(server) {
            Ok(engine) => engine.reconciler().update_shipping_method_ids().await,
            Err(e) => Err(e),
        };
        match result {
            Ok(result) => result.to_payload(),
            Err(e) => SyncPayload::failed(e.to_string()),
        }
    }

    /// Local order status labels a server's orders can take.
    pub fn get_order_status_list(&self, server: &str) -> EngineResult<Vec<String>> {
        let config = self.engine(server)?.server_config();
        if config.order_status_map.is_empty() {
            return Ok(ORDER_STATUS_TABLE
                .iter()
                .map(|(local, _)| local.to_string())
                .collect());
        }
        Ok(config
            .order_status_map
            .iter()
            .map(|pair| pair.local.clone())
            .collect())
    }

    /// Sync status of one entity on one server.
    pub fn status(&self, server: &str, kind: EntityKind, local_id: &str) -> EngineResult<SyncStatusView> {
        Ok(self.engine(server)?.status(kind, local_id))
    }

    /// Snapshot of every tracked entity, for persistence.
    pub fn export_status(&self) -> Vec<SyncableEntity> {
        self.shared.tracker.export()
    }

    /// Restores a snapshot taken by [`SyncService::export_status`].
    pub fn import_status(&self, entries: Vec<SyncableEntity>) -> EngineResult<()> {
        Ok(self.shared.tracker.import(entries)?)
    }

    /// Recent sync results across every server, oldest first.
    pub fn history(&self) -> Vec<SyncResult> {
        self.shared.history.recent()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use serde_json::json;
    use storesync_core::{Record, SyncStatus};
    use storesync_remote::MockRemote;

    fn config() -> StoresyncConfig {
        StoresyncConfig::from_json_str(
            r#"{
                "servers": [
                    {"url": "https://a.example.com", "enable_stock_sync": true},
                    {"url": "https://b.example.com"}
                ]
            }"#,
        )
        .unwrap()
    }

    fn service() -> (SyncService, BTreeMap<String, Arc<MockRemote>>, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let mut remotes = BTreeMap::new();
        let service = SyncService::new(&config(), store.clone(), |server| {
            let remote = Arc::new(MockRemote::new());
            remotes.insert(server.server_name(), remote.clone());
            Ok(remote as Arc<dyn RemoteApi>)
        })
        .unwrap();
        (service, remotes, store)
    }

    fn item(servers: Value) -> Record {
        Record::from_json(json!({"item_name": "Mug", "is_stock_item": 1})).with(SERVERS_FIELD, servers)
    }

    #[tokio::test]
    async fn item_without_servers_fails() {
        let (service, _, store) = service();
        store.seed(EntityKind::Item, "ITEM-009", item(json!([])), Utc::now());

        let payload = service.sync_item("ITEM-009").await;
        assert_eq!(payload.status, SyncStatus::Failed);
        assert_eq!(payload.message, "No remote servers defined for item ITEM-009");
    }

    #[tokio::test]
    async fn item_syncs_to_each_linked_server() {
        let (service, remotes, store) = service();
        store.seed(
            EntityKind::Item,
            "ITEM-001",
            item(json!(["a.example.com", "b.example.com"])),
            Utc::now(),
        );

        let payload = service.sync_item("ITEM-001").await;
        assert_eq!(payload.status, SyncStatus::Success);
        for remote in remotes.values() {
            assert_eq!(remote.records("products").len(), 1);
        }
        assert!(service
            .status("b.example.com", EntityKind::Item, "ITEM-001")
            .unwrap()
            .is_synced());
    }

    #[tokio::test]
    async fn stock_skips_servers_without_stock_sync() {
        let (service, remotes, store) = service();
        store.seed(
            EntityKind::Item,
            "ITEM-002",
            item(json!(["a.example.com", "b.example.com"])),
            Utc::now(),
        );
        store.seed(
            EntityKind::StockLevel,
            "ITEM-002",
            Record::new().with("actual_qty", 7),
            Utc::now(),
        );
        assert!(service.sync_item("ITEM-002").await.errors.is_empty());

        let result = service
            .trigger(EntityKind::StockLevel, "ITEM-002", &SyncOptions::new())
            .await
            .unwrap();
        assert_eq!(result.outcomes().len(), 1);
        let product = remotes["a.example.com"].record("products", "1").unwrap();
        assert_eq!(product.get_f64("stock_quantity"), Some(7.0));
    }

    #[tokio::test]
    async fn unknown_server_is_an_error() {
        let (service, _, _) = service();
        assert!(matches!(
            service.get_tax_classes("c.example.com").await,
            Err(SyncError::UnknownServer(_))
        ));
        assert_eq!(service.sync_taxes("c.example.com").await.status, SyncStatus::Failed);
    }

    #[test]
    fn order_statuses_default_to_table() {
        let (service, _, _) = service();
        let labels = service.get_order_status_list("a.example.com").unwrap();
        assert_eq!(labels.len(), ORDER_STATUS_TABLE.len());
        assert_eq!(labels[0], "Pending Payment");
    }
}
