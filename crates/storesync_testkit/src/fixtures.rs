//! Test fixtures and engine helpers.
//!
//! Provides a ready-wired engine over a mock remote and an in-memory
//! store, plus record builders for the common entity kinds.

use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use storesync_core::{EntityKind, Record, SyncResult};
use storesync_engine::{
    LocalStore, MemoryStore, ServerConfig, SyncConfig, SyncEngine, SyncOptions, SERVERS_FIELD,
};
use storesync_remote::{MockRemote, RemoteApi, RetryConfig, MODIFIED_FIELD};
use tempfile::TempDir;

/// URL of the test server.
pub const SHOP_URL: &str = "https://shop.example.com";

/// Name of the test server.
pub const SHOP: &str = "shop.example.com";

/// Price list the test server pushes.
pub const PRICE_LIST: &str = "Standard Selling";

/// Server configuration with stock and price sync enabled.
pub fn shop_config() -> ServerConfig {
    ServerConfig::new(SHOP_URL)
        .with_credentials("ck_test", "cs_test")
        .with_stock_sync()
        .with_price_list(PRICE_LIST)
}

/// Retries without jitter, starting at 100ms.
pub fn fast_retry(max_attempts: u32) -> RetryConfig {
    RetryConfig::new(max_attempts)
        .with_initial_delay(std::time::Duration::from_millis(100))
        .with_jitter(false)
}

/// An engine over a mock remote and an in-memory store.
pub struct TestShop {
    /// The engine under test.
    pub engine: SyncEngine,
    /// The remote side.
    pub remote: Arc<MockRemote>,
    /// The local side.
    pub store: Arc<MemoryStore>,
}

impl TestShop {
    /// Creates a shop with [`shop_config`] and no retries.
    pub fn new() -> Self {
        Self::with(
            SyncConfig::new().with_retry(RetryConfig::no_retry()),
            shop_config(),
            MockRemote::new(),
        )
    }

    /// Creates a shop from explicit parts.
    pub fn with(config: SyncConfig, server: ServerConfig, remote: MockRemote) -> Self {
        let remote = Arc::new(remote);
        let store = Arc::new(MemoryStore::new());
        let engine = SyncEngine::new(
            config,
            server,
            remote.clone() as Arc<dyn RemoteApi>,
            store.clone() as Arc<dyn LocalStore>,
        )
        .expect("Failed to build test engine");
        Self {
            engine,
            remote,
            store,
        }
    }

    /// Seeds a stock item published to the test server.
    pub fn seed_item(&self, item_code: &str, name: &str) {
        self.store
            .seed(EntityKind::Item, item_code, item_record(name), minutes_ago(10));
    }

    /// Seeds a stock level.
    pub fn seed_stock(&self, item_code: &str, qty: f64) {
        self.store.seed(
            EntityKind::StockLevel,
            item_code,
            Record::new().with("item_code", item_code).with("actual_qty", qty),
            minutes_ago(10),
        );
    }

    /// Seeds a price on [`PRICE_LIST`].
    pub fn seed_price(&self, item_code: &str, rate: f64) {
        self.store.seed(
            EntityKind::Price,
            item_code,
            price_record(item_code, rate),
            minutes_ago(10),
        );
    }

    /// Syncs one item bidirectionally.
    pub async fn sync_item(&self, item_code: &str) -> SyncResult {
        self.engine
            .sync_entity(EntityKind::Item, item_code, &SyncOptions::new())
            .await
            .expect("Item sync did not run")
    }

    /// Remote product id linked to `item_code`.
    pub fn product_id(&self, item_code: &str) -> Option<String> {
        self.engine
            .status(EntityKind::Item, item_code)
            .remote_id()
            .map(str::to_string)
    }

    /// The remote product linked to `item_code`.
    pub fn product(&self, item_code: &str) -> Option<Record> {
        let id = self.product_id(item_code)?;
        self.remote.record("products", &id)
    }
}

impl Default for TestShop {
    fn default() -> Self {
        Self::new()
    }
}

/// Local item record linked to [`SHOP`].
pub fn item_record(name: &str) -> Record {
    Record::from_json(json!({
        "item_name": name,
        "description": format!("{name} description"),
        "is_stock_item": 1,
    }))
    .with(SERVERS_FIELD, json!([SHOP]))
}

/// Local price record on [`PRICE_LIST`], valid for a year.
pub fn price_record(item_code: &str, rate: f64) -> Record {
    let valid_upto = (Utc::now() + Duration::days(365)).date_naive();
    Record::new()
        .with("item_code", item_code)
        .with("price_list", PRICE_LIST)
        .with("price_list_rate", rate)
        .with("valid_upto", valid_upto.format("%Y-%m-%d").to_string())
}

/// Remote product record stamped with a modification time.
pub fn remote_product(name: &str, modified: DateTime<Utc>) -> Record {
    Record::from_json(json!({
        "name": name,
        "description": format!("{name} description"),
        "manage_stock": true,
        "type": "simple",
        "status": "publish",
    }))
    .with(MODIFIED_FIELD, storesync_remote::format_modified(modified))
}

/// A point in the past.
pub fn minutes_ago(minutes: i64) -> DateTime<Utc> {
    Utc::now() - Duration::minutes(minutes)
}

/// A configuration file in a temporary directory.
pub struct TempConfig {
    /// Path of the written file.
    pub path: PathBuf,
    _dir: TempDir,
}

impl TempConfig {
    /// Writes `contents` to `storesync.json` in a fresh directory.
    pub fn write(contents: &str) -> Self {
        let dir = TempDir::new().expect("Failed to create temp directory");
        let path = dir.path().join("storesync.json");
        std::fs::write(&path, contents).expect("Failed to write config");
        Self { path, _dir: dir }
    }
}

/// A two-server configuration file body.
pub fn two_server_config() -> String {
    json!({
        "engine": {"pool_size": 2, "timeout_secs": 5, "max_attempts": 2},
        "servers": [
            {
                "url": SHOP_URL,
                "consumer_key": "ck_test",
                "consumer_secret": "cs_test",
                "enable_stock_sync": true,
            },
            {
                "url": "https://outlet.example.com",
                "name": "outlet",
                "enable_sync": false,
            }
        ]
    })
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use storesync_engine::StoresyncConfig;

    #[test]
    fn item_record_links_shop() {
        let record = item_record("Mug");
        assert_eq!(record.get_str("item_name"), Some("Mug"));
        assert_eq!(record.get(SERVERS_FIELD), Some(&json!([SHOP])));
    }

    #[test]
    fn temp_config_loads() {
        let file = TempConfig::write(&two_server_config());
        let config = StoresyncConfig::load(&file.path).unwrap();
        assert_eq!(config.servers.len(), 2);
        assert!(config.server("outlet").is_ok());
    }
}
