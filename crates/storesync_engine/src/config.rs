//! Configuration for the sync engine.
//!
//! [`SyncConfig`] holds engine-wide knobs. [`ServerConfig`] describes one
//! remote store: credentials, feature flags and the mapping, authority,
//! order status and shipping tables. Both are loaded together from a JSON
//! [`StoresyncConfig`] file and validated before any sync runs.

use crate::error::{EngineResult, SyncError};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;
use storesync_core::{
    validate_status_map, Authority, AuthorityTable, EntityKind, FieldMapper, FieldRule,
    OrderStatusPair, ShippingMethodMap,
};
use storesync_remote::RetryConfig;
use url::Url;

/// Engine-wide configuration.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Maximum concurrent entity syncs in a batch.
    pub pool_size: usize,
    /// Timeout for each remote call.
    pub timeout: Duration,
    /// Retry configuration for remote calls.
    pub retry: RetryConfig,
    /// Number of recent results kept in the sync history.
    pub history_capacity: usize,
}

impl SyncConfig {
    /// Creates a configuration with default values.
    pub fn new() -> Self {
        Self {
            pool_size: 4,
            timeout: Duration::from_secs(40),
            retry: RetryConfig::default(),
            history_capacity: 100,
        }
    }

    /// Sets the batch worker pool size.
    pub fn with_pool_size(mut self, size: usize) -> Self {
        self.pool_size = size.max(1);
        self
    }

    /// Sets the per-call timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the retry configuration.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the history capacity.
    pub fn with_history_capacity(mut self, capacity: usize) -> Self {
        self.history_capacity = capacity;
        self
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// File form of [`SyncConfig`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Batch worker pool size.
    pub pool_size: usize,
    /// Per-call timeout in seconds.
    pub timeout_secs: u64,
    /// Maximum attempts per remote call.
    pub max_attempts: u32,
    /// Initial retry delay in milliseconds.
    pub initial_delay_ms: u64,
    /// Maximum retry delay in milliseconds.
    pub max_delay_ms: u64,
    /// Backoff multiplier.
    pub backoff_multiplier: f64,
    /// Whether retry delays are jittered.
    pub jitter: bool,
    /// Sync history capacity.
    pub history_capacity: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            pool_size: 4,
            timeout_secs: 40,
            max_attempts: 3,
            initial_delay_ms: 500,
            max_delay_ms: 30_000,
            backoff_multiplier: 2.0,
            jitter: true,
            history_capacity: 100,
        }
    }
}

impl EngineSettings {
    /// Converts the settings into a [`SyncConfig`].
    pub fn to_sync_config(&self) -> SyncConfig {
        let retry = RetryConfig::new(self.max_attempts.max(1))
            .with_initial_delay(Duration::from_millis(self.initial_delay_ms))
            .with_max_delay(Duration::from_millis(self.max_delay_ms))
            .with_backoff_multiplier(self.backoff_multiplier)
            .with_jitter(self.jitter);
        SyncConfig::new()
            .with_pool_size(self.pool_size)
            .with_timeout(Duration::from_secs(self.timeout_secs))
            .with_retry(retry)
            .with_history_capacity(self.history_capacity)
    }
}

/// How the local item code of an item created from a remote product is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NameBy {
    /// Use the remote product id.
    #[default]
    RemoteId,
    /// Use the product SKU when present, else the remote id.
    Sku,
}

/// Authority override for one local field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorityOverride {
    /// Entity kind.
    pub kind: EntityKind,
    /// Local field name.
    pub field: String,
    /// Winning side policy.
    pub authority: Authority,
}

fn default_true() -> bool {
    true
}

fn default_product_status() -> String {
    "draft".to_string()
}

/// Configuration of one remote server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Store URL, e.g. `https://shop.example.com`.
    pub url: String,
    /// Server identifier; derived from the URL host when absent.
    #[serde(default)]
    pub name: Option<String>,
    /// API consumer key.
    #[serde(default)]
    pub consumer_key: String,
    /// API consumer secret.
    #[serde(default)]
    pub consumer_secret: String,
    /// Master switch for item sync.
    #[serde(default = "default_true")]
    pub enable_sync: bool,
    /// Push stock levels.
    #[serde(default)]
    pub enable_stock_sync: bool,
    /// Push prices from `price_list`.
    #[serde(default)]
    pub enable_price_list_sync: bool,
    /// Resolve shipping method ids.
    #[serde(default)]
    pub enable_shipping_methods_sync: bool,
    /// Map sales order statuses.
    #[serde(default)]
    pub enable_so_status_sync: bool,
    /// Look up the media library before uploading an image by URL.
    #[serde(default)]
    pub enable_media_lookup: bool,
    /// Status given to newly created remote products.
    #[serde(default = "default_product_status")]
    pub default_product_status: String,
    /// Local price list whose rates are pushed.
    #[serde(default)]
    pub price_list: Option<String>,
    /// Account assigned to newly mirrored tax rules.
    #[serde(default)]
    pub default_tax_account: Option<String>,
    /// Item code policy for items created from remote products.
    #[serde(default)]
    pub name_by: NameBy,
    /// Extra item field mappings.
    #[serde(default)]
    pub item_field_map: Vec<FieldRule>,
    /// Per-field authority overrides.
    #[serde(default)]
    pub authority: Vec<AuthorityOverride>,
    /// Sales order status map.
    #[serde(default)]
    pub order_status_map: Vec<OrderStatusPair>,
    /// Shipping rule to remote method map.
    #[serde(default)]
    pub shipping_rule_map: Vec<ShippingMethodMap>,
}

impl ServerConfig {
    /// Creates a configuration for `url` with default flags.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            name: None,
            consumer_key: String::new(),
            consumer_secret: String::new(),
            enable_sync: true,
            enable_stock_sync: false,
            enable_price_list_sync: false,
            enable_shipping_methods_sync: false,
            enable_so_status_sync: false,
            enable_media_lookup: false,
            default_product_status: default_product_status(),
            price_list: None,
            default_tax_account: None,
            name_by: NameBy::default(),
            item_field_map: Vec::new(),
            authority: Vec::new(),
            order_status_map: Vec::new(),
            shipping_rule_map: Vec::new(),
        }
    }

    /// Sets API credentials.
    pub fn with_credentials(mut self, key: impl Into<String>, secret: impl Into<String>) -> Self {
        self.consumer_key = key.into();
        self.consumer_secret = secret.into();
        self
    }

    /// Enables stock sync.
    pub fn with_stock_sync(mut self) -> Self {
        self.enable_stock_sync = true;
        self
    }

    /// Enables the media library lookup for product images.
    pub fn with_media_lookup(mut self) -> Self {
        self.enable_media_lookup = true;
        self
    }

    /// Enables price sync from `price_list`.
    pub fn with_price_list(mut self, price_list: impl Into<String>) -> Self {
        self.enable_price_list_sync = true;
        self.price_list = Some(price_list.into());
        self
    }

    /// Sets the fallback tax account.
    pub fn with_default_tax_account(mut self, account: impl Into<String>) -> Self {
        self.default_tax_account = Some(account.into());
        self
    }

    /// Sets the item code policy.
    pub fn with_name_by(mut self, name_by: NameBy) -> Self {
        self.name_by = name_by;
        self
    }

    /// Adds an authority override.
    pub fn with_authority(
        mut self,
        kind: EntityKind,
        field: impl Into<String>,
        authority: Authority,
    ) -> Self {
        self.authority.push(AuthorityOverride {
            kind,
            field: field.into(),
            authority,
        });
        self
    }

    /// Server identifier: the configured name, else the URL host.
    pub fn server_name(&self) -> String {
        match &self.name {
            Some(name) if !name.is_empty() => name.clone(),
            _ => url_host(&self.url).unwrap_or_else(|| self.url.clone()),
        }
    }

    /// Validates the URL, status map and mapping overrides.
    pub fn validate(&self) -> EngineResult<()> {
        if url_host(&self.url).is_none() {
            return Err(SyncError::Config(format!(
                "server url '{}' needs a scheme and a host",
                self.url
            )));
        }
        if self.enable_price_list_sync && self.price_list.is_none() {
            return Err(SyncError::Config(format!(
                "price list sync is enabled for {} but no price_list is set",
                self.server_name()
            )));
        }
        validate_status_map(&self.order_status_map)?;
        self.field_mapper()?;
        Ok(())
    }

    /// Field mapper with this server's item overrides applied.
    pub fn field_mapper(&self) -> EngineResult<FieldMapper> {
        Ok(FieldMapper::from_overrides([(
            EntityKind::Item,
            self.item_field_map.as_slice(),
        )])?)
    }

    /// Authority table with this server's overrides applied.
    pub fn authority_table(&self) -> AuthorityTable {
        self.authority
            .iter()
            .fold(AuthorityTable::new(), |table, o| {
                table.with_override(o.kind, o.field.clone(), o.authority)
            })
    }
}

/// Returns the host of an absolute URL.
fn url_host(url: &str) -> Option<String> {
    Url::parse(url)
        .ok()?
        .host_str()
        .filter(|host| !host.is_empty())
        .map(str::to_string)
}

/// Complete configuration file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoresyncConfig {
    /// Engine settings.
    #[serde(default)]
    pub engine: EngineSettings,
    /// Remote servers.
    #[serde(default)]
    pub servers: Vec<ServerConfig>,
}

impl StoresyncConfig {
    /// Parses a JSON configuration.
    pub fn from_json_str(json: &str) -> EngineResult<Self> {
        serde_json::from_str(json).map_err(|e| SyncError::Config(e.to_string()))
    }

    /// Loads and validates a JSON configuration file.
    pub fn load(path: impl AsRef<Path>) -> EngineResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| SyncError::Config(format!("{}: {e}", path.display())))?;
        let config = Self::from_json_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Validates every server and checks server names are unique.
    pub fn validate(&self) -> EngineResult<()> {
        let mut names = HashSet::new();
        for server in &self.servers {
            server.validate()?;
            let name = server.server_name();
            if !names.insert(name.clone()) {
                return Err(SyncError::Config(format!("duplicate server '{name}'")));
            }
        }
        Ok(())
    }

    /// Looks up a server by name.
    pub fn server(&self, name: &str) -> EngineResult<&ServerConfig> {
        self.servers
            .iter()
            .find(|s| s.server_name() == name)
            .ok_or_else(|| SyncError::UnknownServer(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use storesync_core::{CoreError, Direction, Side};

    #[test]
    fn server_name_from_url() {
        assert_eq!(
            ServerConfig::new("https://shop.example.com/store").server_name(),
            "shop.example.com"
        );
        assert_eq!(
            ServerConfig::new("http://user@localhost:8080").server_name(),
            "localhost"
        );
        assert_eq!(
            ServerConfig::new("https://[::1]:8080/shop").server_name(),
            "[::1]"
        );
        let mut named = ServerConfig::new("https://shop.example.com");
        named.name = Some("main".into());
        assert_eq!(named.server_name(), "main");
    }

    #[test]
    fn url_needs_scheme_and_host() {
        assert!(ServerConfig::new("shop.example.com").validate().is_err());
        assert!(ServerConfig::new("https://").validate().is_err());
        assert!(ServerConfig::new("https://shop.example.com").validate().is_ok());
    }

    #[test]
    fn duplicate_status_rejected() {
        let mut server = ServerConfig::new("https://shop.example.com");
        server.order_status_map = vec![
            OrderStatusPair {
                local: "Shipped".into(),
                remote: "completed".into(),
            },
            OrderStatusPair {
                local: "Delivered".into(),
                remote: "completed".into(),
            },
        ];
        assert!(matches!(
            server.validate(),
            Err(SyncError::Core(CoreError::InvalidConfig(_)))
        ));
    }

    #[test]
    fn price_sync_needs_price_list() {
        let mut server = ServerConfig::new("https://shop.example.com");
        server.enable_price_list_sync = true;
        assert!(server.validate().is_err());
        assert!(ServerConfig::new("https://shop.example.com")
            .with_price_list("Standard Selling")
            .validate()
            .is_ok());
    }

    #[test]
    fn parses_json_with_defaults() {
        let config = StoresyncConfig::from_json_str(
            r#"{
                "engine": {"pool_size": 8},
                "servers": [{
                    "url": "https://shop.example.com",
                    "consumer_key": "ck",
                    "consumer_secret": "cs",
                    "enable_stock_sync": true,
                    "name_by": "sku",
                    "item_field_map": [{"local": "item_code", "remote": "sku"}],
                    "authority": [{"kind": "Item", "field": "description", "authority": "local"}]
                }]
            }"#,
        )
        .unwrap();
        config.validate().unwrap();
        assert_eq!(config.engine.to_sync_config().pool_size, 8);
        assert_eq!(config.engine.timeout_secs, 40);

        let server = config.server("shop.example.com").unwrap();
        assert!(server.enable_sync);
        assert!(server.enable_stock_sync);
        assert!(!server.enable_media_lookup);
        assert_eq!(server.default_product_status, "draft");
        assert_eq!(server.name_by, NameBy::Sku);

        let mapping = server
            .field_mapper()
            .unwrap()
            .resolve(EntityKind::Item, Direction::LocalToRemote);
        assert!(mapping.target_fields().any(|f| f == "sku"));
        assert!(mapping.target_fields().any(|f| f == "images"));
        assert_eq!(
            server
                .authority_table()
                .resolve(EntityKind::Item, "description", None, None),
            Side::Local
        );
        assert!(matches!(config.server("nope"), Err(SyncError::UnknownServer(_))));
    }

    #[test]
    fn duplicate_servers_rejected() {
        let config = StoresyncConfig {
            engine: EngineSettings::default(),
            servers: vec![
                ServerConfig::new("https://shop.example.com"),
                ServerConfig::new("https://shop.example.com/other"),
            ],
        };
        assert!(config.validate().is_err());
    }
}
