//! Validate command implementation.

use serde::Serialize;
use std::path::Path;
use storesync_engine::{ServerConfig, StoresyncConfig};
use tracing::info;

/// Validation summary.
#[derive(Debug, Serialize)]
pub struct ValidateResult {
    /// Configuration path.
    pub path: String,
    /// Batch worker pool size.
    pub pool_size: usize,
    /// Maximum attempts per remote call.
    pub max_attempts: u32,
    /// One entry per server.
    pub servers: Vec<ServerSummary>,
}

/// Summary of one server.
#[derive(Debug, Serialize)]
pub struct ServerSummary {
    /// Server name.
    pub name: String,
    /// Store URL.
    pub url: String,
    /// Enabled sync features.
    pub features: Vec<&'static str>,
    /// Price list pushed to the server.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price_list: Option<String>,
    /// Whether credentials are configured.
    pub has_credentials: bool,
}

impl ServerSummary {
    fn from_config(server: &ServerConfig) -> Self {
        let flags = [
            ("items", server.enable_sync),
            ("stock", server.enable_stock_sync),
            ("prices", server.enable_price_list_sync),
            ("shipping", server.enable_shipping_methods_sync),
            ("order_status", server.enable_so_status_sync),
        ];
        Self {
            name: server.server_name(),
            url: server.url.clone(),
            features: flags
                .into_iter()
                .filter(|(_, on)| *on)
                .map(|(name, _)| name)
                .collect(),
            price_list: server.price_list.clone(),
            has_credentials: !server.consumer_key.is_empty() && !server.consumer_secret.is_empty(),
        }
    }
}

/// Loads and validates a configuration file.
pub fn check(path: &Path) -> Result<ValidateResult, Box<dyn std::error::Error>> {
    let config = StoresyncConfig::load(path)?;
    info!(path = %path.display(), servers = config.servers.len(), "configuration valid");
    Ok(ValidateResult {
        path: path.display().to_string(),
        pool_size: config.engine.pool_size,
        max_attempts: config.engine.max_attempts,
        servers: config.servers.iter().map(ServerSummary::from_config).collect(),
    })
}

/// Runs the validate command.
pub fn run(path: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let result = check(path)?;
    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&result)?),
        _ => print_text_output(&result),
    }
    Ok(())
}

fn print_text_output(result: &ValidateResult) {
    println!("Configuration: {}", result.path);
    println!("  Pool size:    {}", result.pool_size);
    println!("  Max attempts: {}", result.max_attempts);
    println!("  Servers:      {}", result.servers.len());
    for server in &result.servers {
        println!();
        println!("  {} ({})", server.name, server.url);
        let features = if server.features.is_empty() {
            "none".to_string()
        } else {
            server.features.join(", ")
        };
        println!("    Sync:        {features}");
        if let Some(price_list) = &server.price_list {
            println!("    Price list:  {price_list}");
        }
        if !server.has_credentials {
            println!("    Warning: no API credentials configured");
        }
    }
}
