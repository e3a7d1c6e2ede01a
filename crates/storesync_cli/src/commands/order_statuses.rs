//! Order statuses command implementation.

use serde::Serialize;
use std::path::Path;
use storesync_core::{OrderStatusPair, ORDER_STATUS_TABLE};
use storesync_engine::StoresyncConfig;

/// Order status pairs and where they came from.
#[derive(Debug, Serialize)]
pub struct OrderStatusList {
    /// Server whose map was used, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server: Option<String>,
    /// Local label and remote slug pairs.
    pub statuses: Vec<OrderStatusPair>,
}

/// Lists the built-in table, or the status map of `server`.
///
/// A server without its own map uses the built-in table.
pub fn list(
    config: Option<&StoresyncConfig>,
    server: Option<&str>,
) -> Result<OrderStatusList, Box<dyn std::error::Error>> {
    let builtin = || {
        ORDER_STATUS_TABLE
            .iter()
            .map(|(local, remote)| OrderStatusPair {
                local: local.to_string(),
                remote: remote.to_string(),
            })
            .collect::<Vec<_>>()
    };
    let Some(server) = server else {
        return Ok(OrderStatusList {
            server: None,
            statuses: builtin(),
        });
    };
    let config = config.ok_or("Configuration path required with --server")?;
    let server = config.server(server)?;
    let statuses = if server.order_status_map.is_empty() {
        builtin()
    } else {
        server.order_status_map.clone()
    };
    Ok(OrderStatusList {
        server: Some(server.server_name()),
        statuses,
    })
}

/// Runs the order-statuses command.
pub fn run(
    path: Option<&Path>,
    server: Option<&str>,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = path.map(StoresyncConfig::load).transpose()?;
    let result = list(config.as_ref(), server)?;
    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&result)?),
        _ => {
            for pair in &result.statuses {
                println!("{:<20} {}", pair.local, pair.remote);
            }
        }
    }
    Ok(())
}
