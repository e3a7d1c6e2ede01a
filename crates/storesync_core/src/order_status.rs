//! Local ↔ remote sales order status table.

use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// The fixed pairing of local order status labels to remote status slugs.
pub const ORDER_STATUS_TABLE: [(&str, &str); 15] = [
    ("Pending Payment", "pending"),
    ("On hold", "on-hold"),
    ("Failed", "failed"),
    ("Cancelled", "cancelled"),
    ("Processing", "processing"),
    ("Refunded", "refunded"),
    ("Shipped", "completed"),
    ("Ready for Pickup", "ready-pickup"),
    ("Picked up", "pickup"),
    ("Delivered", "delivered"),
    ("Processing LP", "processing-lp"),
    ("Draft", "checkout-draft"),
    ("Quote Sent", "gplsquote-req"),
    ("Trash", "trash"),
    ("Partially Shipped", "partial-shipped"),
];

/// Returns the remote slug for a local status label.
pub fn remote_order_status(local: &str) -> Option<&'static str> {
    ORDER_STATUS_TABLE
        .iter()
        .find(|(l, _)| *l == local)
        .map(|(_, r)| *r)
}

/// Returns the local status label for a remote slug.
pub fn local_order_status(remote: &str) -> Option<&'static str> {
    ORDER_STATUS_TABLE
        .iter()
        .find(|(_, r)| *r == remote)
        .map(|(l, _)| *l)
}

/// One configured row of a server's sales order status map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderStatusPair {
    /// Local sales order status.
    pub local: String,
    /// Remote order status slug.
    pub remote: String,
}

/// Checks that no status appears twice on either side of the map.
pub fn validate_status_map(pairs: &[OrderStatusPair]) -> CoreResult<()> {
    let mut local = HashSet::new();
    let mut remote = HashSet::new();
    for pair in pairs {
        if !local.insert(pair.local.as_str()) {
            return Err(CoreError::InvalidConfig(format!(
                "duplicate local sales order status '{}' in status map",
                pair.local
            )));
        }
        if !remote.insert(pair.remote.as_str()) {
            return Err(CoreError::InvalidConfig(format!(
                "duplicate remote sales order status '{}' in status map",
                pair.remote
            )));
        }
    }
    Ok(())
}
