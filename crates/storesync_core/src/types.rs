//! Core type definitions for storesync.

use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A class of syncable object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    /// Catalog item (remote product).
    Item,
    /// Stock quantity of an item.
    StockLevel,
    /// Selling price of an item.
    Price,
    /// Remote-owned tax rule mirrored locally.
    TaxRule,
    /// Remote shipping method paired with a local shipping rule.
    ShippingMethod,
    /// Local variant attribute, written from remote product attributes.
    ItemAttribute,
}

impl EntityKind {
    /// All entity kinds, in declaration order.
    pub const ALL: [EntityKind; 6] = [
        EntityKind::Item,
        EntityKind::StockLevel,
        EntityKind::Price,
        EntityKind::TaxRule,
        EntityKind::ShippingMethod,
        EntityKind::ItemAttribute,
    ];

    /// Returns the canonical name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            EntityKind::Item => "Item",
            EntityKind::StockLevel => "StockLevel",
            EntityKind::Price => "Price",
            EntityKind::TaxRule => "TaxRule",
            EntityKind::ShippingMethod => "ShippingMethod",
            EntityKind::ItemAttribute => "ItemAttribute",
        }
    }

    /// Returns the remote REST resource this kind is stored under.
    ///
    /// Stock levels and prices are fields of the remote product.
    #[must_use]
    pub const fn remote_resource(self) -> &'static str {
        match self {
            EntityKind::Item | EntityKind::StockLevel | EntityKind::Price => "products",
            EntityKind::TaxRule => "taxes",
            EntityKind::ShippingMethod => "shipping_methods",
            EntityKind::ItemAttribute => "products/attributes",
        }
    }

    /// Returns the kind whose remote identifier this kind shares.
    #[must_use]
    pub const fn identity_kind(self) -> EntityKind {
        match self {
            EntityKind::StockLevel | EntityKind::Price => EntityKind::Item,
            other => other,
        }
    }

    /// Returns true if a missing remote record may be created by the engine.
    #[must_use]
    pub const fn creates_remotely(self) -> bool {
        matches!(self, EntityKind::Item)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EntityKind::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| CoreError::UnknownKind(s.to_string()))
    }
}

/// Fully qualified identity of a synchronized entity.
///
/// State is keyed by (remote server, entity kind, local id) so one local
/// entity can be published to several servers.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityKey {
    /// Remote server identifier.
    pub server: String,
    /// Entity kind.
    pub kind: EntityKind,
    /// Local identifier (e.g. item code).
    pub local_id: String,
}

impl EntityKey {
    /// Creates a new entity key.
    pub fn new(server: impl Into<String>, kind: EntityKind, local_id: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            kind,
            local_id: local_id.into(),
        }
    }

    /// Returns the key of the entity that owns this entity's remote id.
    #[must_use]
    pub fn identity_key(&self) -> EntityKey {
        EntityKey {
            server: self.server.clone(),
            kind: self.kind.identity_kind(),
            local_id: self.local_id.clone(),
        }
    }

    /// Returns the serialization key for in-flight sync attempts.
    #[must_use]
    pub fn lock_key(&self) -> LockKey {
        LockKey {
            kind: self.kind,
            local_id: self.local_id.clone(),
        }
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.server, self.kind, self.local_id)
    }
}

/// At most one sync attempt may be in flight per lock key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LockKey {
    /// Entity kind.
    pub kind: EntityKind,
    /// Local identifier.
    pub local_id: String,
}

impl fmt::Display for LockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.local_id)
    }
}

/// Direction of a sync attempt or mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Local store is written to the remote platform.
    LocalToRemote,
    /// Remote platform is written to the local store.
    RemoteToLocal,
    /// Both sides may be written, per-field authority decides.
    #[default]
    Bidirectional,
}

impl Direction {
    /// Returns true if this direction may write to the remote side.
    #[must_use]
    pub const fn writes_remote(self) -> bool {
        matches!(self, Direction::LocalToRemote | Direction::Bidirectional)
    }

    /// Returns true if this direction may write to the local side.
    #[must_use]
    pub const fn writes_local(self) -> bool {
        matches!(self, Direction::RemoteToLocal | Direction::Bidirectional)
    }
}
