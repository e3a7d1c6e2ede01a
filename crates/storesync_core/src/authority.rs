//! Per-field authority used when both sides changed since the last sync.

use crate::types::EntityKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One side of a sync pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    /// The local inventory system.
    Local,
    /// The remote commerce platform.
    Remote,
}

impl Side {
    /// Returns the other side.
    #[must_use]
    pub const fn opposite(self) -> Side {
        match self {
            Side::Local => Side::Remote,
            Side::Remote => Side::Local,
        }
    }
}

/// Which side owns a field when both sides changed it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Authority {
    /// The local value always wins.
    Local,
    /// The remote value always wins.
    Remote,
    /// The side with the newer modification timestamp wins.
    LatestWins,
}

impl Authority {
    /// Resolves the winning side given each side's last-modified time.
    ///
    /// Under `LatestWins`, a tie or an unknown local timestamp goes to the
    /// remote side.
    pub fn winner(
        self,
        local_modified: Option<DateTime<Utc>>,
        remote_modified: Option<DateTime<Utc>>,
    ) -> Side {
        match self {
            Authority::Local => Side::Local,
            Authority::Remote => Side::Remote,
            Authority::LatestWins => match (local_modified, remote_modified) {
                (Some(local), Some(remote)) if local > remote => Side::Local,
                (Some(_), None) => Side::Local,
                _ => Side::Remote,
            },
        }
    }
}

/// Authority configuration, keyed by entity kind and local field name.
#[derive(Debug, Clone, Default)]
pub struct AuthorityTable {
    overrides: HashMap<(EntityKind, String), Authority>,
}

impl AuthorityTable {
    /// Creates a table with only the built-in defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Default authority for every field of `kind`.
    ///
    /// Stock and price are owned by the local system; catalog fields go to
    /// whichever side edited last; tax, shipping and attribute rows are
    /// remote-owned.
    #[must_use]
    pub const fn default_for(kind: EntityKind) -> Authority {
        match kind {
            EntityKind::Item => Authority::LatestWins,
            EntityKind::StockLevel | EntityKind::Price => Authority::Local,
            EntityKind::TaxRule | EntityKind::ShippingMethod | EntityKind::ItemAttribute => {
                Authority::Remote
            }
        }
    }

    /// Sets the authority for one field.
    pub fn set(&mut self, kind: EntityKind, local_field: impl Into<String>, authority: Authority) {
        self.overrides.insert((kind, local_field.into()), authority);
    }

    /// Builder form of [`AuthorityTable::set`].
    #[must_use]
    pub fn with_override(
        mut self,
        kind: EntityKind,
        local_field: impl Into<String>,
        authority: Authority,
    ) -> Self {
        self.set(kind, local_field, authority);
        self
    }

    /// Returns the authority for a field.
    pub fn authority_for(&self, kind: EntityKind, local_field: &str) -> Authority {
        self.overrides
            .get(&(kind, local_field.to_string()))
            .copied()
            .unwrap_or(Self::default_for(kind))
    }

    /// Returns the side that wins a two-sided conflict on a field.
    pub fn resolve(
        &self,
        kind: EntityKind,
        local_field: &str,
        local_modified: Option<DateTime<Utc>>,
        remote_modified: Option<DateTime<Utc>>,
    ) -> Side {
        self.authority_for(kind, local_field)
            .winner(local_modified, remote_modified)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn defaults_per_kind() {
        let table = AuthorityTable::new();
        assert_eq!(table.authority_for(EntityKind::StockLevel, "actual_qty"), Authority::Local);
        assert_eq!(table.authority_for(EntityKind::Item, "item_name"), Authority::LatestWins);
        assert_eq!(table.authority_for(EntityKind::TaxRule, "rate"), Authority::Remote);
    }

    #[test]
    fn override_applies_to_single_field() {
        let table = AuthorityTable::new().with_override(EntityKind::Item, "description", Authority::Remote);
        assert_eq!(table.authority_for(EntityKind::Item, "description"), Authority::Remote);
        assert_eq!(table.authority_for(EntityKind::Item, "item_name"), Authority::LatestWins);
    }

    #[test]
    fn latest_wins_uses_timestamps() {
        let now = Utc::now();
        let earlier = now - Duration::minutes(5);
        let a = Authority::LatestWins;
        assert_eq!(a.winner(Some(now), Some(earlier)), Side::Local);
        assert_eq!(a.winner(Some(earlier), Some(now)), Side::Remote);
        assert_eq!(a.winner(Some(now), Some(now)), Side::Remote);
        assert_eq!(a.winner(None, Some(now)), Side::Remote);
        assert_eq!(a.winner(Some(now), None), Side::Local);
    }

    #[test]
    fn fixed_authority_ignores_timestamps() {
        let now = Utc::now();
        let later = now + Duration::hours(1);
        assert_eq!(Authority::Local.winner(Some(now), Some(later)), Side::Local);
        assert_eq!(Authority::Remote.winner(Some(later), Some(now)), Side::Remote);
        assert_eq!(Side::Local.opposite(), Side::Remote);
    }
}
