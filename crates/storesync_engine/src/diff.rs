//! Field-level diff between the local and remote representations.
//!
//! Both sides are compared in the remote schema. A side has changed when
//! its hash differs from the hash recorded by the last successful sync.
//! For each mapped field whose values differ, the winner is the only side
//! that changed; when both changed, the authority table decides. A forced
//! sync has no baseline, so every differing field goes to authority.

use chrono::{DateTime, Utc};
use storesync_core::{
    values_equal, AuthorityTable, ContentHash, Direction, EntityKind, FieldMapping, Record, Side,
};

/// Everything the diff needs, borrowed from the running attempt.
#[derive(Debug)]
pub struct DiffInput<'a> {
    /// Local→remote mapping of the entity kind.
    pub mapping: &'a FieldMapping,
    /// Local record translated into the remote schema.
    pub local: &'a Record,
    /// Remote record projected onto the mapped remote fields.
    pub remote: &'a Record,
    /// Hash recorded by the last successful sync.
    pub last_hash: Option<ContentHash>,
    /// When the local record was last modified.
    pub local_modified: Option<DateTime<Utc>>,
    /// When the remote record was last modified.
    pub remote_modified: Option<DateTime<Utc>>,
    /// Sides that may be written.
    pub direction: Direction,
    /// Field authority.
    pub authority: &'a AuthorityTable,
}

/// Winner of one differing field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDecision {
    /// Remote field name.
    pub field: String,
    /// Side whose value is kept.
    pub winner: Side,
}

/// Writes needed to bring both sides to the merged record.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SyncPlan {
    /// Fields to update remotely (remote schema).
    pub remote_update: Record,
    /// Fields to update locally (remote schema; inverse-map before writing).
    pub local_update: Record,
    /// Expected state of both sides after the writes.
    pub merged: Record,
    /// One decision per differing field.
    pub decisions: Vec<FieldDecision>,
    /// Whether the local side changed since the last sync.
    pub local_changed: bool,
    /// Whether the remote side changed since the last sync.
    pub remote_changed: bool,
}

impl SyncPlan {
    /// Returns true if no write is needed.
    pub fn is_noop(&self) -> bool {
        self.remote_update.is_empty() && self.local_update.is_empty()
    }

    /// Hash to record once every write has applied.
    pub fn merged_hash(&self) -> ContentHash {
        self.merged.content_hash()
    }
}

/// Computes the writes for one entity.
pub fn plan(input: &DiffInput<'_>) -> SyncPlan {
    let local_changed = input.last_hash != Some(input.local.content_hash());
    let remote_changed = input.last_hash != Some(input.remote.content_hash());
    let kind = input.mapping.kind();

    let mut plan = SyncPlan {
        local_changed,
        remote_changed,
        ..SyncPlan::default()
    };

    for rule in input.mapping.rules() {
        let field = rule.remote.as_str();
        let local = input.local.get(field);
        let remote = input.remote.get(field);

        let equal = match (local, remote) {
            (Some(l), Some(r)) => values_equal(l, r),
            (None, None) => true,
            _ => false,
        };
        if equal {
            if let Some(value) = local {
                plan.merged.insert(field, value.clone());
            }
            continue;
        }

        let winner = winner(input, kind, &rule.local, local_changed, remote_changed);
        let (value, update) = match winner {
            Side::Local => (local, &mut plan.remote_update),
            Side::Remote => (remote, &mut plan.local_update),
        };
        // A winner without a value never erases the other side
        match value {
            Some(value) if !value.is_null() => {
                update.insert(field, value.clone());
                plan.merged.insert(field, value.clone());
            }
            _ => continue,
        }
        plan.decisions.push(FieldDecision {
            field: field.to_string(),
            winner,
        });
    }
    plan
}

fn winner(
    input: &DiffInput<'_>,
    kind: EntityKind,
    local_field: &str,
    local_changed: bool,
    remote_changed: bool,
) -> Side {
    match input.direction {
        Direction::LocalToRemote => Side::Local,
        Direction::RemoteToLocal => Side::Remote,
        Direction::Bidirectional => match (local_changed, remote_changed) {
            (true, false) => Side::Local,
            (false, true) => Side::Remote,
            _ => input.authority.resolve(
                kind,
                local_field,
                input.local_modified,
                input.remote_modified,
            ),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;
    use storesync_core::{Authority, FieldMapper};

    struct Case {
        mapping: FieldMapping,
        authority: AuthorityTable,
    }

    impl Case {
        fn item() -> Self {
            Self {
                mapping: FieldMapper::with_defaults().resolve(EntityKind::Item, Direction::LocalToRemote),
                authority: AuthorityTable::new(),
            }
        }

        fn plan(
            &self,
            local: &Record,
            remote: &Record,
            last: Option<&Record>,
            newer: Side,
            direction: Direction,
        ) -> SyncPlan {
            let now = Utc::now();
            let (lm, rm) = match newer {
                Side::Local => (now, now - Duration::minutes(5)),
                Side::Remote => (now - Duration::minutes(5), now),
            };
            plan(&DiffInput {
                mapping: &self.mapping,
                local,
                remote,
                last_hash: last.map(Record::content_hash),
                local_modified: Some(lm),
                remote_modified: Some(rm),
                direction,
                authority: &self.authority,
            })
        }
    }

    fn product(name: &str, description: &str) -> Record {
        Record::from_json(json!({"name": name, "description": description, "manage_stock": true}))
    }

    #[test]
    fn unchanged_sides_need_no_writes() {
        let case = Case::item();
        let base = product("Mug", "Blue");
        let plan = case.plan(&base, &base, Some(&base), Side::Remote, Direction::Bidirectional);
        assert!(plan.is_noop());
        assert!(!plan.local_changed && !plan.remote_changed);
        assert_eq!(plan.merged_hash(), base.content_hash());
    }

    #[test]
    fn only_changed_side_wins() {
        let case = Case::item();
        let base = product("Mug", "Blue");
        let local = product("Mug XL", "Blue");

        // Remote is newer, but only local changed
        let plan = case.plan(&local, &base, Some(&base), Side::Remote, Direction::Bidirectional);
        assert_eq!(plan.remote_update, Record::new().with("name", "Mug XL"));
        assert!(plan.local_update.is_empty());
        assert_eq!(plan.merged_hash(), local.content_hash());
    }

    #[test]
    fn both_changed_latest_wins_per_field() {
        let case = Case::item();
        let base = product("Mug", "Blue");
        let local = product("Mug XL", "Blue");
        let remote = product("Mug", "Red");

        let plan = case.plan(&local, &remote, Some(&base), Side::Local, Direction::Bidirectional);
        assert_eq!(
            plan.remote_update,
            Record::new().with("name", "Mug XL").with("description", "Blue")
        );
        assert!(plan.local_update.is_empty());

        let plan = case.plan(&local, &remote, Some(&base), Side::Remote, Direction::Bidirectional);
        assert_eq!(
            plan.local_update,
            Record::new().with("name", "Mug").with("description", "Red")
        );
    }

    #[test]
    fn authority_override_beats_timestamps() {
        let mut case = Case::item();
        case.authority = AuthorityTable::new().with_override(EntityKind::Item, "description", Authority::Local);
        let base = product("Mug", "Blue");
        let local = product("Mug", "Green");
        let remote = product("Mug", "Red");

        let plan = case.plan(&local, &remote, Some(&base), Side::Remote, Direction::Bidirectional);
        assert_eq!(plan.remote_update, Record::new().with("description", "Green"));
    }

    #[test]
    fn exact_tie_goes_to_remote() {
        let case = Case::item();
        let local = product("A", "x");
        let remote = product("B", "x");
        let at = Some(Utc::now());
        let plan = plan(&DiffInput {
            mapping: &case.mapping,
            local: &local,
            remote: &remote,
            last_hash: None,
            local_modified: at,
            remote_modified: at,
            direction: Direction::Bidirectional,
            authority: &case.authority,
        });
        assert_eq!(plan.local_update, Record::new().with("name", "B"));
    }

    #[test]
    fn direction_pins_the_winner() {
        let case = Case::item();
        let base = product("Mug", "Blue");
        let remote = product("Cup", "Blue");
        let plan = case.plan(&base, &remote, Some(&base), Side::Remote, Direction::LocalToRemote);
        assert_eq!(plan.remote_update, Record::new().with("name", "Mug"));
        assert!(plan.local_update.is_empty());
    }

    #[test]
    fn missing_winner_value_is_not_written() {
        let case = Case::item();
        let local = Record::from_json(json!({"name": "Mug", "manage_stock": true}));
        let remote = product("Mug", "Blue");
        let plan = case.plan(&local, &remote, None, Side::Local, Direction::LocalToRemote);
        assert!(plan.is_noop());
        assert!(!plan.merged.has("description"));
    }

    #[test]
    fn numerically_equal_values_match() {
        let mapping = FieldMapper::with_defaults().resolve(EntityKind::StockLevel, Direction::LocalToRemote);
        let authority = AuthorityTable::new();
        let local = Record::new().with("stock_quantity", 5.0);
        let remote = Record::new().with("stock_quantity", 5);
        let plan = plan(&DiffInput {
            mapping: &mapping,
            local: &local,
            remote: &remote,
            last_hash: None,
            local_modified: None,
            remote_modified: None,
            direction: Direction::LocalToRemote,
            authority: &authority,
        });
        assert!(plan.is_noop());
    }
}
