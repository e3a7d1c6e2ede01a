//! Tax rules and the account-preserving merge.

use crate::error::{CoreError, CoreResult};
use crate::record::Record;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Tax classes every remote store has, used when the remote lists none.
pub const DEFAULT_TAX_CLASSES: [&str; 3] = ["standard", "reduced-rate", "zero-rate"];

/// Wildcard used for "all countries" / "all states".
const ANY_REGION: &str = "*";

/// A remote tax class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxClass {
    /// Machine name, e.g. `reduced-rate`.
    pub slug: String,
    /// Display name.
    pub name: String,
}

impl TaxClass {
    /// Builds a class from its slug, deriving a display name.
    pub fn from_slug(slug: &str) -> Self {
        let name = slug
            .split('-')
            .map(|word| {
                let mut chars = word.chars();
                match chars.next() {
                    Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                    None => String::new(),
                }
            })
            .collect::<Vec<_>>()
            .join(" ");
        Self {
            slug: slug.to_string(),
            name,
        }
    }

    /// The built-in classes.
    pub fn defaults() -> Vec<TaxClass> {
        DEFAULT_TAX_CLASSES.iter().map(|s| Self::from_slug(s)).collect()
    }
}

/// A remote-owned tax rule mirrored locally with a local account reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxRule {
    /// Remote tax id.
    pub id: u64,
    /// Rule name.
    pub name: String,
    /// ISO country code, or `*`.
    pub country: String,
    /// State code, or `*`.
    pub state: String,
    /// Percentage rate.
    pub rate: f64,
    /// Tax class slug.
    pub class: String,
    /// Priority.
    pub priority: i64,
    /// Whether the rate is compounded.
    pub compound: bool,
    /// Whether the rate applies to shipping.
    pub shipping: bool,
    /// Local ledger account; never taken from the remote side.
    #[serde(default)]
    pub account: Option<String>,
}

impl TaxRule {
    /// Builds a rule from a record in the local schema.
    ///
    /// Numeric strings are accepted for `rate`, empty regions normalize to
    /// `*`, and negative rates are rejected.
    pub fn from_local_record(record: &Record) -> CoreResult<Self> {
        let id = record
            .get_f64("woocommerce_tax_id")
            .filter(|id| *id >= 0.0 && id.fract() == 0.0)
            .ok_or_else(|| CoreError::validation("woocommerce_tax_id", "missing or not an id"))?
            as u64;
        let rate = record
            .get_f64("rate")
            .ok_or_else(|| CoreError::validation("rate", "missing or not a number"))?;
        if rate < 0.0 || !rate.is_finite() {
            return Err(CoreError::validation("rate", format!("rate {rate} must not be negative")));
        }
        let region = |field: &str| match record.get_str(field).map(str::trim) {
            Some(value) if !value.is_empty() => value.to_string(),
            _ => ANY_REGION.to_string(),
        };

        Ok(Self {
            id,
            name: record
                .get_str("woocommerce_tax_name")
                .unwrap_or_default()
                .to_string(),
            country: region("country"),
            state: region("state"),
            rate,
            class: record
                .get_str("tax_class")
                .filter(|c| !c.is_empty())
                .unwrap_or(DEFAULT_TAX_CLASSES[0])
                .to_string(),
            priority: record.get_f64("priority").map_or(1, |p| p as i64),
            compound: record.get_bool("compound").unwrap_or(false),
            shipping: record.get_bool("shipping").unwrap_or(true),
            account: record
                .get_str("account")
                .filter(|a| !a.is_empty())
                .map(str::to_string),
        })
    }

    /// Converts the rule into a record in the local schema.
    pub fn to_local_record(&self) -> Record {
        let mut record = Record::new()
            .with("woocommerce_tax_id", self.id)
            .with("woocommerce_tax_name", self.name.clone())
            .with("country", self.country.clone())
            .with("state", self.state.clone())
            .with("rate", self.rate)
            .with("tax_class", self.class.clone())
            .with("priority", self.priority)
            .with("compound", self.compound)
            .with("shipping", self.shipping);
        if let Some(account) = &self.account {
            record.insert("account", account.clone());
        }
        record
    }

    /// Local key of this row.
    pub fn local_id(&self) -> String {
        self.id.to_string()
    }

    /// Copies every remote-owned field from `remote`, keeping the account.
    fn update_from(&mut self, remote: &TaxRule) {
        let account = self.account.take();
        *self = TaxRule {
            account,
            ..remote.clone()
        };
    }

    fn same_remote_fields(&self, other: &TaxRule) -> bool {
        self.name == other.name
            && self.country == other.country
            && self.state == other.state
            && self.rate == other.rate
            && self.class == other.class
            && self.priority == other.priority
            && self.compound == other.compound
            && self.shipping == other.shipping
    }
}

/// Result of [`merge_tax_rules`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaxMergeOutcome {
    /// The merged table: existing rows in their original order, then inserts.
    pub rows: Vec<TaxRule>,
    /// Remote ids inserted as new rows.
    pub inserted: Vec<u64>,
    /// Remote ids whose fields changed.
    pub updated: Vec<u64>,
    /// Remote ids that were already identical.
    pub unchanged: Vec<u64>,
}

impl TaxMergeOutcome {
    /// Returns true if the merge changed nothing.
    pub fn is_noop(&self) -> bool {
        self.inserted.is_empty() && self.updated.is_empty()
    }
}

/// Merges remote tax rows into the local table, keyed by remote tax id.
///
/// Matched rows take every remote field except the account reference.
/// New rows get `fallback_account`. Local rows with no remote counterpart
/// are kept as they are.
pub fn merge_tax_rules(
    existing: &[TaxRule],
    remote: &[TaxRule],
    fallback_account: Option<&str>,
) -> TaxMergeOutcome {
    let mut outcome = TaxMergeOutcome {
        rows: existing.to_vec(),
        ..TaxMergeOutcome::default()
    };
    let mut position: HashMap<u64, usize> = HashMap::new();
    for (i, row) in outcome.rows.iter().enumerate() {
        position.entry(row.id).or_insert(i);
    }

    for incoming in remote {
        match position.get(&incoming.id) {
            Some(&i) => {
                let row = &mut outcome.rows[i];
                if row.same_remote_fields(incoming) {
                    outcome.unchanged.push(incoming.id);
                } else {
                    row.update_from(incoming);
                    outcome.updated.push(incoming.id);
                }
            }
            None => {
                position.insert(incoming.id, outcome.rows.len());
                outcome.rows.push(TaxRule {
                    account: fallback_account.map(str::to_string),
                    ..incoming.clone()
                });
                outcome.inserted.push(incoming.id);
            }
        }
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn rule(id: u64, name: &str, rate: f64) -> TaxRule {
        TaxRule {
            id,
            name: name.to_string(),
            country: "ZA".to_string(),
            state: "*".to_string(),
            rate,
            class: "standard".to_string(),
            priority: 1,
            compound: false,
            shipping: true,
            account: None,
        }
    }

    #[test]
    fn merge_preserves_account_on_update() {
        let local = TaxRule {
            account: Some("2100 - VAT Payable".to_string()),
            ..rule(1, "Sales Tax", 14.0)
        };
        let remote = rule(1, "VAT", 15.0);

        let outcome = merge_tax_rules(&[local], &[remote], Some("2200 - Fallback"));
        assert_eq!(outcome.updated, vec![1]);
        let row = &outcome.rows[0];
        assert_eq!(row.name, "VAT");
        assert_eq!(row.rate, 15.0);
        assert_eq!(row.account.as_deref(), Some("2100 - VAT Payable"));
    }

    #[test]
    fn merge_inserts_with_fallback_account() {
        let outcome = merge_tax_rules(&[], &[rule(7, "Reduced", 5.0)], Some("2200 - Tax"));
        assert_eq!(outcome.inserted, vec![7]);
        assert_eq!(outcome.rows[0].account.as_deref(), Some("2200 - Tax"));
    }

    #[test]
    fn merge_leaves_local_only_rows() {
        let local_only = TaxRule {
            account: Some("2300".to_string()),
            ..rule(99, "Legacy", 10.0)
        };
        let outcome = merge_tax_rules(&[local_only.clone()], &[rule(1, "VAT", 15.0)], None);
        assert_eq!(outcome.rows[0], local_only);
        assert_eq!(outcome.rows.len(), 2);
    }

    #[test]
    fn identical_rows_are_unchanged() {
        let outcome = merge_tax_rules(&[rule(1, "VAT", 15.0)], &[rule(1, "VAT", 15.0)], None);
        assert!(outcome.is_noop());
        assert_eq!(outcome.unchanged, vec![1]);
    }

    #[test]
    fn local_record_normalization() {
        let record = Record::from_json(json!({
            "woocommerce_tax_id": 1,
            "woocommerce_tax_name": "VAT",
            "rate": "15.0000",
            "country": "",
            "tax_class": "",
        }));
        let rule = TaxRule::from_local_record(&record).unwrap();
        assert_eq!(rule.rate, 15.0);
        assert_eq!(rule.country, "*");
        assert_eq!(rule.state, "*");
        assert_eq!(rule.class, "standard");
    }

    #[test]
    fn negative_rate_rejected() {
        let record = Record::from_json(json!({"woocommerce_tax_id": 456, "rate": -10.0}));
        let err = TaxRule::from_local_record(&record).unwrap_err();
        assert_eq!(err.field(), Some("rate"));
    }

    #[test]
    fn default_classes_have_names() {
        let classes = TaxClass::defaults();
        assert_eq!(classes.len(), 3);
        assert_eq!(classes[1].name, "Reduced Rate");
    }

    fn arb_rule() -> impl Strategy<Value = TaxRule> {
        (0u64..20, "[A-Z]{2,6}", 0u32..3000, "[A-Z]{2}", prop::option::of("[0-9]{4} - [A-Za-z ]{3,10}"))
            .prop_map(|(id, name, rate, country, account)| TaxRule {
                country,
                account,
                ..rule(id, &name, f64::from(rate) / 100.0)
            })
    }

    proptest! {
        #[test]
        fn existing_accounts_survive_merge(
            local in prop::collection::vec(arb_rule(), 0..10),
            remote in prop::collection::vec(arb_rule(), 0..10),
        ) {
            let outcome = merge_tax_rules(&local, &remote, Some("fallback"));
            for (i, before) in local.iter().enumerate() {
                prop_assert_eq!(&outcome.rows[i].account, &before.account);
                prop_assert_eq!(outcome.rows[i].id, before.id);
            }
        }
    }
}
