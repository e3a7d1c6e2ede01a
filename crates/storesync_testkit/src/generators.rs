//! Property-based test generators using proptest.
//!
//! Provides strategies for generating local records and remote rows
//! that satisfy the field mapping's requirements.

use proptest::prelude::*;
use storesync_core::{Record, TaxRule};
use storesync_engine::SERVERS_FIELD;

use crate::fixtures::SHOP;

/// Strategy for generating item codes.
pub fn item_code_strategy() -> impl Strategy<Value = String> {
    (1u32..100_000).prop_map(|n| format!("ITEM-{n:05}"))
}

/// Strategy for generating non-empty item names.
pub fn item_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[A-Z][a-z]{2,12}( [A-Z][a-z]{1,8}){0,2}").expect("Invalid regex")
}

/// Strategy for generating local items published to the test server.
pub fn item_record_strategy() -> impl Strategy<Value = Record> {
    (
        item_name_strategy(),
        prop::option::of(prop::string::string_regex("[a-z ]{0,40}").expect("Invalid regex")),
        any::<bool>(),
    )
        .prop_map(|(name, description, stock)| {
            let mut record = Record::new()
                .with("item_name", name)
                .with("is_stock_item", u8::from(stock))
                .with(SERVERS_FIELD, serde_json::json!([SHOP]));
            if let Some(description) = description {
                record.insert("description", description);
            }
            record
        })
}

/// Strategy for generating price rates with two decimals.
pub fn rate_strategy() -> impl Strategy<Value = f64> {
    (0u32..1_000_000).prop_map(|cents| f64::from(cents) / 100.0)
}

/// Strategy for generating valid tax rules with distinct ids.
pub fn tax_rules_strategy(max: usize) -> impl Strategy<Value = Vec<TaxRule>> {
    prop::collection::btree_map(1u64..500, tax_rule_fields(), 0..max).prop_map(|rows| {
        rows.into_iter()
            .map(|(id, (name, rate, country, compound))| TaxRule {
                id,
                name,
                country,
                state: "*".to_string(),
                rate,
                class: "standard".to_string(),
                priority: 1,
                compound,
                shipping: true,
                account: None,
            })
            .collect()
    })
}

fn tax_rule_fields() -> impl Strategy<Value = (String, f64, String, bool)> {
    (
        prop::string::string_regex("[A-Z]{2,5}").expect("Invalid regex"),
        (0u32..3000).prop_map(|bp| f64::from(bp) / 100.0),
        prop::sample::select(vec!["ZA", "US", "DE", "*"]).prop_map(str::to_string),
        any::<bool>(),
    )
}

/// Strategy for generating ledger account names.
pub fn account_strategy() -> impl Strategy<Value = String> {
    (1000u32..9999, prop::string::string_regex("[A-Z][a-z]{3,10}").expect("Invalid regex"))
        .prop_map(|(number, name)| format!("{number} - {name}"))
}
