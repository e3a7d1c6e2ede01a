//! Item attributes and product variants.
//!
//! A variable product lists each attribute with all of its options; a
//! variation lists each attribute with the one option it was made from.
//! Locally an attribute is a record named by `attribute_name` with a table
//! of `item_attribute_values`.

use crate::record::Record;
use serde_json::{json, Value};
use std::collections::BTreeSet;

/// Local flag marking an item as a variant template.
pub const HAS_VARIANTS_FIELD: &str = "has_variants";

/// Local field naming the template item of a variant.
pub const VARIANT_OF_FIELD: &str = "variant_of";

/// Local table of `{attribute, attribute_value}` rows on an item.
pub const ITEM_ATTRIBUTES_FIELD: &str = "attributes";

/// Remote product type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProductType {
    /// A product without variants.
    Simple,
    /// A product whose variations carry the stock and price.
    Variable,
    /// One variant of a variable product.
    Variation,
}

impl ProductType {
    /// Reads the `type` of a remote product. Unknown types count as simple.
    pub fn of(product: &Record) -> Self {
        match product.get_str("type") {
            Some("variable") => ProductType::Variable,
            Some("variation") => ProductType::Variation,
            _ => ProductType::Simple,
        }
    }

    /// Remote type name.
    pub const fn as_str(self) -> &'static str {
        match self {
            ProductType::Simple => "simple",
            ProductType::Variable => "variable",
            ProductType::Variation => "variation",
        }
    }
}

/// Remote attribute slug: lowercase, spaces replaced by underscores.
pub fn attribute_slug(name: &str) -> String {
    name.to_lowercase().replace(' ', "_")
}

/// One attribute as listed on a remote product.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductAttribute {
    /// Attribute name.
    pub name: String,
    /// Options: every option on a variable product, the chosen one on a variation.
    pub options: Vec<String>,
}

impl ProductAttribute {
    /// Reads the attribute list of a remote product. Entries without a name
    /// are skipped.
    pub fn list(product: &Record) -> Vec<ProductAttribute> {
        let Some(Value::Array(entries)) = product.get("attributes") else {
            return Vec::new();
        };
        entries
            .iter()
            .filter_map(|entry| {
                let name = entry.get("name")?.as_str()?.trim();
                if name.is_empty() {
                    return None;
                }
                let options = match (entry.get("options"), entry.get("option")) {
                    (Some(Value::Array(options)), _) => {
                        options.iter().filter_map(option_text).collect()
                    }
                    (_, Some(option)) => option_text(option).into_iter().collect(),
                    _ => Vec::new(),
                };
                Some(ProductAttribute {
                    name: name.to_string(),
                    options,
                })
            })
            .collect()
    }
}

fn option_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// A local item attribute with its allowed values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemAttribute {
    /// Attribute name, also the local id.
    pub name: String,
    /// Allowed values in order.
    pub values: Vec<String>,
}

impl ItemAttribute {
    /// Creates an attribute.
    pub fn new(name: impl Into<String>, values: Vec<String>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }

    /// Reads a local attribute record stored under `id`.
    pub fn from_local_record(id: &str, record: &Record) -> Self {
        let name = record
            .get_str("attribute_name")
            .filter(|n| !n.is_empty())
            .unwrap_or(id)
            .to_string();
        let values = match record.get("item_attribute_values") {
            Some(Value::Array(rows)) => rows
                .iter()
                .filter_map(|row| row.get("attribute_value").and_then(option_text))
                .collect(),
            _ => Vec::new(),
        };
        Self { name, values }
    }

    /// Renders the local record. Each value's abbreviation is the value
    /// without spaces.
    pub fn to_local_record(&self) -> Record {
        let rows: Vec<Value> = self
            .values
            .iter()
            .map(|value| json!({"attribute_value": value, "abbr": value.replace(' ', "")}))
            .collect();
        Record::new()
            .with("attribute_name", self.name.clone())
            .with("item_attribute_values", Value::Array(rows))
    }

    fn value_set(&self) -> BTreeSet<&str> {
        self.values.iter().map(String::as_str).collect()
    }

    /// Folds the options seen on a remote product into this attribute.
    ///
    /// A variable product lists every option, so differing values are
    /// replaced. A variation names one option, which is added if missing.
    /// Returns the updated attribute, or `None` when nothing changes.
    pub fn upsert(
        existing: Option<&ItemAttribute>,
        seen: &ProductAttribute,
        product_type: ProductType,
    ) -> Option<ItemAttribute> {
        let incoming = ItemAttribute::new(seen.name.clone(), dedup(&seen.options));
        let Some(existing) = existing else {
            return Some(incoming);
        };
        match product_type {
            ProductType::Variation => {
                let mut values = existing.values.clone();
                let mut changed = false;
                for option in incoming.values {
                    if !values.contains(&option) {
                        values.push(option);
                        changed = true;
                    }
                }
                changed.then(|| ItemAttribute::new(existing.name.clone(), values))
            }
            _ => {
                let differs = existing.value_set() != incoming.value_set();
                differs.then(|| ItemAttribute::new(existing.name.clone(), incoming.values))
            }
        }
    }

    /// The attribute entry of a variable product.
    pub fn to_remote_template(&self) -> Value {
        json!({
            "name": self.name,
            "slug": attribute_slug(&self.name),
            "visible": true,
            "variation": true,
            "options": self.values,
        })
    }
}

fn dedup(options: &[String]) -> Vec<String> {
    let mut seen = BTreeSet::new();
    options
        .iter()
        .filter(|o| seen.insert(o.as_str()))
        .cloned()
        .collect()
}

/// The attribute entry of a variation.
pub fn variation_attribute(name: &str, option: &str) -> Value {
    json!({"name": name, "slug": attribute_slug(name), "option": option})
}
