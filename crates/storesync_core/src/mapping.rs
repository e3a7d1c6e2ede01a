//! Field mapping between local and remote schemas.
//!
//! A [`FieldMapping`] is an ordered list of `(local, remote, transform)` rules
//! for one entity kind, stored in the local→remote orientation. The inverse
//! orientation is derived by swapping names and inverting each transform, so
//! a record mapped out and back again reproduces its mapped fields.

use crate::error::{CoreError, CoreResult};
use crate::images::{image_src, image_urls, is_image_url, IMAGES_FIELD};
use crate::record::Record;
use crate::types::{Direction, EntityKind};
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};
use std::collections::{HashMap, HashSet};

/// A pure value conversion applied while copying a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transform {
    /// Copy the value unchanged.
    #[default]
    Identity,
    /// Render a number as a decimal string (`12.5` → `"12.5"`).
    NumberToString,
    /// Parse a decimal string into a number (`"12.5"` → `12.5`).
    StringToNumber,
    /// Convert a 0/1 flag into a boolean.
    IntToBool,
    /// Convert a boolean into a 0/1 flag.
    BoolToInt,
    /// Turn a list of image URLs into `[{"src": url}]`, dropping duplicates
    /// and non-image files.
    UrlsToImages,
    /// Turn `[{"src": url}]` back into a list of URLs.
    ImagesToUrls,
}

impl Transform {
    /// Returns the transform name used in error messages.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Transform::Identity => "identity",
            Transform::NumberToString => "number_to_string",
            Transform::StringToNumber => "string_to_number",
            Transform::IntToBool => "int_to_bool",
            Transform::BoolToInt => "bool_to_int",
            Transform::UrlsToImages => "urls_to_images",
            Transform::ImagesToUrls => "images_to_urls",
        }
    }

    /// Returns the transform that undoes this one.
    #[must_use]
    pub const fn inverse(self) -> Transform {
        match self {
            Transform::Identity => Transform::Identity,
            Transform::NumberToString => Transform::StringToNumber,
            Transform::StringToNumber => Transform::NumberToString,
            Transform::IntToBool => Transform::BoolToInt,
            Transform::BoolToInt => Transform::IntToBool,
            Transform::UrlsToImages => Transform::ImagesToUrls,
            Transform::ImagesToUrls => Transform::UrlsToImages,
        }
    }

    /// Converts a value. Null passes through every transform.
    pub fn apply(self, field: &str, value: &Value) -> CoreResult<Value> {
        if value.is_null() {
            return Ok(Value::Null);
        }
        let fail = |reason: &str| CoreError::Transform {
            transform: self.name(),
            field: field.to_string(),
            reason: reason.to_string(),
        };

        match self {
            Transform::Identity => Ok(value.clone()),
            Transform::NumberToString => match value {
                Value::Number(n) => Ok(Value::String(n.to_string())),
                Value::String(_) => Ok(value.clone()),
                _ => Err(fail("expected a number")),
            },
            Transform::StringToNumber => match value {
                Value::String(s) => parse_number(s.trim()).ok_or_else(|| fail("not a number")),
                Value::Number(_) => Ok(value.clone()),
                _ => Err(fail("expected a numeric string")),
            },
            Transform::IntToBool => match value {
                Value::Bool(_) => Ok(value.clone()),
                Value::Number(n) => match n.as_i64() {
                    Some(0) => Ok(Value::Bool(false)),
                    Some(1) => Ok(Value::Bool(true)),
                    _ => Err(fail("expected 0 or 1")),
                },
                _ => Err(fail("expected 0 or 1")),
            },
            Transform::BoolToInt => match value {
                Value::Bool(b) => Ok(Value::Number(Number::from(u8::from(*b)))),
                Value::Number(_) => Ok(value.clone()),
                _ => Err(fail("expected a boolean")),
            },
            Transform::UrlsToImages => match value {
                Value::Array(_) | Value::String(_) => Ok(Value::Array(
                    image_urls(value)
                        .into_iter()
                        .map(|src| serde_json::json!({ "src": src }))
                        .collect(),
                )),
                _ => Err(fail("expected a list of image URLs")),
            },
            Transform::ImagesToUrls => match value {
                Value::Array(entries) => Ok(Value::Array(
                    entries
                        .iter()
                        .filter_map(image_src)
                        .filter(|src| is_image_url(src))
                        .map(Value::from)
                        .collect(),
                )),
                _ => Err(fail("expected a list of images")),
            },
        }
    }
}

fn parse_number(s: &str) -> Option<Value> {
    if let Ok(i) = s.parse::<i64>() {
        return Some(Value::Number(Number::from(i)));
    }
    s.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(Value::Number)
}

/// One mapped field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldRule {
    /// Local field name.
    pub local: String,
    /// Remote field name.
    pub remote: String,
    /// Conversion applied local → remote.
    #[serde(default)]
    pub transform: Transform,
    /// Whether the source record must carry this field.
    #[serde(default)]
    pub required: bool,
}

impl FieldRule {
    /// Creates an optional identity rule.
    pub fn new(local: impl Into<String>, remote: impl Into<String>) -> Self {
        Self {
            local: local.into(),
            remote: remote.into(),
            transform: Transform::Identity,
            required: false,
        }
    }

    /// Sets the transform.
    #[must_use]
    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = transform;
        self
    }

    /// Marks the rule as required.
    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

/// Static schema of required fields and default rules per entity kind.
pub struct EntitySchema;

impl EntitySchema {
    /// Local fields that every mapping for `kind` must map.
    #[must_use]
    pub fn required_fields(kind: EntityKind) -> &'static [&'static str] {
        match kind {
            EntityKind::Item => &["item_name"],
            EntityKind::StockLevel => &["actual_qty"],
            EntityKind::Price => &["price_list_rate"],
            EntityKind::TaxRule => &["woocommerce_tax_id", "woocommerce_tax_name", "rate"],
            EntityKind::ShippingMethod => &["wc_shipping_method_title"],
            EntityKind::ItemAttribute => &["attribute_name"],
        }
    }

    /// Default rules for `kind`, in local→remote orientation.
    pub fn default_rules(kind: EntityKind) -> Vec<FieldRule> {
        match kind {
            EntityKind::Item => vec![
                FieldRule::new("item_name", "name").required(),
                FieldRule::new("description", "description"),
                FieldRule::new("is_stock_item", "manage_stock").with_transform(Transform::IntToBool),
                FieldRule::new(IMAGES_FIELD, IMAGES_FIELD).with_transform(Transform::UrlsToImages),
            ],
            EntityKind::StockLevel => {
                vec![FieldRule::new("actual_qty", "stock_quantity").required()]
            }
            EntityKind::Price => vec![FieldRule::new("price_list_rate", "regular_price")
                .with_transform(Transform::NumberToString)
                .required()],
            EntityKind::TaxRule => vec![
                FieldRule::new("woocommerce_tax_id", "id").required(),
                FieldRule::new("woocommerce_tax_name", "name").required(),
                FieldRule::new("country", "country"),
                FieldRule::new("state", "state"),
                FieldRule::new("rate", "rate")
                    .with_transform(Transform::NumberToString)
                    .required(),
                FieldRule::new("tax_class", "class"),
                FieldRule::new("priority", "priority"),
                FieldRule::new("compound", "compound"),
                FieldRule::new("shipping", "shipping"),
            ],
            EntityKind::ShippingMethod => vec![
                FieldRule::new("wc_shipping_method_title", "title").required(),
                FieldRule::new("wc_shipping_method_id", "method_id"),
            ],
            EntityKind::ItemAttribute => vec![FieldRule::new("attribute_name", "name").required()],
        }
    }
}

/// Ordered field mapping for one entity kind and direction.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldMapping {
    kind: EntityKind,
    direction: Direction,
    rules: Vec<FieldRule>,
}

impl FieldMapping {
    /// Creates a local→remote mapping, validating name uniqueness.
    pub fn new(kind: EntityKind, rules: Vec<FieldRule>) -> CoreResult<Self> {
        let mapping = Self {
            kind,
            direction: Direction::LocalToRemote,
            rules,
        };
        mapping.validate()?;
        Ok(mapping)
    }

    /// Creates the default mapping for `kind`.
    pub fn default_for(kind: EntityKind) -> Self {
        Self {
            kind,
            direction: Direction::LocalToRemote,
            rules: EntitySchema::default_rules(kind),
        }
    }

    /// Returns a copy with extra rules; a rule replaces any default for the
    /// same local field.
    pub fn with_overrides(&self, extra: &[FieldRule]) -> CoreResult<Self> {
        let mut rules = self.rules.clone();
        for rule in extra {
            match rules.iter_mut().find(|r| r.local == rule.local) {
                Some(existing) => {
                    let required = existing.required;
                    *existing = rule.clone();
                    existing.required |= required;
                }
                None => rules.push(rule.clone()),
            }
        }
        let mapping = Self {
            kind: self.kind,
            direction: self.direction,
            rules,
        };
        mapping.validate()?;
        Ok(mapping)
    }

    /// Checks that field names are unique on both sides and that every
    /// schema-required local field is mapped.
    pub fn validate(&self) -> CoreResult<()> {
        let mut local = HashSet::new();
        let mut remote = HashSet::new();
        for rule in &self.rules {
            if !local.insert(rule.local.as_str()) {
                return Err(CoreError::DuplicateField {
                    kind: self.kind.to_string(),
                    side: "local",
                    field: rule.local.clone(),
                });
            }
            // The inverse mapping is keyed by remote name
            if !remote.insert(rule.remote.as_str()) {
                return Err(CoreError::DuplicateField {
                    kind: self.kind.to_string(),
                    side: "remote",
                    field: rule.remote.clone(),
                });
            }
        }
        for required in EntitySchema::required_fields(self.kind) {
            if !local.contains(required) {
                return Err(CoreError::MissingRequiredMapping {
                    kind: self.kind.to_string(),
                    field: (*required).to_string(),
                });
            }
        }
        Ok(())
    }

    /// Entity kind this mapping applies to.
    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    /// Orientation of this mapping.
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Rules in order (always stored local→remote).
    pub fn rules(&self) -> &[FieldRule] {
        &self.rules
    }

    /// Returns the mapping in the opposite orientation.
    #[must_use]
    pub fn inverse(&self) -> Self {
        let direction = match self.direction {
            Direction::RemoteToLocal => Direction::LocalToRemote,
            _ => Direction::RemoteToLocal,
        };
        Self {
            kind: self.kind,
            direction,
            rules: self.rules.clone(),
        }
    }

    fn endpoints<'a>(&self, rule: &'a FieldRule) -> (&'a str, &'a str, Transform) {
        match self.direction {
            Direction::RemoteToLocal => (
                rule.remote.as_str(),
                rule.local.as_str(),
                rule.transform.inverse(),
            ),
            _ => (rule.local.as_str(), rule.remote.as_str(), rule.transform),
        }
    }

    /// Field names read from the source record, in rule order.
    pub fn source_fields(&self) -> impl Iterator<Item = &str> {
        self.rules.iter().map(|r| self.endpoints(r).0)
    }

    /// Field names written to the target record, in rule order.
    pub fn target_fields(&self) -> impl Iterator<Item = &str> {
        self.rules.iter().map(|r| self.endpoints(r).1)
    }

    /// Translates `source` into the target schema.
    ///
    /// Unmapped source fields are ignored. A required field that is absent
    /// (or null) fails with a validation error naming that field.
    pub fn apply(&self, source: &Record) -> CoreResult<Record> {
        let mut target = Record::new();
        for rule in &self.rules {
            let (from, to, transform) = self.endpoints(rule);
            match source.get(from) {
                Some(value) if !value.is_null() => {
                    target.insert(to, transform.apply(from, value)?);
                }
                _ if rule.required => {
                    return Err(CoreError::validation(from, "required field is missing"));
                }
                Some(_) => {
                    target.insert(to, Value::Null);
                }
                None => {}
            }
        }
        Ok(target)
    }

    /// Translates whichever mapped fields `source` carries, without
    /// enforcing required fields. Used for field-level updates.
    pub fn apply_partial(&self, source: &Record) -> CoreResult<Record> {
        let mut target = Record::new();
        for rule in &self.rules {
            let (from, to, transform) = self.endpoints(rule);
            if let Some(value) = source.get(from) {
                target.insert(to, transform.apply(from, value)?);
            }
        }
        Ok(target)
    }
}

/// Holds the active mapping for every entity kind.
#[derive(Debug, Clone)]
pub struct FieldMapper {
    mappings: HashMap<EntityKind, FieldMapping>,
}

impl FieldMapper {
    /// Creates a mapper with the default mapping for every kind.
    pub fn with_defaults() -> Self {
        Self {
            mappings: EntityKind::ALL
                .into_iter()
                .map(|kind| (kind, FieldMapping::default_for(kind)))
                .collect(),
        }
    }

    /// Creates a mapper from defaults plus configured rules per kind.
    pub fn from_overrides<'a>(
        overrides: impl IntoIterator<Item = (EntityKind, &'a [FieldRule])>,
    ) -> CoreResult<Self> {
        let mut mapper = Self::with_defaults();
        for (kind, rules) in overrides {
            let current = mapper.mapping(kind);
            let merged = current.with_overrides(rules)?;
            mapper.mappings.insert(kind, merged);
        }
        Ok(mapper)
    }

    fn mapping(&self, kind: EntityKind) -> FieldMapping {
        self.mappings
            .get(&kind)
            .cloned()
            .unwrap_or_else(|| FieldMapping::default_for(kind))
    }

    /// Returns the active mapping for a kind and direction.
    ///
    /// Bidirectional resolves to the local→remote orientation, which is the
    /// schema diffs are computed in.
    pub fn resolve(&self, kind: EntityKind, direction: Direction) -> FieldMapping {
        let mapping = self.mapping(kind);
        match direction {
            Direction::RemoteToLocal => mapping.inverse(),
            _ => mapping,
        }
    }

    /// Translates a record with the given mapping.
    pub fn apply(mapping: &FieldMapping, source: &Record) -> CoreResult<Record> {
        mapping.apply(source)
    }
}

impl Default for FieldMapper {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::values_equal;
    use proptest::prelude::*;
    use serde_json::json;

    fn item() -> Record {
        Record::new()
            .with("item_code", "ITEM-001")
            .with("item_name", "Blue Mug")
            .with("is_stock_item", 1)
            .with("description", "A mug")
    }

    #[test]
    fn local_to_remote_translates_names_and_values() {
        let mapper = FieldMapper::with_defaults();
        let mapping = mapper.resolve(EntityKind::Item, Direction::LocalToRemote);
        let remote = mapping.apply(&item()).unwrap();

        assert_eq!(remote.get_str("name"), Some("Blue Mug"));
        assert_eq!(remote.get("manage_stock"), Some(&json!(true)));
        // Unmapped local fields do not leak
        assert!(!remote.has("item_code"));
    }

    #[test]
    fn item_images_become_remote_image_list() {
        let mapping = FieldMapping::default_for(EntityKind::Item);
        let local = item().with(
            "images",
            json!([
                "https://erp.example.com/files/mug.png",
                "https://erp.example.com/files/mug.png",
                "https://erp.example.com/files/manual.pdf",
            ]),
        );
        let remote = mapping.apply(&local).unwrap();
        assert_eq!(
            remote.get("images"),
            Some(&json!([{"src": "https://erp.example.com/files/mug.png"}]))
        );

        let back = mapping.inverse().apply(&remote).unwrap();
        assert_eq!(back.get("images"), Some(&json!(["https://erp.example.com/files/mug.png"])));
        assert!(Transform::UrlsToImages.apply("images", &json!(3)).is_err());
    }

    #[test]
    fn missing_required_field_is_named() {
        let mapping = FieldMapping::default_for(EntityKind::Item);
        let err = mapping.apply(&Record::new().with("item_code", "X")).unwrap_err();
        assert_eq!(err.field(), Some("item_name"));
    }

    #[test]
    fn remote_to_local_ignores_unmapped_remote_fields() {
        let mapping = FieldMapper::with_defaults().resolve(EntityKind::Price, Direction::RemoteToLocal);
        let remote = Record::new()
            .with("regular_price", "12.50")
            .with("sale_price", "9.99");
        let local = mapping.apply(&remote).unwrap();
        assert_eq!(local.get_f64("price_list_rate"), Some(12.5));
        assert_eq!(local.len(), 1);
    }

    #[test]
    fn partial_apply_skips_required_check() {
        let mapping = FieldMapper::with_defaults().resolve(EntityKind::Item, Direction::RemoteToLocal);
        let local = mapping
            .apply_partial(&Record::new().with("manage_stock", false))
            .unwrap();
        assert_eq!(local.get("is_stock_item"), Some(&json!(0)));
        assert_eq!(local.len(), 1);
    }

    #[test]
    fn duplicate_local_field_rejected() {
        let rules = vec![
            FieldRule::new("item_name", "name").required(),
            FieldRule::new("item_name", "title"),
        ];
        let err = FieldMapping::new(EntityKind::Item, rules).unwrap_err();
        assert!(matches!(err, CoreError::DuplicateField { side: "local", .. }));
    }

    #[test]
    fn unmapped_required_field_rejected() {
        let rules = vec![FieldRule::new("description", "description")];
        let err = FieldMapping::new(EntityKind::Item, rules).unwrap_err();
        assert!(matches!(err, CoreError::MissingRequiredMapping { .. }));
    }

    #[test]
    fn overrides_replace_defaults_by_local_name() {
        let base = FieldMapping::default_for(EntityKind::Item);
        let mapping = base
            .with_overrides(&[
                FieldRule::new("item_name", "short_name"),
                FieldRule::new("brand", "brand"),
            ])
            .unwrap();
        let rule = mapping.rules().iter().find(|r| r.local == "item_name").unwrap();
        assert_eq!(rule.remote, "short_name");
        assert!(rule.required, "schema requirement survives override");
        assert!(mapping.rules().iter().any(|r| r.local == "brand"));
    }

    #[test]
    fn transform_failures_name_field() {
        let err = Transform::StringToNumber
            .apply("rate", &json!("fifteen"))
            .unwrap_err();
        assert_eq!(err.field(), Some("rate"));
        assert!(Transform::IntToBool.apply("flag", &json!(7)).is_err());
    }

    #[test]
    fn transforms_invert() {
        for t in [
            Transform::Identity,
            Transform::NumberToString,
            Transform::StringToNumber,
            Transform::IntToBool,
            Transform::BoolToInt,
            Transform::UrlsToImages,
            Transform::ImagesToUrls,
        ] {
            assert_eq!(t.inverse().inverse(), t);
        }
    }

    fn value_for(transform: Transform) -> BoxedStrategy<Value> {
        match transform {
            Transform::Identity => prop_oneof![
                "[a-zA-Z0-9 ]{0,16}".prop_map(Value::from),
                any::<i32>().prop_map(Value::from),
                any::<bool>().prop_map(Value::from),
            ]
            .boxed(),
            Transform::NumberToString => prop_oneof![
                any::<i32>().prop_map(Value::from),
                (1i64..1_000_000).prop_map(|c| json!(c as f64 / 100.0 + 0.001)),
            ]
            .boxed(),
            Transform::IntToBool => (0u8..=1).prop_map(Value::from).boxed(),
            Transform::BoolToInt => any::<bool>().prop_map(Value::from).boxed(),
            Transform::StringToNumber => any::<i32>().prop_map(|i| json!(i.to_string())).boxed(),
            Transform::UrlsToImages => image_names()
                .prop_map(|names| {
                    json!(names
                        .iter()
                        .map(|n| format!("https://erp.example.com/files/{n}.png"))
                        .collect::<Vec<_>>())
                })
                .boxed(),
            Transform::ImagesToUrls => image_names()
                .prop_map(|names| {
                    json!(names
                        .iter()
                        .map(|n| json!({"src": format!("https://shop.example.com/uploads/{n}.jpg")}))
                        .collect::<Vec<_>>())
                })
                .boxed(),
        }
    }

    fn image_names() -> impl Strategy<Value = std::collections::BTreeSet<String>> {
        prop::collection::btree_set("[a-z]{1,8}", 0..4)
    }

    fn transform_strategy() -> impl Strategy<Value = Transform> {
        prop_oneof![
            Just(Transform::Identity),
            Just(Transform::NumberToString),
            Just(Transform::IntToBool),
            Just(Transform::BoolToInt),
            Just(Transform::StringToNumber),
            Just(Transform::UrlsToImages),
            Just(Transform::ImagesToUrls),
        ]
    }

    fn mapping_and_record() -> impl Strategy<Value = (FieldMapping, Record)> {
        prop::collection::vec(transform_strategy(), 0..6).prop_flat_map(|transforms| {
            let mut rules = vec![FieldRule::new("item_name", "name").required()];
            let mut values: Vec<BoxedStrategy<Value>> = vec![value_for(Transform::Identity)];
            for (i, t) in transforms.into_iter().enumerate() {
                rules.push(FieldRule::new(format!("local_{i}"), format!("remote_{i}")).with_transform(t));
                values.push(value_for(t));
            }
            values.prop_map(move |vals| {
                let mut record = Record::new();
                for (rule, v) in rules.iter().zip(vals) {
                    record.insert(rule.local.clone(), v);
                }
                let mapping = FieldMapping::new(EntityKind::Item, rules.clone()).unwrap();
                (mapping, record)
            })
        })
    }

    proptest! {
        #[test]
        fn mapping_roundtrips((mapping, record) in mapping_and_record()) {
            let remote = mapping.apply(&record).unwrap();
            let back = mapping.inverse().apply(&remote).unwrap();
            for field in mapping.source_fields() {
                let original = record.get(field).unwrap();
                let restored = back.get(field).unwrap();
                prop_assert!(values_equal(original, restored), "{field}: {original} vs {restored}");
            }
        }
    }
}
