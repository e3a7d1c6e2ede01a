//! Shipping method mapping.
//!
//! A [`ShippingMethodMap`] pairs a local shipping rule with a remote shipping
//! method. The user picks the method by title; the method id is derived from
//! the title through a [`TitleIndex`] and cannot be set directly.

use crate::error::{CoreError, CoreResult};
use crate::record::Record;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A shipping method as listed by the remote store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingMethod {
    /// Remote method id (e.g. `flat_rate`).
    pub method_id: String,
    /// User-configured title.
    pub title: String,
}

impl ShippingMethod {
    /// Creates a method.
    pub fn new(method_id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            method_id: method_id.into(),
            title: title.into(),
        }
    }

    /// Builds a method from a record in the local schema.
    pub fn from_local_record(record: &Record) -> CoreResult<Self> {
        let method_id = record
            .get_str("wc_shipping_method_id")
            .filter(|s| !s.is_empty())
            .ok_or_else(|| CoreError::validation("wc_shipping_method_id", "missing"))?;
        let title = record
            .get_str("wc_shipping_method_title")
            .filter(|s| !s.is_empty())
            .ok_or_else(|| CoreError::validation("wc_shipping_method_title", "missing"))?;
        Ok(Self::new(method_id, title))
    }
}

/// Title → method id lookup. The first method listed for a title wins.
#[derive(Debug, Clone, Default)]
pub struct TitleIndex {
    by_title: HashMap<String, String>,
}

impl TitleIndex {
    /// Indexes a list of methods.
    pub fn build(methods: &[ShippingMethod]) -> Self {
        let mut by_title = HashMap::new();
        for method in methods {
            by_title
                .entry(method.title.clone())
                .or_insert_with(|| method.method_id.clone());
        }
        Self { by_title }
    }

    /// Looks up the method id for a title.
    pub fn lookup(&self, title: &str) -> Option<&str> {
        self.by_title.get(title).map(String::as_str)
    }

    /// Number of distinct titles.
    pub fn len(&self) -> usize {
        self.by_title.len()
    }

    /// Returns true if no methods were indexed.
    pub fn is_empty(&self) -> bool {
        self.by_title.is_empty()
    }
}

/// Outcome of re-resolving a map row's method id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TitleResolution {
    /// The id changed to the given value.
    Resolved(String),
    /// The title resolved to the id already stored.
    Unchanged,
    /// The title is not offered remotely; the id was left as it was.
    Unresolved,
}

/// Pairs a local shipping rule with a remote shipping method.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingMethodMap {
    shipping_rule: String,
    title: String,
    #[serde(default)]
    method_id: Option<String>,
}

impl ShippingMethodMap {
    /// Creates an unresolved row.
    pub fn new(shipping_rule: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            shipping_rule: shipping_rule.into(),
            title: title.into(),
            method_id: None,
        }
    }

    /// Local shipping rule name.
    pub fn shipping_rule(&self) -> &str {
        &self.shipping_rule
    }

    /// Remote method title.
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Derived remote method id.
    pub fn method_id(&self) -> Option<&str> {
        self.method_id.as_deref()
    }

    /// Changes the title and re-resolves the method id against `index`.
    pub fn set_title(&mut self, title: impl Into<String>, index: &TitleIndex) -> TitleResolution {
        self.title = title.into();
        self.begin_resolution(index).resolve()
    }

    /// Opens the id edit window. The window closes when it is resolved or
    /// dropped.
    pub fn begin_resolution<'a>(&'a mut self, index: &'a TitleIndex) -> IdEditWindow<'a> {
        IdEditWindow { map: self, index }
    }

    /// Converts the row into a record in the local schema.
    pub fn to_local_record(&self) -> Record {
        let mut record = Record::new()
            .with("shipping_rule", self.shipping_rule.clone())
            .with("wc_shipping_method_title", self.title.clone());
        if let Some(id) = &self.method_id {
            record.insert("wc_shipping_method_id", id.clone());
        }
        record
    }

    /// Builds a row from a record in the local schema, keeping any stored id.
    pub fn from_local_record(record: &Record) -> CoreResult<Self> {
        let shipping_rule = record
            .get_str("shipping_rule")
            .ok_or_else(|| CoreError::validation("shipping_rule", "missing"))?;
        let title = record
            .get_str("wc_shipping_method_title")
            .ok_or_else(|| CoreError::validation("wc_shipping_method_title", "missing"))?;
        Ok(Self {
            shipping_rule: shipping_rule.to_string(),
            title: title.to_string(),
            method_id: record
                .get_str("wc_shipping_method_id")
                .filter(|s| !s.is_empty())
                .map(str::to_string),
        })
    }
}

/// Exclusive, short-lived permission to rewrite a row's method id.
///
/// The only write it allows is the id the index derives from the row's
/// current title.
pub struct IdEditWindow<'a> {
    map: &'a mut ShippingMethodMap,
    index: &'a TitleIndex,
}

impl IdEditWindow<'_> {
    /// Resolves the id from the title and closes the window.
    pub fn resolve(self) -> TitleResolution {
        match self.index.lookup(&self.map.title) {
            None => TitleResolution::Unresolved,
            Some(id) if self.map.method_id.as_deref() == Some(id) => TitleResolution::Unchanged,
            Some(id) => {
                self.map.method_id = Some(id.to_string());
                TitleResolution::Resolved(id.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index() -> TitleIndex {
        TitleIndex::build(&[
            ShippingMethod::new("flat_rate", "Courier"),
            ShippingMethod::new("local_pickup", "Collect"),
            ShippingMethod::new("free_shipping", "Courier"),
        ])
    }

    #[test]
    fn first_title_wins() {
        assert_eq!(index().lookup("Courier"), Some("flat_rate"));
        assert_eq!(index().len(), 2);
    }

    #[test]
    fn set_title_resolves_id() {
        let idx = index();
        let mut row = ShippingMethodMap::new("Standard", "Courier");
        assert_eq!(row.begin_resolution(&idx).resolve(), TitleResolution::Resolved("flat_rate".into()));
        assert_eq!(row.method_id(), Some("flat_rate"));

        assert_eq!(row.set_title("Collect", &idx), TitleResolution::Resolved("local_pickup".into()));
        assert_eq!(row.method_id(), Some("local_pickup"));
        assert_eq!(row.set_title("Collect", &idx), TitleResolution::Unchanged);
    }

    #[test]
    fn unknown_title_keeps_id() {
        let idx = index();
        let mut row = ShippingMethodMap::new("Standard", "Courier");
        row.set_title("Courier", &idx);
        assert_eq!(row.set_title("Drone", &idx), TitleResolution::Unresolved);
        assert_eq!(row.title(), "Drone");
        assert_eq!(row.method_id(), Some("flat_rate"));
    }

    #[test]
    fn local_record_roundtrip() {
        let mut row = ShippingMethodMap::new("Express", "Courier");
        row.set_title("Courier", &index());
        let back = ShippingMethodMap::from_local_record(&row.to_local_record()).unwrap();
        assert_eq!(back, row);
    }
}
