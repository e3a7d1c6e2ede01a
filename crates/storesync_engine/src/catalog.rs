//! Product images and variant attributes.
//!
//! Outgoing image lists are resolved against images the remote already
//! holds, so an unchanged image is referenced by id instead of uploaded
//! again. Variant templates and variants carry their attributes both ways:
//! outgoing as product attributes, incoming as local item attributes.

use crate::engine::SyncEngine;
use crate::error::EngineResult;
use crate::store::{LocalStore, StoreError};
use serde_json::{json, Value};
use storesync_core::{
    find_image_id, image_file_name, image_src, variation_attribute, CoreError, EntityKey,
    EntityKind, ItemAttribute, ProductAttribute, ProductType, Record, SyncResultBuilder,
    HAS_VARIANTS_FIELD, IMAGES_FIELD, ITEM_ATTRIBUTES_FIELD, VARIANT_OF_FIELD,
};
use storesync_remote::{ListQuery, RemoteApi, MEDIA_RESOURCE};
use tracing::{debug, warn};

fn remote_id_value(id: &str) -> Value {
    id.parse::<u64>().map_or_else(|_| Value::from(id), Value::from)
}

fn id_text(value: &Value) -> Option<String> {
    match value {
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        _ => None,
    }
}

/// `(attribute, attribute_value)` rows of a local item.
fn item_attribute_rows(local: &Record) -> Vec<(String, Option<String>)> {
    let Some(Value::Array(rows)) = local.get(ITEM_ATTRIBUTES_FIELD) else {
        return Vec::new();
    };
    rows.iter()
        .filter_map(|row| {
            let name = row.get("attribute")?.as_str()?.trim();
            if name.is_empty() {
                return None;
            }
            let value = row
                .get("attribute_value")
                .and_then(Value::as_str)
                .map(str::to_string);
            Some((name.to_string(), value))
        })
        .collect()
}

impl SyncEngine {
    /// Rewrites the image list of an outgoing body.
    ///
    /// An image the product already shows (same file name) is sent by id.
    /// With media lookup enabled, an image already in the media library is
    /// also sent by id. Anything else is sent by URL for the remote to
    /// upload.
    pub(crate) async fn resolve_images(
        &self,
        key: &EntityKey,
        current: Option<&Record>,
        body: &mut Record,
    ) {
        let Some(Value::Array(entries)) = body.get(IMAGES_FIELD).cloned() else {
            return;
        };
        let mut resolved = Vec::with_capacity(entries.len());
        for entry in &entries {
            let Some(src) = image_src(entry) else {
                continue;
            };
            let id = match current.and_then(|remote| find_image_id(remote, src)) {
                Some(id) => Some(id.clone()),
                None if self.server_config().enable_media_lookup => {
                    self.find_media(key, src).await
                }
                None => None,
            };
            resolved.push(match id {
                Some(id) => json!({"id": id, "src": src}),
                None => json!({ "src": src }),
            });
        }
        body.insert(IMAGES_FIELD, Value::Array(resolved));
    }

    /// Searches the media library for a file named like `src`.
    async fn find_media(&self, key: &EntityKey, src: &str) -> Option<Value> {
        let file = image_file_name(src);
        let stem = file.rsplit_once('.').map_or(file, |(stem, _)| stem);
        let query = ListQuery::new().with_param("search", stem);
        match self.remote.list(MEDIA_RESOURCE, &query).await {
            Ok(media) => {
                let found = media
                    .iter()
                    .find(|m| {
                        m.get_str("source_url")
                            .is_some_and(|url| image_file_name(url).eq_ignore_ascii_case(file))
                    })
                    .and_then(|m| m.get("id").cloned());
                debug!(
                    server = %key.server,
                    local_id = %key.local_id,
                    file,
                    found = found.is_some(),
                    "media lookup"
                );
                found
            }
            Err(e) => {
                warn!(
                    server = %key.server,
                    local_id = %key.local_id,
                    file,
                    error = %e,
                    "media lookup failed, uploading by URL"
                );
                None
            }
        }
    }

    /// Sets the product type and attributes of a new product from the
    /// local variant fields.
    pub(crate) async fn add_variant_fields(
        &self,
        local: &Record,
        body: &mut Record,
    ) -> EngineResult<()> {
        if local.get_bool(HAS_VARIANTS_FIELD) == Some(true) {
            let mut templates = Vec::new();
            for (name, _) in item_attribute_rows(local) {
                let attribute = match self.store.read(EntityKind::ItemAttribute, &name).await {
                    Ok(record) => ItemAttribute::from_local_record(&name, &record.fields),
                    Err(StoreError::NotFound { .. }) => ItemAttribute::new(name, Vec::new()),
                    Err(e) => return Err(e.into()),
                };
                templates.push(attribute.to_remote_template());
            }
            body.insert("type", ProductType::Variable.as_str());
            body.insert("attributes", Value::Array(templates));
            return Ok(());
        }

        let Some(parent) = local.get_str(VARIANT_OF_FIELD).filter(|p| !p.is_empty()) else {
            return Ok(());
        };
        let parent_key = EntityKey::new(self.server_name(), EntityKind::Item, parent);
        let parent_id = self.shared().tracker.remote_id(&parent_key).ok_or_else(|| {
            CoreError::validation(
                VARIANT_OF_FIELD,
                format!(
                    "template item {parent} has no remote product on {}",
                    self.server_name()
                ),
            )
        })?;
        let attributes: Vec<Value> = item_attribute_rows(local)
            .iter()
            .map(|(name, value)| variation_attribute(name, value.as_deref().unwrap_or_default()))
            .collect();
        body.insert("type", ProductType::Variation.as_str());
        body.insert("parent_id", remote_id_value(&parent_id));
        body.insert("attributes", Value::Array(attributes));
        Ok(())
    }

    /// Fills the local variant fields of an item imported from `product`
    /// and upserts the attributes it names.
    pub(crate) async fn import_variant_fields(
        &self,
        product: &Record,
        fields: &mut Record,
        out: &mut SyncResultBuilder,
    ) -> EngineResult<()> {
        let product_type = ProductType::of(product);
        let seen = ProductAttribute::list(product);
        let rows: Vec<Value> = match product_type {
            ProductType::Simple => return Ok(()),
            ProductType::Variable => {
                fields.insert(HAS_VARIANTS_FIELD, 1);
                seen.iter()
                    .map(|a| json!({ "attribute": a.name }))
                    .collect()
            }
            ProductType::Variation => {
                let parent = product
                    .get("parent_id")
                    .and_then(id_text)
                    .filter(|id| id != "0")
                    .ok_or_else(|| {
                        CoreError::validation(VARIANT_OF_FIELD, "variation has no parent product")
                    })?;
                let template = self
                    .shared()
                    .tracker
                    .find_by_remote_id(self.server_name(), EntityKind::Item, &parent)
                    .ok_or_else(|| {
                        CoreError::validation(
                            VARIANT_OF_FIELD,
                            format!("parent product {parent} is not linked to a local item"),
                        )
                    })?;
                fields.insert(VARIANT_OF_FIELD, template.local_id);
                seen.iter()
                    .map(|a| json!({"attribute": a.name, "attribute_value": a.options.first()}))
                    .collect()
            }
        };

        for attribute in &seen {
            if self.upsert_attribute(attribute, product_type).await? {
                out.write_applied();
            }
        }
        fields.insert(ITEM_ATTRIBUTES_FIELD, Value::Array(rows));
        Ok(())
    }

    /// Creates or updates the local attribute named by `seen`. Returns true
    /// if a write happened.
    async fn upsert_attribute(
        &self,
        seen: &ProductAttribute,
        product_type: ProductType,
    ) -> EngineResult<bool> {
        let existing = match self.store.read(EntityKind::ItemAttribute, &seen.name).await {
            Ok(record) => Some(ItemAttribute::from_local_record(&record.id, &record.fields)),
            Err(StoreError::NotFound { .. }) => None,
            Err(e) => return Err(e.into()),
        };
        let Some(updated) = ItemAttribute::upsert(existing.as_ref(), seen, product_type) else {
            return Ok(false);
        };
        self.store
            .write(EntityKind::ItemAttribute, &seen.name, &updated.to_local_record())
            .await?;
        debug!(
            server = %self.server_name(),
            attribute = %updated.name,
            values = updated.values.len(),
            "item attribute written"
        );
        Ok(true)
    }
}
