//! # storesync core
//!
//! Pure data model for synchronizing a local inventory system with a remote
//! commerce platform.
//!
//! This crate provides:
//! - Entity kinds and keys (`EntityKind`, `EntityKey`)
//! - Field records and stable content hashes (`Record`, `ContentHash`)
//! - The field mapper (`FieldMapping`, `FieldMapper`, `Transform`)
//! - The per-field authority table used during diffing
//! - The conflict/status tracker (`StatusTracker`)
//! - Tax rule merging and shipping method maps
//! - Product image lists and variant attributes
//! - Immutable sync outcomes (`SyncResult`)
//!
//! This is a pure crate with no I/O operations. Network and persistence
//! live in `storesync_remote` and `storesync_engine`.
//!
//! ## Key Invariants
//!
//! - A remote identifier, once assigned to a local entity, never changes
//! - Local field names are unique within a mapping
//! - Mapping transforms are pure functions
//! - A tax row's local account survives every re-fetch of the same remote id
//! - A `SyncResult` is never mutated after creation

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod attributes;
mod authority;
mod error;
mod images;
mod mapping;
mod order_status;
mod outcome;
mod record;
mod shipping;
mod tax;
mod tracker;
mod types;

pub use attributes::{
    attribute_slug, variation_attribute, ItemAttribute, ProductAttribute, ProductType,
    HAS_VARIANTS_FIELD, ITEM_ATTRIBUTES_FIELD, VARIANT_OF_FIELD,
};
pub use authority::{Authority, AuthorityTable, Side};
pub use error::{CoreError, CoreResult};
pub use images::{
    align_images, find_image_id, image_file_name, image_src, image_urls, is_image_url,
    prune_images, IMAGES_FIELD,
};
pub use mapping::{EntitySchema, FieldMapper, FieldMapping, FieldRule, Transform};
pub use order_status::{
    local_order_status, remote_order_status, validate_status_map, OrderStatusPair,
    ORDER_STATUS_TABLE,
};
pub use outcome::{
    EntityOutcome, IssueClass, SyncIssue, SyncPayload, SyncResult, SyncResultBuilder, SyncStatus,
};
pub use record::{canonical_value, values_equal, ContentHash, Record};
pub use shipping::{IdEditWindow, ShippingMethod, ShippingMethodMap, TitleIndex, TitleResolution};
pub use tax::{merge_tax_rules, TaxClass, TaxMergeOutcome, TaxRule, DEFAULT_TAX_CLASSES};
pub use tracker::{StatusTracker, SyncStatusView, SyncableEntity};
pub use types::{Direction, EntityKey, EntityKind, LockKey};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
