//! # storesync testkit
//!
//! Test utilities for storesync.
//!
//! This crate provides:
//! - [`TestShop`]: an engine wired to a mock remote and an in-memory store
//! - Record and configuration fixtures
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust,ignore
//! use storesync_testkit::prelude::*;
//!
//! #[tokio::test]
//! async fn creates_product() {
//!     let shop = TestShop::new();
//!     shop.seed_item("ITEM-001", "Mug");
//!     let result = shop.sync_item("ITEM-001").await;
//!     assert!(result.is_success());
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
}

pub use fixtures::*;
pub use generators::*;
