//! CLI command implementations.

pub mod mapping;
pub mod order_statuses;
pub mod validate;
