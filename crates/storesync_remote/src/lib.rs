//! # storesync remote
//!
//! Remote API Client capability for storesync.
//!
//! This crate provides:
//! - The [`RemoteApi`] trait the sync engine calls (`get`, `list`, `create`, `update`)
//! - The remote error taxonomy ([`RemoteError`])
//! - A WooCommerce-style REST client over an abstract [`HttpClient`]
//! - [`RetryingRemote`]: per-call timeouts and bounded backoff of transient failures
//! - [`MockRemote`]: an in-memory remote with scripted failures, for tests
//!
//! Transient failures (rate limits, timeouts, 5xx) are retried inside this
//! boundary; only exhausted retries surface to the engine.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod client;
mod error;
mod http;
mod mock;
mod retry;

pub use client::{
    format_modified, parse_modified, record_id, ListQuery, RemoteApi, DEFAULT_PAGE_SIZE,
    MEDIA_RESOURCE, MODIFIED_FIELD, MODIFIED_FORMAT,
};
pub use error::{RemoteError, RemoteResult};
#[cfg(feature = "reqwest")]
pub use http::ReqwestClient;
pub use http::{
    HttpClient, HttpRequest, HttpResponse, Method, RestClient, API_PREFIX, WP_API_PREFIX,
};
pub use mock::{MockCall, MockOp, MockRemote};
pub use retry::{RetryConfig, RetryingRemote};
