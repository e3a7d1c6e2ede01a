//! REST client for the remote commerce API.
//!
//! The actual HTTP client is abstracted via [`HttpClient`] so the REST layer
//! (URL building, authentication, status mapping) can be tested without a
//! network. A reqwest-backed client is available behind the `reqwest`
//! feature.

use crate::client::{record_id, ListQuery, RemoteApi, MEDIA_RESOURCE};
use crate::error::{RemoteError, RemoteResult};
use async_trait::async_trait;
use chrono::SecondsFormat;
use serde_json::Value;
use std::time::Duration;
use storesync_core::Record;
use tracing::debug;
use url::Url;

/// API root appended to the store URL.
pub const API_PREFIX: &str = "wp-json/wc/v3";

/// API root of the WordPress media library.
pub const WP_API_PREFIX: &str = "wp-json/wp/v2";

/// Default wait when a 429 carries no usable `Retry-After`.
const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(1);

/// HTTP method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// GET
    Get,
    /// POST
    Post,
    /// PUT
    Put,
}

impl Method {
    /// Method name on the wire.
    pub const fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
        }
    }
}

/// An outgoing HTTP request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    /// Method.
    pub method: Method,
    /// Absolute URL including the query string.
    pub url: String,
    /// JSON body.
    pub body: Option<Vec<u8>>,
}

/// A received HTTP response.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HttpResponse {
    /// Status code.
    pub status: u16,
    /// Response headers.
    pub headers: Vec<(String, String)>,
    /// Body bytes.
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Creates a response with a JSON body.
    pub fn json(status: u16, body: &Value) -> Self {
        Self {
            status,
            headers: vec![("content-type".into(), "application/json".into())],
            body: body.to_string().into_bytes(),
        }
    }

    /// Adds a header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Looks up a header, case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// HTTP client abstraction.
///
/// Implementations return `Err` only for transport failures (connection
/// refused, TLS, reset). Any response, whatever its status, is `Ok`.
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Sends a request.
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, String>;
}

/// Remote API client speaking the WooCommerce REST dialect.
pub struct RestClient<C: HttpClient> {
    base_url: Url,
    consumer_key: String,
    consumer_secret: String,
    client: C,
}

impl<C: HttpClient> RestClient<C> {
    /// Creates a new client for a store URL.
    ///
    /// Fails if `base_url` is not an absolute http(s) URL.
    pub fn new(
        base_url: &str,
        consumer_key: impl Into<String>,
        consumer_secret: impl Into<String>,
        client: C,
    ) -> RemoteResult<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| RemoteError::Protocol(format!("invalid store URL '{base_url}': {e}")))?;
        if base_url.cannot_be_a_base() || !matches!(base_url.scheme(), "http" | "https") {
            return Err(RemoteError::Protocol(format!(
                "store URL '{base_url}' is not an http(s) URL"
            )));
        }
        Ok(Self {
            base_url,
            consumer_key: consumer_key.into(),
            consumer_secret: consumer_secret.into(),
            client,
        })
    }

    /// Returns the store URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn url(&self, path: &str, params: &[(String, String)]) -> String {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .extend(api_prefix(path).split('/'))
                .extend(path.split('/').filter(|s| !s.is_empty()));
        }
        url.query_pairs_mut()
            .clear()
            .append_pair("consumer_key", &self.consumer_key)
            .append_pair("consumer_secret", &self.consumer_secret)
            .extend_pairs(params);
        url.into()
    }

    async fn call(
        &self,
        method: Method,
        path: &str,
        params: &[(String, String)],
        body: Option<&Record>,
    ) -> RemoteResult<Value> {
        let request = HttpRequest {
            method,
            url: self.url(path, params),
            body: body.map(|r| r.clone().into_json().to_string().into_bytes()),
        };
        debug!(method = method.as_str(), path, "remote request");

        let response = self
            .client
            .send(request)
            .await
            .map_err(RemoteError::Unavailable)?;
        check_status(path, &response)?;

        if response.body.is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_slice(&response.body)
            .map_err(|e| RemoteError::Protocol(format!("invalid JSON from {path}: {e}")))
    }
}

#[async_trait]
impl<C: HttpClient> RemoteApi for RestClient<C> {
    async fn get(&self, resource: &str, id: &str) -> RemoteResult<Record> {
        let path = format!("{resource}/{id}");
        match self.call(Method::Get, &path, &[], None).await {
            Ok(Value::Object(map)) => Ok(Record::from_json(Value::Object(map))),
            Ok(other) => Err(RemoteError::Protocol(format!(
                "expected an object from {path}, got {other}"
            ))),
            Err(RemoteError::NotFound { .. }) => Err(RemoteError::NotFound {
                resource: resource.to_string(),
                id: id.to_string(),
            }),
            Err(e) => Err(e),
        }
    }

    async fn list(&self, resource: &str, query: &ListQuery) -> RemoteResult<Vec<Record>> {
        let mut params = vec![
            ("page".to_string(), query.page.to_string()),
            ("per_page".to_string(), query.per_page.to_string()),
        ];
        if let Some(since) = query.modified_after {
            params.push((
                "modified_after".to_string(),
                since.to_rfc3339_opts(SecondsFormat::Secs, true),
            ));
        }
        params.extend(query.params.iter().map(|(k, v)| (k.clone(), v.clone())));

        match self.call(Method::Get, resource, &params, None).await? {
            Value::Array(items) => Ok(items.into_iter().map(Record::from_json).collect()),
            other => Err(RemoteError::Protocol(format!(
                "expected a list from {resource}, got {other}"
            ))),
        }
    }

    async fn create(&self, resource: &str, record: &Record) -> RemoteResult<String> {
        let created = Record::from_json(self.call(Method::Post, resource, &[], Some(record)).await?);
        record_id(&created)
            .ok_or_else(|| RemoteError::Protocol(format!("create on {resource} returned no id")))
    }

    async fn update(&self, resource: &str, id: &str, fields: &Record) -> RemoteResult<()> {
        let path = format!("{resource}/{id}");
        self.call(Method::Put, &path, &[], Some(fields)).await?;
        Ok(())
    }
}

/// Maps a non-2xx response onto the remote error taxonomy.
/// Media lives in WordPress itself, every other resource in WooCommerce.
fn api_prefix(path: &str) -> &'static str {
    match path.split('/').find(|s| !s.is_empty()) {
        Some(MEDIA_RESOURCE) => WP_API_PREFIX,
        _ => API_PREFIX,
    }
}

fn check_status(path: &str, response: &HttpResponse) -> RemoteResult<()> {
    let status = response.status;
    if (200..300).contains(&status) {
        return Ok(());
    }
    let body: Value = serde_json::from_slice(&response.body).unwrap_or(Value::Null);
    let message = body
        .get("message")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| format!("HTTP {status}"));

    Err(match status {
        401 | 403 => RemoteError::Auth(message),
        404 => RemoteError::NotFound {
            resource: path.to_string(),
            id: String::new(),
        },
        429 => RemoteError::RateLimited {
            retry_after: response
                .header("retry-after")
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map_or(DEFAULT_RETRY_AFTER, Duration::from_secs),
        },
        400..=499 => RemoteError::Validation {
            // rest_invalid_param responses name the fields under data.params
            field: body
                .pointer("/data/params")
                .and_then(Value::as_object)
                .and_then(|params| params.keys().next().cloned()),
            reason: message,
        },
        _ => RemoteError::Unavailable(message),
    })
}

/// [`HttpClient`] backed by `reqwest`.
#[cfg(feature = "reqwest")]
pub struct ReqwestClient {
    inner: reqwest::Client,
}

#[cfg(feature = "reqwest")]
impl ReqwestClient {
    /// Creates a client with the given request timeout.
    pub fn new(timeout: Duration) -> Result<Self, String> {
        let inner = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| e.to_string())?;
        Ok(Self { inner })
    }
}

#[cfg(feature = "reqwest")]
#[async_trait]
impl HttpClient for ReqwestClient {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, String> {
        let method = match request.method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
        };
        let mut builder = self.inner.request(method, &request.url);
        if let Some(body) = request.body {
            builder = builder
                .header("content-type", "application/json")
                .body(body);
        }
        let response = builder.send().await.map_err(|e| e.to_string())?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.to_string(), v.to_string())))
            .collect();
        let body = response.bytes().await.map_err(|e| e.to_string())?.to_vec();
        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}
