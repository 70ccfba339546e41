//! Transport abstraction: request descriptors, responses, and the
//! object-safe async `Transport` trait the pipeline is built on.
//!
//! The pipeline never talks HTTP itself; it hands a [`RequestDescriptor`]
//! to whatever [`Transport`] it was built with. A libcurl-backed default
//! lives in [`curl`].

pub mod curl;

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::error::ApiError;
use crate::queue::Priority;

/// Default per-request transport timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// HTTP method of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Head,
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Head => "HEAD",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
        }
    }

    /// Whether repeating the request cannot change the outcome beyond the
    /// first application. Drives retry decisions for ambiguous failures.
    pub fn is_idempotent(&self) -> bool {
        !matches!(self, Method::Post | Method::Patch)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything needed to issue one request. Immutable once submitted to the
/// pipeline; the pipeline clones and adjusts its own copy (timeouts, headers).
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    pub method: Method,
    pub url: String,
    /// Query parameters, appended to the URL in order.
    pub params: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
    pub headers: HashMap<String, String>,
    pub timeout: Duration,
    pub priority: Priority,
    /// Explicit merge/cache key; derived from the request when absent.
    pub merge_key: Option<String>,
}

impl RequestDescriptor {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            params: Vec::new(),
            body: None,
            headers: HashMap::new(),
            timeout: DEFAULT_TIMEOUT,
            priority: Priority::Normal,
            merge_key: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::Get, url)
    }

    pub fn head(url: impl Into<String>) -> Self {
        Self::new(Method::Head, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::Post, url)
    }

    pub fn put(url: impl Into<String>) -> Self {
        Self::new(Method::Put, url)
    }

    pub fn delete(url: impl Into<String>) -> Self {
        Self::new(Method::Delete, url)
    }

    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((name.into(), value.into()));
        self
    }

    /// Header names are stored lower-cased so later lookups and overrides
    /// behave the same regardless of caller spelling.
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_merge_key(mut self, key: impl Into<String>) -> Self {
        self.merge_key = Some(key.into());
        self
    }

    /// Serialize `body` as JSON and set the content type.
    pub fn with_json_body<T: Serialize>(mut self, body: &T) -> Result<Self, ApiError> {
        let bytes = serde_json::to_vec(body)
            .map_err(|e| ApiError::InvalidRequest(format!("body serialization failed: {e}")))?;
        self.body = Some(bytes);
        self.headers
            .insert("content-type".into(), "application/json".into());
        Ok(self)
    }

    /// Identity of this request for merging, caching, and correlation.
    ///
    /// Uses the explicit `merge_key` when set, otherwise a digest over
    /// method, URL, query parameters, and body, so identical requests
    /// collide and everything else does not.
    pub fn request_id(&self) -> String {
        if let Some(key) = &self.merge_key {
            return key.clone();
        }
        let mut hasher = Sha256::new();
        hasher.update(self.method.as_str().as_bytes());
        hasher.update(b"\n");
        hasher.update(self.url.as_bytes());
        for (name, value) in &self.params {
            hasher.update(b"\n");
            hasher.update(name.as_bytes());
            hasher.update(b"=");
            hasher.update(value.as_bytes());
        }
        if let Some(body) = &self.body {
            hasher.update(b"\n");
            hasher.update(body);
        }
        let digest = hasher.finalize();
        hex::encode(&digest[..16])
    }

    /// Short human-readable label for logs.
    pub fn label(&self) -> String {
        format!("{} {}", self.method, self.url)
    }
}

/// A successful (2xx) HTTP response. Header names are lower-cased.
#[derive(Debug, Clone)]
pub struct Response {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl Response {
    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(|v| v.as_str())
    }

    /// Decode the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        serde_json::from_slice(&self.body)
            .map_err(|e| ApiError::InvalidRequest(format!("response decode failed: {e}")))
    }

    /// Body as UTF-8, lossily.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Minimal contract the pipeline assumes from an HTTP client.
///
/// 2xx responses resolve to `Ok(Response)`; any other status resolves to
/// [`ApiError::Http`] with `Retry-After` already parsed; transport-level
/// failures resolve to the network/timeout variants. Object-safe so the
/// client can hold `Arc<dyn Transport>`.
pub trait Transport: Send + Sync {
    fn execute<'a>(
        &'a self,
        request: &'a RequestDescriptor,
    ) -> BoxFuture<'a, Result<Response, ApiError>>;
}
