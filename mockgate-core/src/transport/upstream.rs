//! Upstream HTTP client with connection pooling.
//!
//! Forwards the inbound method, path, query string and raw body to the
//! configured `listen` base URL and buffers the full response, bounded by a
//! configured maximum size.
//!
//! # Header Forwarding
//!
//! Outbound headers are built in a fixed order: inbound request headers first
//! (minus hop-by-hop headers, `host`, `content-length` and `accept-encoding`),
//! then the configured extra headers, which replace request headers of the
//! same name. `accept-encoding` is dropped so the captured body is never
//! compressed.
//!
//! # Error Classification
//!
//! - Timeout errors → [`UpstreamError::Timeout`]
//! - Connection errors → [`UpstreamError::ConnectionFailed`]
//! - Non-2xx status → [`UpstreamError::Status`]
//! - Oversized body → [`UpstreamError::TooLarge`]
//!
//! No automatic retry: forwarded requests may have side effects.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http::header::{self, HeaderMap, HeaderName, HeaderValue};
use http::StatusCode;
use reqwest::Client;
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::config::Settings;
use crate::request::MockRequest;

/// Hop-by-hop headers (RFC 9110 §7.6.1) never forwarded in either direction.
const HOP_BY_HOP: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

fn is_hop_by_hop(name: &HeaderName) -> bool {
    HOP_BY_HOP.contains(&name.as_str())
}

/// Upstream transport errors. Each one is a `500` for its request unless
/// offline replay finds a fixture.
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("upstream request to {url} timed out after {timeout_secs}s")]
    Timeout { url: String, timeout_secs: u64 },

    #[error("failed to connect to upstream {url}: {reason}")]
    ConnectionFailed { url: String, reason: String },

    #[error("upstream returned HTTP {status}")]
    Status { status: StatusCode, body: Bytes },

    #[error("upstream response too large: {size} bytes exceeds {limit} byte limit")]
    TooLarge { size: u64, limit: usize },

    #[error("invalid upstream URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("upstream request failed: {0}")]
    Request(String),
}

/// Configuration for the upstream client.
#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    /// Base URL of the live API (e.g. "http://localhost:8080").
    pub base_url: String,
    /// Request timeout (includes connection + response).
    pub timeout: Duration,
    /// Connection timeout (TCP + TLS handshake).
    pub connect_timeout: Duration,
    /// Maximum idle connections per host.
    pub pool_max_idle_per_host: usize,
    /// Idle connection timeout.
    pub pool_idle_timeout: Duration,
    /// Maximum response body size in bytes.
    pub max_response_size: usize,
    /// Extra headers added to every forwarded request.
    pub extra_headers: BTreeMap<String, String>,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(5),
            pool_max_idle_per_host: 32,
            pool_idle_timeout: Duration::from_secs(90),
            max_response_size: 10 * 1024 * 1024, // 10 MB
            extra_headers: BTreeMap::new(),
        }
    }
}

impl UpstreamConfig {
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    /// Proxy-mode configuration, or `None` in mock mode.
    pub fn from_settings(settings: &Settings) -> Option<Self> {
        let base_url = settings.listen.clone()?;
        Some(Self {
            base_url,
            timeout: settings.upstream_timeout,
            max_response_size: settings.max_body_size,
            extra_headers: settings.headers.clone(),
            ..Default::default()
        })
    }
}

/// A buffered upstream response.
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Forwards a request to the live API.
///
/// The capture pipeline depends on this trait so tests can substitute an
/// in-memory upstream.
#[async_trait]
pub trait Upstream: Send + Sync {
    /// Forward the request and buffer the response. Non-2xx statuses are
    /// returned as [`UpstreamError::Status`].
    async fn forward(&self, request: &MockRequest) -> Result<UpstreamResponse, UpstreamError>;
}

/// Build the outbound header set.
///
/// Inbound headers come first, minus hop-by-hop headers, `host`,
/// `content-length` and `accept-encoding`. Configured extra headers then
/// replace same-named inbound headers. Invalid extra headers are skipped.
pub fn merge_forward_headers(inbound: &HeaderMap, extra: &BTreeMap<String, String>) -> HeaderMap {
    let mut merged = HeaderMap::with_capacity(inbound.len() + extra.len());

    for (name, value) in inbound {
        if is_hop_by_hop(name)
            || name == header::HOST
            || name == header::CONTENT_LENGTH
            || name == header::ACCEPT_ENCODING
        {
            continue;
        }
        merged.append(name.clone(), value.clone());
    }

    for (name, value) in extra {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                merged.insert(name, value);
            }
            _ => warn!(header = %name, "Skipping invalid configured header"),
        }
    }

    merged
}

/// Response headers safe to relay to the client.
fn relay_headers(upstream: &HeaderMap) -> HeaderMap {
    let mut relayed = HeaderMap::with_capacity(upstream.len());
    for (name, value) in upstream {
        if is_hop_by_hop(name) || name == header::CONTENT_LENGTH {
            continue;
        }
        relayed.append(name.clone(), value.clone());
    }
    relayed
}

/// reqwest-backed [`Upstream`].
///
/// The client is `Clone` and can be shared across tasks. The underlying
/// reqwest client handles connection pooling internally.
#[derive(Clone)]
pub struct UpstreamClient {
    client: Client,
    config: UpstreamConfig,
    /// Base URL with any trailing `/` removed.
    base: String,
}

impl UpstreamClient {
    /// Create a new upstream client.
    ///
    /// # Errors
    ///
    /// Returns [`UpstreamError::InvalidUrl`] if the base URL is empty or not an
    /// absolute URL, and [`UpstreamError::Request`] if the HTTP client cannot
    /// be built.
    pub fn new(config: UpstreamConfig) -> Result<Self, UpstreamError> {
        if config.base_url.is_empty() {
            return Err(UpstreamError::InvalidUrl {
                url: String::new(),
                reason: "base URL is empty".to_string(),
            });
        }

        if let Err(e) = reqwest::Url::parse(&config.base_url) {
            return Err(UpstreamError::InvalidUrl {
                url: config.base_url.clone(),
                reason: e.to_string(),
            });
        }

        let client = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .pool_idle_timeout(config.pool_idle_timeout)
            .redirect(reqwest::redirect::Policy::none())
            .tcp_nodelay(true)
            .build()
            .map_err(|e| UpstreamError::Request(format!("failed to build HTTP client: {e}")))?;

        let base = config.base_url.trim_end_matches('/').to_string();

        Ok(Self {
            client,
            config,
            base,
        })
    }

    pub fn config(&self) -> &UpstreamConfig {
        &self.config
    }

    /// Target URL for a request: base + path + `?query`.
    pub fn target_url(&self, request: &MockRequest) -> String {
        match request.query() {
            Some(query) => format!("{}{}?{}", self.base, request.path(), query),
            None => format!("{}{}", self.base, request.path()),
        }
    }

    /// Read the response body with a size limit.
    async fn read_body_limited(
        &self,
        mut response: reqwest::Response,
        url: &str,
    ) -> Result<Bytes, UpstreamError> {
        let max_size = self.config.max_response_size;

        // Early reject if Content-Length exceeds limit
        if let Some(content_length) = response.content_length()
            && content_length as usize > max_size
        {
            warn!(
                url = %url,
                content_length,
                max_response_size = max_size,
                "Upstream response exceeds size limit (Content-Length)"
            );
            return Err(UpstreamError::TooLarge {
                size: content_length,
                limit: max_size,
            });
        }

        let mut buf = Vec::with_capacity(
            response
                .content_length()
                .map(|cl| cl as usize)
                .unwrap_or(8192)
                .min(max_size),
        );

        while let Some(chunk) = response.chunk().await.map_err(|e| {
            error!(url = %url, error = %e, "Failed to read upstream response body chunk");
            UpstreamError::Request(format!("failed to read upstream body: {e}"))
        })? {
            if buf.len() + chunk.len() > max_size {
                warn!(
                    url = %url,
                    received = buf.len() + chunk.len(),
                    max_response_size = max_size,
                    "Upstream response exceeds size limit (streaming)"
                );
                return Err(UpstreamError::TooLarge {
                    size: (buf.len() + chunk.len()) as u64,
                    limit: max_size,
                });
            }
            buf.extend_from_slice(&chunk);
        }

        Ok(Bytes::from(buf))
    }

    /// Map a reqwest error to an [`UpstreamError`].
    fn classify_error(&self, error: reqwest::Error, url: &str) -> UpstreamError {
        if error.is_timeout() {
            warn!(
                url = %url,
                timeout_secs = self.config.timeout.as_secs(),
                "Upstream request timed out"
            );
            UpstreamError::Timeout {
                url: url.to_string(),
                timeout_secs: self.config.timeout.as_secs(),
            }
        } else if error.is_connect() {
            warn!(url = %url, "Failed to connect to upstream");
            UpstreamError::ConnectionFailed {
                url: url.to_string(),
                reason: error.to_string(),
            }
        } else {
            error!(url = %url, error = %error, "Upstream request failed");
            UpstreamError::Request(error.to_string())
        }
    }
}

#[async_trait]
impl Upstream for UpstreamClient {
    #[tracing::instrument(skip(self, request), fields(method = %request.method(), path = %request.path()))]
    async fn forward(&self, request: &MockRequest) -> Result<UpstreamResponse, UpstreamError> {
        let url = self.target_url(request);
        let headers = merge_forward_headers(request.headers(), &self.config.extra_headers);

        debug!(url = %url, "Forwarding request to upstream");

        let response = self
            .client
            .request(request.method().clone(), &url)
            .headers(headers)
            .body(request.body().clone())
            .send()
            .await
            .map_err(|e| self.classify_error(e, &url))?;

        let status = response.status();
        let headers = relay_headers(response.headers());
        let body = self.read_body_limited(response, &url).await?;

        if !status.is_success() {
            warn!(url = %url, status = %status, "Upstream returned error status");
            return Err(UpstreamError::Status { status, body });
        }

        debug!(url = %url, status = %status, bytes = body.len(), "Received upstream response");

        Ok(UpstreamResponse {
            status,
            headers,
            body,
        })
    }
}
