//! Verbatim forwarding of everything the caches do not answer.

use std::sync::Arc;
use std::time::Duration;

use axum::body::{Body, HttpBody};
use axum::extract::Request;
use axum::http::header::{self, HeaderMap, HeaderName};
use axum::response::{IntoResponse, Response};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_tracing::TracingMiddleware;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::Result;
use crate::error::ProxyError;
use crate::rate_limit::{RateLimitConfig, RateLimiter};
use crate::types::{MarketClass, QueryParams};

/// Headers that describe one connection rather than the message.
const HOP_BY_HOP: [HeaderName; 8] = [
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

/// Forwards requests to the class's upstream host after the rate limiter
/// admits them.
///
/// Method, path, query, headers and body are sent unchanged apart from
/// hop-by-hop headers and `Host`. Redirects are returned to the client, not
/// followed. Transport failures become `502 Bad Gateway` and are not retried.
#[derive(Clone)]
pub struct PassthroughProxy {
    class: MarketClass,
    http_client: ClientWithMiddleware,
    base_url: String,
    limiter: Arc<RateLimiter>,
    cancel: CancellationToken,
}

impl std::fmt::Debug for PassthroughProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PassthroughProxy")
            .field("class", &self.class)
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl PassthroughProxy {
    /// Create a new builder for a market class.
    pub fn builder(class: MarketClass) -> PassthroughProxyBuilder {
        PassthroughProxyBuilder::new(class)
    }

    /// Upstream base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Forward a request and relay the upstream response.
    pub async fn forward(&self, request: Request) -> Response {
        match self.try_forward(request).await {
            Ok(response) => response,
            Err(e) => {
                warn!(class = %self.class, "Pass-through failed: {}", e);
                e.into_response()
            }
        }
    }

    async fn try_forward(&self, request: Request) -> Result<Response> {
        let (parts, body) = request.into_parts();
        let path = parts.uri.path();
        let query = QueryParams::parse(parts.uri.query());

        self.limiter.wait(&parts.method, path, &query, &self.cancel).await?;

        let url = match parts.uri.query() {
            Some(raw) => format!("{}{}?{}", self.base_url, path, raw),
            None => format!("{}{}", self.base_url, path),
        };
        debug!(class = %self.class, method = %parts.method, %url, "Forwarding");

        let mut headers = parts.headers;
        strip_hop_by_hop(&mut headers);
        headers.remove(header::HOST);

        let mut upstream = self
            .http_client
            .request(parts.method, &url)
            .headers(headers);
        if !body.is_end_stream() {
            upstream = upstream.body(reqwest::Body::wrap_stream(body.into_data_stream()));
        }

        let response = upstream
            .send()
            .await
            .map_err(|e| ProxyError::Upstream(e.to_string()))?;

        let status = response.status();
        let mut headers = response.headers().clone();
        strip_hop_by_hop(&mut headers);

        let mut relayed = Response::new(Body::from_stream(response.bytes_stream()));
        *relayed.status_mut() = status;
        *relayed.headers_mut() = headers;
        Ok(relayed)
    }
}

/// Remove hop-by-hop headers, including any named by `Connection`.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let named: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    for name in named.iter().chain(HOP_BY_HOP.iter()) {
        headers.remove(name);
    }
}

/// Builder for [`PassthroughProxy`].
pub struct PassthroughProxyBuilder {
    class: MarketClass,
    base_url: String,
    limiter: Option<Arc<RateLimiter>>,
    cancel: Option<CancellationToken>,
    connect_timeout: Duration,
}

impl PassthroughProxyBuilder {
    /// Create a new builder with default settings.
    pub fn new(class: MarketClass) -> Self {
        Self {
            class,
            base_url: class.rest_base_url().to_string(),
            limiter: None,
            cancel: None,
            connect_timeout: Duration::from_secs(10),
        }
    }

    /// Set the upstream base URL (useful for testing with a mock server).
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Share the class limiter with the caches.
    pub fn limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.limiter = Some(limiter);
        self
    }

    /// Abort waiting requests when `cancel` fires.
    pub fn cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Set the connect timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Build the proxy.
    pub fn build(self) -> PassthroughProxy {
        let reqwest_client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .connect_timeout(self.connect_timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        let client = ClientBuilder::new(reqwest_client)
            .with(TracingMiddleware::default())
            .build();

        let limiter = self
            .limiter
            .unwrap_or_else(|| Arc::new(RateLimiter::for_class(self.class, &RateLimitConfig::default())));

        PassthroughProxy {
            class: self.class,
            http_client: client,
            base_url: self.base_url,
            limiter,
            cancel: self.cancel.unwrap_or_default(),
        }
    }
}
