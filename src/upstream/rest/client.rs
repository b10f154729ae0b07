//! Rate-limited REST client for one Binance market class.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use reqwest::Method;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_tracing::TracingMiddleware;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::Result;
use crate::error::{ApiError, ProxyError};
use crate::rate_limit::{RateLimitConfig, RateLimiter};
use crate::types::serde_helpers::OneOrFirst;
use crate::types::{Candle, DepthSnapshot, MarketClass, QueryParams, Ticker24hr};
use crate::upstream::endpoints::cached;

/// REST client used by the caches to backfill and refresh their state.
///
/// Every request first waits on the class's [`RateLimiter`], so cache traffic
/// and pass-through traffic share one weight budget.
///
/// # Example
///
/// ```rust,no_run
/// use binance_proxy::types::MarketClass;
/// use binance_proxy::upstream::rest::MarketRestClient;
/// use tokio_util::sync::CancellationToken;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let client = MarketRestClient::builder(MarketClass::Spot).build();
///     let cancel = CancellationToken::new();
///
///     let candles = client.get_klines("BTCUSDT", "1m", 1000, &cancel).await?;
///     println!("{} candles", candles.len());
///
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct MarketRestClient {
    class: MarketClass,
    http_client: ClientWithMiddleware,
    base_url: String,
    limiter: Arc<RateLimiter>,
}

impl MarketRestClient {
    /// Create a new client builder for a market class.
    pub fn builder(class: MarketClass) -> MarketRestClientBuilder {
        MarketRestClientBuilder::new(class)
    }

    /// Market class this client talks to.
    pub fn class(&self) -> MarketClass {
        self.class
    }

    /// Upstream base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fetch the most recent `limit` candles of a series, oldest first.
    pub async fn get_klines(
        &self,
        symbol: &str,
        interval: &str,
        limit: u32,
        cancel: &CancellationToken,
    ) -> Result<Vec<Candle>> {
        let params = QueryParams::from_pairs([
            ("symbol", symbol.to_string()),
            ("interval", interval.to_string()),
            ("limit", limit.to_string()),
        ]);
        self.public_get_with_params(cached::KLINES, &params, cancel).await
    }

    /// Fetch an order book snapshot with up to `limit` levels per side.
    pub async fn get_depth(&self, symbol: &str, limit: u32, cancel: &CancellationToken) -> Result<DepthSnapshot> {
        let params = QueryParams::from_pairs([("symbol", symbol.to_string()), ("limit", limit.to_string())]);
        self.public_get_with_params(cached::DEPTH, &params, cancel).await
    }

    /// Fetch the 24h statistics of one symbol.
    ///
    /// COIN-M answers with a one-element array; the first element is used.
    pub async fn get_ticker_24hr(&self, symbol: &str, cancel: &CancellationToken) -> Result<Ticker24hr> {
        let params = QueryParams::from_pairs([("symbol", symbol)]);
        let ticker: OneOrFirst<Ticker24hr> = self
            .public_get_with_params(cached::TICKER_24HR, &params, cancel)
            .await?;
        Ok(ticker.into_inner())
    }

    /// Fetch the exchange metadata document, verbatim.
    pub async fn get_exchange_info(&self, cancel: &CancellationToken) -> Result<Bytes> {
        let body = self
            .get_raw(cached::EXCHANGE_INFO, &QueryParams::default(), cancel)
            .await?;
        // Only cache documents that at least parse.
        serde_json::from_slice::<serde::de::IgnoredAny>(&body)?;
        Ok(body)
    }

    /// Make a rate-limited GET request and decode the JSON body.
    pub(crate) async fn public_get_with_params<T>(
        &self,
        suffix: &str,
        params: &QueryParams,
        cancel: &CancellationToken,
    ) -> Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        let body = self.get_raw(suffix, params, cancel).await?;
        serde_json::from_slice(&body).map_err(|e| {
            ProxyError::InvalidResponse(format!(
                "Failed to parse response: {}. Body: {}",
                e,
                String::from_utf8_lossy(&body)
            ))
        })
    }

    /// Make a rate-limited GET request and return the raw body of a 2xx response.
    async fn get_raw(&self, suffix: &str, params: &QueryParams, cancel: &CancellationToken) -> Result<Bytes> {
        let path = self.class.path(suffix);
        self.limiter.wait(&Method::GET, &path, params, cancel).await?;

        let query_string = params.to_query_string();
        let url = if query_string.is_empty() {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}{}?{}", self.base_url, path, query_string)
        };

        debug!(class = %self.class, %url, "Upstream GET");
        let response = self.http_client.get(&url).send().await?;
        let status = response.status();
        let body = response.bytes().await?;

        if !status.is_success() {
            let text = String::from_utf8_lossy(&body);
            return Err(match ApiError::from_body(&text) {
                Some(api_error) => ProxyError::Api(api_error),
                None => ProxyError::InvalidResponse(format!("HTTP {}: {}", status, text)),
            });
        }

        Ok(body)
    }
}

impl std::fmt::Debug for MarketRestClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MarketRestClient")
            .field("class", &self.class)
            .field("base_url", &self.base_url)
            .finish()
    }
}

/// Builder for [`MarketRestClient`].
pub struct MarketRestClientBuilder {
    class: MarketClass,
    base_url: String,
    limiter: Option<Arc<RateLimiter>>,
    user_agent: Option<String>,
    timeout: Duration,
}

impl MarketRestClientBuilder {
    /// Create a new builder with default settings.
    pub fn new(class: MarketClass) -> Self {
        Self {
            class,
            base_url: class.rest_base_url().to_string(),
            limiter: None,
            user_agent: None,
            timeout: Duration::from_secs(30),
        }
    }

    /// Set the base URL (useful for testing with a mock server).
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Share an existing limiter instead of creating a private one.
    pub fn limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.limiter = Some(limiter);
        self
    }

    /// Set a custom user agent.
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// Set the per-request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Build the client.
    pub fn build(self) -> MarketRestClient {
        let mut headers = HeaderMap::new();
        let user_agent = self
            .user_agent
            .unwrap_or_else(|| format!("binance-proxy/{}", env!("CARGO_PKG_VERSION")));
        let header_value =
            HeaderValue::from_str(&user_agent).unwrap_or_else(|_| HeaderValue::from_static("binance-proxy"));
        headers.insert(USER_AGENT, header_value);

        let reqwest_client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(self.timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        let client = ClientBuilder::new(reqwest_client)
            .with(TracingMiddleware::default())
            .build();

        let limiter = self
            .limiter
            .unwrap_or_else(|| Arc::new(RateLimiter::for_class(self.class, &RateLimitConfig::default())));

        MarketRestClient {
            class: self.class,
            http_client: client,
            base_url: self.base_url,
            limiter,
        }
    }
}
