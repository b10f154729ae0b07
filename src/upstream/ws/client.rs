//! Market stream client.

use std::time::Duration;

use crate::error::ProxyError;
use crate::types::MarketClass;
use crate::upstream::endpoints::streams;
use crate::upstream::ws::stream::MarketStream;

/// Configuration for stream connections.
#[derive(Debug, Clone)]
pub struct WsConfig {
    /// Maximum time to establish a connection.
    pub connect_timeout: Duration,
    /// A connection with no frame (pings included) for this long is treated as dead.
    pub message_timeout: Duration,
}

impl Default for WsConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            // Futures servers ping every 3 minutes.
            message_timeout: Duration::from_secs(300),
        }
    }
}

impl WsConfig {
    /// Create a new configuration builder.
    pub fn builder() -> WsConfigBuilder {
        WsConfigBuilder::new()
    }
}

/// Builder for [`WsConfig`].
#[derive(Debug, Clone, Default)]
pub struct WsConfigBuilder {
    config: WsConfig,
}

impl WsConfigBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self {
            config: WsConfig::default(),
        }
    }

    /// Set the connect timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Set the silence timeout.
    pub fn message_timeout(mut self, timeout: Duration) -> Self {
        self.config.message_timeout = timeout;
        self
    }

    /// Build the configuration.
    pub fn build(self) -> WsConfig {
        self.config
    }
}

/// Opens raw market streams for one market class.
#[derive(Debug, Clone)]
pub struct MarketWsClient {
    class: MarketClass,
    base_url: String,
    config: WsConfig,
}

impl MarketWsClient {
    /// Create a client for the class's production stream endpoint.
    pub fn new(class: MarketClass) -> Self {
        Self::with_config(class, WsConfig::default())
    }

    /// Create a client with custom configuration.
    pub fn with_config(class: MarketClass, config: WsConfig) -> Self {
        Self {
            class,
            base_url: class.ws_base_url().to_string(),
            config,
        }
    }

    /// Point the client at another base URL (useful for testing).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Market class this client connects to.
    pub fn class(&self) -> MarketClass {
        self.class
    }

    /// Base URL streams are opened under.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Get the configuration.
    pub fn config(&self) -> &WsConfig {
        &self.config
    }

    /// Open `<base_url>/<stream_name>`.
    pub async fn subscribe(&self, stream_name: &str) -> Result<MarketStream, ProxyError> {
        let url = format!("{}/{}", self.base_url, stream_name);
        MarketStream::connect(self.class, &url, &self.config).await
    }

    /// Open the candlestick stream of a series.
    pub async fn subscribe_klines(&self, symbol: &str, interval: &str) -> Result<MarketStream, ProxyError> {
        self.subscribe(&streams::kline(symbol, interval)).await
    }

    /// Open the 100ms order book diff stream of a symbol.
    pub async fn subscribe_depth(&self, symbol: &str) -> Result<MarketStream, ProxyError> {
        self.subscribe(&streams::depth(symbol)).await
    }

    /// Open the 24h statistics stream of a symbol.
    pub async fn subscribe_ticker(&self, symbol: &str) -> Result<MarketStream, ProxyError> {
        self.subscribe(&streams::ticker(symbol)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_urls_per_class() {
        assert_eq!(
            MarketWsClient::new(MarketClass::Spot).base_url(),
            "wss://stream.binance.com:9443/ws"
        );
        assert_eq!(
            MarketWsClient::new(MarketClass::Delivery).base_url(),
            "wss://dstream.binance.com/ws"
        );
    }

    #[test]
    fn test_with_base_url_trims_slash() {
        let client = MarketWsClient::new(MarketClass::Futures).with_base_url("ws://127.0.0.1:9000/ws/");
        assert_eq!(client.base_url(), "ws://127.0.0.1:9000/ws");
    }

    #[test]
    fn test_config_builder() {
        let config = WsConfig::builder()
            .connect_timeout(Duration::from_secs(2))
            .message_timeout(Duration::from_secs(5))
            .build();
        assert_eq!(config.connect_timeout, Duration::from_secs(2));
        assert_eq!(config.message_timeout, Duration::from_secs(5));
    }
}
