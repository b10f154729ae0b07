//! Proxy configuration.

use std::time::Duration;

use crate::backoff::BackoffConfig;
use crate::cache::CacheOptions;
use crate::proxy::dispatcher::DEFAULT_READY_TIMEOUT;
use crate::rate_limit::RateLimitConfig;
use crate::types::MarketClass;
use crate::upstream::ws::WsConfig;

/// Default spot listen address.
pub const DEFAULT_SPOT_ADDR: &str = "0.0.0.0:8090";
/// Default futures listen address.
pub const DEFAULT_FUTURES_ADDR: &str = "0.0.0.0:8091";
/// Default delivery listen address.
pub const DEFAULT_DELIVERY_ADDR: &str = "0.0.0.0:8092";
/// Default debug listen address.
pub const DEFAULT_DEBUG_ADDR: &str = "127.0.0.1:65088";

/// Settings of one market class listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassConfig {
    /// Market class served.
    pub class: MarketClass,
    /// Whether the listener is started at all.
    pub enabled: bool,
    /// Address to listen on.
    pub listen: String,
    /// Upstream REST base URL.
    pub rest_url: String,
    /// Upstream stream base URL.
    pub ws_url: String,
}

impl ClassConfig {
    /// Defaults for `class`: enabled, production endpoints.
    pub fn new(class: MarketClass) -> Self {
        let listen = match class {
            MarketClass::Spot => DEFAULT_SPOT_ADDR,
            MarketClass::Futures => DEFAULT_FUTURES_ADDR,
            MarketClass::Delivery => DEFAULT_DELIVERY_ADDR,
        };
        Self {
            class,
            enabled: true,
            listen: listen.to_string(),
            rest_url: class.rest_base_url().to_string(),
            ws_url: class.ws_base_url().to_string(),
        }
    }
}

/// Complete proxy configuration.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// One entry per market class, in [`MarketClass::ALL`] order.
    pub classes: [ClassConfig; 3],
    /// Debug listener address; `None` disables it.
    pub debug_addr: Option<String>,
    /// Cache behaviour.
    pub cache: CacheOptions,
    /// Upstream rate limits.
    pub rate_limit: RateLimitConfig,
    /// Stream connection settings.
    pub ws: WsConfig,
    /// How long a request waits for a new cache before being forwarded.
    pub ready_timeout: Duration,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            classes: MarketClass::ALL.map(ClassConfig::new),
            debug_addr: Some(DEFAULT_DEBUG_ADDR.to_string()),
            cache: CacheOptions::default(),
            rate_limit: RateLimitConfig::default(),
            ws: WsConfig::default(),
            ready_timeout: DEFAULT_READY_TIMEOUT,
        }
    }
}

impl ProxyConfig {
    /// Create a new configuration builder.
    pub fn builder() -> ProxyConfigBuilder {
        ProxyConfigBuilder::new()
    }

    /// Settings of one class.
    pub fn class(&self, class: MarketClass) -> &ClassConfig {
        &self.classes[index(class)]
    }

    /// Classes whose listener is enabled.
    pub fn enabled_classes(&self) -> impl Iterator<Item = &ClassConfig> {
        self.classes.iter().filter(|c| c.enabled)
    }
}

fn index(class: MarketClass) -> usize {
    match class {
        MarketClass::Spot => 0,
        MarketClass::Futures => 1,
        MarketClass::Delivery => 2,
    }
}

/// Builder for [`ProxyConfig`].
#[derive(Debug, Clone, Default)]
pub struct ProxyConfigBuilder {
    config: ProxyConfig,
}

impl ProxyConfigBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    fn class_mut(&mut self, class: MarketClass) -> &mut ClassConfig {
        &mut self.config.classes[index(class)]
    }

    /// Set the listen address of a class.
    pub fn listen(mut self, class: MarketClass, addr: impl Into<String>) -> Self {
        self.class_mut(class).listen = addr.into();
        self
    }

    /// Enable or disable a class listener.
    pub fn enabled(mut self, class: MarketClass, enabled: bool) -> Self {
        self.class_mut(class).enabled = enabled;
        self
    }

    /// Point a class at another REST upstream (useful for testing).
    pub fn rest_url(mut self, class: MarketClass, url: impl Into<String>) -> Self {
        self.class_mut(class).rest_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Point a class at another stream upstream (useful for testing).
    pub fn ws_url(mut self, class: MarketClass, url: impl Into<String>) -> Self {
        self.class_mut(class).ws_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Set or disable the debug listener.
    pub fn debug_addr(mut self, addr: Option<String>) -> Self {
        self.config.debug_addr = addr;
        self
    }

    /// Evict caches not read for this long; `None` keeps them forever.
    pub fn idle_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.cache.idle_timeout = timeout;
        self
    }

    /// Set the exchange info refresh period.
    pub fn exchange_info_refresh(mut self, period: Duration) -> Self {
        self.config.cache.exchange_info_refresh = period;
        self
    }

    /// Set the retry backoff.
    pub fn backoff(mut self, backoff: BackoffConfig) -> Self {
        self.config.cache.backoff = backoff;
        self
    }

    /// Set the rate limit configuration.
    pub fn rate_limit(mut self, rate_limit: RateLimitConfig) -> Self {
        self.config.rate_limit = rate_limit;
        self
    }

    /// Set the stream connection settings.
    pub fn ws_config(mut self, ws: WsConfig) -> Self {
        self.config.ws = ws;
        self
    }

    /// Set how long requests wait for a new cache.
    pub fn ready_timeout(mut self, timeout: Duration) -> Self {
        self.config.ready_timeout = timeout;
        self
    }

    /// Build the configuration.
    pub fn build(self) -> ProxyConfig {
        self.config
    }
}
