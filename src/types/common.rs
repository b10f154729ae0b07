//! Common domain types shared by the caches, the rate limiter and the dispatcher.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::upstream::endpoints;

/// One of the three independently hosted Binance products.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarketClass {
    /// Spot market (`api.binance.com`)
    Spot,
    /// USDⓈ-M futures (`fapi.binance.com`)
    Futures,
    /// COIN-M futures (`dapi.binance.com`)
    Delivery,
}

impl MarketClass {
    /// All market classes, in listener order.
    pub const ALL: [MarketClass; 3] = [MarketClass::Spot, MarketClass::Futures, MarketClass::Delivery];

    /// Default REST base URL for this class.
    pub fn rest_base_url(self) -> &'static str {
        match self {
            MarketClass::Spot => endpoints::SPOT_REST_URL,
            MarketClass::Futures => endpoints::FUTURES_REST_URL,
            MarketClass::Delivery => endpoints::DELIVERY_REST_URL,
        }
    }

    /// Default streaming base URL for this class.
    pub fn ws_base_url(self) -> &'static str {
        match self {
            MarketClass::Spot => endpoints::SPOT_WS_URL,
            MarketClass::Futures => endpoints::FUTURES_WS_URL,
            MarketClass::Delivery => endpoints::DELIVERY_WS_URL,
        }
    }

    /// REST path prefix (e.g. `/api/v3`).
    pub fn api_prefix(self) -> &'static str {
        match self {
            MarketClass::Spot => endpoints::SPOT_PREFIX,
            MarketClass::Futures => endpoints::FUTURES_PREFIX,
            MarketClass::Delivery => endpoints::DELIVERY_PREFIX,
        }
    }

    /// Full REST path for an endpoint suffix such as `/klines`.
    pub fn path(self, suffix: &str) -> String {
        format!("{}{}", self.api_prefix(), suffix)
    }
}

impl fmt::Display for MarketClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MarketClass::Spot => write!(f, "spot"),
            MarketClass::Futures => write!(f, "futures"),
            MarketClass::Delivery => write!(f, "delivery"),
        }
    }
}

impl FromStr for MarketClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "spot" => Ok(MarketClass::Spot),
            "futures" => Ok(MarketClass::Futures),
            "delivery" => Ok(MarketClass::Delivery),
            other => Err(format!("unknown market class: {other}")),
        }
    }
}

/// Which cached endpoint a cache instance serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum CacheKind {
    /// Candlestick series
    Klines,
    /// Order book depth
    Depth,
    /// 24h rolling statistics
    Ticker,
    /// Exchange metadata
    ExchangeInfo,
}

impl fmt::Display for CacheKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheKind::Klines => write!(f, "klines"),
            CacheKind::Depth => write!(f, "depth"),
            CacheKind::Ticker => write!(f, "ticker"),
            CacheKind::ExchangeInfo => write!(f, "exchangeInfo"),
        }
    }
}

/// Identifies exactly one cache instance.
///
/// Symbols are upper-cased on construction. Intervals are kept verbatim since
/// Binance distinguishes `1m` (minute) from `1M` (month).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct StreamKey {
    /// Market class the cache belongs to.
    pub class: MarketClass,
    /// Endpoint served by the cache.
    pub kind: CacheKind,
    /// Upper-case symbol, empty for exchange info.
    pub symbol: String,
    /// Kline interval, only set for klines.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interval: Option<String>,
}

impl StreamKey {
    /// Key for a klines cache.
    pub fn klines(class: MarketClass, symbol: &str, interval: &str) -> Self {
        Self {
            class,
            kind: CacheKind::Klines,
            symbol: normalize_symbol(symbol),
            interval: Some(interval.to_string()),
        }
    }

    /// Key for a depth cache.
    pub fn depth(class: MarketClass, symbol: &str) -> Self {
        Self {
            class,
            kind: CacheKind::Depth,
            symbol: normalize_symbol(symbol),
            interval: None,
        }
    }

    /// Key for a 24h ticker cache.
    pub fn ticker(class: MarketClass, symbol: &str) -> Self {
        Self {
            class,
            kind: CacheKind::Ticker,
            symbol: normalize_symbol(symbol),
            interval: None,
        }
    }

    /// Key for the per-class exchange info cache.
    pub fn exchange_info(class: MarketClass) -> Self {
        Self {
            class,
            kind: CacheKind::ExchangeInfo,
            symbol: String::new(),
            interval: None,
        }
    }
}

impl fmt::Display for StreamKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.class, self.kind)?;
        if !self.symbol.is_empty() {
            write!(f, ".{}", self.symbol)?;
        }
        if let Some(interval) = &self.interval {
            write!(f, ".{}", interval)?;
        }
        Ok(())
    }
}

/// Upper-case and trim a symbol as received from a client.
pub fn normalize_symbol(symbol: &str) -> String {
    symbol.trim().to_ascii_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_market_class_display_and_parse() {
        for class in MarketClass::ALL {
            assert_eq!(class.to_string().parse::<MarketClass>().unwrap(), class);
        }
        assert!("margin".parse::<MarketClass>().is_err());
    }

    #[test]
    fn test_market_class_paths() {
        assert_eq!(MarketClass::Spot.path("/klines"), "/api/v3/klines");
        assert_eq!(MarketClass::Futures.path("/depth"), "/fapi/v1/depth");
        assert_eq!(MarketClass::Delivery.path("/ticker/24hr"), "/dapi/v1/ticker/24hr");
    }

    #[test]
    fn test_stream_key_normalizes_symbol_not_interval() {
        let a = StreamKey::klines(MarketClass::Spot, "btcusdt", "1M");
        let b = StreamKey::klines(MarketClass::Spot, " BTCUSDT", "1M");
        assert_eq!(a, b);
        assert_ne!(a, StreamKey::klines(MarketClass::Spot, "BTCUSDT", "1m"));
        assert_eq!(a.to_string(), "spot.klines.BTCUSDT.1M");
    }

    #[test]
    fn test_stream_key_distinguishes_class_and_kind() {
        let spot = StreamKey::depth(MarketClass::Spot, "ETHUSDT");
        let futures = StreamKey::depth(MarketClass::Futures, "ETHUSDT");
        let ticker = StreamKey::ticker(MarketClass::Spot, "ETHUSDT");
        assert_ne!(spot, futures);
        assert_ne!(spot, ticker);
        assert_eq!(StreamKey::exchange_info(MarketClass::Delivery).to_string(), "delivery.exchangeInfo");
    }
}
