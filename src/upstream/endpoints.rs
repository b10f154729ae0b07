//! Binance endpoint constants.

/// Spot REST base URL.
pub const SPOT_REST_URL: &str = "https://api.binance.com";
/// USDⓈ-M futures REST base URL.
pub const FUTURES_REST_URL: &str = "https://fapi.binance.com";
/// COIN-M futures REST base URL.
pub const DELIVERY_REST_URL: &str = "https://dapi.binance.com";

/// Spot raw stream base URL.
pub const SPOT_WS_URL: &str = "wss://stream.binance.com:9443/ws";
/// USDⓈ-M futures raw stream base URL.
pub const FUTURES_WS_URL: &str = "wss://fstream.binance.com/ws";
/// COIN-M futures raw stream base URL.
pub const DELIVERY_WS_URL: &str = "wss://dstream.binance.com/ws";

/// Spot REST path prefix.
pub const SPOT_PREFIX: &str = "/api/v3";
/// USDⓈ-M futures REST path prefix.
pub const FUTURES_PREFIX: &str = "/fapi/v1";
/// COIN-M futures REST path prefix.
pub const DELIVERY_PREFIX: &str = "/dapi/v1";

/// Endpoint suffixes served from the caches, relative to the class prefix.
pub mod cached {
    /// Candlesticks.
    pub const KLINES: &str = "/klines";
    /// Order book.
    pub const DEPTH: &str = "/depth";
    /// 24h rolling statistics.
    pub const TICKER_24HR: &str = "/ticker/24hr";
    /// Exchange metadata.
    pub const EXCHANGE_INFO: &str = "/exchangeInfo";
}

/// Stream name builders.
pub mod streams {
    /// `<symbol>@kline_<interval>`
    pub fn kline(symbol: &str, interval: &str) -> String {
        format!("{}@kline_{}", symbol.to_ascii_lowercase(), interval)
    }

    /// `<symbol>@depth@100ms`
    pub fn depth(symbol: &str) -> String {
        format!("{}@depth@100ms", symbol.to_ascii_lowercase())
    }

    /// `<symbol>@ticker`
    pub fn ticker(symbol: &str) -> String {
        format!("{}@ticker", symbol.to_ascii_lowercase())
    }
}
