//! Which requests can be answered from a cache.
//!
//! A request is only served from memory when the cache holds exactly what
//! upstream would return for it. Anything else, including malformed
//! requests, goes upstream so the exchange answers (and errors) faithfully.

use axum::http::Method;

use crate::cache::depth::MAX_DEPTH;
use crate::types::{MAX_CANDLES, MarketClass, QueryParams, normalize_symbol};
use crate::upstream::endpoints::cached;

/// Candles returned by `/klines` when no limit is given.
pub const DEFAULT_KLINES_LIMIT: usize = 500;

/// Levels per side returned by `/depth` when no limit is given.
pub fn default_depth_limit(class: MarketClass) -> usize {
    match class {
        MarketClass::Spot => 100,
        MarketClass::Futures | MarketClass::Delivery => 500,
    }
}

/// Depth limits accepted by the futures and delivery APIs.
const DERIVATIVES_DEPTH_LIMITS: [usize; 7] = [5, 10, 20, 50, 100, 500, 1000];

/// Kline intervals with a stream on every market class.
const INTERVALS: [&str; 15] = [
    "1m", "3m", "5m", "15m", "30m", "1h", "2h", "4h", "6h", "8h", "12h", "1d", "3d", "1w", "1M",
];

/// Where a request is answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// Newest `limit` candles of a series.
    Klines {
        /// Upper-case symbol.
        symbol: String,
        /// Interval, verbatim.
        interval: String,
        /// Number of candles.
        limit: usize,
    },
    /// Top `limit` levels of an order book.
    Depth {
        /// Upper-case symbol.
        symbol: String,
        /// Levels per side.
        limit: usize,
    },
    /// 24h statistics of one symbol.
    Ticker {
        /// Upper-case symbol.
        symbol: String,
    },
    /// Exchange metadata document.
    ExchangeInfo,
    /// Forward upstream unchanged.
    Passthrough,
}

/// Decide how a request to a `class` listener is answered.
pub fn route(class: MarketClass, method: &Method, path: &str, query: &QueryParams) -> Route {
    if *method != Method::GET {
        return Route::Passthrough;
    }
    let Some(suffix) = path.strip_prefix(class.api_prefix()) else {
        return Route::Passthrough;
    };

    let routed = match suffix {
        cached::KLINES => klines(class, query),
        cached::DEPTH => depth(class, query),
        cached::TICKER_24HR => ticker(query),
        cached::EXCHANGE_INFO if query.is_empty() => Some(Route::ExchangeInfo),
        _ => None,
    };

    routed.unwrap_or(Route::Passthrough)
}

fn klines(class: MarketClass, query: &QueryParams) -> Option<Route> {
    if !only_keys(query, &["symbol", "interval", "limit"]) {
        return None;
    }
    let symbol = symbol(query)?;
    let interval = query.get("interval")?;
    let known = INTERVALS.contains(&interval) || (class == MarketClass::Spot && interval == "1s");
    if !known {
        return None;
    }
    let limit = limit(query, DEFAULT_KLINES_LIMIT)?;
    if limit == 0 || limit > MAX_CANDLES {
        return None;
    }

    Some(Route::Klines {
        symbol,
        interval: interval.to_string(),
        limit,
    })
}

fn depth(class: MarketClass, query: &QueryParams) -> Option<Route> {
    if !only_keys(query, &["symbol", "limit"]) {
        return None;
    }
    let symbol = symbol(query)?;
    let limit = limit(query, default_depth_limit(class))?;
    let valid = match class {
        MarketClass::Spot => (1..=MAX_DEPTH).contains(&limit),
        MarketClass::Futures | MarketClass::Delivery => DERIVATIVES_DEPTH_LIMITS.contains(&limit),
    };
    if !valid {
        return None;
    }

    Some(Route::Depth { symbol, limit })
}

fn ticker(query: &QueryParams) -> Option<Route> {
    if !only_keys(query, &["symbol"]) {
        return None;
    }
    Some(Route::Ticker {
        symbol: symbol(query)?,
    })
}

/// Whether every parameter is one of `allowed`, each given once.
fn only_keys(query: &QueryParams, allowed: &[&str]) -> bool {
    let mut seen = Vec::with_capacity(query.len());
    for (key, _) in query.iter() {
        if !allowed.contains(&key) || seen.contains(&key) {
            return false;
        }
        seen.push(key);
    }
    true
}

fn symbol(query: &QueryParams) -> Option<String> {
    let symbol = normalize_symbol(query.get("symbol")?);
    let valid = !symbol.is_empty() && symbol.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    valid.then_some(symbol)
}

/// `limit` if present and numeric, `default` if absent, `None` if malformed.
fn limit(query: &QueryParams, default: usize) -> Option<usize> {
    match query.get("limit") {
        None => Some(default),
        Some(_) => query.get_u32("limit").map(|limit| limit as usize),
    }
}
