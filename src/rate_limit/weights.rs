//! Request weight table.
//!
//! Costs follow the published weights of the Binance REST endpoints. Anything
//! not listed costs 1.

use reqwest::Method;

use crate::types::{MarketClass, QueryParams};

/// Weight of a request against the `REQUEST_WEIGHT` window of its class.
///
/// `path` is the full request path including the class prefix; a path with a
/// foreign prefix is weighed by its suffix all the same.
pub fn request_weight(class: MarketClass, method: &Method, path: &str, query: &QueryParams) -> u32 {
    let suffix = strip_prefix(path);
    match class {
        MarketClass::Spot => spot_weight(method, suffix, query),
        MarketClass::Futures | MarketClass::Delivery => derivatives_weight(class, method, suffix, query),
    }
}

fn strip_prefix(path: &str) -> &str {
    for prefix in ["/api/v3", "/fapi/v1", "/dapi/v1", "/fapi/v2", "/fapi/v3", "/dapi/v2"] {
        if let Some(rest) = path.strip_prefix(prefix) {
            return rest;
        }
    }
    path
}

/// Number of symbols in a `symbols=["A","B"]` parameter.
fn symbols_count(query: &QueryParams) -> Option<usize> {
    let raw = query.get("symbols")?;
    match serde_json::from_str::<Vec<String>>(raw) {
        Ok(symbols) => Some(symbols.len()),
        Err(_) => Some(raw.split(',').filter(|s| !s.trim().is_empty()).count()),
    }
}

fn spot_weight(method: &Method, suffix: &str, query: &QueryParams) -> u32 {
    match (method, suffix) {
        (_, "/ping") | (_, "/time") => 1,
        (_, "/exchangeInfo") => 20,
        (_, "/depth") => match query.get_u32("limit").unwrap_or(100) {
            0..=100 => 5,
            101..=500 => 25,
            501..=1000 => 50,
            _ => 250,
        },
        (_, "/trades") | (_, "/historicalTrades") => 25,
        (_, "/aggTrades") | (_, "/klines") | (_, "/uiKlines") | (_, "/avgPrice") => 2,
        (_, "/ticker/24hr") => {
            if query.contains("symbol") {
                2
            } else {
                match symbols_count(query) {
                    Some(0..=20) => 2,
                    Some(21..=100) => 40,
                    _ => 80,
                }
            }
        }
        (_, "/ticker/price") | (_, "/ticker/bookTicker") => {
            if query.contains("symbol") {
                2
            } else {
                4
            }
        }
        (_, "/ticker") | (_, "/ticker/tradingDay") => {
            let symbols = if query.contains("symbol") {
                1
            } else {
                symbols_count(query).unwrap_or(1)
            };
            (4 * symbols as u32).min(200)
        }
        (m, "/order") if m == Method::GET => 4,
        (m, "/openOrders") if m == Method::GET => {
            if query.contains("symbol") {
                6
            } else {
                80
            }
        }
        (_, "/allOrders") | (_, "/account") | (_, "/myTrades") => 20,
        _ => 1,
    }
}

fn derivatives_weight(class: MarketClass, method: &Method, suffix: &str, query: &QueryParams) -> u32 {
    match (method, suffix) {
        (_, "/ping") | (_, "/time") | (_, "/exchangeInfo") => 1,
        (_, "/depth") => match query.get_u32("limit").unwrap_or(500) {
            0..=50 => 2,
            51..=100 => 5,
            101..=500 => 10,
            _ => 20,
        },
        (_, "/klines")
        | (_, "/continuousKlines")
        | (_, "/indexPriceKlines")
        | (_, "/markPriceKlines")
        | (_, "/premiumIndexKlines") => match query.get_u32("limit").unwrap_or(500) {
            0..=99 => 1,
            100..=499 => 2,
            500..=1000 => 5,
            _ => 10,
        },
        (_, "/trades") => 5,
        (_, "/historicalTrades") | (_, "/aggTrades") => 20,
        (_, "/ticker/24hr") => {
            let scoped = query.contains("symbol")
                || (class == MarketClass::Delivery && query.contains("pair"));
            if scoped { 1 } else { 40 }
        }
        (_, "/ticker/price") | (_, "/ticker/bookTicker") => {
            let scoped = query.contains("symbol")
                || (class == MarketClass::Delivery && query.contains("pair"));
            if scoped { 1 } else { 2 }
        }
        (_, "/premiumIndex") | (_, "/openInterest") | (_, "/fundingRate") => 1,
        (m, "/openOrders") if m == Method::GET => {
            if query.contains("symbol") {
                1
            } else {
                40
            }
        }
        (_, "/account")
        | (_, "/balance")
        | (_, "/allOrders")
        | (_, "/userTrades")
        | (_, "/positionRisk") => 5,
        _ => 1,
    }
}
