//! Common types used across the proxy.

pub mod common;
pub mod market_data;
pub mod query;
pub mod serde_helpers;

pub use common::*;
pub use market_data::{Candle, DepthSnapshot, MAX_CANDLES, PriceLevel, Ticker24hr};
pub use query::QueryParams;
