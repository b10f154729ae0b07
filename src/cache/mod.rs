//! Self-maintaining caches for the hot market data endpoints.
//!
//! Each cache is a [`StreamingCache`] driven by a [`Feed`]:
//!
//! - [`KlinesFeed`]: candlestick series, merged from the kline stream
//! - [`DepthFeed`]: order book, patched with diff events
//! - [`TickerFeed`]: 24h statistics, replaced by each ticker event
//! - [`ExchangeInfoFeed`]: exchange metadata, re-fetched on a timer
//!
//! Caches are created on first use through a [`CacheRegistry`].

pub mod depth;
pub mod exchange_info;
mod gate;
pub mod klines;
pub mod registry;
mod streaming;
pub mod ticker;

pub use depth::{DepthFeed, OrderBook};
pub use exchange_info::ExchangeInfoFeed;
pub use gate::ReadinessGate;
pub use klines::KlinesFeed;
pub use registry::{CacheInfo, CacheOptions, CacheRegistry};
pub use streaming::{CacheState, Feed, StreamingCache};
pub use ticker::TickerFeed;
