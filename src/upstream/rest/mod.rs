//! Binance REST access for the caches.

mod client;

pub use client::{MarketRestClient, MarketRestClientBuilder};
