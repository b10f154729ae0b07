//! Upstream Binance connectivity: REST backfills and market streams.

pub mod endpoints;
pub mod rest;
pub mod ws;
