//! # Binance Proxy
//!
//! A caching, rate-limited reverse proxy for the Binance spot, USDⓈ-M
//! futures and COIN-M futures REST APIs.
//!
//! ## Features
//!
//! - Candlesticks, order book depth, 24h tickers and exchange info are
//!   answered from memory, kept current by streaming subscriptions
//! - Every other request is forwarded verbatim to the matching upstream host
//! - All upstream REST traffic shares one weighted, FIFO rate limiter per
//!   market class
//! - Financial precision with `rust_decimal`
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use binance_proxy::config::ProxyConfig;
//! use binance_proxy::server::ProxyServer;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ProxyConfig::builder().idle_timeout(None).build();
//!     ProxyServer::new(config, CancellationToken::new()).run().await?;
//!     Ok(())
//! }
//! ```

pub mod backoff;
pub mod cache;
pub mod config;
pub mod error;
pub mod proxy;
pub mod rate_limit;
pub mod server;
pub mod types;
pub mod upstream;

// Re-export commonly used types at crate root
pub use error::ProxyError;
pub use types::{MarketClass, StreamKey};

/// Result type alias using ProxyError
pub type Result<T> = std::result::Result<T, ProxyError>;
