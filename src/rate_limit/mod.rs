//! Rate limiting for upstream Binance requests.
//!
//! Binance enforces IP-scoped limits per product, counted in request weight
//! (each endpoint has a cost that may depend on its parameters) and, on spot,
//! also in raw request count. Exceeding them yields HTTP 429 and then an IP
//! ban, so every request the proxy sends upstream first waits on the limiter
//! for its market class.
//!
//! ## Structure
//!
//! - [`SlidingWindow`]: one weighted rolling window
//! - [`request_weight`]: the cost table
//! - [`RateLimiter`]: all windows of one market class, FIFO and cancellable
//! - [`RateLimiters`]: the three per-class limiters
//!
//! ## Example
//!
//! ```rust
//! use binance_proxy::rate_limit::{RateLimitConfig, RateLimiters};
//! use binance_proxy::types::{MarketClass, QueryParams};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run() -> binance_proxy::Result<()> {
//! let limiters = RateLimiters::new(&RateLimitConfig::default());
//! let cancel = CancellationToken::new();
//! let query = QueryParams::parse(Some("symbol=BTCUSDT&limit=1000"));
//! limiters
//!     .for_class(MarketClass::Spot)
//!     .wait(&reqwest::Method::GET, "/api/v3/depth", &query, &cancel)
//!     .await?;
//! # Ok(())
//! # }
//! ```

mod limiter;
mod weights;
mod window;

pub use limiter::{ClassUsage, RateLimiter, RateLimiters};
pub use weights::request_weight;
pub use window::{SlidingWindow, WindowKind, WindowLimit, WindowUsage};

use std::time::Duration;

use crate::types::MarketClass;

/// Rate limiter configuration.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Whether to enforce the limits at all.
    pub enabled: bool,
    /// Fraction of each published capacity the proxy allows itself, in `(0, 1]`.
    pub headroom: f64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            headroom: 1.0,
        }
    }
}

impl RateLimitConfig {
    /// Windows enforced for a market class, scaled by `headroom`.
    pub fn windows(&self, class: MarketClass) -> Vec<WindowLimit> {
        let scale = |capacity: u32| -> u32 {
            let headroom = if self.headroom.is_finite() {
                self.headroom.clamp(0.0, 1.0)
            } else {
                1.0
            };
            ((capacity as f64 * headroom).floor() as u32).max(1)
        };

        match class {
            MarketClass::Spot => vec![
                WindowLimit::weight(
                    Duration::from_secs(60),
                    scale(limits::spot::REQUEST_WEIGHT_PER_MINUTE),
                ),
                WindowLimit::raw_requests(
                    Duration::from_secs(300),
                    scale(limits::spot::RAW_REQUESTS_PER_5_MINUTES),
                ),
            ],
            MarketClass::Futures => vec![WindowLimit::weight(
                Duration::from_secs(60),
                scale(limits::futures::REQUEST_WEIGHT_PER_MINUTE),
            )],
            MarketClass::Delivery => vec![WindowLimit::weight(
                Duration::from_secs(60),
                scale(limits::delivery::REQUEST_WEIGHT_PER_MINUTE),
            )],
        }
    }
}

/// Published IP limits per market class.
pub mod limits {
    /// Spot (`api.binance.com`).
    pub mod spot {
        /// `REQUEST_WEIGHT` per minute.
        pub const REQUEST_WEIGHT_PER_MINUTE: u32 = 6000;
        /// `RAW_REQUESTS` per five minutes.
        pub const RAW_REQUESTS_PER_5_MINUTES: u32 = 61_000;
    }

    /// USDⓈ-M futures (`fapi.binance.com`).
    pub mod futures {
        /// `REQUEST_WEIGHT` per minute.
        pub const REQUEST_WEIGHT_PER_MINUTE: u32 = 2400;
    }

    /// COIN-M futures (`dapi.binance.com`).
    pub mod delivery {
        /// `REQUEST_WEIGHT` per minute.
        pub const REQUEST_WEIGHT_PER_MINUTE: u32 = 2400;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_windows_per_class() {
        let config = RateLimitConfig::default();

        let spot = config.windows(MarketClass::Spot);
        assert_eq!(spot.len(), 2);
        assert_eq!(spot[0].capacity, 6000);
        assert_eq!(spot[1].kind, WindowKind::RawRequests);
        assert_eq!(spot[1].interval, Duration::from_secs(300));

        let futures = config.windows(MarketClass::Futures);
        assert_eq!(futures, vec![WindowLimit::weight(Duration::from_secs(60), 2400)]);
    }

    #[test]
    fn test_headroom_scales_capacity() {
        let config = RateLimitConfig {
            enabled: true,
            headroom: 0.5,
        };
        assert_eq!(config.windows(MarketClass::Delivery)[0].capacity, 1200);
        assert_eq!(config.windows(MarketClass::Spot)[1].capacity, 30_500);
    }

    #[test]
    fn test_headroom_out_of_range_is_clamped() {
        let config = RateLimitConfig {
            enabled: true,
            headroom: 3.0,
        };
        assert_eq!(config.windows(MarketClass::Futures)[0].capacity, 2400);

        let config = RateLimitConfig {
            enabled: true,
            headroom: 0.0,
        };
        assert_eq!(config.windows(MarketClass::Futures)[0].capacity, 1);
    }
}
