//! Per-class weighted limiter with FIFO admission.

use std::sync::Arc;

use reqwest::Method;
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::Result;
use crate::backoff::sleep_or_cancel;
use crate::error::ProxyError;
use crate::rate_limit::{RateLimitConfig, SlidingWindow, WindowLimit, WindowUsage, request_weight};
use crate::types::{MarketClass, QueryParams};

/// Admission control for all upstream requests of one market class.
///
/// Callers are admitted in arrival order: the queue lock is fair, and the
/// caller at its head keeps it while sleeping for capacity, so a later
/// caller with a small weight cannot overtake an earlier one with a large
/// weight. A cancelled waiter leaves the queue without debiting anything.
#[derive(Debug)]
pub struct RateLimiter {
    class: MarketClass,
    enabled: bool,
    /// Serializes admission; held by the waiter at the head of the queue.
    queue: Mutex<()>,
    /// Window state, only locked for short non-awaiting sections.
    windows: Mutex<Vec<SlidingWindow>>,
}

impl RateLimiter {
    /// Create a limiter enforcing the given windows.
    pub fn new(class: MarketClass, limits: Vec<WindowLimit>) -> Self {
        Self {
            class,
            enabled: true,
            queue: Mutex::new(()),
            windows: Mutex::new(limits.into_iter().map(SlidingWindow::new).collect()),
        }
    }

    /// Create a limiter for a class from configuration.
    pub fn for_class(class: MarketClass, config: &RateLimitConfig) -> Self {
        let mut limiter = Self::new(class, config.windows(class));
        limiter.enabled = config.enabled;
        limiter
    }

    /// A limiter that admits everything immediately.
    pub fn disabled(class: MarketClass) -> Self {
        let mut limiter = Self::new(class, Vec::new());
        limiter.enabled = false;
        limiter
    }

    /// Market class this limiter guards.
    pub fn class(&self) -> MarketClass {
        self.class
    }

    /// Whether limits are enforced.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Wait until the request described by `method`, `path` and `query` may
    /// be sent, then debit its weight.
    ///
    /// Returns [`ProxyError::Cancelled`] if `cancel` fires first.
    pub async fn wait(
        &self,
        method: &Method,
        path: &str,
        query: &QueryParams,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let weight = request_weight(self.class, method, path, query);
        trace!(class = %self.class, %method, path, weight, "Waiting for rate limiter");
        self.acquire(weight, cancel).await
    }

    /// Wait until `weight` fits in every window, then debit it from all of them.
    pub async fn acquire(&self, weight: u32, cancel: &CancellationToken) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }

        let _turn = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ProxyError::Cancelled),
            turn = self.queue.lock() => turn,
        };

        loop {
            let wait = {
                let mut windows = self.windows.lock().await;
                let now = Instant::now();
                let wait = windows
                    .iter_mut()
                    .filter_map(|window| window.time_until_fits(weight, now))
                    .max();
                match wait {
                    None => {
                        for window in windows.iter_mut() {
                            window.debit(weight, now);
                        }
                        return Ok(());
                    }
                    Some(wait) => wait,
                }
            };

            debug!(
                class = %self.class,
                weight,
                wait_ms = wait.as_millis() as u64,
                "Rate limit reached, delaying upstream request"
            );
            if !sleep_or_cancel(wait, cancel).await {
                return Err(ProxyError::Cancelled);
            }
        }
    }

    /// Current usage of every window.
    pub async fn usage(&self) -> Vec<WindowUsage> {
        self.windows.lock().await.iter().map(SlidingWindow::usage).collect()
    }
}

/// Usage of one class, for diagnostics.
#[derive(Debug, Clone, Serialize)]
pub struct ClassUsage {
    /// Market class.
    pub class: MarketClass,
    /// Whether limits are enforced.
    pub enabled: bool,
    /// Per-window usage.
    pub windows: Vec<WindowUsage>,
}

/// The three per-class limiters, shared by caches and pass-through.
#[derive(Debug, Clone)]
pub struct RateLimiters {
    spot: Arc<RateLimiter>,
    futures: Arc<RateLimiter>,
    delivery: Arc<RateLimiter>,
}

impl RateLimiters {
    /// Create limiters for all classes from configuration.
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            spot: Arc::new(RateLimiter::for_class(MarketClass::Spot, config)),
            futures: Arc::new(RateLimiter::for_class(MarketClass::Futures, config)),
            delivery: Arc::new(RateLimiter::for_class(MarketClass::Delivery, config)),
        }
    }

    /// Limiter for a market class.
    pub fn for_class(&self, class: MarketClass) -> &Arc<RateLimiter> {
        match class {
            MarketClass::Spot => &self.spot,
            MarketClass::Futures => &self.futures,
            MarketClass::Delivery => &self.delivery,
        }
    }

    /// Wait on the limiter of `class`.
    pub async fn wait(
        &self,
        class: MarketClass,
        method: &Method,
        path: &str,
        query: &QueryParams,
        cancel: &CancellationToken,
    ) -> Result<()> {
        self.for_class(class).wait(method, path, query, cancel).await
    }

    /// Usage of every class.
    pub async fn usage(&self) -> Vec<ClassUsage> {
        let mut usage = Vec::with_capacity(MarketClass::ALL.len());
        for class in MarketClass::ALL {
            let limiter = self.for_class(class);
            usage.push(ClassUsage {
                class,
                enabled: limiter.is_enabled(),
                windows: limiter.usage().await,
            });
        }
        usage
    }
}
