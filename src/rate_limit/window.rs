//! Weighted sliding window accounting.
//!
//! A [`SlidingWindow`] records every debit with its timestamp and forgets it
//! once it is older than the window interval, so the total weight inside any
//! rolling interval never exceeds the capacity.
//!
//! # Example
//!
//! ```rust
//! use std::time::Duration;
//! use binance_proxy::rate_limit::{SlidingWindow, WindowLimit};
//!
//! let mut window = SlidingWindow::new(WindowLimit::weight(Duration::from_secs(60), 10));
//! assert!(window.try_acquire(6).is_ok());
//! assert!(window.try_acquire(6).is_err());
//! assert_eq!(window.remaining(), 4);
//! ```

use std::collections::VecDeque;
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

/// What a window counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WindowKind {
    /// Sum of request weights (`REQUEST_WEIGHT`).
    RequestWeight,
    /// Number of requests regardless of weight (`RAW_REQUESTS`).
    RawRequests,
}

/// Capacity of one accounting window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowLimit {
    /// What is counted.
    pub kind: WindowKind,
    /// Length of the rolling window.
    pub interval: Duration,
    /// Maximum total within the window.
    pub capacity: u32,
}

impl WindowLimit {
    /// A request weight window.
    pub fn weight(interval: Duration, capacity: u32) -> Self {
        Self {
            kind: WindowKind::RequestWeight,
            interval,
            capacity,
        }
    }

    /// A raw request count window.
    pub fn raw_requests(interval: Duration, capacity: u32) -> Self {
        Self {
            kind: WindowKind::RawRequests,
            interval,
            capacity,
        }
    }
}

/// Point-in-time view of a window, for diagnostics.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowUsage {
    /// What is counted.
    pub kind: WindowKind,
    /// Window length in seconds.
    pub interval_secs: u64,
    /// Configured capacity.
    pub capacity: u32,
    /// Amount currently debited.
    pub used: u32,
}

/// A weighted sliding window rate limiter.
#[derive(Debug)]
pub struct SlidingWindow {
    limit: WindowLimit,
    /// Debits in arrival order.
    entries: VecDeque<(Instant, u32)>,
    /// Sum of `entries`.
    used: u32,
}

impl SlidingWindow {
    /// Create an empty window.
    pub fn new(limit: WindowLimit) -> Self {
        Self {
            limit,
            entries: VecDeque::new(),
            used: 0,
        }
    }

    /// Amount this window charges for a request of the given weight.
    ///
    /// Charges are clamped to the capacity so an oversized request can still
    /// be admitted once the window is empty.
    pub fn cost(&self, weight: u32) -> u32 {
        let capacity = self.limit.capacity.max(1);
        match self.limit.kind {
            WindowKind::RequestWeight => weight.clamp(1, capacity),
            WindowKind::RawRequests => 1,
        }
    }

    /// How long until a request of `weight` fits, or `None` if it fits now.
    pub fn time_until_fits(&mut self, weight: u32, now: Instant) -> Option<Duration> {
        self.expire(now);

        let cost = self.cost(weight);
        let capacity = self.limit.capacity.max(1);
        if self.used + cost <= capacity {
            return None;
        }

        // Walk the oldest debits until enough would have expired.
        let mut remaining = self.used;
        for (at, amount) in &self.entries {
            remaining -= amount;
            if remaining + cost <= capacity {
                let expires = *at + self.limit.interval;
                return Some(expires.saturating_duration_since(now).max(Duration::from_millis(1)));
            }
        }

        // Not reached: cost never exceeds capacity.
        Some(self.limit.interval)
    }

    /// Record a request of `weight` at `now`. Does not check capacity.
    pub fn debit(&mut self, weight: u32, now: Instant) {
        let cost = self.cost(weight);
        self.entries.push_back((now, cost));
        self.used += cost;
    }

    /// Try to debit a request right now.
    ///
    /// Returns `Ok(())` if allowed, `Err(wait_time)` if the window is full.
    pub fn try_acquire(&mut self, weight: u32) -> Result<(), Duration> {
        let now = Instant::now();
        match self.time_until_fits(weight, now) {
            None => {
                self.debit(weight, now);
                Ok(())
            }
            Some(wait) => Err(wait),
        }
    }

    /// Amount currently debited inside the window.
    pub fn used(&self) -> u32 {
        let now = Instant::now();
        self.entries
            .iter()
            .filter(|(at, _)| now.saturating_duration_since(*at) < self.limit.interval)
            .map(|(_, amount)| amount)
            .sum()
    }

    /// Capacity left inside the window.
    pub fn remaining(&self) -> u32 {
        self.limit.capacity.saturating_sub(self.used())
    }

    /// Diagnostic snapshot.
    pub fn usage(&self) -> WindowUsage {
        WindowUsage {
            kind: self.limit.kind,
            interval_secs: self.limit.interval.as_secs(),
            capacity: self.limit.capacity,
            used: self.used(),
        }
    }

    /// Remove debits that are outside the window.
    fn expire(&mut self, now: Instant) {
        while let Some((at, amount)) = self.entries.front().copied() {
            if now.saturating_duration_since(at) >= self.limit.interval {
                self.entries.pop_front();
                self.used -= amount;
            } else {
                break;
            }
        }
    }
}
