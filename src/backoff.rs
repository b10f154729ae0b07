//! Retry delay sequencing.
//!
//! Every retry loop in the proxy (stream reconnects, REST backfills and the
//! periodic exchange info refresh) draws its waits from a [`DelayIterator`].
//! The iterator only produces durations; sleeping is left to the caller so the
//! sequence can be asserted without real time passing.
//!
//! # Example
//!
//! ```rust
//! use std::time::Duration;
//! use binance_proxy::backoff::DelayIterator;
//!
//! let mut delays = DelayIterator::new(Duration::from_secs(1), Duration::from_secs(4));
//! assert_eq!(delays.next_delay(), Duration::from_secs(1));
//! assert_eq!(delays.next_delay(), Duration::from_secs(2));
//! assert_eq!(delays.next_delay(), Duration::from_secs(4));
//! assert_eq!(delays.next_delay(), Duration::from_secs(4));
//!
//! delays.reset();
//! assert_eq!(delays.next_delay(), Duration::from_secs(1));
//! ```

use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// Backoff parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffConfig {
    /// First delay handed out after a failure.
    pub initial: Duration,
    /// Ceiling for the delay.
    pub max: Duration,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(1),
            max: Duration::from_secs(60),
        }
    }
}

/// Infinite exponential delay sequence capped at a maximum.
///
/// Delays double on each call to [`next_delay`](Self::next_delay) until they
/// reach the ceiling, then stay there. The sequence never ends; retries stop
/// only when the owner is cancelled.
#[derive(Debug, Clone)]
pub struct DelayIterator {
    config: BackoffConfig,
    attempt: u32,
}

impl DelayIterator {
    /// Create a new delay sequence.
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self::with_config(BackoffConfig { initial, max })
    }

    /// Create a new delay sequence from a [`BackoffConfig`].
    pub fn with_config(config: BackoffConfig) -> Self {
        Self { config, attempt: 0 }
    }

    /// Return the delay to wait before the next attempt and advance.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.peek();
        self.attempt = self.attempt.saturating_add(1);
        delay
    }

    /// Return the delay the next call to [`next_delay`](Self::next_delay) would produce.
    pub fn peek(&self) -> Duration {
        let base = self.config.initial.as_millis() as u64;
        let max = self.config.max.as_millis() as u64;
        let multiplier = 2u64.saturating_pow(self.attempt);
        Duration::from_millis(base.saturating_mul(multiplier).min(max))
    }

    /// Go back to the initial delay.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    /// Number of delays handed out since the last reset.
    pub fn attempts(&self) -> u32 {
        self.attempt
    }
}

impl Default for DelayIterator {
    fn default() -> Self {
        Self::with_config(BackoffConfig::default())
    }
}

impl Iterator for DelayIterator {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        Some(self.next_delay())
    }
}

/// Sleep for `delay` unless `cancel` fires first.
///
/// Returns `false` if the sleep was cut short by cancellation.
pub async fn sleep_or_cancel(delay: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}
