//! Exchange metadata cache.
//!
//! There is no stream for exchange info. The "subscription" is a timer that
//! re-fetches the document every refresh period; a failed refresh ends it so
//! the cache falls back to its reconnect and backoff path while the last good
//! document keeps being served.

use std::pin::Pin;
use std::time::Duration;

use axum::body::Bytes;
use futures_util::{Stream, StreamExt};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_stream::wrappers::IntervalStream;
use tokio_util::sync::CancellationToken;

use crate::Result;
use crate::cache::streaming::Feed;
use crate::types::StreamKey;
use crate::upstream::rest::MarketRestClient;

/// Default time between refreshes.
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(3600);

/// Refreshed exchange info documents.
pub type RefreshStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// Keeps the exchange info document of one market class, byte for byte.
#[derive(Debug)]
pub struct ExchangeInfoFeed {
    key: StreamKey,
    rest: MarketRestClient,
    refresh: Duration,
    cancel: CancellationToken,
}

impl ExchangeInfoFeed {
    /// Create the feed. Refreshes stop when `cancel` fires.
    pub fn new(rest: MarketRestClient, refresh: Duration, cancel: CancellationToken) -> Self {
        Self {
            key: StreamKey::exchange_info(rest.class()),
            rest,
            refresh: refresh.max(Duration::from_secs(1)),
            cancel,
        }
    }

    /// Time between refreshes.
    pub fn refresh_interval(&self) -> Duration {
        self.refresh
    }
}

impl Feed for ExchangeInfoFeed {
    type State = Bytes;
    type Snapshot = Bytes;
    type Event = Bytes;
    type Events = RefreshStream;

    fn key(&self) -> &StreamKey {
        &self.key
    }

    async fn subscribe(&self) -> Result<RefreshStream> {
        let mut interval = tokio::time::interval_at(Instant::now() + self.refresh, self.refresh);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let rest = self.rest.clone();
        let cancel = self.cancel.clone();
        let ticks = IntervalStream::new(interval).then(move |_| {
            let rest = rest.clone();
            let cancel = cancel.clone();
            async move { rest.get_exchange_info(&cancel).await }
        });
        Ok(Box::pin(ticks))
    }

    async fn backfill(&self, cancel: &CancellationToken) -> Result<Bytes> {
        self.rest.get_exchange_info(cancel).await
    }

    fn apply(&self, state: &mut Bytes, event: Bytes) -> Result<bool> {
        if *state == event {
            return Ok(false);
        }
        *state = event;
        Ok(true)
    }

    fn snapshot(&self, state: &Bytes) -> Bytes {
        state.clone()
    }
}
