//! Candlestick series cache.

use std::collections::VecDeque;

use tokio_util::sync::CancellationToken;

use crate::Result;
use crate::cache::streaming::Feed;
use crate::types::{Candle, MAX_CANDLES, StreamKey};
use crate::upstream::rest::MarketRestClient;
use crate::upstream::ws::{MarketStream, MarketWsClient, StreamEvent};

/// Keeps the newest [`MAX_CANDLES`] candles of one `(symbol, interval)` series.
#[derive(Debug)]
pub struct KlinesFeed {
    key: StreamKey,
    rest: MarketRestClient,
    ws: MarketWsClient,
}

impl KlinesFeed {
    /// Create the feed for `symbol` at `interval`.
    pub fn new(rest: MarketRestClient, ws: MarketWsClient, symbol: &str, interval: &str) -> Self {
        Self {
            key: StreamKey::klines(rest.class(), symbol, interval),
            rest,
            ws,
        }
    }

    fn interval(&self) -> &str {
        self.key.interval.as_deref().unwrap_or_default()
    }
}

impl Feed for KlinesFeed {
    type State = VecDeque<Candle>;
    type Snapshot = Vec<Candle>;
    type Event = StreamEvent;
    type Events = MarketStream;

    fn key(&self) -> &StreamKey {
        &self.key
    }

    async fn subscribe(&self) -> Result<MarketStream> {
        self.ws.subscribe_klines(&self.key.symbol, self.interval()).await
    }

    async fn backfill(&self, cancel: &CancellationToken) -> Result<VecDeque<Candle>> {
        let candles = self
            .rest
            .get_klines(&self.key.symbol, self.interval(), MAX_CANDLES as u32, cancel)
            .await?;

        let mut series = VecDeque::with_capacity(MAX_CANDLES);
        for candle in candles {
            merge_candle(&mut series, candle);
        }
        Ok(series)
    }

    fn apply(&self, state: &mut VecDeque<Candle>, event: StreamEvent) -> Result<bool> {
        Ok(match event.candle() {
            Some(candle) => merge_candle(state, candle),
            None => false,
        })
    }

    fn snapshot(&self, state: &VecDeque<Candle>) -> Vec<Candle> {
        state.iter().cloned().collect()
    }
}

/// Merge one candle into a series ordered by open time.
///
/// A newer candle is appended, a candle for the tail's open time replaces
/// the tail, and anything older is ignored. The series is then trimmed to
/// [`MAX_CANDLES`]. Returns whether the series changed.
pub fn merge_candle(series: &mut VecDeque<Candle>, candle: Candle) -> bool {
    let changed = match series.back_mut() {
        Some(tail) if candle.open_time == tail.open_time => {
            if *tail == candle {
                false
            } else {
                *tail = candle;
                true
            }
        }
        Some(tail) if candle.open_time < tail.open_time => false,
        _ => {
            series.push_back(candle);
            true
        }
    };

    while series.len() > MAX_CANDLES {
        series.pop_front();
    }

    changed
}

/// The newest `limit` candles of a snapshot, oldest first.
pub fn newest(candles: &[Candle], limit: usize) -> &[Candle] {
    &candles[candles.len().saturating_sub(limit)..]
}
