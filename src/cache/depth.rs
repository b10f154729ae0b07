//! Order book cache.
//!
//! A REST snapshot is patched with diff events. Binance documents the
//! procedure per product:
//!
//! 1. Buffer the stream, fetch `/depth?limit=1000`.
//! 2. Drop events with `u <= lastUpdateId`.
//! 3. The first applied event must satisfy `U <= lastUpdateId + 1 <= u`.
//! 4. Afterwards each event must continue the previous one: `U == last + 1`
//!    on spot, `pu == last` on futures and delivery.
//!
//! Any violation means the local book can no longer be trusted and is
//! rebuilt from a fresh snapshot.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use tokio_util::sync::CancellationToken;

use crate::Result;
use crate::cache::streaming::Feed;
use crate::error::ProxyError;
use crate::types::{DepthSnapshot, PriceLevel, StreamKey};
use crate::upstream::rest::MarketRestClient;
use crate::upstream::ws::messages::DepthDelta;
use crate::upstream::ws::{MarketStream, MarketWsClient, StreamEvent};

/// Levels requested when backfilling, and the most ever served.
pub const MAX_DEPTH: usize = 1000;

/// Locally maintained order book.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrderBook {
    last_update_id: u64,
    /// Whether an event has been applied since the snapshot.
    synced: bool,
    bids: BTreeMap<Decimal, Decimal>,
    asks: BTreeMap<Decimal, Decimal>,
    symbol: Option<String>,
    pair: Option<String>,
    event_time: Option<i64>,
    transaction_time: Option<i64>,
}

impl OrderBook {
    /// Build a book from a REST snapshot.
    pub fn from_snapshot(snapshot: DepthSnapshot) -> Self {
        let levels = |side: Vec<PriceLevel>| -> BTreeMap<Decimal, Decimal> {
            side.into_iter().filter(|(_, qty)| !qty.is_zero()).collect()
        };

        Self {
            last_update_id: snapshot.last_update_id,
            synced: false,
            bids: levels(snapshot.bids),
            asks: levels(snapshot.asks),
            symbol: snapshot.symbol,
            pair: snapshot.pair,
            event_time: snapshot.event_time,
            transaction_time: snapshot.transaction_time,
        }
    }

    /// Id of the last update reflected in the book.
    pub fn last_update_id(&self) -> u64 {
        self.last_update_id
    }

    /// Apply one diff.
    ///
    /// Returns `Ok(false)` for events already contained in the book and
    /// [`ProxyError::Resync`] when the event does not continue it.
    pub fn apply(&mut self, delta: &DepthDelta<'_>) -> Result<bool> {
        if delta.final_update_id <= self.last_update_id {
            return Ok(false);
        }

        if !self.synced {
            if delta.first_update_id > self.last_update_id + 1 {
                return Err(ProxyError::Resync(format!(
                    "first event {}..{} does not cover snapshot {}",
                    delta.first_update_id, delta.final_update_id, self.last_update_id
                )));
            }
        } else {
            let continuous = match delta.prev_final_update_id {
                Some(prev) => prev == self.last_update_id,
                None => delta.first_update_id == self.last_update_id + 1,
            };
            if !continuous {
                return Err(ProxyError::Resync(format!(
                    "gap after update {}: next event starts at {}",
                    self.last_update_id, delta.first_update_id
                )));
            }
        }

        update_side(&mut self.bids, delta.bids);
        update_side(&mut self.asks, delta.asks);
        self.last_update_id = delta.final_update_id;
        self.synced = true;
        self.event_time = Some(delta.event_time);
        if delta.transaction_time.is_some() {
            self.transaction_time = delta.transaction_time;
        }

        Ok(true)
    }

    /// REST-shaped view with at most `limit` levels per side.
    pub fn to_snapshot(&self, limit: usize) -> DepthSnapshot {
        DepthSnapshot {
            last_update_id: self.last_update_id,
            symbol: self.symbol.clone(),
            pair: self.pair.clone(),
            event_time: self.event_time,
            transaction_time: self.transaction_time,
            bids: self.bids.iter().rev().take(limit).map(|(p, q)| (*p, *q)).collect(),
            asks: self.asks.iter().take(limit).map(|(p, q)| (*p, *q)).collect(),
        }
    }
}

fn update_side(side: &mut BTreeMap<Decimal, Decimal>, levels: &[PriceLevel]) {
    for (price, qty) in levels {
        if qty.is_zero() {
            side.remove(price);
        } else {
            side.insert(*price, *qty);
        }
    }
}

/// Keeps the order book of one symbol.
#[derive(Debug)]
pub struct DepthFeed {
    key: StreamKey,
    rest: MarketRestClient,
    ws: MarketWsClient,
}

impl DepthFeed {
    /// Create the feed for `symbol`.
    pub fn new(rest: MarketRestClient, ws: MarketWsClient, symbol: &str) -> Self {
        Self {
            key: StreamKey::depth(rest.class(), symbol),
            rest,
            ws,
        }
    }
}

impl Feed for DepthFeed {
    type State = OrderBook;
    type Snapshot = DepthSnapshot;
    type Event = StreamEvent;
    type Events = MarketStream;

    fn key(&self) -> &StreamKey {
        &self.key
    }

    async fn subscribe(&self) -> Result<MarketStream> {
        self.ws.subscribe_depth(&self.key.symbol).await
    }

    async fn backfill(&self, cancel: &CancellationToken) -> Result<OrderBook> {
        let snapshot = self
            .rest
            .get_depth(&self.key.symbol, MAX_DEPTH as u32, cancel)
            .await?;
        Ok(OrderBook::from_snapshot(snapshot))
    }

    fn apply(&self, state: &mut OrderBook, event: StreamEvent) -> Result<bool> {
        match event.depth_delta() {
            Some(delta) => state.apply(&delta),
            None => Ok(false),
        }
    }

    fn snapshot(&self, state: &OrderBook) -> DepthSnapshot {
        state.to_snapshot(MAX_DEPTH)
    }
}
