//! 24h ticker cache.

use tokio_util::sync::CancellationToken;

use crate::Result;
use crate::cache::streaming::Feed;
use crate::types::{StreamKey, Ticker24hr};
use crate::upstream::rest::MarketRestClient;
use crate::upstream::ws::{MarketStream, MarketWsClient, StreamEvent};

/// Keeps the 24h statistics of one symbol.
///
/// Each ticker event carries the complete window, so the newest event simply
/// replaces whatever was held before.
#[derive(Debug)]
pub struct TickerFeed {
    key: StreamKey,
    rest: MarketRestClient,
    ws: MarketWsClient,
}

impl TickerFeed {
    /// Create the feed for `symbol`.
    pub fn new(rest: MarketRestClient, ws: MarketWsClient, symbol: &str) -> Self {
        Self {
            key: StreamKey::ticker(rest.class(), symbol),
            rest,
            ws,
        }
    }
}

impl Feed for TickerFeed {
    type State = Ticker24hr;
    type Snapshot = Ticker24hr;
    type Event = StreamEvent;
    type Events = MarketStream;

    fn key(&self) -> &StreamKey {
        &self.key
    }

    async fn subscribe(&self) -> Result<MarketStream> {
        self.ws.subscribe_ticker(&self.key.symbol).await
    }

    async fn backfill(&self, cancel: &CancellationToken) -> Result<Ticker24hr> {
        self.rest.get_ticker_24hr(&self.key.symbol, cancel).await
    }

    fn apply(&self, state: &mut Ticker24hr, event: StreamEvent) -> Result<bool> {
        Ok(match event.ticker() {
            Some(ticker) => replace_ticker(state, ticker),
            None => false,
        })
    }

    fn snapshot(&self, state: &Ticker24hr) -> Ticker24hr {
        state.clone()
    }
}

/// Replace the held ticker. Returns whether anything changed.
pub fn replace_ticker(state: &mut Ticker24hr, ticker: Ticker24hr) -> bool {
    if *state == ticker {
        return false;
    }
    *state = ticker;
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MarketClass;
    use crate::upstream::ws::messages::parse_event;

    const TICKER_A: &str = r#"{"e":"24hrTicker","E":1,"s":"BTCUSDT","p":"10","P":"1.0","w":"100","c":"110","Q":"1","o":"100","h":"120","l":"90","v":"5","q":"500","O":0,"C":86400000,"F":1,"L":10,"n":10}"#;
    const TICKER_B: &str = r#"{"e":"24hrTicker","E":2,"s":"BTCUSDT","p":"-5","P":"-0.5","w":"99","c":"95","Q":"2","o":"100","h":"120","l":"90","v":"6","q":"590","O":1000,"C":86401000,"F":2,"L":12,"n":11}"#;

    fn futures_ticker(text: &str) -> Ticker24hr {
        parse_event(MarketClass::Futures, text)
            .unwrap()
            .unwrap()
            .ticker()
            .unwrap()
    }

    #[test]
    fn test_latest_ticker_replaces_state() {
        let a = futures_ticker(TICKER_A);
        let b = futures_ticker(TICKER_B);

        let mut state = a.clone();
        assert!(replace_ticker(&mut state, b.clone()));
        assert_eq!(state, b);
        assert_eq!(state.last_price, "95".parse().unwrap());
        assert_eq!(state.count, 11);

        assert!(!replace_ticker(&mut state, b));
    }
}
