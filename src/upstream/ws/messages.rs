//! Market stream event payloads.
//!
//! Raw streams deliver one JSON object per frame with an `e` field naming the
//! event type. The three market classes use similar but not identical shapes,
//! so every event is tagged with its class: [`StreamEvent`] wraps a
//! [`SpotEvent`], [`FuturesEvent`] or [`DeliveryEvent`]. The caches consume the
//! tagged value through the class-independent views [`StreamEvent::candle`],
//! [`StreamEvent::depth_delta`] and [`StreamEvent::ticker`].

use rust_decimal::Decimal;
use serde::Deserialize;

use crate::error::ProxyError;
use crate::types::{Candle, MarketClass, PriceLevel, Ticker24hr};

/// Event type names.
pub mod event_types {
    /// Candlestick update.
    pub const KLINE: &str = "kline";
    /// Order book diff.
    pub const DEPTH_UPDATE: &str = "depthUpdate";
    /// 24h rolling statistics.
    pub const TICKER_24HR: &str = "24hrTicker";
}

// ---------------------------------------------------------------------------
// Candlesticks (same shape on every class)
// ---------------------------------------------------------------------------

/// Candlestick event (`<symbol>@kline_<interval>`).
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct KlineEvent {
    /// Event time.
    #[serde(rename = "E")]
    pub event_time: i64,
    /// Symbol.
    #[serde(rename = "s")]
    pub symbol: String,
    /// The candle.
    #[serde(rename = "k")]
    pub kline: KlinePayload,
}

/// Candle body of a [`KlineEvent`].
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct KlinePayload {
    /// Open time.
    #[serde(rename = "t")]
    pub open_time: i64,
    /// Close time.
    #[serde(rename = "T")]
    pub close_time: i64,
    /// Interval.
    #[serde(rename = "i")]
    pub interval: String,
    /// Open price.
    #[serde(rename = "o")]
    pub open: Decimal,
    /// Close price.
    #[serde(rename = "c")]
    pub close: Decimal,
    /// High price.
    #[serde(rename = "h")]
    pub high: Decimal,
    /// Low price.
    #[serde(rename = "l")]
    pub low: Decimal,
    /// Volume.
    #[serde(rename = "v")]
    pub volume: Decimal,
    /// Number of trades.
    #[serde(rename = "n")]
    pub trade_count: u64,
    /// Whether the candle is closed.
    #[serde(rename = "x")]
    pub is_closed: bool,
    /// Quote asset volume (base asset volume on delivery).
    #[serde(rename = "q")]
    pub quote_volume: Decimal,
    /// Taker buy volume.
    #[serde(rename = "V")]
    pub taker_buy_base_volume: Decimal,
    /// Taker buy quote volume.
    #[serde(rename = "Q")]
    pub taker_buy_quote_volume: Decimal,
}

impl From<&KlinePayload> for Candle {
    fn from(k: &KlinePayload) -> Self {
        Candle {
            open_time: k.open_time,
            open: k.open,
            high: k.high,
            low: k.low,
            close: k.close,
            volume: k.volume,
            close_time: k.close_time,
            quote_volume: k.quote_volume,
            trade_count: k.trade_count,
            taker_buy_base_volume: k.taker_buy_base_volume,
            taker_buy_quote_volume: k.taker_buy_quote_volume,
        }
    }
}

// ---------------------------------------------------------------------------
// Order book diffs
// ---------------------------------------------------------------------------

/// Spot order book diff.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SpotDepthUpdate {
    /// Event time.
    #[serde(rename = "E")]
    pub event_time: i64,
    /// Symbol.
    #[serde(rename = "s")]
    pub symbol: String,
    /// First update id in this event.
    #[serde(rename = "U")]
    pub first_update_id: u64,
    /// Final update id in this event.
    #[serde(rename = "u")]
    pub final_update_id: u64,
    /// Changed bids.
    #[serde(rename = "b")]
    pub bids: Vec<PriceLevel>,
    /// Changed asks.
    #[serde(rename = "a")]
    pub asks: Vec<PriceLevel>,
}

/// USDⓈ-M order book diff.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FuturesDepthUpdate {
    /// Event time.
    #[serde(rename = "E")]
    pub event_time: i64,
    /// Transaction time.
    #[serde(rename = "T")]
    pub transaction_time: i64,
    /// Symbol.
    #[serde(rename = "s")]
    pub symbol: String,
    /// First update id in this event.
    #[serde(rename = "U")]
    pub first_update_id: u64,
    /// Final update id in this event.
    #[serde(rename = "u")]
    pub final_update_id: u64,
    /// Final update id of the previous event.
    #[serde(rename = "pu")]
    pub prev_final_update_id: u64,
    /// Changed bids.
    #[serde(rename = "b")]
    pub bids: Vec<PriceLevel>,
    /// Changed asks.
    #[serde(rename = "a")]
    pub asks: Vec<PriceLevel>,
}

/// COIN-M order book diff.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DeliveryDepthUpdate {
    /// Event time.
    #[serde(rename = "E")]
    pub event_time: i64,
    /// Transaction time.
    #[serde(rename = "T")]
    pub transaction_time: i64,
    /// Symbol.
    #[serde(rename = "s")]
    pub symbol: String,
    /// Pair.
    #[serde(rename = "ps")]
    pub pair: String,
    /// First update id in this event.
    #[serde(rename = "U")]
    pub first_update_id: u64,
    /// Final update id in this event.
    #[serde(rename = "u")]
    pub final_update_id: u64,
    /// Final update id of the previous event.
    #[serde(rename = "pu")]
    pub prev_final_update_id: u64,
    /// Changed bids.
    #[serde(rename = "b")]
    pub bids: Vec<PriceLevel>,
    /// Changed asks.
    #[serde(rename = "a")]
    pub asks: Vec<PriceLevel>,
}

/// Class-independent view of an order book diff.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DepthDelta<'a> {
    /// Event time.
    pub event_time: i64,
    /// Transaction time, where reported.
    pub transaction_time: Option<i64>,
    /// First update id in this event.
    pub first_update_id: u64,
    /// Final update id in this event.
    pub final_update_id: u64,
    /// Final update id of the previous event, where reported.
    ///
    /// Spot does not report it; continuity is then `first_update_id == last + 1`.
    pub prev_final_update_id: Option<u64>,
    /// Changed bids; a zero quantity removes the level.
    pub bids: &'a [PriceLevel],
    /// Changed asks; a zero quantity removes the level.
    pub asks: &'a [PriceLevel],
}

// ---------------------------------------------------------------------------
// 24h tickers
// ---------------------------------------------------------------------------

/// Spot 24h statistics event.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SpotTicker {
    /// Event time.
    #[serde(rename = "E")]
    pub event_time: i64,
    /// Symbol.
    #[serde(rename = "s")]
    pub symbol: String,
    /// Price change.
    #[serde(rename = "p")]
    pub price_change: Decimal,
    /// Price change percent.
    #[serde(rename = "P")]
    pub price_change_percent: Decimal,
    /// Weighted average price.
    #[serde(rename = "w")]
    pub weighted_avg_price: Decimal,
    /// First trade price before the window.
    #[serde(rename = "x")]
    pub prev_close_price: Decimal,
    /// Last price.
    #[serde(rename = "c")]
    pub last_price: Decimal,
    /// Last quantity.
    #[serde(rename = "Q")]
    pub last_qty: Decimal,
    /// Best bid price.
    #[serde(rename = "b")]
    pub bid_price: Decimal,
    /// Best bid quantity.
    #[serde(rename = "B")]
    pub bid_qty: Decimal,
    /// Best ask price.
    #[serde(rename = "a")]
    pub ask_price: Decimal,
    /// Best ask quantity.
    #[serde(rename = "A")]
    pub ask_qty: Decimal,
    /// Open price.
    #[serde(rename = "o")]
    pub open_price: Decimal,
    /// High price.
    #[serde(rename = "h")]
    pub high_price: Decimal,
    /// Low price.
    #[serde(rename = "l")]
    pub low_price: Decimal,
    /// Base asset volume.
    #[serde(rename = "v")]
    pub volume: Decimal,
    /// Quote asset volume.
    #[serde(rename = "q")]
    pub quote_volume: Decimal,
    /// Statistics open time.
    #[serde(rename = "O")]
    pub open_time: i64,
    /// Statistics close time.
    #[serde(rename = "C")]
    pub close_time: i64,
    /// First trade id.
    #[serde(rename = "F")]
    pub first_id: i64,
    /// Last trade id.
    #[serde(rename = "L")]
    pub last_id: i64,
    /// Trade count.
    #[serde(rename = "n")]
    pub count: u64,
}

/// USDⓈ-M 24h statistics event.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FuturesTicker {
    /// Event time.
    #[serde(rename = "E")]
    pub event_time: i64,
    /// Symbol.
    #[serde(rename = "s")]
    pub symbol: String,
    /// Price change.
    #[serde(rename = "p")]
    pub price_change: Decimal,
    /// Price change percent.
    #[serde(rename = "P")]
    pub price_change_percent: Decimal,
    /// Weighted average price.
    #[serde(rename = "w")]
    pub weighted_avg_price: Decimal,
    /// Last price.
    #[serde(rename = "c")]
    pub last_price: Decimal,
    /// Last quantity.
    #[serde(rename = "Q")]
    pub last_qty: Decimal,
    /// Open price.
    #[serde(rename = "o")]
    pub open_price: Decimal,
    /// High price.
    #[serde(rename = "h")]
    pub high_price: Decimal,
    /// Low price.
    #[serde(rename = "l")]
    pub low_price: Decimal,
    /// Base asset volume.
    #[serde(rename = "v")]
    pub volume: Decimal,
    /// Quote asset volume.
    #[serde(rename = "q")]
    pub quote_volume: Decimal,
    /// Statistics open time.
    #[serde(rename = "O")]
    pub open_time: i64,
    /// Statistics close time.
    #[serde(rename = "C")]
    pub close_time: i64,
    /// First trade id.
    #[serde(rename = "F")]
    pub first_id: i64,
    /// Last trade id.
    #[serde(rename = "L")]
    pub last_id: i64,
    /// Trade count.
    #[serde(rename = "n")]
    pub count: u64,
}

/// COIN-M 24h statistics event.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DeliveryTicker {
    /// Event time.
    #[serde(rename = "E")]
    pub event_time: i64,
    /// Symbol.
    #[serde(rename = "s")]
    pub symbol: String,
    /// Pair.
    #[serde(rename = "ps")]
    pub pair: String,
    /// Price change.
    #[serde(rename = "p")]
    pub price_change: Decimal,
    /// Price change percent.
    #[serde(rename = "P")]
    pub price_change_percent: Decimal,
    /// Weighted average price.
    #[serde(rename = "w")]
    pub weighted_avg_price: Decimal,
    /// Last price.
    #[serde(rename = "c")]
    pub last_price: Decimal,
    /// Last quantity.
    #[serde(rename = "Q")]
    pub last_qty: Decimal,
    /// Open price.
    #[serde(rename = "o")]
    pub open_price: Decimal,
    /// High price.
    #[serde(rename = "h")]
    pub high_price: Decimal,
    /// Low price.
    #[serde(rename = "l")]
    pub low_price: Decimal,
    /// Volume in contracts.
    #[serde(rename = "v")]
    pub volume: Decimal,
    /// Volume in base asset.
    #[serde(rename = "q")]
    pub base_volume: Decimal,
    /// Statistics open time.
    #[serde(rename = "O")]
    pub open_time: i64,
    /// Statistics close time.
    #[serde(rename = "C")]
    pub close_time: i64,
    /// First trade id.
    #[serde(rename = "F")]
    pub first_id: i64,
    /// Last trade id.
    #[serde(rename = "L")]
    pub last_id: i64,
    /// Trade count.
    #[serde(rename = "n")]
    pub count: u64,
}

impl From<SpotTicker> for Ticker24hr {
    fn from(t: SpotTicker) -> Self {
        Ticker24hr {
            symbol: t.symbol,
            pair: None,
            price_change: t.price_change,
            price_change_percent: t.price_change_percent,
            weighted_avg_price: t.weighted_avg_price,
            prev_close_price: Some(t.prev_close_price),
            last_price: t.last_price,
            last_qty: t.last_qty,
            bid_price: Some(t.bid_price),
            bid_qty: Some(t.bid_qty),
            ask_price: Some(t.ask_price),
            ask_qty: Some(t.ask_qty),
            open_price: t.open_price,
            high_price: t.high_price,
            low_price: t.low_price,
            volume: t.volume,
            quote_volume: Some(t.quote_volume),
            base_volume: None,
            open_time: t.open_time,
            close_time: t.close_time,
            first_id: t.first_id,
            last_id: t.last_id,
            count: t.count,
        }
    }
}

impl From<FuturesTicker> for Ticker24hr {
    fn from(t: FuturesTicker) -> Self {
        Ticker24hr {
            symbol: t.symbol,
            pair: None,
            price_change: t.price_change,
            price_change_percent: t.price_change_percent,
            weighted_avg_price: t.weighted_avg_price,
            prev_close_price: None,
            last_price: t.last_price,
            last_qty: t.last_qty,
            bid_price: None,
            bid_qty: None,
            ask_price: None,
            ask_qty: None,
            open_price: t.open_price,
            high_price: t.high_price,
            low_price: t.low_price,
            volume: t.volume,
            quote_volume: Some(t.quote_volume),
            base_volume: None,
            open_time: t.open_time,
            close_time: t.close_time,
            first_id: t.first_id,
            last_id: t.last_id,
            count: t.count,
        }
    }
}

impl From<DeliveryTicker> for Ticker24hr {
    fn from(t: DeliveryTicker) -> Self {
        Ticker24hr {
            symbol: t.symbol,
            pair: Some(t.pair),
            price_change: t.price_change,
            price_change_percent: t.price_change_percent,
            weighted_avg_price: t.weighted_avg_price,
            prev_close_price: None,
            last_price: t.last_price,
            last_qty: t.last_qty,
            bid_price: None,
            bid_qty: None,
            ask_price: None,
            ask_qty: None,
            open_price: t.open_price,
            high_price: t.high_price,
            low_price: t.low_price,
            volume: t.volume,
            quote_volume: None,
            base_volume: Some(t.base_volume),
            open_time: t.open_time,
            close_time: t.close_time,
            first_id: t.first_id,
            last_id: t.last_id,
            count: t.count,
        }
    }
}

// ---------------------------------------------------------------------------
// Tagged events
// ---------------------------------------------------------------------------

/// Spot stream event.
#[derive(Debug, Clone, PartialEq)]
pub enum SpotEvent {
    /// Candlestick update.
    Kline(KlineEvent),
    /// Order book diff.
    DepthUpdate(SpotDepthUpdate),
    /// 24h statistics.
    Ticker(Box<SpotTicker>),
}

/// USDⓈ-M stream event.
#[derive(Debug, Clone, PartialEq)]
pub enum FuturesEvent {
    /// Candlestick update.
    Kline(KlineEvent),
    /// Order book diff.
    DepthUpdate(FuturesDepthUpdate),
    /// 24h statistics.
    Ticker(Box<FuturesTicker>),
}

/// COIN-M stream event.
#[derive(Debug, Clone, PartialEq)]
pub enum DeliveryEvent {
    /// Candlestick update.
    Kline(KlineEvent),
    /// Order book diff.
    DepthUpdate(DeliveryDepthUpdate),
    /// 24h statistics.
    Ticker(Box<DeliveryTicker>),
}

/// A parsed market stream event, tagged with its market class.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// From a spot stream.
    Spot(SpotEvent),
    /// From a USDⓈ-M stream.
    Futures(FuturesEvent),
    /// From a COIN-M stream.
    Delivery(DeliveryEvent),
}

impl StreamEvent {
    /// Market class the event came from.
    pub fn class(&self) -> MarketClass {
        match self {
            StreamEvent::Spot(_) => MarketClass::Spot,
            StreamEvent::Futures(_) => MarketClass::Futures,
            StreamEvent::Delivery(_) => MarketClass::Delivery,
        }
    }

    /// The candle carried by a kline event.
    pub fn candle(&self) -> Option<Candle> {
        let kline = match self {
            StreamEvent::Spot(SpotEvent::Kline(k))
            | StreamEvent::Futures(FuturesEvent::Kline(k))
            | StreamEvent::Delivery(DeliveryEvent::Kline(k)) => k,
            _ => return None,
        };
        Some(Candle::from(&kline.kline))
    }

    /// The order book diff carried by a depth event.
    pub fn depth_delta(&self) -> Option<DepthDelta<'_>> {
        match self {
            StreamEvent::Spot(SpotEvent::DepthUpdate(d)) => Some(DepthDelta {
                event_time: d.event_time,
                transaction_time: None,
                first_update_id: d.first_update_id,
                final_update_id: d.final_update_id,
                prev_final_update_id: None,
                bids: &d.bids,
                asks: &d.asks,
            }),
            StreamEvent::Futures(FuturesEvent::DepthUpdate(d)) => Some(DepthDelta {
                event_time: d.event_time,
                transaction_time: Some(d.transaction_time),
                first_update_id: d.first_update_id,
                final_update_id: d.final_update_id,
                prev_final_update_id: Some(d.prev_final_update_id),
                bids: &d.bids,
                asks: &d.asks,
            }),
            StreamEvent::Delivery(DeliveryEvent::DepthUpdate(d)) => Some(DepthDelta {
                event_time: d.event_time,
                transaction_time: Some(d.transaction_time),
                first_update_id: d.first_update_id,
                final_update_id: d.final_update_id,
                prev_final_update_id: Some(d.prev_final_update_id),
                bids: &d.bids,
                asks: &d.asks,
            }),
            _ => None,
        }
    }

    /// The 24h statistics carried by a ticker event, in REST shape.
    pub fn ticker(self) -> Option<Ticker24hr> {
        match self {
            StreamEvent::Spot(SpotEvent::Ticker(t)) => Some((*t).into()),
            StreamEvent::Futures(FuturesEvent::Ticker(t)) => Some((*t).into()),
            StreamEvent::Delivery(DeliveryEvent::Ticker(t)) => Some((*t).into()),
            _ => None,
        }
    }
}

/// Parse a text frame from a stream of `class`.
///
/// Returns `Ok(None)` for frames that are not market events, such as
/// subscription acknowledgements. Combined-stream envelopes
/// (`{"stream":..,"data":{..}}`) are unwrapped.
pub fn parse_event(class: MarketClass, text: &str) -> Result<Option<StreamEvent>, ProxyError> {
    let mut value: serde_json::Value = serde_json::from_str(text)?;

    if let Some(data) = value.get_mut("data").filter(|d| d.is_object()) {
        value = data.take();
    }

    let event_type = match value.get("e").and_then(|e| e.as_str()) {
        Some(event_type) => event_type.to_string(),
        None => return Ok(None),
    };

    let event = match (class, event_type.as_str()) {
        (_, event_types::KLINE) => {
            let kline: KlineEvent = serde_json::from_value(value)?;
            match class {
                MarketClass::Spot => StreamEvent::Spot(SpotEvent::Kline(kline)),
                MarketClass::Futures => StreamEvent::Futures(FuturesEvent::Kline(kline)),
                MarketClass::Delivery => StreamEvent::Delivery(DeliveryEvent::Kline(kline)),
            }
        }
        (MarketClass::Spot, event_types::DEPTH_UPDATE) => {
            StreamEvent::Spot(SpotEvent::DepthUpdate(serde_json::from_value(value)?))
        }
        (MarketClass::Futures, event_types::DEPTH_UPDATE) => {
            StreamEvent::Futures(FuturesEvent::DepthUpdate(serde_json::from_value(value)?))
        }
        (MarketClass::Delivery, event_types::DEPTH_UPDATE) => {
            StreamEvent::Delivery(DeliveryEvent::DepthUpdate(serde_json::from_value(value)?))
        }
        (MarketClass::Spot, event_types::TICKER_24HR) => {
            StreamEvent::Spot(SpotEvent::Ticker(Box::new(serde_json::from_value(value)?)))
        }
        (MarketClass::Futures, event_types::TICKER_24HR) => {
            StreamEvent::Futures(FuturesEvent::Ticker(Box::new(serde_json::from_value(value)?)))
        }
        (MarketClass::Delivery, event_types::TICKER_24HR) => {
            StreamEvent::Delivery(DeliveryEvent::Ticker(Box::new(serde_json::from_value(value)?)))
        }
        (_, other) => {
            tracing::debug!("Ignoring stream event type: {}", other);
            return Ok(None);
        }
    };

    Ok(Some(event))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn test_parse_spot_kline() {
        let json = r#"{"e":"kline","E":1672515782136,"s":"BNBBTC","k":{"t":1672515780000,"T":1672515839999,"s":"BNBBTC","i":"1m","f":100,"L":200,"o":"0.0010","c":"0.0020","h":"0.0025","l":"0.0015","v":"1000","n":100,"x":false,"q":"1.0000","V":"500","Q":"0.500","B":"123456"}}"#;
        let event = parse_event(MarketClass::Spot, json).unwrap().unwrap();
        assert_eq!(event.class(), MarketClass::Spot);

        let candle = event.candle().unwrap();
        assert_eq!(candle.open_time, 1_672_515_780_000);
        assert_eq!(candle.close, dec("0.0020"));
        assert_eq!(candle.trade_count, 100);
        assert!(event.depth_delta().is_none());
    }

    #[test]
    fn test_parse_futures_depth_update() {
        let json = r#"{"e":"depthUpdate","E":123456789,"T":123456788,"s":"BTCUSDT","U":157,"u":160,"pu":149,"b":[["0.0024","10"]],"a":[["0.0026","100"]]}"#;
        let event = parse_event(MarketClass::Futures, json).unwrap().unwrap();
        let delta = event.depth_delta().unwrap();
        assert_eq!(delta.first_update_id, 157);
        assert_eq!(delta.final_update_id, 160);
        assert_eq!(delta.prev_final_update_id, Some(149));
        assert_eq!(delta.transaction_time, Some(123_456_788));
        assert_eq!(delta.bids, &[(dec("0.0024"), dec("10"))]);
    }

    #[test]
    fn test_parse_spot_depth_update_has_no_pu() {
        let json = r#"{"e":"depthUpdate","E":1,"s":"BNBBTC","U":157,"u":160,"b":[],"a":[]}"#;
        let event = parse_event(MarketClass::Spot, json).unwrap().unwrap();
        assert!(matches!(event, StreamEvent::Spot(SpotEvent::DepthUpdate(_))));
        assert!(event.depth_delta().unwrap().prev_final_update_id.is_none());
    }

    #[test]
    fn test_futures_depth_requires_pu() {
        let json = r#"{"e":"depthUpdate","E":1,"T":1,"s":"BTCUSDT","U":157,"u":160,"b":[],"a":[]}"#;
        assert!(parse_event(MarketClass::Futures, json).is_err());
    }

    #[test]
    fn test_parse_delivery_ticker_maps_base_volume() {
        let json = r#"{"e":"24hrTicker","E":1591268262453,"s":"BTCUSD_200626","ps":"BTCUSD","p":"-43.4","P":"-0.452","w":"0.00147974","c":"9548.5","Q":"2","o":"9591.9","h":"10000.0","l":"9400.0","v":"17","q":"0.0001","O":1591181820000,"C":1591268262442,"F":512014,"L":615289,"n":103272}"#;
        let event = parse_event(MarketClass::Delivery, json).unwrap().unwrap();
        let ticker = event.ticker().unwrap();
        assert_eq!(ticker.pair.as_deref(), Some("BTCUSD"));
        assert!(ticker.quote_volume.is_none());
        assert_eq!(ticker.base_volume, Some(dec("0.0001")));
        assert_eq!(ticker.count, 103_272);
    }

    #[test]
    fn test_parse_spot_ticker_keeps_book_fields() {
        let json = r#"{"e":"24hrTicker","E":123456789,"s":"BNBBTC","p":"0.0015","P":"250.00","w":"0.0018","x":"0.0009","c":"0.0025","Q":"10","b":"0.0024","B":"10","a":"0.0026","A":"100","o":"0.0010","h":"0.0025","l":"0.0010","v":"10000","q":"18","O":0,"C":86400000,"F":0,"L":18150,"n":18151}"#;
        let ticker = parse_event(MarketClass::Spot, json).unwrap().unwrap().ticker().unwrap();
        assert_eq!(ticker.bid_price, Some(dec("0.0024")));
        assert_eq!(ticker.prev_close_price, Some(dec("0.0009")));
        assert_eq!(ticker.quote_volume, Some(dec("18")));
    }

    #[test]
    fn test_parse_futures_ticker_omits_spot_fields() {
        let json = r#"{"e":"24hrTicker","E":123456789,"s":"BTCUSDT","p":"0.0015","P":"250.00","w":"0.0018","c":"0.0025","Q":"10","o":"0.0010","h":"0.0025","l":"0.0010","v":"10000","q":"18","O":0,"C":86400000,"F":0,"L":18150,"n":18151}"#;
        let ticker = parse_event(MarketClass::Futures, json).unwrap().unwrap().ticker().unwrap();
        assert!(ticker.bid_price.is_none());
        assert!(ticker.prev_close_price.is_none());
        assert_eq!(ticker.quote_volume, Some(dec("18")));
    }

    #[test]
    fn test_parse_non_event_frames() {
        assert!(parse_event(MarketClass::Spot, r#"{"result":null,"id":1}"#).unwrap().is_none());
        assert!(parse_event(MarketClass::Spot, r#"{"e":"aggTrade","E":1}"#).unwrap().is_none());
        assert!(parse_event(MarketClass::Spot, "not json").is_err());
    }

    #[test]
    fn test_parse_combined_envelope() {
        let json = r#"{"stream":"bnbbtc@depth@100ms","data":{"e":"depthUpdate","E":1,"s":"BNBBTC","U":1,"u":2,"b":[],"a":[]}}"#;
        let event = parse_event(MarketClass::Spot, json).unwrap().unwrap();
        assert!(event.depth_delta().is_some());
    }
}
