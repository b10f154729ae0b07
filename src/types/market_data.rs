//! Market data values served from the caches.
//!
//! These types re-project only the fields needed to answer the cached
//! endpoints, serialized in the same shape the upstream REST API uses.

use std::fmt;

use rust_decimal::Decimal;
use serde::de::{self, Deserializer, IgnoredAny, SeqAccess, Visitor};
use serde::ser::{SerializeTuple, Serializer};
use serde::{Deserialize, Serialize};

/// Maximum number of candles kept per series.
pub const MAX_CANDLES: usize = 1000;

/// A single candlestick.
///
/// `open_time` is the identity and ordering key within a series. On the wire
/// this is the 12-element array Binance returns from `/klines`, with the
/// trailing unused field written as `"0"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candle {
    /// Open time in milliseconds.
    pub open_time: i64,
    /// Open price.
    pub open: Decimal,
    /// High price.
    pub high: Decimal,
    /// Low price.
    pub low: Decimal,
    /// Close price.
    pub close: Decimal,
    /// Base asset volume (contracts for delivery).
    pub volume: Decimal,
    /// Close time in milliseconds.
    pub close_time: i64,
    /// Quote asset volume (base asset volume for delivery).
    pub quote_volume: Decimal,
    /// Number of trades.
    pub trade_count: u64,
    /// Taker buy base asset volume.
    pub taker_buy_base_volume: Decimal,
    /// Taker buy quote asset volume.
    pub taker_buy_quote_volume: Decimal,
}

impl Serialize for Candle {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut tuple = serializer.serialize_tuple(12)?;
        tuple.serialize_element(&self.open_time)?;
        tuple.serialize_element(&self.open)?;
        tuple.serialize_element(&self.high)?;
        tuple.serialize_element(&self.low)?;
        tuple.serialize_element(&self.close)?;
        tuple.serialize_element(&self.volume)?;
        tuple.serialize_element(&self.close_time)?;
        tuple.serialize_element(&self.quote_volume)?;
        tuple.serialize_element(&self.trade_count)?;
        tuple.serialize_element(&self.taker_buy_base_volume)?;
        tuple.serialize_element(&self.taker_buy_quote_volume)?;
        tuple.serialize_element("0")?;
        tuple.end()
    }
}

impl<'de> Deserialize<'de> for Candle {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct CandleVisitor;

        impl<'de> Visitor<'de> for CandleVisitor {
            type Value = Candle;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a kline array with at least 11 elements")
            }

            fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
            where
                A: SeqAccess<'de>,
            {
                fn field<'de, T, A>(seq: &mut A, index: usize) -> Result<T, A::Error>
                where
                    T: Deserialize<'de>,
                    A: SeqAccess<'de>,
                {
                    seq.next_element()?
                        .ok_or_else(|| de::Error::invalid_length(index, &"a kline array"))
                }

                let candle = Candle {
                    open_time: field(&mut seq, 0)?,
                    open: field(&mut seq, 1)?,
                    high: field(&mut seq, 2)?,
                    low: field(&mut seq, 3)?,
                    close: field(&mut seq, 4)?,
                    volume: field(&mut seq, 5)?,
                    close_time: field(&mut seq, 6)?,
                    quote_volume: field(&mut seq, 7)?,
                    trade_count: field(&mut seq, 8)?,
                    taker_buy_base_volume: field(&mut seq, 9)?,
                    taker_buy_quote_volume: field(&mut seq, 10)?,
                };

                // Skip the unused trailing field(s).
                while seq.next_element::<IgnoredAny>()?.is_some() {}

                Ok(candle)
            }
        }

        deserializer.deserialize_seq(CandleVisitor)
    }
}

/// A `[price, quantity]` pair.
pub type PriceLevel = (Decimal, Decimal);

/// Order book snapshot in the REST `/depth` shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepthSnapshot {
    /// Last update id included in this snapshot.
    pub last_update_id: u64,
    /// Symbol (delivery only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    /// Pair (delivery only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pair: Option<String>,
    /// Message output time (futures and delivery).
    #[serde(rename = "E", default, skip_serializing_if = "Option::is_none")]
    pub event_time: Option<i64>,
    /// Transaction time (futures and delivery).
    #[serde(rename = "T", default, skip_serializing_if = "Option::is_none")]
    pub transaction_time: Option<i64>,
    /// Bids, best (highest) first.
    pub bids: Vec<PriceLevel>,
    /// Asks, best (lowest) first.
    pub asks: Vec<PriceLevel>,
}

impl DepthSnapshot {
    /// Copy of this snapshot with at most `limit` levels per side.
    pub fn truncated(&self, limit: usize) -> Self {
        Self {
            last_update_id: self.last_update_id,
            symbol: self.symbol.clone(),
            pair: self.pair.clone(),
            event_time: self.event_time,
            transaction_time: self.transaction_time,
            bids: self.bids.iter().take(limit).copied().collect(),
            asks: self.asks.iter().take(limit).copied().collect(),
        }
    }
}

/// 24h rolling window statistics in the REST `/ticker/24hr` shape.
///
/// Optional fields are only present for the market classes that report them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ticker24hr {
    /// Symbol.
    pub symbol: String,
    /// Pair (delivery only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pair: Option<String>,
    /// Absolute price change.
    pub price_change: Decimal,
    /// Relative price change in percent.
    pub price_change_percent: Decimal,
    /// Weighted average price.
    pub weighted_avg_price: Decimal,
    /// Previous day's close (spot only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prev_close_price: Option<Decimal>,
    /// Last price.
    pub last_price: Decimal,
    /// Last quantity.
    pub last_qty: Decimal,
    /// Best bid price (spot only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bid_price: Option<Decimal>,
    /// Best bid quantity (spot only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bid_qty: Option<Decimal>,
    /// Best ask price (spot only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ask_price: Option<Decimal>,
    /// Best ask quantity (spot only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ask_qty: Option<Decimal>,
    /// Open price.
    pub open_price: Decimal,
    /// High price.
    pub high_price: Decimal,
    /// Low price.
    pub low_price: Decimal,
    /// Traded volume (contracts for delivery).
    pub volume: Decimal,
    /// Quote asset volume (spot and futures).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quote_volume: Option<Decimal>,
    /// Base asset volume (delivery only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_volume: Option<Decimal>,
    /// Statistics open time.
    pub open_time: i64,
    /// Statistics close time.
    pub close_time: i64,
    /// First trade id.
    pub first_id: i64,
    /// Last trade id.
    pub last_id: i64,
    /// Trade count.
    pub count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn test_candle_from_rest_array() {
        let json = r#"[1499040000000,"0.01634790","0.80000000","0.01575800","0.01577100","148976.11427815",1499644799999,"2434.19055334",308,"1756.87402397","28.46694368","0"]"#;
        let candle: Candle = serde_json::from_str(json).unwrap();
        assert_eq!(candle.open_time, 1_499_040_000_000);
        assert_eq!(candle.open, dec("0.01634790"));
        assert_eq!(candle.trade_count, 308);
        assert_eq!(candle.taker_buy_quote_volume, dec("28.46694368"));
    }

    #[test]
    fn test_candle_serializes_in_upstream_order() {
        let json = r#"[1499040000000,"0.01634790","0.80000000","0.01575800","0.01577100","148976.11427815",1499644799999,"2434.19055334",308,"1756.87402397","28.46694368","0"]"#;
        let candle: Candle = serde_json::from_str(json).unwrap();
        assert_eq!(serde_json::to_string(&candle).unwrap(), json);
    }

    #[test]
    fn test_candle_rejects_short_array() {
        let json = r#"[1499040000000,"0.1","0.2"]"#;
        assert!(serde_json::from_str::<Candle>(json).is_err());
    }

    #[test]
    fn test_depth_snapshot_spot_shape() {
        let json = r#"{"lastUpdateId":1027024,"bids":[["4.00000000","431.00000000"]],"asks":[["4.00000200","12.00000000"]]}"#;
        let depth: DepthSnapshot = serde_json::from_str(json).unwrap();
        assert_eq!(depth.last_update_id, 1_027_024);
        assert!(depth.event_time.is_none());
        assert_eq!(serde_json::to_string(&depth).unwrap(), json);
    }

    #[test]
    fn test_depth_snapshot_truncated() {
        let depth = DepthSnapshot {
            last_update_id: 1,
            symbol: None,
            pair: None,
            event_time: Some(5),
            transaction_time: Some(4),
            bids: vec![(dec("3"), dec("1")), (dec("2"), dec("1")), (dec("1"), dec("1"))],
            asks: vec![(dec("4"), dec("1"))],
        };
        let top = depth.truncated(2);
        assert_eq!(top.bids.len(), 2);
        assert_eq!(top.bids[0].0, dec("3"));
        assert_eq!(top.asks.len(), 1);
        assert_eq!(top.event_time, Some(5));
    }

    #[test]
    fn test_ticker_futures_shape_omits_spot_fields() {
        let json = r#"{"symbol":"BTCUSDT","priceChange":"-94.99999800","priceChangePercent":"-95.960","weightedAvgPrice":"0.29628482","lastPrice":"4.00000200","lastQty":"200.00000000","openPrice":"99.00000000","highPrice":"100.00000000","lowPrice":"0.10000000","volume":"8913.30000000","quoteVolume":"15.30000000","openTime":1499783499040,"closeTime":1499869899040,"firstId":28385,"lastId":28460,"count":76}"#;
        let ticker: Ticker24hr = serde_json::from_str(json).unwrap();
        assert!(ticker.bid_price.is_none());
        assert_eq!(ticker.count, 76);
        assert_eq!(serde_json::to_string(&ticker).unwrap(), json);
    }
}
