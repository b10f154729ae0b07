//! Custom serde helpers for Binance's response formats.

use std::fmt;
use std::marker::PhantomData;

use serde::de::value::MapAccessDeserializer;
use serde::de::{self, Deserialize, Deserializer, MapAccess, SeqAccess, Visitor};

/// Accept either a single object or an array of objects, keeping the first.
///
/// COIN-M `/dapi/v1/ticker/24hr?symbol=...` answers with a one-element array
/// while the spot and USDⓈ-M endpoints answer with a bare object.
///
/// # Example
///
/// ```rust
/// use serde::Deserialize;
/// use binance_proxy::types::serde_helpers::OneOrFirst;
///
/// #[derive(Debug, Deserialize)]
/// struct Item {
///     symbol: String,
/// }
///
/// let single: OneOrFirst<Item> = serde_json::from_str(r#"{"symbol":"BTCUSD_PERP"}"#).unwrap();
/// let listed: OneOrFirst<Item> = serde_json::from_str(r#"[{"symbol":"BTCUSD_PERP"}]"#).unwrap();
/// assert_eq!(single.0.symbol, listed.0.symbol);
/// ```
#[derive(Debug, Clone)]
pub struct OneOrFirst<T>(pub T);

impl<T> OneOrFirst<T> {
    /// Unwrap the inner value.
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for OneOrFirst<T> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct OneOrFirstVisitor<T>(PhantomData<T>);

        impl<'de, T: Deserialize<'de>> Visitor<'de> for OneOrFirstVisitor<T> {
            type Value = OneOrFirst<T>;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("an object or a non-empty array of objects")
            }

            fn visit_map<M>(self, map: M) -> Result<Self::Value, M::Error>
            where
                M: MapAccess<'de>,
            {
                T::deserialize(MapAccessDeserializer::new(map)).map(OneOrFirst)
            }

            fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
            where
                A: SeqAccess<'de>,
            {
                let first: T = seq
                    .next_element()?
                    .ok_or_else(|| de::Error::invalid_length(0, &"a non-empty array"))?;
                while seq.next_element::<de::IgnoredAny>()?.is_some() {}
                Ok(OneOrFirst(first))
            }
        }

        deserializer.deserialize_any(OneOrFirstVisitor(PhantomData))
    }
}
