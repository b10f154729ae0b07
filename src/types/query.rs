//! Parsed URL query parameters.

/// Ordered list of decoded `key=value` pairs from a request's query string.
///
/// Repeated keys are kept; lookups return the first occurrence.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams(Vec<(String, String)>);

impl QueryParams {
    /// Parse a raw (still percent-encoded) query string.
    ///
    /// Malformed input yields an empty parameter list; the request is then
    /// weighed and routed as if it had no parameters.
    pub fn parse(raw: Option<&str>) -> Self {
        raw.and_then(|query| serde_urlencoded::from_str::<Vec<(String, String)>>(query).ok())
            .map(Self)
            .unwrap_or_default()
    }

    /// Build from key/value pairs.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self(pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }

    /// First value for `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Whether `name` is present (even with an empty value).
    pub fn contains(&self, name: &str) -> bool {
        self.0.iter().any(|(key, _)| key == name)
    }

    /// First value for `name` parsed as `u32`; `None` if absent or not a number.
    pub fn get_u32(&self, name: &str) -> Option<u32> {
        self.get(name).and_then(|value| value.trim().parse().ok())
    }

    /// Number of parameters.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether there are no parameters.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over the pairs in order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Encode back into a query string.
    pub fn to_query_string(&self) -> String {
        serde_urlencoded::to_string(&self.0).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_lookup() {
        let query = QueryParams::parse(Some("symbol=BTCUSDT&interval=1m&limit=100&symbol=ETHUSDT"));
        assert_eq!(query.len(), 4);
        assert_eq!(query.get("symbol"), Some("BTCUSDT"));
        assert_eq!(query.get_u32("limit"), Some(100));
        assert!(query.contains("interval"));
        assert!(!query.contains("startTime"));
    }

    #[test]
    fn test_parse_percent_encoded_array() {
        let query = QueryParams::parse(Some("symbols=%5B%22BTCUSDT%22%2C%22BNBUSDT%22%5D"));
        assert_eq!(query.get("symbols"), Some(r#"["BTCUSDT","BNBUSDT"]"#));
    }

    #[test]
    fn test_parse_missing_or_invalid() {
        assert!(QueryParams::parse(None).is_empty());
        let query = QueryParams::parse(Some("limit=abc"));
        assert_eq!(query.get_u32("limit"), None);
    }

    #[test]
    fn test_round_trip_string() {
        let query = QueryParams::from_pairs([("symbol", "BTCUSDT"), ("limit", "1000")]);
        assert_eq!(query.to_query_string(), "symbol=BTCUSDT&limit=1000");
    }
}
