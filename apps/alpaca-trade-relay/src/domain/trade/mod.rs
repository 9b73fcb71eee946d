//! Trade Records
//!
//! The raw trade print as delivered by the stock stream, and the
//! normalized form that the line-protocol renderer consumes.
//!
//! Normalization never fails: an unparsable timestamp becomes `0` and an
//! empty condition list becomes the `"N"` sentinel, so every trade that
//! decodes is emitted.

use chrono::DateTime;
use serde::{Deserialize, Serialize};

/// Condition string used when a trade carries no condition codes.
pub const NO_CONDITIONS: &str = "N";

/// Real-time stock trade from the SIP/IEX stream.
///
/// # Wire Format (JSON)
/// ```json
/// {
///   "T": "t",
///   "i": 96921,
///   "S": "AAPL",
///   "x": "D",
///   "p": 126.55,
///   "s": 1,
///   "t": "2021-02-22T15:51:44.208Z",
///   "c": ["@", "I"],
///   "z": "C"
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawTradeEvent {
    /// Message type (always "t")
    #[serde(rename = "T")]
    pub msg_type: String,

    /// Trade ID (unique per exchange per day)
    #[serde(rename = "i")]
    pub trade_id: i64,

    /// Ticker symbol (e.g., "AAPL")
    #[serde(rename = "S")]
    pub symbol: String,

    /// Exchange code where trade executed
    #[serde(rename = "x")]
    pub exchange: String,

    /// Trade price
    #[serde(rename = "p")]
    pub price: f64,

    /// Trade size (shares)
    #[serde(rename = "s")]
    pub size: i64,

    /// Trade timestamp (RFC-3339, nanosecond precision)
    #[serde(rename = "t")]
    pub timestamp: String,

    /// Trade condition codes (e.g., "@" for regular sale)
    #[serde(rename = "c", default)]
    pub conditions: Vec<String>,

    /// Tape: "A" (NYSE), "B" (ARCA/regional), "C" (NASDAQ)
    #[serde(rename = "z")]
    pub tape: String,
}

/// A trade ready to be rendered as a line-protocol record.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedTrade {
    /// Ticker symbol.
    pub symbol: String,
    /// Trade price.
    pub price: f64,
    /// Trade size (shares).
    pub size: i64,
    /// Exchange code.
    pub exchange: String,
    /// Condition codes joined without separator, or [`NO_CONDITIONS`].
    pub conditions: String,
    /// Trade time in nanoseconds since the Unix epoch, `0` if unparsable.
    pub timestamp_ns: i64,
    /// Trade ID.
    pub trade_id: i64,
    /// Tape identifier.
    pub tape: String,
}

impl NormalizedTrade {
    /// Normalize a raw trade event.
    #[must_use]
    pub fn from_raw(raw: &RawTradeEvent) -> Self {
        Self {
            symbol: raw.symbol.clone(),
            price: raw.price,
            size: raw.size,
            exchange: raw.exchange.clone(),
            conditions: join_conditions(&raw.conditions),
            timestamp_ns: parse_epoch_nanos(&raw.timestamp),
            trade_id: raw.trade_id,
            tape: raw.tape.clone(),
        }
    }
}

impl From<&RawTradeEvent> for NormalizedTrade {
    fn from(raw: &RawTradeEvent) -> Self {
        Self::from_raw(raw)
    }
}

impl From<RawTradeEvent> for NormalizedTrade {
    fn from(raw: RawTradeEvent) -> Self {
        Self::from_raw(&raw)
    }
}

/// Join condition codes into a single tag value.
///
/// Codes are concatenated with no separator; commas and whitespace are
/// dropped because both are structural in line protocol. An empty result
/// maps to [`NO_CONDITIONS`].
#[must_use]
pub fn join_conditions(codes: &[String]) -> String {
    let joined: String = codes
        .iter()
        .flat_map(|code| code.chars())
        .filter(|c| *c != ',' && !c.is_whitespace())
        .collect();

    if joined.is_empty() {
        NO_CONDITIONS.to_string()
    } else {
        joined
    }
}

/// Parse an RFC-3339 timestamp into nanoseconds since the Unix epoch.
///
/// Returns `0` for anything that does not parse or falls outside the
/// representable nanosecond range.
#[must_use]
pub fn parse_epoch_nanos(timestamp: &str) -> i64 {
    match DateTime::parse_from_rfc3339(timestamp) {
        Ok(parsed) => parsed.timestamp_nanos_opt().unwrap_or_else(|| {
            tracing::warn!(timestamp, "Trade timestamp out of nanosecond range");
            0
        }),
        Err(e) => {
            tracing::warn!(timestamp, error = %e, "Failed to parse trade timestamp");
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn raw_trade() -> RawTradeEvent {
        RawTradeEvent {
            msg_type: "t".to_string(),
            trade_id: 96921,
            symbol: "AAPL".to_string(),
            exchange: "D".to_string(),
            price: 126.55,
            size: 1,
            timestamp: "2021-02-22T15:51:44.208Z".to_string(),
            conditions: vec!["@".to_string(), "I".to_string()],
            tape: "C".to_string(),
        }
    }

    #[test_case(&[], "N" ; "empty list")]
    #[test_case(&["", "X", "Y"], "XY" ; "leading empty code")]
    #[test_case(&["@", "I"], "@I" ; "regular codes")]
    #[test_case(&["", ""], "N" ; "only empty codes")]
    #[test_case(&[" "], "N" ; "whitespace code")]
    #[test_case(&["F,", "T"], "FT" ; "embedded comma")]
    fn condition_join(codes: &[&str], expected: &str) {
        let codes: Vec<String> = codes.iter().map(ToString::to_string).collect();
        assert_eq!(join_conditions(&codes), expected);
    }

    #[test]
    fn parse_whole_second_timestamp() {
        assert_eq!(
            parse_epoch_nanos("2024-01-01T00:00:00Z"),
            1_704_067_200_000_000_000
        );
    }

    #[test]
    fn parse_nanosecond_timestamp() {
        assert_eq!(
            parse_epoch_nanos("2021-02-22T15:51:45.335689322Z"),
            1_614_009_105_335_689_322
        );
    }

    #[test]
    fn parse_offset_timestamp() {
        assert_eq!(
            parse_epoch_nanos("2024-01-01T05:00:00+05:00"),
            1_704_067_200_000_000_000
        );
    }

    #[test_case("" ; "empty")]
    #[test_case("not a time" ; "garbage")]
    #[test_case("2024-01-01 00:00:00" ; "missing offset")]
    #[test_case("2024-13-01T00:00:00Z" ; "bad month")]
    fn malformed_timestamp_is_zero(input: &str) {
        assert_eq!(parse_epoch_nanos(input), 0);
    }

    #[test]
    fn normalize_trade() {
        let trade = NormalizedTrade::from_raw(&raw_trade());
        assert_eq!(trade.symbol, "AAPL");
        assert_eq!(trade.conditions, "@I");
        assert_eq!(trade.timestamp_ns, 1_614_009_104_208_000_000);
        assert_eq!(trade.trade_id, 96921);
        assert_eq!(trade.tape, "C");
    }

    #[test]
    fn normalize_keeps_trade_with_bad_timestamp() {
        let mut raw = raw_trade();
        raw.timestamp = "garbage".to_string();
        let trade = NormalizedTrade::from(raw);
        assert_eq!(trade.timestamp_ns, 0);
        assert_eq!(trade.symbol, "AAPL");
    }

    #[test]
    fn deserialize_trade_without_conditions() {
        let json = r#"{"T":"t","i":1,"S":"AAPL","x":"Q","p":150.25,"s":10,"t":"2024-01-01T00:00:00Z","z":"A"}"#;
        let raw: RawTradeEvent = serde_json::from_str(json).unwrap();
        assert!(raw.conditions.is_empty());
        assert_eq!(NormalizedTrade::from_raw(&raw).conditions, NO_CONDITIONS);
    }
}
