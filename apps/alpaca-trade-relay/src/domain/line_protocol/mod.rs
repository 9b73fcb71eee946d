//! Line Protocol Records
//!
//! Renders normalized trades as InfluxDB line-protocol records for the
//! Telegraf socket listener:
//!
//! ```text
//! alpaca_equities_streaming_trades,symbol=AAPL,conditions_str="N",exchange=Q price=150.250000,size=10,trade_id=1,tape="A" 1704067200000000000
//! ```
//!
//! A [`FormattedLine`] can only be built from text that passes
//! [`is_valid_line`], which makes the validity check the single gate in
//! front of the sink.

use std::fmt;

use crate::domain::trade::NormalizedTrade;

/// Measurement name for every trade record.
pub const MEASUREMENT: &str = "alpaca_equities_streaming_trades";

/// Structural validity check for a line-protocol record.
///
/// A line is accepted when it has at least one comma, one `=`, and one
/// space. This is a cheap shape check, not a grammar.
#[must_use]
pub fn is_valid_line(line: &str) -> bool {
    line.contains(',') && line.contains('=') && line.contains(' ')
}

/// Remove whitespace that sits outside double-quoted string values.
#[must_use]
pub fn strip_unquoted_whitespace(input: &str) -> String {
    let mut in_quotes = false;
    input
        .chars()
        .filter(|c| {
            if *c == '"' {
                in_quotes = !in_quotes;
            }
            in_quotes || !c.is_whitespace()
        })
        .collect()
}

/// Render a trade as a line-protocol record without validating it.
#[must_use]
pub fn render_trade(trade: &NormalizedTrade) -> String {
    let tags = strip_unquoted_whitespace(&format!(
        "symbol={},conditions_str=\"{}\",exchange={}",
        trade.symbol, trade.conditions, trade.exchange
    ));
    let fields = strip_unquoted_whitespace(&format!(
        "price={:.6},size={},trade_id={},tape=\"{}\"",
        trade.price, trade.size, trade.trade_id, trade.tape
    ));

    format!("{MEASUREMENT},{tags} {fields} {}", trade.timestamp_ns)
}

/// A record that passed the structural validity check.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FormattedLine(String);

impl FormattedLine {
    /// Validate a line.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidLine`] carrying the rejected text when the line
    /// fails [`is_valid_line`].
    pub fn new(line: impl Into<String>) -> Result<Self, InvalidLine> {
        let line = line.into();
        if is_valid_line(&line) {
            Ok(Self(line))
        } else {
            Err(InvalidLine(line))
        }
    }

    /// Render and validate a trade.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidLine`] when the rendered record is malformed.
    pub fn from_trade(trade: &NormalizedTrade) -> Result<Self, InvalidLine> {
        Self::new(render_trade(trade))
    }

    /// The record text, without a trailing newline.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Length of the record in bytes.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.0.len()
    }

    /// Always false; a valid line is never empty.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl TryFrom<String> for FormattedLine {
    type Error = InvalidLine;

    fn try_from(line: String) -> Result<Self, Self::Error> {
        Self::new(line)
    }
}

impl TryFrom<&str> for FormattedLine {
    type Error = InvalidLine;

    fn try_from(line: &str) -> Result<Self, Self::Error> {
        Self::new(line)
    }
}

impl AsRef<str> for FormattedLine {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FormattedLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A record rejected by the validity check.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid line protocol: {0}")]
pub struct InvalidLine(pub String);
