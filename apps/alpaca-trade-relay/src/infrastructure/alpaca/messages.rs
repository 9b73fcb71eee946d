//! Alpaca Stock Stream Messages
//!
//! Wire types for the trade leg of Alpaca's stock data stream. Every
//! frame is a JSON array; each element carries its kind in the `"T"`
//! field.
//!
//! # Message Kinds
//!
//! | `T`            | Meaning                                  |
//! |----------------|------------------------------------------|
//! | `success`      | Connection or authentication acknowledged |
//! | `error`        | Error notice, usually with a numeric code |
//! | `subscription` | Active subscription confirmation         |
//! | `t`            | Trade print                              |
//!
//! # References
//!
//! - [Real-time Stock Data](https://docs.alpaca.markets/docs/real-time-stock-pricing-data)

use serde::{Deserialize, Serialize};

use crate::domain::trade::RawTradeEvent;

// =============================================================================
// Message Type Tags
// =============================================================================

/// Tag of a success acknowledgement.
pub const TAG_SUCCESS: &str = "success";

/// Tag of an error notice.
pub const TAG_ERROR: &str = "error";

/// Tag of a subscription confirmation.
pub const TAG_SUBSCRIPTION: &str = "subscription";

/// Tag of a trade print.
pub const TAG_TRADE: &str = "t";

// =============================================================================
// Control Messages
// =============================================================================

/// Control frame entry.
///
/// # Wire Format (JSON)
/// ```json
/// {"T": "success", "msg": "authenticated"}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlMessage {
    /// Message type tag
    #[serde(rename = "T")]
    pub msg_type: String,

    /// Optional free-text message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msg: Option<String>,
}

impl ControlMessage {
    /// Whether this entry acknowledges the connection or credentials.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.msg_type == TAG_SUCCESS
    }
}

/// Error message with code and description.
///
/// # Wire Format (JSON)
/// ```json
/// {"T": "error", "code": 402, "msg": "auth failed"}
/// ```
///
/// # Error Codes
/// - 400: Invalid syntax
/// - 401: Not authenticated
/// - 402: Auth failed
/// - 403: Already authenticated
/// - 404: Auth timeout
/// - 405: Symbol limit exceeded
/// - 406: Connection limit exceeded
/// - 407: Slow client
/// - 408: Insufficient subscription
/// - 500: Internal error
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorMessage {
    /// Message type (always "error")
    #[serde(rename = "T")]
    pub msg_type: String,

    /// Error code; 0 when the notice carries none
    #[serde(default)]
    pub code: i32,

    /// Error message
    #[serde(default)]
    pub msg: String,
}

/// Subscription confirmation.
///
/// # Wire Format (JSON)
/// ```json
/// {"T": "subscription", "trades": ["AAPL"], "quotes": [], "bars": []}
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionMessage {
    /// Message type (always "subscription")
    #[serde(rename = "T")]
    pub msg_type: String,

    /// Subscribed trade symbols
    #[serde(default)]
    pub trades: Vec<String>,
}

// =============================================================================
// Inbound Envelope
// =============================================================================

/// One decoded element of an inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    /// Success acknowledgement.
    Success(ControlMessage),
    /// Error notice.
    Error(ErrorMessage),
    /// Subscription confirmation.
    Subscription(SubscriptionMessage),
    /// Trade print.
    Trade(RawTradeEvent),
    /// Any other kind (quotes, bars, statuses); carries the tag.
    Other(String),
}

impl InboundMessage {
    /// Message type tag.
    #[must_use]
    pub fn tag(&self) -> &str {
        match self {
            Self::Success(_) => TAG_SUCCESS,
            Self::Error(_) => TAG_ERROR,
            Self::Subscription(_) => TAG_SUBSCRIPTION,
            Self::Trade(_) => TAG_TRADE,
            Self::Other(tag) => tag,
        }
    }

    /// Whether this entry confirms the session for trade data.
    #[must_use]
    pub const fn confirms_session(&self) -> bool {
        matches!(self, Self::Success(_) | Self::Subscription(_))
    }
}

// =============================================================================
// Outbound Requests
// =============================================================================

/// Subscription request for the trade channel.
///
/// # Wire Format (JSON)
/// ```json
/// {"action": "subscribe", "trades": ["AAPL", "MSFT"]}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubscriptionRequest {
    /// Action: "subscribe"
    pub action: String,

    /// Trade symbols
    pub trades: Vec<String>,
}

impl SubscriptionRequest {
    /// Create a trade subscribe request.
    #[must_use]
    pub fn subscribe_trades(symbols: Vec<String>) -> Self {
        Self {
            action: "subscribe".to_string(),
            trades: symbols,
        }
    }

    /// Serialize to JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
