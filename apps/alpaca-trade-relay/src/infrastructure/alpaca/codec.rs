//! Stream Codec Module
//!
//! Decodes Alpaca stock stream frames. Each frame is a JSON array; every
//! element is classified by its `"T"` tag first and then decoded straight
//! into the matching message type, so a frame is parsed exactly once.
//! An element that has no tag, or does not match its tagged type, is
//! kept as [`InboundMessage::Other`] so the rest of the frame survives.
//!
//! Example frame:
//! ```json
//! [{"T":"t","i":1,"S":"AAPL","x":"Q","p":150.25,"s":10,"t":"2024-01-01T00:00:00Z","c":[],"z":"A"}]
//! ```

use super::messages::{InboundMessage, TAG_ERROR, TAG_SUBSCRIPTION, TAG_SUCCESS, TAG_TRADE};

/// Codec errors.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// JSON encoding/decoding failed.
    #[error("JSON codec error: {0}")]
    Json(#[from] serde_json::Error),

    /// Frame is not a JSON array.
    #[error("invalid message format: {0}")]
    InvalidFormat(String),
}

/// JSON codec for the stock stream.
#[derive(Debug, Default, Clone)]
pub struct JsonCodec;

impl JsonCodec {
    /// Create a new JSON codec.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Decode a text frame into its messages, in frame order.
    ///
    /// Unknown tags, untagged elements and elements that do not match
    /// their tagged type decode to [`InboundMessage::Other`].
    ///
    /// # Errors
    ///
    /// Returns an error if the frame is not a JSON array.
    pub fn decode(&self, text: &str) -> Result<Vec<InboundMessage>, CodecError> {
        let trimmed = text.trim();
        if !trimmed.starts_with('[') {
            let preview: String = trimmed.chars().take(50).collect();
            return Err(CodecError::InvalidFormat(format!(
                "expected JSON array, got: {preview}..."
            )));
        }

        let raw_array: Vec<serde_json::Value> = serde_json::from_str(trimmed)?;
        let mut messages = Vec::with_capacity(raw_array.len());

        for (index, value) in raw_array.into_iter().enumerate() {
            let Some(msg_type) = value
                .get("T")
                .and_then(serde_json::Value::as_str)
                .map(str::to_owned)
            else {
                tracing::debug!(index, "Skipping untagged message");
                messages.push(InboundMessage::Other(String::new()));
                continue;
            };

            let decoded = match msg_type.as_str() {
                TAG_SUCCESS => serde_json::from_value(value).map(InboundMessage::Success),
                TAG_ERROR => serde_json::from_value(value).map(InboundMessage::Error),
                TAG_SUBSCRIPTION => serde_json::from_value(value).map(InboundMessage::Subscription),
                TAG_TRADE => serde_json::from_value(value).map(InboundMessage::Trade),
                _ => Ok(InboundMessage::Other(msg_type.clone())),
            };

            messages.push(decoded.unwrap_or_else(|e| {
                tracing::debug!(index, tag = %msg_type, error = %e, "Skipping malformed message");
                InboundMessage::Other(msg_type)
            }));
        }

        Ok(messages)
    }
}
