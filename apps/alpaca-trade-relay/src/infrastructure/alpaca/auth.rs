//! Alpaca WebSocket Authentication
//!
//! The stock stream is authenticated with two request headers
//! (`APCA-API-KEY-ID`, `APCA-API-SECRET-KEY`) on the upgrade request, so
//! no auth message is sent. The server answers with a control frame that
//! must carry a `success` entry.
//!
//! # Authentication Flow
//!
//! 1. Connect with header credentials
//! 2. Receive `[{"T":"success","msg":"connected"}]` (or `"authenticated"`)
//! 3. Any other first frame, a decode failure, or a close is fatal
//!
//! # Error Codes
//!
//! - 401: Not authenticated
//! - 402: Authentication failed (invalid credentials)
//! - 403: Already authenticated
//! - 404: Authentication timeout
//! - 406: Connection limit exceeded

use futures_util::{Stream, StreamExt};
use thiserror::Error;
use tokio_tungstenite::tungstenite::{self, Message};

use super::codec::JsonCodec;
use super::messages::{ErrorMessage, InboundMessage};

// =============================================================================
// Constants
// =============================================================================

/// Header carrying the API key id.
pub const KEY_ID_HEADER: &str = "APCA-API-KEY-ID";

/// Header carrying the API secret.
pub const SECRET_KEY_HEADER: &str = "APCA-API-SECRET-KEY";

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur during authentication.
#[derive(Debug, Clone, Error)]
pub enum AuthError {
    /// Not authenticated.
    #[error("not authenticated: must authenticate before making requests")]
    NotAuthenticated,

    /// Authentication failed (invalid credentials).
    #[error("authentication failed: invalid API key or secret")]
    InvalidCredentials,

    /// Already authenticated (connection was already authenticated).
    #[error("already authenticated: connection is already authenticated")]
    AlreadyAuthenticated,

    /// Authentication timeout.
    #[error("authentication timeout")]
    Timeout,

    /// Connection limit exceeded.
    #[error("connection limit exceeded: too many concurrent connections")]
    ConnectionLimitExceeded,

    /// First frame carried no `success` entry.
    #[error("authentication not acknowledged: first frame had tags {0:?}")]
    NotAcknowledged(Vec<String>),

    /// Invalid message format received.
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    /// Server closed the connection before acknowledging.
    #[error("connection closed during authentication")]
    Closed,

    /// Stream ended before any frame arrived.
    #[error("stream ended during authentication")]
    StreamEnded,

    /// Transport error while reading the first frame.
    #[error("transport error during authentication: {0}")]
    Transport(String),

    /// Unexpected error from server.
    #[error("server error ({code}): {message}")]
    ServerError {
        /// Error code from server
        code: i32,
        /// Error message from server
        message: String,
    },
}

impl From<&ErrorMessage> for AuthError {
    fn from(err: &ErrorMessage) -> Self {
        match err.code {
            401 => Self::NotAuthenticated,
            402 => Self::InvalidCredentials,
            403 => Self::AlreadyAuthenticated,
            404 => Self::Timeout,
            406 => Self::ConnectionLimitExceeded,
            code => Self::ServerError {
                code,
                message: err.msg.clone(),
            },
        }
    }
}

// =============================================================================
// Credentials
// =============================================================================

/// Alpaca API credentials.
///
/// Stores the API key and secret needed for authentication.
/// The `Debug` implementation redacts the secret for safe logging.
#[derive(Clone)]
pub struct Credentials {
    key: String,
    secret: String,
}

impl Credentials {
    /// Create new credentials.
    ///
    /// # Errors
    ///
    /// Returns an error if either key or secret is empty.
    pub fn new(key: impl Into<String>, secret: impl Into<String>) -> Result<Self, AuthError> {
        let key = key.into();
        let secret = secret.into();

        if key.trim().is_empty() {
            return Err(AuthError::InvalidMessage(
                "API key cannot be empty".to_string(),
            ));
        }
        if secret.trim().is_empty() {
            return Err(AuthError::InvalidMessage(
                "API secret cannot be empty".to_string(),
            ));
        }

        Ok(Self { key, secret })
    }

    /// Get the API key.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Get the API secret.
    #[must_use]
    pub fn secret(&self) -> &str {
        &self.secret
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("key", &self.key)
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

// =============================================================================
// Handshake
// =============================================================================

/// Read the first data frame and check it acknowledges the session.
///
/// Ping and pong frames are skipped; the first text or binary frame is
/// the only one inspected. Succeeds iff at least one entry is tagged
/// `success`.
///
/// # Errors
///
/// Returns an error if the frame does not decode, carries no `success`
/// entry, or the connection closes or fails first.
pub async fn await_authentication<S>(read: &mut S, codec: &JsonCodec) -> Result<(), AuthError>
where
    S: Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
{
    let text = loop {
        match read.next().await {
            Some(Ok(Message::Text(text))) => break text.to_string(),
            Some(Ok(Message::Binary(data))) => {
                break String::from_utf8(data.to_vec())
                    .map_err(|e| AuthError::InvalidMessage(e.to_string()))?;
            }
            Some(Ok(Message::Close(frame))) => {
                tracing::warn!(?frame, "Server closed connection during authentication");
                return Err(AuthError::Closed);
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => return Err(AuthError::Transport(e.to_string())),
            None => return Err(AuthError::StreamEnded),
        }
    };

    let messages = codec
        .decode(&text)
        .map_err(|e| AuthError::InvalidMessage(e.to_string()))?;

    if messages
        .iter()
        .any(|m| matches!(m, InboundMessage::Success(_)))
    {
        tracing::info!("Stream authenticated");
        return Ok(());
    }

    if let Some(error) = messages.iter().find_map(|m| match m {
        InboundMessage::Error(e) => Some(e),
        _ => None,
    }) {
        tracing::error!(code = error.code, msg = %error.msg, "Authentication rejected");
        return Err(AuthError::from(error));
    }

    Err(AuthError::NotAcknowledged(
        messages.iter().map(|m| m.tag().to_string()).collect(),
    ))
}
