//! Stock Stream Connection
//!
//! Dials Alpaca's stock data stream with header credentials and sends the
//! trade subscription.
//!
//! # Stream URL
//!
//! - SIP: `wss://stream.data.alpaca.markets/v2/sip`
//! - IEX: `wss://stream.data.alpaca.markets/v2/iex`

use futures_util::{Sink, SinkExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use super::auth::{Credentials, KEY_ID_HEADER, SECRET_KEY_HEADER};
use super::messages::SubscriptionRequest;

/// WebSocket connection to the stock stream.
pub type StockStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Errors establishing or using the stream connection.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    /// Endpoint URL could not be turned into a request.
    #[error("invalid stream URL {url}: {message}")]
    InvalidUrl { url: String, message: String },

    /// Credential could not be used as a header value.
    #[error("invalid header value for {0}")]
    InvalidHeader(&'static str),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    /// Request serialization failed.
    #[error("failed to encode request: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Stream URL for a data feed.
#[must_use]
pub fn stream_url(feed: &str) -> String {
    format!("wss://stream.data.alpaca.markets/v2/{feed}")
}

/// Dial the stream endpoint with the credentials attached as headers.
///
/// # Errors
///
/// Returns an error if the URL is invalid or the upgrade fails.
pub async fn connect(url: &str, credentials: &Credentials) -> Result<StockStream, StreamError> {
    let mut request = url
        .into_client_request()
        .map_err(|e| StreamError::InvalidUrl {
            url: url.to_string(),
            message: e.to_string(),
        })?;

    let headers = request.headers_mut();
    headers.insert(
        KEY_ID_HEADER,
        HeaderValue::from_str(credentials.key())
            .map_err(|_| StreamError::InvalidHeader(KEY_ID_HEADER))?,
    );
    headers.insert(
        SECRET_KEY_HEADER,
        HeaderValue::from_str(credentials.secret())
            .map_err(|_| StreamError::InvalidHeader(SECRET_KEY_HEADER))?,
    );

    tracing::info!(url, key = credentials.key(), "Connecting to stock stream");
    let (stream, response) = tokio_tungstenite::connect_async(request).await?;
    tracing::debug!(status = %response.status(), "Stock stream upgrade complete");

    Ok(stream)
}

/// Send one trade subscription naming every symbol.
///
/// # Errors
///
/// Returns an error if the request cannot be encoded or written.
pub async fn send_subscribe<W>(write: &mut W, symbols: &[String]) -> Result<(), StreamError>
where
    W: Sink<Message, Error = tungstenite::Error> + Unpin,
{
    let request = SubscriptionRequest::subscribe_trades(symbols.to_vec());
    let json = request.to_json()?;
    write.send(Message::text(json)).await?;
    tracing::info!(count = symbols.len(), "Sent trade subscription");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::sink;

    #[test]
    fn feed_url() {
        assert_eq!(stream_url("sip"), "wss://stream.data.alpaca.markets/v2/sip");
        assert_eq!(stream_url("iex"), "wss://stream.data.alpaca.markets/v2/iex");
    }

    #[tokio::test]
    async fn subscribe_writes_one_frame() {
        let mut sent = Vec::new();
        {
            let write = sink::unfold(&mut sent, |sent, msg: Message| async move {
                sent.push(msg);
                Ok::<_, tungstenite::Error>(sent)
            });
            futures_util::pin_mut!(write);
            send_subscribe(&mut write, &["AAPL".to_string(), "MSFT".to_string()])
                .await
                .unwrap();
        }
        assert_eq!(sent.len(), 1);
        assert_eq!(
            sent[0].to_text().unwrap(),
            r#"{"action":"subscribe","trades":["AAPL","MSFT"]}"#
        );
    }

    #[tokio::test]
    async fn invalid_url_is_rejected() {
        let creds = Credentials::new("key", "secret").unwrap();
        let result = connect("not a url", &creds).await;
        assert!(matches!(result, Err(StreamError::InvalidUrl { .. })));
    }
}
