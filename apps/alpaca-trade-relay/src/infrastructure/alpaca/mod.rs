//! Alpaca WebSocket Adapters
//!
//! Client side of Alpaca's stock data stream, trade channel only:
//!
//! - **Stream**: Header-credential dial and trade subscription
//! - **Auth**: First-frame acknowledgement handshake
//! - **Codec**: Tag-first JSON frame decoding

pub mod auth;
pub mod codec;
pub mod messages;
pub mod stream;

pub use auth::{AuthError, Credentials, await_authentication};
pub use codec::{CodecError, JsonCodec};
pub use messages::{
    ControlMessage, ErrorMessage, InboundMessage, SubscriptionMessage, SubscriptionRequest,
};
pub use stream::{StockStream, StreamError, connect, send_subscribe, stream_url};
