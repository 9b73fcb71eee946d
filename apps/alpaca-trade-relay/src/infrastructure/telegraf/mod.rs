//! Telegraf Sink Adapter
//!
//! Forwards line-protocol records to Telegraf over one persistent TCP
//! connection:
//!
//! - **Dialer**: TCP connection factory
//! - **Writer**: Retry and reconnect state machine
//! - **Forwarder**: Single-owner actor that serializes all writes
//! - **Reconnect**: Exponential backoff schedule

pub mod dialer;
pub mod forwarder;
pub mod reconnect;
pub mod writer;

pub use dialer::TcpDialer;
pub use forwarder::{DEFAULT_QUEUE_DEPTH, Forwarder};
pub use reconnect::{ReconnectConfig, ReconnectPolicy};
pub use writer::SinkWriter;
