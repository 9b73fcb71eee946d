//! Sink Ports (Driven Ports)
//!
//! The transport seam for the metrics sink (`SinkDialer`) and the
//! delivery interface the dispatcher workers call (`LineSink`).

use std::io;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::io::AsyncWrite;

use crate::domain::line_protocol::FormattedLine;

/// Connection state of the sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SinkState {
    /// No connection; sends fail fast.
    #[default]
    Disconnected,
    /// Connection established.
    Connected,
    /// Connection lost after setup; the next send reconnects first.
    Lost,
}

impl SinkState {
    /// Check if a connection is open.
    #[must_use]
    pub const fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Label used in logs and health output.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connected => "connected",
            Self::Lost => "lost",
        }
    }
}

/// Sink state shared between the forwarder and status readers.
pub type SharedSinkState = Arc<RwLock<SinkState>>;

/// Forwarding error.
#[derive(Debug, thiserror::Error)]
pub enum ForwardError {
    /// No connection has been established, or it was torn down.
    #[error("sink not connected")]
    NotConnected,

    /// Write failed and the connection could not be re-established.
    #[error("sink I/O error: {0}")]
    Io(#[from] io::Error),

    /// Write kept failing through the whole attempt budget.
    #[error("sink write failed after {attempts} attempts: {source}")]
    WriteExhausted {
        attempts: u32,
        #[source]
        source: io::Error,
    },

    /// Initial dial failed through the whole attempt budget.
    #[error("sink dial to {endpoint} failed after {attempts} attempts: {source}")]
    DialExhausted {
        endpoint: String,
        attempts: u32,
        #[source]
        source: io::Error,
    },

    /// The forwarder task is no longer running.
    #[error("forwarder closed")]
    Closed,
}

/// Port for opening connections to the sink.
#[async_trait]
pub trait SinkDialer: Send + Sync + 'static {
    /// Connection type produced by [`SinkDialer::dial`].
    type Connection: AsyncWrite + Unpin + Send + 'static;

    /// Open one connection.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error if the connection fails.
    async fn dial(&self) -> io::Result<Self::Connection>;

    /// Endpoint description used in logs.
    fn endpoint(&self) -> String;
}

/// Port for delivering validated records to the sink.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LineSink: Send + Sync {
    /// Deliver records in order, each as one newline-terminated line.
    ///
    /// # Errors
    ///
    /// Returns error if the records could not be delivered; the caller
    /// owns the decision to drop or retry them.
    async fn send_lines(&self, lines: Vec<FormattedLine>) -> Result<(), ForwardError>;
}
