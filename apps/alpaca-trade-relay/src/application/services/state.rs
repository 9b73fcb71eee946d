//! Relay State
//!
//! Shared status of one relay run, written by the orchestrator and the
//! dispatcher and read by the health server.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::application::ports::{SharedSinkState, SinkState};

// =============================================================================
// Stream State
// =============================================================================

/// Lifecycle of the stock stream connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamState {
    /// Not started.
    #[default]
    Disconnected,
    /// Dialing the stream endpoint.
    Connecting,
    /// Waiting for the server acknowledgement.
    Authenticating,
    /// Subscription request sent, confirmation pending.
    Subscribed,
    /// Subscription confirmed; trades are being forwarded.
    Streaming,
    /// Stream ended or was cancelled.
    Closed,
    /// Server rejected the session.
    AuthFailed,
    /// Run aborted with an error.
    Failed,
}

impl StreamState {
    /// Label used in logs and health output.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Authenticating => "authenticating",
            Self::Subscribed => "subscribed",
            Self::Streaming => "streaming",
            Self::Closed => "closed",
            Self::AuthFailed => "auth_failed",
            Self::Failed => "failed",
        }
    }
}

// =============================================================================
// Relay State
// =============================================================================

/// Point-in-time copy of [`RelayState`].
#[derive(Debug, Clone, Serialize)]
pub struct RelayStatus {
    /// Stream connection state.
    pub stream: StreamState,
    /// Sink connection state.
    pub sink: &'static str,
    /// When the stream was last authenticated.
    pub last_connected_at: Option<DateTime<Utc>>,
    /// Error that ended the last run.
    pub error_message: Option<String>,
    /// Symbols in the subscription.
    pub symbols_subscribed: usize,
    /// Data frames read from the stream.
    pub frames_received: u64,
    /// Trades decoded.
    pub trades_received: u64,
    /// Batches handed to workers.
    pub batches_dispatched: u64,
    /// Batches dropped after a forwarding failure.
    pub batches_dropped: u64,
    /// Lines written to the sink.
    pub lines_forwarded: u64,
}

/// Shared relay status.
#[derive(Debug, Default)]
pub struct RelayState {
    stream: parking_lot::RwLock<StreamState>,
    last_connected_at: parking_lot::RwLock<Option<DateTime<Utc>>>,
    error_message: parking_lot::RwLock<Option<String>>,
    sink: SharedSinkState,
    symbols_subscribed: AtomicUsize,
    frames_received: AtomicU64,
    trades_received: AtomicU64,
    batches_dispatched: AtomicU64,
    batches_dropped: AtomicU64,
    lines_forwarded: AtomicU64,
}

impl RelayState {
    /// Create a new state in `Disconnected`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the stream state.
    pub fn set_stream_state(&self, state: StreamState) {
        let previous = std::mem::replace(&mut *self.stream.write(), state);
        if state == StreamState::Authenticating {
            *self.last_connected_at.write() = Some(Utc::now());
            *self.error_message.write() = None;
        }
        if previous != state {
            tracing::debug!(from = previous.as_str(), to = state.as_str(), "Stream state changed");
        }
    }

    /// Set a terminal failure state with a message.
    pub fn set_failure(&self, state: StreamState, message: String) {
        *self.stream.write() = state;
        *self.error_message.write() = Some(message);
    }

    /// Handle the forwarder publishes sink changes into.
    #[must_use]
    pub fn sink_handle(&self) -> SharedSinkState {
        SharedSinkState::clone(&self.sink)
    }

    /// Update the subscribed symbol count.
    pub fn set_symbols_subscribed(&self, count: usize) {
        self.symbols_subscribed.store(count, Ordering::Relaxed);
    }

    /// Increment the frame counter.
    pub fn increment_frames(&self) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
    }

    /// Add decoded trades.
    pub fn add_trades(&self, count: u64) {
        self.trades_received.fetch_add(count, Ordering::Relaxed);
    }

    /// Increment the dispatched batch counter.
    pub fn increment_batches_dispatched(&self) {
        self.batches_dispatched.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment the dropped batch counter.
    pub fn increment_batches_dropped(&self) {
        self.batches_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Add lines written to the sink.
    pub fn add_lines_forwarded(&self, count: u64) {
        self.lines_forwarded.fetch_add(count, Ordering::Relaxed);
    }

    /// Get the stream state.
    #[must_use]
    pub fn get_stream_state(&self) -> StreamState {
        *self.stream.read()
    }

    /// Get the sink state.
    #[must_use]
    pub fn get_sink_state(&self) -> SinkState {
        *self.sink.read()
    }

    /// Get the decoded trade count.
    #[must_use]
    pub fn get_trades_received(&self) -> u64 {
        self.trades_received.load(Ordering::Relaxed)
    }

    /// Get the forwarded line count.
    #[must_use]
    pub fn get_lines_forwarded(&self) -> u64 {
        self.lines_forwarded.load(Ordering::Relaxed)
    }

    /// Ready when trades are streaming and the sink is connected.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.get_stream_state() == StreamState::Streaming && self.get_sink_state().is_connected()
    }

    /// Copy the current status.
    #[must_use]
    pub fn snapshot(&self) -> RelayStatus {
        RelayStatus {
            stream: self.get_stream_state(),
            sink: self.get_sink_state().as_str(),
            last_connected_at: *self.last_connected_at.read(),
            error_message: self.error_message.read().clone(),
            symbols_subscribed: self.symbols_subscribed.load(Ordering::Relaxed),
            frames_received: self.frames_received.load(Ordering::Relaxed),
            trades_received: self.get_trades_received(),
            batches_dispatched: self.batches_dispatched.load(Ordering::Relaxed),
            batches_dropped: self.batches_dropped.load(Ordering::Relaxed),
            lines_forwarded: self.get_lines_forwarded(),
        }
    }
}
