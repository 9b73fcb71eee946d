//! Prometheus Metrics Module
//!
//! Exposes application metrics via Prometheus format for monitoring.
//!
//! # Metrics Categories
//!
//! - **Frames**: Inbound frames by kind, and frames dropped on decode failure
//! - **Trades**: Trades decoded, batches dispatched, in-flight workers
//! - **Sink**: Lines forwarded or rejected, dropped batches, reconnects
//! - **Latency**: Batch forwarding duration
//!
//! # Integration
//!
//! Metrics are exposed at `/metrics` on the health server port.

use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// # Panics
///
/// Panics if the recorder cannot be installed.
pub fn init_metrics() -> PrometheusHandle {
    PROMETHEUS_HANDLE
        .get_or_init(|| {
            let builder = PrometheusBuilder::new();
            let handle = builder
                .install_recorder()
                .expect("failed to install Prometheus recorder");

            register_metrics();
            handle
        })
        .clone()
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    // Inbound
    describe_counter!(
        "relay_frames_received_total",
        "Total frames received from the stock stream by kind"
    );
    describe_counter!(
        "relay_frames_dropped_total",
        "Total inbound frames discarded because they did not decode"
    );
    describe_counter!(
        "relay_trades_received_total",
        "Total trades decoded from the stock stream"
    );

    // Dispatch
    describe_counter!(
        "relay_batches_dispatched_total",
        "Total trade batches handed to workers"
    );
    describe_gauge!(
        "relay_inflight_batches",
        "Number of batches currently being forwarded"
    );
    describe_gauge!(
        "relay_symbols_subscribed",
        "Number of symbols in the trade subscription"
    );

    // Sink
    describe_counter!(
        "relay_lines_forwarded_total",
        "Total line-protocol records written to the sink"
    );
    describe_counter!(
        "relay_lines_rejected_total",
        "Total records rejected by the line validity check"
    );
    describe_counter!(
        "relay_batches_dropped_total",
        "Total batches dropped after forwarding failed"
    );
    describe_counter!(
        "relay_sink_write_errors_total",
        "Total sink write errors by I/O error kind"
    );
    describe_counter!(
        "relay_sink_reconnects_total",
        "Total successful sink reconnections"
    );

    // Latency
    describe_histogram!(
        "relay_batch_forward_seconds",
        "Time to render and forward one batch"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Metric labels for inbound frame kinds.
#[derive(Debug, Clone, Copy)]
pub enum FrameKind {
    /// Control frame read before the session is confirmed.
    Control,
    /// Data frame read after the session is confirmed.
    Data,
    /// Ping, pong, or other non-text frame.
    Ignored,
}

impl FrameKind {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Control => "control",
            Self::Data => "data",
            Self::Ignored => "ignored",
        }
    }
}

/// Record a frame received from the stock stream.
pub fn record_frame_received(kind: FrameKind) {
    counter!(
        "relay_frames_received_total",
        "kind" => kind.as_str()
    )
    .increment(1);
}

/// Record a frame discarded on decode failure.
pub fn record_frame_dropped(kind: FrameKind) {
    counter!(
        "relay_frames_dropped_total",
        "kind" => kind.as_str()
    )
    .increment(1);
}

/// Record trades decoded from one frame.
pub fn record_trades_received(count: u64) {
    counter!("relay_trades_received_total").increment(count);
}

/// Record a batch handed to a worker.
pub fn record_batch_dispatched() {
    counter!("relay_batches_dispatched_total").increment(1);
}

/// Update the in-flight batch count.
pub fn set_inflight_batches(count: f64) {
    gauge!("relay_inflight_batches").set(count);
}

/// Update the subscribed symbol count.
pub fn set_symbols_subscribed(count: f64) {
    gauge!("relay_symbols_subscribed").set(count);
}

/// Record records written to the sink.
pub fn record_lines_forwarded(count: u64) {
    counter!("relay_lines_forwarded_total").increment(count);
}

/// Record records rejected by the validity check.
pub fn record_lines_rejected(count: u64) {
    counter!("relay_lines_rejected_total").increment(count);
}

/// Record a batch dropped after forwarding failed.
pub fn record_batch_dropped() {
    counter!("relay_batches_dropped_total").increment(1);
}

/// Record a sink write error.
pub fn record_sink_write_error(kind: std::io::ErrorKind) {
    counter!(
        "relay_sink_write_errors_total",
        "kind" => format!("{kind:?}")
    )
    .increment(1);
}

/// Record a successful sink reconnection.
pub fn record_sink_reconnect() {
    counter!("relay_sink_reconnects_total").increment(1);
}

/// Record batch forwarding duration.
pub fn record_batch_forward_duration(duration: Duration) {
    histogram!("relay_batch_forward_seconds").record(duration.as_secs_f64());
}

// =============================================================================
// Tests
// =============================================================================
