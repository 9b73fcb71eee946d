//! Trade Dispatcher
//!
//! Reads frames from the authenticated stream, waits for the session
//! confirmation, batches decoded trades, and hands each full batch to a
//! worker that renders and forwards it.
//!
//! # Flow
//!
//! 1. Frames before confirmation are control frames. A `success` or
//!    `subscription` entry confirms the session; nothing else is acted on.
//! 2. After confirmation every trade entry is normalized and appended to
//!    the current batch.
//! 3. A full batch waits for a worker slot (at most `max_in_flight`
//!    batches are forwarded at once) and is spawned.
//! 4. On cancellation, close, read error, or end of stream all workers
//!    are awaited and the partial batch is flushed once.
//!
//! A batch whose forwarding fails is logged and dropped.

use std::sync::Arc;
use std::time::Instant;

use futures_util::{Stream, StreamExt};
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_util::sync::CancellationToken;

use super::state::{RelayState, StreamState};
use crate::application::ports::LineSink;
use crate::domain::batch::{BatchAccumulator, DEFAULT_BATCH_SIZE};
use crate::domain::line_protocol::{FormattedLine, render_trade};
use crate::domain::trade::NormalizedTrade;
use crate::infrastructure::alpaca::{InboundMessage, JsonCodec};
use crate::infrastructure::metrics::{self, FrameKind};

/// Default cap on concurrently forwarded batches.
pub const DEFAULT_MAX_IN_FLIGHT: usize = 10;

// =============================================================================
// Configuration
// =============================================================================

/// Batching and concurrency limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchConfig {
    /// Trades per batch.
    pub batch_size: usize,
    /// Maximum batches forwarded concurrently.
    pub max_in_flight: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
        }
    }
}

// =============================================================================
// Summary
// =============================================================================

/// Why the read loop stopped.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum StreamEnd {
    /// The cancellation token fired.
    #[default]
    Cancelled,
    /// The server sent a close frame.
    Closed,
    /// The stream returned no more frames.
    Ended,
    /// Reading a frame failed.
    Failed(String),
}

/// Counters for one dispatcher run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    /// Why the loop stopped.
    pub end: StreamEnd,
    /// Text or binary frames read.
    pub frames_received: u64,
    /// Frames discarded because they did not decode.
    pub frames_dropped: u64,
    /// Trades decoded after confirmation.
    pub trades_received: u64,
    /// Batches handed to the sink, including the final flush.
    pub batches_dispatched: u64,
    /// Batches dropped after forwarding failed.
    pub batches_dropped: u64,
    /// Lines written to the sink.
    pub lines_forwarded: u64,
    /// Lines rejected by the validity check.
    pub lines_rejected: u64,
}

#[derive(Debug, Default)]
struct BatchOutcome {
    forwarded: u64,
    rejected: u64,
    dropped: bool,
}

// =============================================================================
// Dispatcher
// =============================================================================

/// Classifies inbound frames and dispatches trade batches.
pub struct TradeDispatcher {
    codec: JsonCodec,
    sink: Arc<dyn LineSink>,
    state: Arc<RelayState>,
    cancel: CancellationToken,
    limiter: Arc<Semaphore>,
    max_in_flight: usize,
    workers: JoinSet<BatchOutcome>,
    batch: BatchAccumulator<NormalizedTrade>,
    confirmed: bool,
    summary: DispatchSummary,
}

impl TradeDispatcher {
    /// Create a dispatcher forwarding into `sink`.
    #[must_use]
    pub fn new(
        config: DispatchConfig,
        sink: Arc<dyn LineSink>,
        state: Arc<RelayState>,
        cancel: CancellationToken,
    ) -> Self {
        let max_in_flight = config.max_in_flight.max(1);
        Self {
            codec: JsonCodec::new(),
            sink,
            state,
            cancel,
            limiter: Arc::new(Semaphore::new(max_in_flight)),
            max_in_flight,
            workers: JoinSet::new(),
            batch: BatchAccumulator::new(config.batch_size),
            confirmed: false,
            summary: DispatchSummary::default(),
        }
    }

    /// Run until cancellation or the end of the stream.
    ///
    /// Close frames, read errors, and the end of the stream cancel the
    /// token so that the rest of the relay shuts down with the loop.
    pub async fn run<R>(mut self, mut read: R) -> DispatchSummary
    where
        R: Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
    {
        let end = loop {
            let next = tokio::select! {
                biased;
                () = self.cancel.cancelled() => break StreamEnd::Cancelled,
                next = read.next() => next,
            };

            match next {
                Some(Ok(Message::Text(text))) => self.handle_frame(text.as_str()).await,
                Some(Ok(Message::Binary(data))) => match std::str::from_utf8(&data) {
                    Ok(text) => self.handle_frame(text).await,
                    Err(e) => {
                        let kind = self.frame_kind();
                        self.summary.frames_received += 1;
                        self.summary.frames_dropped += 1;
                        metrics::record_frame_received(kind);
                        metrics::record_frame_dropped(kind);
                        tracing::warn!(error = %e, "Dropping non UTF-8 binary frame");
                    }
                },
                Some(Ok(Message::Close(frame))) => {
                    tracing::info!(?frame, "Stock stream closed by server");
                    self.cancel.cancel();
                    break StreamEnd::Closed;
                }
                Some(Ok(_)) => metrics::record_frame_received(FrameKind::Ignored),
                Some(Err(e)) => {
                    tracing::error!(error = %e, "Stock stream read failed");
                    self.cancel.cancel();
                    break StreamEnd::Failed(e.to_string());
                }
                None => {
                    tracing::info!("Stock stream ended");
                    self.cancel.cancel();
                    break StreamEnd::Ended;
                }
            }
        };

        self.finish(end).await
    }

    const fn frame_kind(&self) -> FrameKind {
        if self.confirmed {
            FrameKind::Data
        } else {
            FrameKind::Control
        }
    }

    async fn handle_frame(&mut self, text: &str) {
        let kind = self.frame_kind();
        self.summary.frames_received += 1;
        self.state.increment_frames();
        metrics::record_frame_received(kind);

        let messages = match self.codec.decode(text) {
            Ok(messages) => messages,
            Err(e) => {
                self.summary.frames_dropped += 1;
                metrics::record_frame_dropped(kind);
                tracing::warn!(error = %e, kind = ?kind, "Dropping undecodable frame");
                return;
            }
        };

        if !self.confirmed {
            self.handle_control(&messages);
            return;
        }

        let mut trades = 0u64;
        for message in messages {
            match message {
                InboundMessage::Trade(raw) => {
                    trades += 1;
                    if let Some(batch) = self.batch.push(NormalizedTrade::from(raw)) {
                        self.dispatch(batch).await;
                    }
                }
                InboundMessage::Error(error) => {
                    tracing::warn!(code = error.code, msg = %error.msg, "Stream error notice");
                }
                InboundMessage::Subscription(sub) => {
                    tracing::info!(trades = sub.trades.len(), "Subscription updated");
                }
                other => tracing::trace!(tag = other.tag(), "Ignoring non-trade entry"),
            }
        }

        if trades > 0 {
            self.summary.trades_received += trades;
            self.state.add_trades(trades);
            metrics::record_trades_received(trades);
        }
    }

    fn handle_control(&mut self, messages: &[InboundMessage]) {
        for message in messages {
            if message.confirms_session() {
                self.confirmed = true;
            } else {
                tracing::debug!(tag = message.tag(), "Control entry before confirmation");
            }
        }

        if self.confirmed {
            self.state.set_stream_state(StreamState::Streaming);
            tracing::info!("Subscription confirmed, forwarding trades");
        }
    }

    async fn dispatch(&mut self, batch: Vec<NormalizedTrade>) {
        self.reap_finished();

        let permit = tokio::select! {
            biased;
            () = self.cancel.cancelled() => {
                tracing::warn!(count = batch.len(), "Cancelled while waiting for a worker, dropping batch");
                self.record_dropped();
                return;
            }
            permit = Arc::clone(&self.limiter).acquire_owned() => permit,
        };
        let Ok(permit) = permit else {
            tracing::error!(count = batch.len(), "Worker limiter closed, dropping batch");
            self.record_dropped();
            return;
        };

        self.summary.batches_dispatched += 1;
        self.state.increment_batches_dispatched();
        metrics::record_batch_dispatched();

        let sink = Arc::clone(&self.sink);
        self.workers.spawn(async move {
            let outcome = forward_batch(sink.as_ref(), batch).await;
            drop(permit);
            outcome
        });
        self.update_inflight();
    }

    fn reap_finished(&mut self) {
        while let Some(result) = self.workers.try_join_next() {
            self.tally(result);
        }
        self.update_inflight();
    }

    fn update_inflight(&self) {
        let busy = self.max_in_flight - self.limiter.available_permits();
        #[allow(clippy::cast_precision_loss)]
        metrics::set_inflight_batches(busy as f64);
    }

    fn tally(&mut self, result: Result<BatchOutcome, JoinError>) {
        match result {
            Ok(outcome) => self.apply(&outcome),
            Err(e) => {
                tracing::error!(error = %e, "Batch worker failed");
                self.record_dropped();
            }
        }
    }

    fn apply(&mut self, outcome: &BatchOutcome) {
        self.summary.lines_forwarded += outcome.forwarded;
        self.summary.lines_rejected += outcome.rejected;
        self.state.add_lines_forwarded(outcome.forwarded);
        if outcome.dropped {
            self.summary.batches_dropped += 1;
            self.state.increment_batches_dropped();
        }
    }

    fn record_dropped(&mut self) {
        self.summary.batches_dropped += 1;
        self.state.increment_batches_dropped();
        metrics::record_batch_dropped();
    }

    async fn finish(mut self, end: StreamEnd) -> DispatchSummary {
        while let Some(result) = self.workers.join_next().await {
            self.tally(result);
        }
        metrics::set_inflight_batches(0.0);

        if let Some(batch) = self.batch.take() {
            tracing::info!(count = batch.len(), "Flushing partial batch");
            self.summary.batches_dispatched += 1;
            self.state.increment_batches_dispatched();
            metrics::record_batch_dispatched();
            let outcome = forward_batch(self.sink.as_ref(), batch).await;
            self.apply(&outcome);
        }

        self.summary.end = end;
        tracing::info!(
            end = ?self.summary.end,
            frames = self.summary.frames_received,
            trades = self.summary.trades_received,
            batches = self.summary.batches_dispatched,
            dropped = self.summary.batches_dropped,
            lines = self.summary.lines_forwarded,
            "Dispatcher stopped"
        );
        self.summary
    }
}

/// Render a batch and forward the valid lines as one request.
async fn forward_batch(sink: &dyn LineSink, batch: Vec<NormalizedTrade>) -> BatchOutcome {
    let started = Instant::now();
    let mut lines = Vec::with_capacity(batch.len());
    let mut rejected = 0u64;

    for trade in &batch {
        match FormattedLine::from_trade(trade) {
            Ok(line) => lines.push(line),
            Err(e) => {
                rejected += 1;
                tracing::warn!(line = %e.0, "Dropping invalid line");
            }
        }
    }
    if rejected > 0 {
        metrics::record_lines_rejected(rejected);
    }
    if lines.is_empty() {
        return BatchOutcome {
            rejected,
            ..BatchOutcome::default()
        };
    }

    let count = lines.len() as u64;
    match sink.send_lines(lines).await {
        Ok(()) => {
            metrics::record_lines_forwarded(count);
            metrics::record_batch_forward_duration(started.elapsed());
            tracing::debug!(count, "Forwarded batch");
            BatchOutcome {
                forwarded: count,
                rejected,
                dropped: false,
            }
        }
        Err(e) => {
            let content: Vec<String> = batch.iter().map(render_trade).collect();
            tracing::error!(error = %e, count, lines = ?content, "Dropping batch after forward failure");
            metrics::record_batch_dropped();
            BatchOutcome {
                forwarded: 0,
                rejected,
                dropped: true,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use futures_util::stream;
    use parking_lot::Mutex;

    use super::*;
    use crate::application::ports::{ForwardError, MockLineSink};

    /// Sink that records every request.
    #[derive(Default)]
    struct RecordingSink {
        batches: Mutex<Vec<Vec<String>>>,
    }

    impl RecordingSink {
        fn sizes(&self) -> Vec<usize> {
            self.batches.lock().iter().map(Vec::len).collect()
        }
    }

    #[async_trait]
    impl LineSink for RecordingSink {
        async fn send_lines(&self, lines: Vec<FormattedLine>) -> Result<(), ForwardError> {
            self.batches
                .lock()
                .push(lines.iter().map(|l| l.as_str().to_string()).collect());
            Ok(())
        }
    }

    /// Sink that holds each request briefly and tracks peak concurrency.
    #[derive(Default)]
    struct SlowSink {
        active: AtomicUsize,
        peak: AtomicUsize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl LineSink for SlowSink {
        async fn send_lines(&self, _lines: Vec<FormattedLine>) -> Result<(), ForwardError> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.active.fetch_sub(1, Ordering::SeqCst);
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    type Frame = Result<Message, tungstenite::Error>;

    const CONFIRM: &str = r#"[{"T":"success","msg":"connected"}]"#;
    const CONFIRM_ENTRY: &str = r#"{"T":"subscription","trades":["AAPL"]}"#;

    fn text(s: &str) -> Frame {
        Ok(Message::text(s))
    }

    fn trade_json(id: i64) -> String {
        format!(
            r#"{{"T":"t","i":{id},"S":"AAPL","x":"Q","p":150.25,"s":10,"t":"2024-01-01T00:00:00Z","c":[],"z":"A"}}"#
        )
    }

    fn trade_frame(ids: std::ops::Range<i64>) -> Frame {
        let entries: Vec<String> = ids.map(trade_json).collect();
        text(&format!("[{}]", entries.join(",")))
    }

    fn dispatcher(sink: Arc<dyn LineSink>, batch_size: usize, max_in_flight: usize) -> TradeDispatcher {
        TradeDispatcher::new(
            DispatchConfig {
                batch_size,
                max_in_flight,
            },
            sink,
            Arc::new(RelayState::new()),
            CancellationToken::new(),
        )
    }

    #[tokio::test]
    async fn batches_full_and_flushes_remainder() {
        let sink = Arc::new(RecordingSink::default());
        let frames = vec![text(CONFIRM), trade_frame(0..250)];

        let summary = dispatcher(sink.clone(), 100, 4)
            .run(stream::iter(frames))
            .await;

        let mut sizes = sink.sizes();
        sizes.sort_unstable();
        assert_eq!(sizes, vec![50, 100, 100]);
        assert_eq!(summary.trades_received, 250);
        assert_eq!(summary.batches_dispatched, 3);
        assert_eq!(summary.lines_forwarded, 250);
        assert_eq!(summary.end, StreamEnd::Ended);
    }

    #[tokio::test]
    async fn renders_reference_line() {
        let sink = Arc::new(RecordingSink::default());
        let frames = vec![
            text(CONFIRM),
            text(r#"[{"T":"t","i":1,"S":"AAPL","x":"Q","p":150.25,"s":10,"t":"2024-01-01T00:00:00Z","c":[],"z":"A"}]"#),
        ];

        dispatcher(sink.clone(), 100, 1)
            .run(stream::iter(frames))
            .await;

        assert_eq!(
            sink.batches.lock().concat(),
            vec![
                "alpaca_equities_streaming_trades,symbol=AAPL,conditions_str=\"N\",exchange=Q price=150.250000,size=10,trade_id=1,tape=\"A\" 1704067200000000000"
            ]
        );
    }

    #[tokio::test]
    async fn trades_before_confirmation_are_ignored() {
        let sink = Arc::new(RecordingSink::default());
        let frames = vec![
            trade_frame(0..3),
            text(&format!("[{CONFIRM_ENTRY},{}]", trade_json(9))),
            trade_frame(10..12),
        ];

        let summary = dispatcher(sink.clone(), 100, 1)
            .run(stream::iter(frames))
            .await;

        assert_eq!(summary.trades_received, 2);
        assert_eq!(sink.sizes(), vec![2]);
    }

    #[tokio::test]
    async fn undecodable_frames_are_dropped() {
        let sink = Arc::new(RecordingSink::default());
        let frames = vec![
            text("garbage"),
            text(CONFIRM),
            text("{not an array}"),
            trade_frame(0..1),
        ];

        let summary = dispatcher(sink.clone(), 100, 1)
            .run(stream::iter(frames))
            .await;

        assert_eq!(summary.frames_received, 4);
        assert_eq!(summary.frames_dropped, 2);
        assert_eq!(summary.trades_received, 1);
        assert_eq!(sink.sizes(), vec![1]);
    }

    #[tokio::test]
    async fn malformed_entries_do_not_discard_frame() {
        let sink = Arc::new(RecordingSink::default());
        let frames = vec![
            text(r#"[{"T":"success","msg":"connected"},{"T":"error","msg":"notice"}]"#),
            text(&format!(r#"[{},{{"T":"t","S":"MSFT"}},{}]"#, trade_json(1), trade_json(2))),
        ];

        let summary = dispatcher(sink.clone(), 100, 1)
            .run(stream::iter(frames))
            .await;

        assert_eq!(summary.frames_dropped, 0);
        assert_eq!(summary.trades_received, 2);
        assert_eq!(sink.sizes(), vec![2]);
    }

    #[tokio::test]
    async fn failed_batch_is_dropped_and_loop_continues() {
        let mut mock = MockLineSink::new();
        mock.expect_send_lines()
            .times(2)
            .returning(|_| Err(ForwardError::NotConnected));

        let frames = vec![text(CONFIRM), trade_frame(0..2), trade_frame(2..4)];
        let summary = dispatcher(Arc::new(mock), 2, 1)
            .run(stream::iter(frames))
            .await;

        assert_eq!(summary.batches_dispatched, 2);
        assert_eq!(summary.batches_dropped, 2);
        assert_eq!(summary.lines_forwarded, 0);
    }

    #[tokio::test]
    async fn in_flight_batches_are_bounded() {
        let sink = Arc::new(SlowSink::default());
        let frames = vec![text(CONFIRM), trade_frame(0..12)];

        let summary = dispatcher(sink.clone(), 2, 2)
            .run(stream::iter(frames))
            .await;

        assert_eq!(summary.batches_dispatched, 6);
        assert_eq!(sink.calls.load(Ordering::SeqCst), 6);
        assert!(sink.peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn close_frame_cancels_and_flushes() {
        let sink = Arc::new(RecordingSink::default());
        let cancel = CancellationToken::new();
        let frames = vec![
            text(CONFIRM),
            trade_frame(0..3),
            Ok(Message::Close(None)),
            trade_frame(3..6),
        ];

        let summary = TradeDispatcher::new(
            DispatchConfig::default(),
            sink.clone(),
            Arc::new(RelayState::new()),
            cancel.clone(),
        )
        .run(stream::iter(frames))
        .await;

        assert_eq!(summary.end, StreamEnd::Closed);
        assert!(cancel.is_cancelled());
        assert_eq!(sink.sizes(), vec![3]);
    }

    #[tokio::test]
    async fn read_error_ends_loop() {
        let sink = Arc::new(RecordingSink::default());
        let frames = vec![text(CONFIRM), Err(tungstenite::Error::ConnectionClosed)];

        let summary = dispatcher(sink, 100, 1).run(stream::iter(frames)).await;

        assert!(matches!(summary.end, StreamEnd::Failed(_)));
    }

    #[tokio::test]
    async fn cancelled_before_start_sends_nothing() {
        let mut mock = MockLineSink::new();
        mock.expect_send_lines().never();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let summary = TradeDispatcher::new(
            DispatchConfig::default(),
            Arc::new(mock),
            Arc::new(RelayState::new()),
            cancel,
        )
        .run(stream::iter(vec![text(CONFIRM), trade_frame(0..5)]))
        .await;

        assert_eq!(summary.end, StreamEnd::Cancelled);
        assert_eq!(summary.frames_received, 0);
    }

    #[tokio::test]
    async fn confirmation_marks_state_streaming() {
        let state = Arc::new(RelayState::new());
        let sink = Arc::new(RecordingSink::default());

        TradeDispatcher::new(
            DispatchConfig::default(),
            sink,
            Arc::clone(&state),
            CancellationToken::new(),
        )
        .run(stream::iter(vec![text(CONFIRM), trade_frame(0..4)]))
        .await;

        assert_eq!(state.get_stream_state(), StreamState::Streaming);
        assert_eq!(state.get_trades_received(), 4);
        assert_eq!(state.get_lines_forwarded(), 4);
    }

    #[tokio::test]
    async fn pings_are_not_counted_as_frames() {
        let sink = Arc::new(RecordingSink::default());
        let frames = vec![
            Ok(Message::Ping(vec![1].into())),
            text(CONFIRM),
            Ok(Message::Pong(vec![1].into())),
        ];

        let summary = dispatcher(sink, 100, 1).run(stream::iter(frames)).await;

        assert_eq!(summary.frames_received, 1);
        assert_eq!(summary.batches_dispatched, 0);
    }
}
