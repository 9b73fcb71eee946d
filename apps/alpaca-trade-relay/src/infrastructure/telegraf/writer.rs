//! Sink Writer
//!
//! Owns the byte-stream connection to Telegraf's socket listener and
//! writes newline-terminated records with retry and reconnect.
//!
//! # State Machine
//!
//! ```text
//! Disconnected --setup--> Connected --write error--> (reconnect) --> Connected
//!                              |                          |
//!                          teardown                 budget spent
//!                              v                          v
//!                        Disconnected                    Lost --next send--> (reconnect)
//! ```
//!
//! A writer that was never set up, or was torn down, refuses to send
//! without touching the network.

use std::io;

use tokio::io::AsyncWriteExt;

use super::reconnect::ReconnectConfig;
use crate::application::ports::{ForwardError, SinkDialer, SinkState};
use crate::domain::line_protocol::FormattedLine;
use crate::infrastructure::metrics;

/// Write errors retried on the same connection.
fn is_transient(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
    )
}

// =============================================================================
// Sink Writer
// =============================================================================

/// Retrying writer over one sink connection.
pub struct SinkWriter<D: SinkDialer> {
    dialer: D,
    reconnect: ReconnectConfig,
    conn: Option<D::Connection>,
    state: SinkState,
}

impl<D: SinkDialer> SinkWriter<D> {
    /// Create a disconnected writer.
    #[must_use]
    pub const fn new(dialer: D, reconnect: ReconnectConfig) -> Self {
        Self {
            dialer,
            reconnect,
            conn: None,
            state: SinkState::Disconnected,
        }
    }

    /// Current connection state.
    #[must_use]
    pub const fn state(&self) -> SinkState {
        self.state
    }

    /// Establish the connection, retrying with backoff.
    ///
    /// # Errors
    ///
    /// Returns [`ForwardError::DialExhausted`] when every attempt fails.
    pub async fn setup(&mut self) -> Result<(), ForwardError> {
        if self.conn.is_some() {
            return Ok(());
        }

        let conn = dial_with_backoff(&self.dialer, &self.reconnect).await?;
        self.conn = Some(conn);
        self.state = SinkState::Connected;
        tracing::info!(endpoint = %self.dialer.endpoint(), "Sink connected");
        Ok(())
    }

    /// Write each line, in order, as one newline-terminated record.
    ///
    /// Returns the number of lines written.
    ///
    /// # Errors
    ///
    /// Returns [`ForwardError::NotConnected`] without any I/O when the
    /// writer is not set up. Otherwise returns the write error once its
    /// retry or reconnect budget is spent; lines after the failing one
    /// are not written.
    pub async fn send(&mut self, lines: &[FormattedLine]) -> Result<usize, ForwardError> {
        match self.state {
            SinkState::Disconnected => return Err(ForwardError::NotConnected),
            SinkState::Lost => {
                tracing::info!(endpoint = %self.dialer.endpoint(), "Reconnecting lost sink");
                let conn = dial_with_backoff(&self.dialer, &self.reconnect).await?;
                self.conn = Some(conn);
                self.state = SinkState::Connected;
                metrics::record_sink_reconnect();
            }
            SinkState::Connected => {}
        }

        for line in lines {
            self.write_line(line).await?;
        }
        Ok(lines.len())
    }

    /// Close the connection if open. Idempotent.
    pub async fn teardown(&mut self) {
        self.close().await;
        self.state = SinkState::Disconnected;
    }

    async fn write_line(&mut self, line: &FormattedLine) -> Result<(), ForwardError> {
        let mut payload = Vec::with_capacity(line.len() + 1);
        payload.extend_from_slice(line.as_str().as_bytes());
        payload.push(b'\n');

        let mut policy = self.reconnect.policy();
        let mut written = 0;
        loop {
            let Some(conn) = self.conn.as_mut() else {
                self.state = SinkState::Lost;
                return Err(ForwardError::NotConnected);
            };

            let error = match write_record(conn, &payload, &mut written).await {
                Ok(()) => return Ok(()),
                Err(e) => e,
            };

            metrics::record_sink_write_error(error.kind());
            let transient = is_transient(&error);
            tracing::warn!(
                endpoint = %self.dialer.endpoint(),
                attempt = policy.attempt_count() + 1,
                transient,
                error = %error,
                "Sink write failed"
            );

            if !transient {
                self.close().await;
                written = 0;
            }

            let Some(delay) = policy.next_delay() else {
                if !transient {
                    self.state = SinkState::Lost;
                }
                return Err(ForwardError::WriteExhausted {
                    attempts: policy.attempt_count(),
                    source: error,
                });
            };
            tokio::time::sleep(delay).await;

            if !transient {
                match dial_with_backoff(&self.dialer, &self.reconnect).await {
                    Ok(conn) => {
                        self.conn = Some(conn);
                        metrics::record_sink_reconnect();
                        tracing::info!(endpoint = %self.dialer.endpoint(), "Sink reconnected");
                    }
                    Err(reconnect_error) => {
                        tracing::error!(error = %reconnect_error, "Sink reconnect failed");
                        self.state = SinkState::Lost;
                        return Err(ForwardError::Io(error));
                    }
                }
            }
        }
    }

    async fn close(&mut self) {
        if let Some(mut conn) = self.conn.take()
            && let Err(e) = conn.shutdown().await
        {
            tracing::debug!(error = %e, "Sink shutdown error");
        }
    }
}

async fn dial_with_backoff<D: SinkDialer>(
    dialer: &D,
    reconnect: &ReconnectConfig,
) -> Result<D::Connection, ForwardError> {
    let mut policy = reconnect.policy();
    loop {
        match dialer.dial().await {
            Ok(conn) => return Ok(conn),
            Err(e) => {
                tracing::warn!(
                    endpoint = %dialer.endpoint(),
                    attempt = policy.attempt_count() + 1,
                    error = %e,
                    "Sink dial failed"
                );
                match policy.next_delay() {
                    Some(delay) => tokio::time::sleep(delay).await,
                    None => {
                        return Err(ForwardError::DialExhausted {
                            endpoint: dialer.endpoint(),
                            attempts: policy.attempt_count(),
                            source: e,
                        });
                    }
                }
            }
        }
    }
}

/// Write `payload[*written..]` and flush, advancing `written` as bytes
/// are accepted so a retry resumes mid-line.
async fn write_record<W>(conn: &mut W, payload: &[u8], written: &mut usize) -> io::Result<()>
where
    W: tokio::io::AsyncWrite + Unpin,
{
    while *written < payload.len() {
        match conn.write(&payload[*written..]).await? {
            0 => return Err(io::Error::from(io::ErrorKind::WriteZero)),
            n => *written += n,
        }
    }
    conn.flush().await
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::collections::VecDeque;
    use std::marker::PhantomData;
    use std::pin::Pin;
    use std::sync::Arc;
    use std::task::{Context, Poll};
    use std::time::Duration;

    use async_trait::async_trait;
    use parking_lot::Mutex;
    use tokio::io::AsyncWrite;

    use super::*;

    /// Shared record of everything written through fake connections.
    #[derive(Default)]
    struct Wire {
        bytes: Vec<u8>,
        dials: u32,
        shutdowns: u32,
    }

    /// Connection that fails its first `failures` writes with `kind`.
    struct FakeConn {
        wire: Arc<Mutex<Wire>>,
        failures: VecDeque<io::ErrorKind>,
    }

    impl AsyncWrite for FakeConn {
        fn poll_write(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            if let Some(kind) = self.failures.pop_front() {
                return Poll::Ready(Err(io::Error::from(kind)));
            }
            self.wire.lock().bytes.extend_from_slice(buf);
            Poll::Ready(Ok(buf.len()))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            self.wire.lock().shutdowns += 1;
            Poll::Ready(Ok(()))
        }
    }

    /// Dialer handing out scripted connections.
    struct FakeDialer {
        wire: Arc<Mutex<Wire>>,
        /// Per dial: `None` refuses, `Some(failures)` connects.
        script: Mutex<VecDeque<Option<Vec<io::ErrorKind>>>>,
    }

    impl FakeDialer {
        fn new(script: Vec<Option<Vec<io::ErrorKind>>>) -> (Self, Arc<Mutex<Wire>>) {
            let wire = Arc::new(Mutex::new(Wire::default()));
            let dialer = Self {
                wire: Arc::clone(&wire),
                script: Mutex::new(script.into()),
            };
            (dialer, wire)
        }
    }

    #[async_trait]
    impl SinkDialer for FakeDialer {
        type Connection = FakeConn;

        async fn dial(&self) -> io::Result<FakeConn> {
            self.wire.lock().dials += 1;
            let next = self.script.lock().pop_front().unwrap_or(Some(vec![]));
            match next {
                Some(failures) => Ok(FakeConn {
                    wire: Arc::clone(&self.wire),
                    failures: failures.into(),
                }),
                None => Err(io::Error::from(io::ErrorKind::ConnectionRefused)),
            }
        }

        fn endpoint(&self) -> String {
            "fake:8094".to_string()
        }
    }

    fn config(max_attempts: u32) -> ReconnectConfig {
        ReconnectConfig::new(Duration::from_millis(1), max_attempts)
    }

    fn lines(items: &[&str]) -> Vec<FormattedLine> {
        items
            .iter()
            .map(|l| FormattedLine::new(*l).unwrap())
            .collect()
    }

    fn written(wire: &Arc<Mutex<Wire>>) -> String {
        String::from_utf8(wire.lock().bytes.clone()).unwrap()
    }

    #[tokio::test]
    async fn send_without_setup_is_not_connected() {
        let (dialer, wire) = FakeDialer::new(vec![]);
        let mut writer = SinkWriter::new(dialer, config(3));

        let err = writer.send(&lines(&["m,a=1 f=1 1"])).await.unwrap_err();

        assert!(matches!(err, ForwardError::NotConnected));
        assert_eq!(wire.lock().dials, 0);
        assert!(wire.lock().bytes.is_empty());
    }

    #[tokio::test]
    async fn writes_lines_in_order_with_newlines() {
        let (dialer, wire) = FakeDialer::new(vec![Some(vec![])]);
        let mut writer = SinkWriter::new(dialer, config(3));
        writer.setup().await.unwrap();

        let n = writer
            .send(&lines(&["m,a=1 f=1 1", "m,a=2 f=2 2"]))
            .await
            .unwrap();

        assert_eq!(n, 2);
        assert_eq!(written(&wire), "m,a=1 f=1 1\nm,a=2 f=2 2\n");
    }

    #[tokio::test]
    async fn setup_retries_then_connects() {
        let (dialer, wire) = FakeDialer::new(vec![None, None, Some(vec![])]);
        let mut writer = SinkWriter::new(dialer, config(5));

        writer.setup().await.unwrap();

        assert_eq!(writer.state(), SinkState::Connected);
        assert_eq!(wire.lock().dials, 3);
    }

    #[tokio::test]
    async fn setup_exhausts_budget() {
        let (dialer, wire) = FakeDialer::new(vec![None, None, None, None]);
        let mut writer = SinkWriter::new(dialer, config(3));

        let err = writer.setup().await.unwrap_err();

        assert!(matches!(err, ForwardError::DialExhausted { attempts: 3, .. }));
        assert_eq!(wire.lock().dials, 3);
        assert_eq!(writer.state(), SinkState::Disconnected);
    }

    #[tokio::test]
    async fn broken_connection_reconnects_and_retransmits_once() {
        let (dialer, wire) = FakeDialer::new(vec![
            Some(vec![io::ErrorKind::BrokenPipe]),
            Some(vec![]),
        ]);
        let mut writer = SinkWriter::new(dialer, config(3));
        writer.setup().await.unwrap();

        writer
            .send(&lines(&["m,a=1 f=1 1", "m,a=2 f=2 2"]))
            .await
            .unwrap();

        assert_eq!(written(&wire), "m,a=1 f=1 1\nm,a=2 f=2 2\n");
        assert_eq!(wire.lock().dials, 2);
        assert_eq!(wire.lock().shutdowns, 1);
        assert_eq!(writer.state(), SinkState::Connected);
    }

    #[tokio::test]
    async fn transient_error_retries_on_same_connection() {
        let (dialer, wire) = FakeDialer::new(vec![Some(vec![
            io::ErrorKind::Interrupted,
            io::ErrorKind::TimedOut,
        ])]);
        let mut writer = SinkWriter::new(dialer, config(3));
        writer.setup().await.unwrap();

        writer.send(&lines(&["m,a=1 f=1 1"])).await.unwrap();

        assert_eq!(written(&wire), "m,a=1 f=1 1\n");
        assert_eq!(wire.lock().dials, 1);
    }

    #[tokio::test]
    async fn transient_errors_exhaust_write_budget() {
        let (dialer, _wire) = FakeDialer::new(vec![Some(vec![io::ErrorKind::WouldBlock; 5])]);
        let mut writer = SinkWriter::new(dialer, config(3));
        writer.setup().await.unwrap();

        let err = writer.send(&lines(&["m,a=1 f=1 1"])).await.unwrap_err();

        assert!(matches!(err, ForwardError::WriteExhausted { attempts: 3, .. }));
        assert_eq!(writer.state(), SinkState::Connected);
    }

    #[tokio::test]
    async fn failed_reconnect_returns_original_error_and_marks_lost() {
        let (dialer, wire) = FakeDialer::new(vec![
            Some(vec![io::ErrorKind::ConnectionReset]),
            None,
            None,
            None,
        ]);
        let mut writer = SinkWriter::new(dialer, config(3));
        writer.setup().await.unwrap();

        let err = writer.send(&lines(&["m,a=1 f=1 1"])).await.unwrap_err();

        match err {
            ForwardError::Io(e) => assert_eq!(e.kind(), io::ErrorKind::ConnectionReset),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(writer.state(), SinkState::Lost);
        assert_eq!(wire.lock().dials, 4);
    }

    #[tokio::test]
    async fn lost_writer_reconnects_on_next_send() {
        let (dialer, wire) = FakeDialer::new(vec![
            Some(vec![io::ErrorKind::ConnectionReset]),
            None,
            None,
            Some(vec![]),
        ]);
        let mut writer = SinkWriter::new(dialer, config(2));
        writer.setup().await.unwrap();
        assert!(writer.send(&lines(&["m,a=1 f=1 1"])).await.is_err());
        assert_eq!(writer.state(), SinkState::Lost);

        writer.send(&lines(&["m,a=2 f=2 2"])).await.unwrap();

        assert_eq!(writer.state(), SinkState::Connected);
        assert_eq!(written(&wire), "m,a=2 f=2 2\n");
    }

    #[tokio::test]
    async fn teardown_is_idempotent() {
        let (dialer, wire) = FakeDialer::new(vec![Some(vec![])]);
        let mut writer = SinkWriter::new(dialer, config(3));
        writer.setup().await.unwrap();

        writer.teardown().await;
        writer.teardown().await;

        assert_eq!(wire.lock().shutdowns, 1);
        assert_eq!(writer.state(), SinkState::Disconnected);
        assert!(matches!(
            writer.send(&lines(&["m,a=1 f=1 1"])).await,
            Err(ForwardError::NotConnected)
        ));
    }

    /// Dialer handing out one `tokio_test` mock with exact write expectations.
    struct ScriptedIoDialer(Mutex<Option<tokio_test::io::Mock>>);

    #[async_trait]
    impl SinkDialer for ScriptedIoDialer {
        type Connection = tokio_test::io::Mock;

        async fn dial(&self) -> io::Result<tokio_test::io::Mock> {
            self.0
                .lock()
                .take()
                .ok_or_else(|| io::Error::from(io::ErrorKind::ConnectionRefused))
        }

        fn endpoint(&self) -> String {
            "scripted".to_string()
        }
    }

    #[tokio::test]
    async fn each_line_is_one_terminated_write() {
        let mock = tokio_test::io::Builder::new()
            .write(b"m,a=1 f=1 1\n")
            .write(b"m,a=2 f=2 2\n")
            .build();
        let mut writer = SinkWriter::new(ScriptedIoDialer(Mutex::new(Some(mock))), config(1));
        writer.setup().await.unwrap();

        writer
            .send(&lines(&["m,a=1 f=1 1", "m,a=2 f=2 2"]))
            .await
            .unwrap();
        writer.teardown().await;
    }

    /// Connection accepting at most `chunk` bytes per write; its second
    /// write times out.
    struct StutteringConn {
        wire: Arc<Mutex<Wire>>,
        chunk: usize,
        writes: u32,
    }

    impl AsyncWrite for StutteringConn {
        fn poll_write(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            self.writes += 1;
            if self.writes == 2 {
                return Poll::Ready(Err(io::Error::from(io::ErrorKind::TimedOut)));
            }
            let n = buf.len().min(self.chunk);
            self.wire.lock().bytes.extend_from_slice(&buf[..n]);
            Poll::Ready(Ok(n))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    struct StutteringDialer(Arc<Mutex<Wire>>);

    #[async_trait]
    impl SinkDialer for StutteringDialer {
        type Connection = StutteringConn;

        async fn dial(&self) -> io::Result<StutteringConn> {
            self.0.lock().dials += 1;
            Ok(StutteringConn {
                wire: Arc::clone(&self.0),
                chunk: 5,
                writes: 0,
            })
        }

        fn endpoint(&self) -> String {
            "stuttering".to_string()
        }
    }

    #[tokio::test]
    async fn transient_error_resumes_partial_line() {
        let wire = Arc::new(Mutex::new(Wire::default()));
        let mut writer = SinkWriter::new(StutteringDialer(Arc::clone(&wire)), config(3));
        writer.setup().await.unwrap();

        writer.send(&lines(&["m,a=1 f=1 1"])).await.unwrap();

        assert_eq!(written(&wire), "m,a=1 f=1 1\n");
        assert_eq!(wire.lock().dials, 1);
    }

    /// Connection that is `Send` but not `Sync`.
    struct UnsyncConn {
        inner: FakeConn,
        _not_sync: PhantomData<Cell<()>>,
    }

    impl AsyncWrite for UnsyncConn {
        fn poll_write(
            mut self: Pin<&mut Self>,
            cx: &mut Context<'_>,
            buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            Pin::new(&mut self.inner).poll_write(cx, buf)
        }

        fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Pin::new(&mut self.inner).poll_flush(cx)
        }

        fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Pin::new(&mut self.inner).poll_shutdown(cx)
        }
    }

    struct UnsyncDialer(FakeDialer);

    #[async_trait]
    impl SinkDialer for UnsyncDialer {
        type Connection = UnsyncConn;

        async fn dial(&self) -> io::Result<UnsyncConn> {
            self.0.dial().await.map(|inner| UnsyncConn {
                inner,
                _not_sync: PhantomData,
            })
        }

        fn endpoint(&self) -> String {
            self.0.endpoint()
        }
    }

    #[tokio::test]
    async fn writer_with_unsync_connection_runs_on_spawned_task() {
        let (dialer, wire) = FakeDialer::new(vec![Some(vec![io::ErrorKind::BrokenPipe]), Some(vec![])]);

        let task = tokio::spawn(async move {
            let mut writer = SinkWriter::new(UnsyncDialer(dialer), config(3));
            writer.setup().await.unwrap();
            let sent = writer.send(&lines(&["m,a=1 f=1 1"])).await.unwrap();
            writer.teardown().await;
            sent
        });

        assert_eq!(task.await.unwrap(), 1);
        assert_eq!(written(&wire), "m,a=1 f=1 1\n");
        assert_eq!(wire.lock().dials, 2);
    }
}
