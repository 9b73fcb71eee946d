//! Forwarder
//!
//! Single-owner actor around [`SinkWriter`]. Every worker talks to the
//! sink through a cloneable [`Forwarder`] handle that queues a request
//! and awaits the reply, so writes from concurrent batches are
//! serialized and the lines of one batch are never interleaved with
//! another's.

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use super::reconnect::ReconnectConfig;
use super::writer::SinkWriter;
use crate::application::ports::{ForwardError, LineSink, SharedSinkState, SinkDialer, SinkState};
use crate::domain::line_protocol::FormattedLine;

/// Default request queue depth.
pub const DEFAULT_QUEUE_DEPTH: usize = 64;

enum Command {
    Send {
        lines: Vec<FormattedLine>,
        reply: oneshot::Sender<Result<usize, ForwardError>>,
    },
    Teardown {
        reply: oneshot::Sender<()>,
    },
}

/// Handle to the sink actor.
#[derive(Clone)]
pub struct Forwarder {
    tx: mpsc::Sender<Command>,
    state: SharedSinkState,
}

impl Forwarder {
    /// Connect to the sink and start the actor.
    ///
    /// The actor publishes every connection change into `state`.
    ///
    /// # Errors
    ///
    /// Returns [`ForwardError::DialExhausted`] if the initial connection
    /// cannot be established; no task is spawned in that case.
    pub async fn start<D: SinkDialer>(
        dialer: D,
        reconnect: ReconnectConfig,
        queue_depth: usize,
        state: SharedSinkState,
    ) -> Result<(Self, JoinHandle<()>), ForwardError> {
        let mut writer = SinkWriter::new(dialer, reconnect);
        writer.setup().await?;
        Ok(Self::spawn(writer, queue_depth, state))
    }

    /// Start the actor over an existing writer, connected or not.
    #[must_use]
    pub fn spawn<D: SinkDialer>(
        writer: SinkWriter<D>,
        queue_depth: usize,
        state: SharedSinkState,
    ) -> (Self, JoinHandle<()>) {
        *state.write() = writer.state();
        let (tx, rx) = mpsc::channel(queue_depth.max(1));
        let handle = tokio::spawn(run(writer, rx, SharedSinkState::clone(&state)));
        (Self { tx, state }, handle)
    }

    /// Write lines in order through the actor.
    ///
    /// # Errors
    ///
    /// Returns the writer's error, or [`ForwardError::Closed`] if the
    /// actor has stopped.
    pub async fn send(&self, lines: Vec<FormattedLine>) -> Result<usize, ForwardError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::Send { lines, reply })
            .await
            .map_err(|_| ForwardError::Closed)?;
        rx.await.map_err(|_| ForwardError::Closed)?
    }

    /// Close the sink connection. Idempotent; later sends fail with
    /// [`ForwardError::NotConnected`].
    pub async fn teardown(&self) {
        let (reply, rx) = oneshot::channel();
        if self.tx.send(Command::Teardown { reply }).await.is_ok() {
            let _ = rx.await;
        }
    }

    /// Last observed connection state.
    #[must_use]
    pub fn state(&self) -> SinkState {
        *self.state.read()
    }
}

impl std::fmt::Debug for Forwarder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Forwarder")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl LineSink for Forwarder {
    async fn send_lines(&self, lines: Vec<FormattedLine>) -> Result<(), ForwardError> {
        self.send(lines).await.map(|_| ())
    }
}

async fn run<D: SinkDialer>(
    mut writer: SinkWriter<D>,
    mut rx: mpsc::Receiver<Command>,
    state: SharedSinkState,
) {
    while let Some(command) = rx.recv().await {
        match command {
            Command::Send { lines, reply } => {
                let result = writer.send(&lines).await;
                publish(&state, writer.state());
                let _ = reply.send(result);
            }
            Command::Teardown { reply } => {
                writer.teardown().await;
                publish(&state, writer.state());
                tracing::info!("Sink connection closed");
                let _ = reply.send(());
            }
        }
    }

    writer.teardown().await;
    publish(&state, writer.state());
    tracing::debug!("Forwarder stopped");
}

fn publish(state: &SharedSinkState, next: SinkState) {
    let previous = std::mem::replace(&mut *state.write(), next);
    if previous != next {
        tracing::info!(from = previous.as_str(), to = next.as_str(), "Sink state changed");
    }
}
