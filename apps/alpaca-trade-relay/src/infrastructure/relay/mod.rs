//! Relay Orchestration
//!
//! Wires one relay run together:
//!
//! 1. Connect the sink (fatal if the dial budget is spent)
//! 2. Connect the stock stream and await the acknowledgement
//! 3. Resolve the symbol list and send one trade subscription
//! 4. Run the dispatcher until cancellation or the end of the stream
//! 5. Tear down the sink connection
//!
//! Startup phases stop early when the cancellation token fires.

use std::sync::Arc;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use thiserror::Error;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use crate::application::ports::{ForwardError, SymbolSource, SymbolSourceError};
use crate::application::services::{
    DispatchConfig, DispatchSummary, RelayState, StreamEnd, StreamState, SymbolResolver,
    TradeDispatcher,
};
use crate::infrastructure::alpaca::{
    self, AuthError, JsonCodec, StockStream, StreamError, await_authentication, send_subscribe,
};
use crate::infrastructure::config::{RelayConfig, SymbolSettings};
use crate::infrastructure::metrics;
use crate::infrastructure::symbols::{HttpSymbolSource, ParquetSymbolSource, StaticSymbolSource};
use crate::infrastructure::telegraf::{Forwarder, ReconnectConfig, TcpDialer};

/// Errors that abort a relay run.
#[derive(Debug, Error)]
pub enum RelayError {
    /// The sink could not be reached.
    #[error("sink unavailable: {0}")]
    Sink(#[from] ForwardError),

    /// The stock stream could not be opened.
    #[error("stream connection failed: {0}")]
    Stream(#[from] StreamError),

    /// The server did not acknowledge the session.
    #[error("stream authentication failed: {0}")]
    Auth(#[from] AuthError),

    /// No symbol source produced a list.
    #[error("symbol resolution failed: {0}")]
    Symbols(#[from] SymbolSourceError),
}

type StreamWriter = SplitSink<StockStream, Message>;
type StreamReader = SplitStream<StockStream>;

/// Run the relay until cancellation or the end of the stream.
///
/// Progress and the final error are published into `state`. A read
/// failure ends the run in [`StreamState::Failed`]; the summary still
/// returns with [`StreamEnd::Failed`] so the caller can report it.
///
/// # Errors
///
/// Returns an error if the sink is unreachable, the stream cannot be
/// opened or authenticated, or no symbols can be resolved.
pub async fn run_relay(
    config: &RelayConfig,
    state: Arc<RelayState>,
    cancel: CancellationToken,
) -> Result<DispatchSummary, RelayError> {
    let result = relay(config, &state, cancel).await;

    match &result {
        Ok(summary) => match &summary.end {
            StreamEnd::Failed(reason) => {
                state.set_failure(StreamState::Failed, reason.clone());
                tracing::error!(error = %reason, "Stock stream failed");
            }
            end => {
                state.set_stream_state(StreamState::Closed);
                tracing::info!(?end, "Relay finished");
            }
        },
        Err(e) => {
            let terminal = if matches!(e, RelayError::Auth(_)) {
                StreamState::AuthFailed
            } else {
                StreamState::Failed
            };
            state.set_failure(terminal, e.to_string());
            tracing::error!(error = %e, "Relay failed");
        }
    }
    result
}

async fn relay(
    config: &RelayConfig,
    state: &Arc<RelayState>,
    cancel: CancellationToken,
) -> Result<DispatchSummary, RelayError> {
    let dialer = TcpDialer::new(config.sink.host.clone(), config.sink.port)
        .with_connect_timeout(config.sink.connect_timeout);
    let reconnect = ReconnectConfig::new(config.sink.base_backoff, config.sink.max_attempts);

    let (forwarder, actor) = tokio::select! {
        biased;
        () = cancel.cancelled() => return Ok(DispatchSummary::default()),
        started = Forwarder::start(dialer, reconnect, config.sink.queue_depth, state.sink_handle()) => started?,
    };

    let result = stream_trades(config, state, &forwarder, cancel).await;

    forwarder.teardown().await;
    drop(forwarder);
    if let Err(e) = actor.await {
        tracing::warn!(error = %e, "Forwarder task ended abnormally");
    }

    result
}

async fn stream_trades(
    config: &RelayConfig,
    state: &Arc<RelayState>,
    forwarder: &Forwarder,
    cancel: CancellationToken,
) -> Result<DispatchSummary, RelayError> {
    let (mut write, read) = tokio::select! {
        biased;
        () = cancel.cancelled() => {
            tracing::info!("Cancelled during startup");
            return Ok(DispatchSummary::default());
        }
        session = open_session(config, state) => session?,
    };

    let dispatcher = TradeDispatcher::new(
        DispatchConfig {
            batch_size: config.dispatch.batch_size,
            max_in_flight: config.dispatch.max_in_flight,
        },
        Arc::new(forwarder.clone()),
        Arc::clone(state),
        cancel,
    );
    let summary = dispatcher.run(read).await;

    if let Err(e) = write.close().await {
        tracing::debug!(error = %e, "Stock stream close failed");
    }

    Ok(summary)
}

async fn open_session(
    config: &RelayConfig,
    state: &RelayState,
) -> Result<(StreamWriter, StreamReader), RelayError> {
    state.set_stream_state(StreamState::Connecting);
    let stream = alpaca::connect(&config.stream.url, &config.credentials).await?;
    let (mut write, mut read) = stream.split();

    state.set_stream_state(StreamState::Authenticating);
    await_authentication(&mut read, &JsonCodec::new()).await?;

    let symbols = symbol_resolver(&config.symbols)?.resolve().await?;
    send_subscribe(&mut write, &symbols).await?;

    state.set_symbols_subscribed(symbols.len());
    #[allow(clippy::cast_precision_loss)]
    metrics::set_symbols_subscribed(symbols.len() as f64);
    state.set_stream_state(StreamState::Subscribed);

    Ok((write, read))
}

/// Build the resolver from settings: a fixed list or the HTTP catalog
/// first, the Parquet file as fallback.
///
/// # Errors
///
/// Returns an error if the HTTP client cannot be built.
pub fn symbol_resolver(settings: &SymbolSettings) -> Result<SymbolResolver, SymbolSourceError> {
    let primary: Arc<dyn SymbolSource> = match &settings.fixed {
        Some(list) => Arc::new(StaticSymbolSource::from_csv(list)),
        None => Arc::new(HttpSymbolSource::new(
            settings.catalog_url.clone(),
            settings.request_timeout,
        )?),
    };
    let fallback = Arc::new(ParquetSymbolSource::new(
        settings.fallback_path.clone(),
        settings.fallback_limit,
    ));

    Ok(SymbolResolver::new(
        primary,
        fallback,
        settings.fallback_limit,
    ))
}
