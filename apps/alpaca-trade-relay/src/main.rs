//! Alpaca Trade Relay Binary
//!
//! Streams trades from Alpaca and forwards them to Telegraf.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin alpaca-trade-relay
//! ```
//!
//! # Environment Variables
//!
//! ## Required
//! - `APCA_API_KEY_ID`: Alpaca API key
//! - `APCA_API_SECRET_KEY`: Alpaca API secret
//!
//! ## Optional
//! - `ALPACA_FEED`: Market data feed - "sip" | "iex" (default: sip)
//! - `RELAY_STREAM_URL`: Stream endpoint override
//! - `TELEGRAF_HOST` / `TELEGRAF_PORT`: Sink address (default: telegraf:8094)
//! - `RELAY_SYMBOLS`: Comma-separated symbols replacing the catalog
//! - `RELAY_HEALTH_PORT`: Health check HTTP port, 0 disables (default: 8082)
//! - `RELAY_LOG_FORMAT`: "text" or "json" (default: text)
//! - `OTEL_ENABLED`: Enable OpenTelemetry export (default: false)
//! - `RUST_LOG`: Log level (default: info)

use std::sync::Arc;
use std::time::Duration;

use alpaca_trade_relay::infrastructure::health::{HealthServer, HealthServerState};
use alpaca_trade_relay::infrastructure::telemetry::{self, TelemetryConfig};
use alpaca_trade_relay::{RelayConfig, RelayState, StreamEnd, init_metrics, run_relay};
use anyhow::Context;
use tokio::signal;
use tokio_util::sync::CancellationToken;

/// Graceful shutdown timeout.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("failed to install rustls crypto provider"))?;

    load_dotenv();

    let _telemetry_guard = telemetry::init(&TelemetryConfig::from_env())
        .context("failed to initialize telemetry")?;

    tracing::info!("Starting Alpaca Trade Relay");

    // Initialize Prometheus metrics
    let _metrics_handle = init_metrics();

    let config = RelayConfig::from_env().context("invalid configuration")?;
    log_config(&config);

    let shutdown_token = CancellationToken::new();
    let relay_state = Arc::new(RelayState::new());

    // Spawn health server
    let health_task = (config.server.health_port != 0).then(|| {
        let health_state = Arc::new(HealthServerState::new(
            env!("CARGO_PKG_VERSION").to_string(),
            Arc::clone(&relay_state),
        ));
        let health_server = HealthServer::new(
            config.server.health_port,
            health_state,
            shutdown_token.clone(),
        );
        tokio::spawn(async move {
            if let Err(e) = health_server.run().await {
                tracing::error!(error = %e, "Health server error");
            }
        })
    });

    tokio::spawn(await_shutdown(shutdown_token.clone()));

    let result = run_relay(&config, Arc::clone(&relay_state), shutdown_token.clone()).await;

    shutdown_token.cancel();
    if let Some(task) = health_task
        && tokio::time::timeout(SHUTDOWN_TIMEOUT, task).await.is_err()
    {
        tracing::warn!("Health server did not stop in time");
    }

    let summary = result.context("relay failed")?;
    tracing::info!(
        trades = summary.trades_received,
        lines = summary.lines_forwarded,
        dropped_batches = summary.batches_dropped,
        "Trade relay stopped"
    );
    if let StreamEnd::Failed(reason) = summary.end {
        anyhow::bail!("stock stream failed: {reason}");
    }
    Ok(())
}

/// Load .env file from current or ancestor directories.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Log the parsed configuration.
fn log_config(config: &RelayConfig) {
    tracing::info!(
        feed = config.stream.feed.as_str(),
        sink_host = %config.sink.host,
        sink_port = config.sink.port,
        batch_size = config.dispatch.batch_size,
        max_in_flight = config.dispatch.max_in_flight,
        health_port = config.server.health_port,
        "Configuration loaded"
    );
    tracing::debug!(
        stream_url = %config.stream.url,
        catalog_url = %config.symbols.catalog_url,
        fallback_path = %config.symbols.fallback_path.display(),
        fixed_symbols = config.symbols.fixed.is_some(),
        "Endpoints"
    );
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
#[allow(clippy::expect_used)]
async fn await_shutdown(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
        () = shutdown_token.cancelled() => return,
    }

    shutdown_token.cancel();
}
