#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::match_same_arms,
        clippy::needless_pass_by_value,
        clippy::needless_collect,
        clippy::option_if_let_else,
        clippy::default_trait_access,
        clippy::items_after_statements,
        clippy::or_fun_call
    )
)]

//! Alpaca Trade Relay - Trade Stream to Telegraf
//!
//! Maintains one authenticated connection to Alpaca's stock data stream,
//! subscribes to trades for a resolved symbol universe, and relays every
//! trade as an InfluxDB line-protocol record to a Telegraf TCP listener.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Trade records and their wire rendering
//!   - `trade`: Raw and normalized trades
//!   - `line_protocol`: Record rendering and the validity gate
//!   - `batch`: Fixed-size batch accumulation
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: Symbol sources and the line sink
//!   - `services`: Symbol resolution, trade dispatch, relay state
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `alpaca`: Stock stream connect, authenticate, subscribe
//!   - `telegraf`: Sink writer, reconnection, forwarder actor
//!   - `symbols`: Catalog, Parquet, and fixed-list sources
//!   - `config`: Environment configuration
//!   - `health`: Health check HTTP endpoint
//!   - `relay`: Orchestration of one run
//!
//! # Data Flow
//!
//! ```text
//! Alpaca stock WS ──► Dispatcher ──► batch workers ──► Forwarder ──► Telegraf TCP
//!                       (confirm,      (render,          (single
//!                        batch)         validate)         writer)
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Trade types with no I/O.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::line_protocol::{FormattedLine, InvalidLine, render_trade};
pub use domain::trade::{NormalizedTrade, RawTradeEvent};

// Application services
pub use application::services::{
    DispatchConfig, DispatchSummary, RelayState, RelayStatus, StreamEnd, StreamState,
    SymbolResolver, TradeDispatcher,
};

// Infrastructure config
pub use infrastructure::config::{ConfigError, DataFeed, RelayConfig};

// Orchestration
pub use infrastructure::relay::{RelayError, run_relay};

// Health server
pub use infrastructure::health::{HealthServer, HealthServerError, HealthServerState};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{
    LogFormat, TelemetryConfig, TelemetryError, TelemetryGuard, init as init_telemetry,
};
