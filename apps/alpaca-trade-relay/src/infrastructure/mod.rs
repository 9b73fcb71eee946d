//! Infrastructure Layer - Adapters and external integrations.
//!
//! This layer contains the concrete implementations of the port interfaces
//! defined in the application layer.

/// Alpaca stock stream client (connect, authenticate, subscribe).
pub mod alpaca;

/// Configuration loaded from the environment.
pub mod config;

/// Health check HTTP endpoint.
pub mod health;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// Relay orchestration.
pub mod relay;

/// Symbol source adapters.
pub mod symbols;

/// Telegraf TCP sink.
pub mod telegraf;

/// Logging and OpenTelemetry tracing integration.
pub mod telemetry;
