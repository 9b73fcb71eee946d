//! Relay Configuration Settings
//!
//! Configuration types for the trade relay, loaded from environment
//! variables. Every setting except the credentials has a default.

use std::path::PathBuf;
use std::time::Duration;

use crate::infrastructure::alpaca::{Credentials, stream_url};

/// Environment variable holding the API key id.
pub const KEY_ID_VAR: &str = "APCA_API_KEY_ID";

/// Environment variable holding the API secret.
pub const SECRET_KEY_VAR: &str = "APCA_API_SECRET_KEY";

/// Market data feed type for Alpaca streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DataFeed {
    /// SIP (Securities Information Processor) - Full market data.
    #[default]
    Sip,
    /// IEX (Investors Exchange) - Free tier with limited data.
    Iex,
}

impl DataFeed {
    /// Parse feed type from string.
    #[must_use]
    pub fn from_str_case_insensitive(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "iex" => Self::Iex,
            _ => Self::Sip,
        }
    }

    /// Get the feed name for WebSocket URLs.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Sip => "sip",
            Self::Iex => "iex",
        }
    }
}

/// Stock stream settings.
#[derive(Debug, Clone)]
pub struct StreamSettings {
    /// Market data feed.
    pub feed: DataFeed,
    /// WebSocket endpoint.
    pub url: String,
}

impl Default for StreamSettings {
    fn default() -> Self {
        let feed = DataFeed::default();
        Self {
            feed,
            url: stream_url(feed.as_str()),
        }
    }
}

/// Telegraf sink settings.
#[derive(Debug, Clone)]
pub struct SinkSettings {
    /// Sink host.
    pub host: String,
    /// Sink TCP port.
    pub port: u16,
    /// Attempt budget for dial, reconnect, and write.
    pub max_attempts: u32,
    /// Base backoff delay.
    pub base_backoff: Duration,
    /// Per-attempt connect timeout.
    pub connect_timeout: Duration,
    /// Forwarder request queue depth.
    pub queue_depth: usize,
}

impl Default for SinkSettings {
    fn default() -> Self {
        Self {
            host: "telegraf".to_string(),
            port: 8094,
            max_attempts: 5,
            base_backoff: Duration::from_millis(100),
            connect_timeout: Duration::from_secs(5),
            queue_depth: 64,
        }
    }
}

/// Batch dispatch settings.
#[derive(Debug, Clone)]
pub struct DispatchSettings {
    /// Trades per batch.
    pub batch_size: usize,
    /// Maximum concurrently forwarding batches.
    pub max_in_flight: usize,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            batch_size: 100,
            max_in_flight: 10,
        }
    }
}

/// Symbol universe settings.
#[derive(Debug, Clone)]
pub struct SymbolSettings {
    /// Catalog endpoint returning a JSON array of tickers.
    pub catalog_url: String,
    /// Fallback Parquet file.
    pub fallback_path: PathBuf,
    /// Maximum symbols taken from the fallback.
    pub fallback_limit: usize,
    /// Catalog request timeout.
    pub request_timeout: Duration,
    /// Fixed list replacing the catalog, if set.
    pub fixed: Option<String>,
}

impl Default for SymbolSettings {
    fn default() -> Self {
        Self {
            catalog_url: "https://algotrading.ventures/datastreaming/v1/datasets/author_symbols"
                .to_string(),
            fallback_path: PathBuf::from("/data/deriv_symbols_used.parquet"),
            fallback_limit: 500,
            request_timeout: Duration::from_secs(30),
            fixed: None,
        }
    }
}

/// Server port settings.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    /// Health and metrics HTTP port (0 = disabled).
    pub health_port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self { health_port: 8082 }
    }
}

/// Complete relay configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// API credentials.
    pub credentials: Credentials,
    /// Stock stream settings.
    pub stream: StreamSettings,
    /// Sink settings.
    pub sink: SinkSettings,
    /// Dispatch settings.
    pub dispatch: DispatchSettings,
    /// Symbol universe settings.
    pub symbols: SymbolSettings,
    /// Server port settings.
    pub server: ServerSettings,
}

impl RelayConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if the credentials are missing or empty.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Returns an error if the credentials are missing or empty.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_key = required(&lookup, KEY_ID_VAR)?;
        let api_secret = required(&lookup, SECRET_KEY_VAR)?;
        let credentials = Credentials::new(api_key, api_secret)
            .map_err(|e| ConfigError::InvalidValue(e.to_string()))?;

        let feed = lookup("ALPACA_FEED")
            .map(|s| DataFeed::from_str_case_insensitive(&s))
            .unwrap_or_default();
        let stream = StreamSettings {
            feed,
            url: lookup("RELAY_STREAM_URL")
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| stream_url(feed.as_str())),
        };

        let sink_defaults = SinkSettings::default();
        let sink = SinkSettings {
            host: lookup("TELEGRAF_HOST")
                .filter(|s| !s.trim().is_empty())
                .unwrap_or(sink_defaults.host),
            port: parse_env(&lookup, "TELEGRAF_PORT").unwrap_or(sink_defaults.port),
            max_attempts: parse_env(&lookup, "RELAY_SINK_MAX_RETRIES")
                .unwrap_or(sink_defaults.max_attempts),
            base_backoff: parse_env::<_, u64>(&lookup, "RELAY_SINK_BACKOFF_MS")
                .map_or(sink_defaults.base_backoff, Duration::from_millis),
            connect_timeout: parse_env::<_, u64>(&lookup, "RELAY_SINK_CONNECT_TIMEOUT_SECS")
                .map_or(sink_defaults.connect_timeout, Duration::from_secs),
            queue_depth: parse_env(&lookup, "RELAY_SINK_QUEUE_DEPTH")
                .unwrap_or(sink_defaults.queue_depth),
        };

        let dispatch_defaults = DispatchSettings::default();
        let dispatch = DispatchSettings {
            batch_size: parse_env(&lookup, "RELAY_BATCH_SIZE")
                .unwrap_or(dispatch_defaults.batch_size),
            max_in_flight: parse_env(&lookup, "RELAY_MAX_IN_FLIGHT")
                .unwrap_or(dispatch_defaults.max_in_flight),
        };

        let symbol_defaults = SymbolSettings::default();
        let symbols = SymbolSettings {
            catalog_url: lookup("RELAY_SYMBOLS_URL")
                .filter(|s| !s.trim().is_empty())
                .unwrap_or(symbol_defaults.catalog_url),
            fallback_path: lookup("RELAY_SYMBOLS_FALLBACK_PATH")
                .filter(|s| !s.trim().is_empty())
                .map_or(symbol_defaults.fallback_path, PathBuf::from),
            fallback_limit: parse_env(&lookup, "RELAY_SYMBOLS_MAX")
                .unwrap_or(symbol_defaults.fallback_limit),
            request_timeout: parse_env::<_, u64>(&lookup, "RELAY_SYMBOLS_TIMEOUT_SECS")
                .map_or(symbol_defaults.request_timeout, Duration::from_secs),
            fixed: lookup("RELAY_SYMBOLS").filter(|s| !s.trim().is_empty()),
        };

        let server = ServerSettings {
            health_port: parse_env(&lookup, "RELAY_HEALTH_PORT")
                .unwrap_or(ServerSettings::default().health_port),
        };

        Ok(Self {
            credentials,
            stream,
            sink,
            dispatch,
            symbols,
            server,
        })
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
    /// Environment variable has an unusable value.
    #[error("invalid configuration: {0}")]
    InvalidValue(String),
}

fn required<F>(lookup: &F, key: &str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let value = lookup(key).ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))?;
    if value.trim().is_empty() {
        return Err(ConfigError::EmptyValue(key.to_string()));
    }
    Ok(value)
}

fn parse_env<F, T>(lookup: &F, key: &str) -> Option<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    lookup(key).and_then(|v| v.trim().parse().ok())
}
