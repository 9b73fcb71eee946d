//! Symbol Source Port (Driven Port)
//!
//! Interface for the instrument catalog that supplies the tickers to
//! subscribe to.

use async_trait::async_trait;

/// Symbol retrieval error.
#[derive(Debug, thiserror::Error)]
pub enum SymbolSourceError {
    /// HTTP request failed or returned a non-success status.
    #[error("Symbol catalog request failed: {message}")]
    Http { message: String },

    /// Response body or file content could not be decoded.
    #[error("Symbol decode error: {message}")]
    Decode { message: String },

    /// Local file could not be read.
    #[error("Symbol file error ({path}): {source}")]
    File {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Source returned no symbols.
    #[error("Symbol source {source_name} returned no symbols")]
    Empty { source_name: String },

    /// Primary and fallback sources both failed.
    #[error("No symbols available: primary ({primary}); fallback ({fallback})")]
    Exhausted { primary: String, fallback: String },
}

/// Port for retrieving the subscription symbol list.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SymbolSource: Send + Sync {
    /// Fetch an ordered list of ticker strings.
    ///
    /// # Errors
    ///
    /// Returns error if the source is unreachable or unreadable.
    async fn symbols(&self) -> Result<Vec<String>, SymbolSourceError>;

    /// Short name used in logs.
    fn name(&self) -> &'static str;
}
