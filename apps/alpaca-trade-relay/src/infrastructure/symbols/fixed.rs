//! Fixed Symbol List
//!
//! In-memory source, used when the universe is given on the command line
//! or environment instead of the catalog.

use async_trait::async_trait;

use crate::application::ports::{SymbolSource, SymbolSourceError};

/// Symbol source over a fixed list.
#[derive(Debug, Clone, Default)]
pub struct StaticSymbolSource {
    symbols: Vec<String>,
}

impl StaticSymbolSource {
    /// Create a source that always returns `symbols`.
    #[must_use]
    pub const fn new(symbols: Vec<String>) -> Self {
        Self { symbols }
    }

    /// Parse a comma-separated list, skipping blanks.
    #[must_use]
    pub fn from_csv(list: &str) -> Self {
        Self::new(
            list.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_uppercase)
                .collect(),
        )
    }
}

#[async_trait]
impl SymbolSource for StaticSymbolSource {
    async fn symbols(&self) -> Result<Vec<String>, SymbolSourceError> {
        Ok(self.symbols.clone())
    }

    fn name(&self) -> &'static str {
        "static-list"
    }
}
