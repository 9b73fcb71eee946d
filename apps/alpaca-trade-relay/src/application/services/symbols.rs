//! Symbol Resolution
//!
//! Picks the subscription list: the primary catalog when it answers with
//! at least one symbol, otherwise the fallback source capped at a fixed
//! number of entries. Both results are trimmed and deduplicated in first
//! occurrence order.

use std::collections::HashSet;
use std::sync::Arc;

use crate::application::ports::{SymbolSource, SymbolSourceError};

/// Maximum number of symbols taken from the fallback source.
pub const DEFAULT_SYMBOL_LIMIT: usize = 500;

/// Resolves the subscription symbol list.
pub struct SymbolResolver {
    primary: Arc<dyn SymbolSource>,
    fallback: Arc<dyn SymbolSource>,
    fallback_limit: usize,
}

impl SymbolResolver {
    /// Create a resolver over a primary and a fallback source.
    #[must_use]
    pub fn new(
        primary: Arc<dyn SymbolSource>,
        fallback: Arc<dyn SymbolSource>,
        fallback_limit: usize,
    ) -> Self {
        Self {
            primary,
            fallback,
            fallback_limit,
        }
    }

    /// Resolve the symbol list.
    ///
    /// # Errors
    ///
    /// Returns [`SymbolSourceError::Exhausted`] when the primary source
    /// fails or is empty and the fallback does the same.
    pub async fn resolve(&self) -> Result<Vec<String>, SymbolSourceError> {
        let primary_error = match self.primary.symbols().await {
            Ok(symbols) => {
                let symbols = normalize(symbols);
                if !symbols.is_empty() {
                    tracing::info!(
                        source = self.primary.name(),
                        count = symbols.len(),
                        "Resolved symbols from primary source"
                    );
                    return Ok(symbols);
                }
                SymbolSourceError::Empty {
                    source_name: self.primary.name().to_string(),
                }
            }
            Err(e) => e,
        };

        tracing::warn!(
            source = self.primary.name(),
            error = %primary_error,
            fallback = self.fallback.name(),
            "Primary symbol source failed, using fallback"
        );

        let fallback_error = match self.fallback.symbols().await {
            Ok(symbols) => {
                let mut symbols = normalize(symbols);
                symbols.truncate(self.fallback_limit);
                if !symbols.is_empty() {
                    tracing::info!(
                        source = self.fallback.name(),
                        count = symbols.len(),
                        "Resolved symbols from fallback source"
                    );
                    return Ok(symbols);
                }
                SymbolSourceError::Empty {
                    source_name: self.fallback.name().to_string(),
                }
            }
            Err(e) => e,
        };

        Err(SymbolSourceError::Exhausted {
            primary: primary_error.to_string(),
            fallback: fallback_error.to_string(),
        })
    }
}

/// Trim, drop blanks, and deduplicate keeping the first occurrence.
fn normalize(symbols: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::with_capacity(symbols.len());
    symbols
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty() && seen.insert(s.clone()))
        .collect()
}
