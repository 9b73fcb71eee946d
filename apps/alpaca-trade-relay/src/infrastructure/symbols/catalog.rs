//! HTTP Symbol Catalog
//!
//! Fetches the subscription universe from the catalog service, which
//! answers a GET with a JSON array of ticker strings.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use crate::application::ports::{SymbolSource, SymbolSourceError};

/// Default request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Symbol source backed by the HTTP catalog.
#[derive(Debug, Clone)]
pub struct HttpSymbolSource {
    client: Client,
    url: String,
}

impl HttpSymbolSource {
    /// Create a catalog client for `url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, SymbolSourceError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SymbolSourceError::Http {
                message: e.to_string(),
            })?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl SymbolSource for HttpSymbolSource {
    async fn symbols(&self) -> Result<Vec<String>, SymbolSourceError> {
        tracing::debug!(url = %self.url, "Fetching symbols from catalog");

        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| SymbolSourceError::Http {
                message: e.to_string(),
            })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(SymbolSourceError::Http {
                message: format!("status {status}: {body}"),
            });
        }

        let symbols: Vec<String> =
            response
                .json()
                .await
                .map_err(|e| SymbolSourceError::Decode {
                    message: e.to_string(),
                })?;

        tracing::info!(url = %self.url, count = symbols.len(), "Fetched symbols from catalog");
        Ok(symbols)
    }

    fn name(&self) -> &'static str {
        "http-catalog"
    }
}
