//! Parquet Symbol File
//!
//! Local fallback universe: the `symbol` column of a Parquet file, read
//! in row order and capped at a fixed number of rows.

use std::fs::File;
use std::path::PathBuf;

use arrow::array::{Array, LargeStringArray, StringArray};
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;

use crate::application::ports::{SymbolSource, SymbolSourceError};

/// Column holding the ticker.
pub const SYMBOL_COLUMN: &str = "symbol";

/// Symbol source backed by a local Parquet file.
#[derive(Debug, Clone)]
pub struct ParquetSymbolSource {
    path: PathBuf,
    limit: usize,
}

impl ParquetSymbolSource {
    /// Read at most `limit` symbols from `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, limit: usize) -> Self {
        Self {
            path: path.into(),
            limit,
        }
    }
}

#[async_trait]
impl SymbolSource for ParquetSymbolSource {
    async fn symbols(&self) -> Result<Vec<String>, SymbolSourceError> {
        let path = self.path.clone();
        let limit = self.limit;

        let symbols = tokio::task::spawn_blocking(move || read_symbols(&path, limit))
            .await
            .map_err(|e| SymbolSourceError::Decode {
                message: format!("symbol file reader panicked: {e}"),
            })??;

        tracing::info!(
            path = %self.path.display(),
            count = symbols.len(),
            "Read symbols from Parquet file"
        );
        Ok(symbols)
    }

    fn name(&self) -> &'static str {
        "parquet-file"
    }
}

fn read_symbols(path: &std::path::Path, limit: usize) -> Result<Vec<String>, SymbolSourceError> {
    let file = File::open(path).map_err(|source| SymbolSourceError::File {
        path: path.display().to_string(),
        source,
    })?;

    let reader = ParquetRecordBatchReaderBuilder::try_new(file)
        .and_then(|builder| builder.with_batch_size(limit.clamp(1, 8192)).build())
        .map_err(|e| SymbolSourceError::Decode {
            message: e.to_string(),
        })?;

    let mut symbols = Vec::with_capacity(limit);
    for batch in reader {
        if symbols.len() >= limit {
            break;
        }
        let batch = batch.map_err(|e| SymbolSourceError::Decode {
            message: e.to_string(),
        })?;
        append_symbols(&batch, limit, &mut symbols)?;
    }

    Ok(symbols)
}

fn append_symbols(
    batch: &RecordBatch,
    limit: usize,
    out: &mut Vec<String>,
) -> Result<(), SymbolSourceError> {
    let column = batch
        .column_by_name(SYMBOL_COLUMN)
        .ok_or_else(|| SymbolSourceError::Decode {
            message: format!("missing column '{SYMBOL_COLUMN}'"),
        })?;

    let remaining = limit.saturating_sub(out.len());
    if let Some(values) = column.as_any().downcast_ref::<StringArray>() {
        out.extend(values.iter().flatten().take(remaining).map(str::to_owned));
    } else if let Some(values) = column.as_any().downcast_ref::<LargeStringArray>() {
        out.extend(values.iter().flatten().take(remaining).map(str::to_owned));
    } else {
        return Err(SymbolSourceError::Decode {
            message: format!(
                "column '{SYMBOL_COLUMN}' has type {}, expected utf8",
                column.data_type()
            ),
        });
    }
    Ok(())
}
