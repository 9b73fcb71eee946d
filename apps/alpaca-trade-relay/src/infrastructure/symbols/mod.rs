//! Symbol Source Adapters
//!
//! - **Catalog**: HTTP service returning a JSON array of tickers
//! - **Parquet file**: Local fallback, `symbol` column
//! - **Fixed**: In-memory list from configuration

pub mod catalog;
pub mod fixed;
pub mod parquet_file;

pub use catalog::HttpSymbolSource;
pub use fixed::StaticSymbolSource;
pub use parquet_file::ParquetSymbolSource;
