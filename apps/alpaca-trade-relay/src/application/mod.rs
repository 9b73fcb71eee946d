//! Application Layer - Use cases and port definitions.
//!
//! This layer contains the ingestion pipeline and symbol resolution,
//! written against port traits so the transport adapters can be faked
//! in tests.

/// Port interfaces for symbol sources and the line sink.
pub mod ports;

/// Application services for symbol resolution and trade dispatch.
pub mod services;
