//! Domain Layer - Trade records and their line-protocol rendering.
//!
//! Pure types and transformations with no I/O. Everything here is
//! deterministic and tested in isolation.

/// Size-bounded batch accumulation.
pub mod batch;

/// Line-protocol rendering and the structural validity gate.
pub mod line_protocol;

/// Raw and normalized trade records.
pub mod trade;
