//! Port Interfaces
//!
//! Defines the interfaces (ports) for external systems following
//! the Hexagonal Architecture pattern. These are the contracts that
//! infrastructure adapters must implement.
//!
//! ## Driven Ports (Outbound)
//!
//! - `SymbolSource`: Ordered ticker list from a catalog or local file
//! - `SinkDialer`: Opens byte-stream connections to the metrics sink
//! - `LineSink`: Serialized delivery of validated line-protocol records

mod sink_port;
mod symbol_source_port;

pub use sink_port::{ForwardError, LineSink, SharedSinkState, SinkDialer, SinkState};
#[cfg(test)]
pub use sink_port::MockLineSink;
pub use symbol_source_port::{SymbolSource, SymbolSourceError};
#[cfg(test)]
pub use symbol_source_port::MockSymbolSource;
