//! Application Services
//!
//! Services that orchestrate domain logic and coordinate between ports.
//!
//! - `SymbolResolver`: Primary/fallback symbol retrieval
//! - `TradeDispatcher`: Frame classification, batching, and bounded dispatch
//! - `RelayState`: Shared run status read by the health server

mod dispatcher;
mod state;
mod symbols;

pub use dispatcher::{
    DEFAULT_MAX_IN_FLIGHT, DispatchConfig, DispatchSummary, StreamEnd, TradeDispatcher,
};
pub use state::{RelayState, RelayStatus, StreamState};
pub use symbols::{DEFAULT_SYMBOL_LIMIT, SymbolResolver};
