//! Application Services
//!
//! Services that orchestrate domain logic and coordinate between ports.
//!
//! - `ConnectionManager`: Owns the terminal session and serializes access
//! - `TradingGateway`: Operation set exposed to remote callers

mod connection_manager;
mod trading_gateway;

pub use connection_manager::{ConnectionManager, SessionGuard, StateChange};
pub use trading_gateway::{TimeframeArg, TradingGateway};
