//! Port Interfaces
//!
//! Contracts that infrastructure adapters implement.
//!
//! ## Driven Ports (Outbound)
//!
//! - `TerminalPort`: native calls against the trading terminal

mod terminal_port;

#[cfg(test)]
pub use terminal_port::MockTerminalPort;
pub use terminal_port::{NativeError, Payload, PositionsQuery, TerminalPort};
