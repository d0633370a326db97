//! Terminal Adapters
//!
//! Implementations of [`TerminalPort`](crate::application::ports::TerminalPort):
//!
//! - [`BridgeTerminal`]: HTTP/JSON bridge to a running terminal
//! - [`SimulatedTerminal`]: in-memory terminal for tests and local development

mod bridge;
mod simulated;

pub use bridge::BridgeTerminal;
pub use simulated::{OrderScript, SimulatedTerminal};

/// Terminal adapter construction error.
#[derive(Debug, thiserror::Error)]
pub enum TerminalError {
    /// HTTP client could not be built.
    #[error("failed to build bridge client: {0}")]
    Client(String),
}
