//! Configuration Module
//!
//! Configuration loading and dependency injection for the gateway.

mod container;
mod settings;

pub use container::GatewayContext;
pub use settings::{
    BridgeSettings, ConfigError, DEFAULT_OBJECT_ID, GatewayConfig, ServerSettings,
    TerminalBackend,
};
