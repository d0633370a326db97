#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::items_after_statements
    )
)]

//! Terminal Gateway - Shared Trading Terminal Session
//!
//! Holds the one connection a process may have to an external trading
//! terminal and lets any number of remote clients query accounts, fetch
//! price history and send orders through it.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Pure types
//!   - `session`: Session lifecycle state and the credential
//!   - `catalog`: Stable names for terminal-native constants
//!
//! - **Resilience**: Bounded retries with escalating delays
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: The terminal port
//!   - `services`: Connection manager and the RPC operation set
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `terminal`: Bridge client and simulated terminal
//!   - `rpc`: HTTP/JSON RPC server
//!   - `config`: Configuration and the application context
//!   - `health`: Health check HTTP endpoint
//!
//! # Data Flow
//!
//! ```text
//! Client 1 ──┐
//!            │     ┌─────────────┐     ┌────────────────┐     ┌──────────┐
//! Client 2 ──┼────►│  RPC Server │────►│ TradingGateway │────►│ Session  │──► Terminal
//!            │     └─────────────┘     └────────────────┘     │  (lock)  │
//! Client N ──┘                                                └──────────┘
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Session types and the constant catalog.
pub mod domain;

/// Retry engine for terminal calls.
pub mod resilience;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

/// Gateway error taxonomy.
pub mod error;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::catalog::{CatalogSnapshot, ConstantCatalog, Timeframe, TradeRetcode};
pub use domain::session::{Credential, SessionState, SessionStatus};

// Errors
pub use error::{ErrorBody, ErrorCode, GatewayError};

// Application services
pub use application::ports::{NativeError, Payload, PositionsQuery, TerminalPort};
pub use application::services::{
    ConnectionManager, StateChange, TimeframeArg, TradingGateway,
};

// Infrastructure config
pub use infrastructure::config::{
    BridgeSettings, ConfigError, GatewayConfig, GatewayContext, ServerSettings, TerminalBackend,
};

// Servers
pub use infrastructure::health::{HealthServer, HealthServerError, HealthServerState};
pub use infrastructure::rpc::{RpcServer, RpcServerError};

// Terminal adapters (for integration tests)
pub use infrastructure::terminal::{BridgeTerminal, OrderScript, SimulatedTerminal};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
