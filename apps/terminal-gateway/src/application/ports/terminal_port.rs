//! Terminal Port (Driven Port)
//!
//! Interface to the external trading terminal. The terminal's session is not
//! safe for concurrent native calls; callers are expected to go through the
//! connection manager, which serializes access.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::catalog::NativeCode;
use crate::domain::session::Credential;

/// Opaque terminal payload (account snapshots, rate records, order requests
/// and results). Passed through without interpretation.
pub type Payload = serde_json::Value;

/// Error code and description reported by the terminal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NativeError {
    /// Terminal-native error code.
    pub code: i64,
    /// Terminal-provided description.
    pub description: String,
}

impl NativeError {
    /// Create a native error.
    #[must_use]
    pub fn new(code: i64, description: impl Into<String>) -> Self {
        Self {
            code,
            description: description.into(),
        }
    }

    /// No error recorded.
    #[must_use]
    pub fn success() -> Self {
        Self::new(1, "Success")
    }

    /// Generic failure.
    #[must_use]
    pub fn generic_fail(description: impl Into<String>) -> Self {
        Self::new(-1, description)
    }

    /// Invalid arguments or parameters.
    #[must_use]
    pub fn invalid_params(description: impl Into<String>) -> Self {
        Self::new(-2, description)
    }

    /// Authorization failed.
    #[must_use]
    pub fn auth_failed(description: impl Into<String>) -> Self {
        Self::new(-6, description)
    }

    /// Internal terminal failure.
    #[must_use]
    pub fn internal_fail(description: impl Into<String>) -> Self {
        Self::new(-10000, description)
    }

    /// Terminal IPC initialization failed.
    #[must_use]
    pub fn init_fail(description: impl Into<String>) -> Self {
        Self::new(-10003, description)
    }

    /// No connection to the terminal.
    #[must_use]
    pub fn connect_fail(description: impl Into<String>) -> Self {
        Self::new(-10004, description)
    }

    /// Terminal call timed out.
    #[must_use]
    pub fn timeout(description: impl Into<String>) -> Self {
        Self::new(-10005, description)
    }
}

impl fmt::Display for NativeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, '{}')", self.code, self.description)
    }
}

impl std::error::Error for NativeError {}

/// Filter for open position queries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionsQuery {
    /// Restrict to one symbol.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    /// Restrict to one position ticket.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ticket: Option<u64>,
}

/// Native terminal operations.
///
/// Queries return `None` where the terminal returns its null sentinel;
/// [`TerminalPort::last_error`] then describes why.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TerminalPort: Send + Sync {
    /// Establish the terminal connection.
    async fn initialize(&self) -> Result<(), NativeError>;

    /// Log in to a trading account.
    async fn login(&self, credential: &Credential) -> Result<(), NativeError>;

    /// Close the terminal connection.
    async fn shutdown(&self);

    /// Error recorded by the most recent native call.
    async fn last_error(&self) -> NativeError;

    /// Current account snapshot.
    async fn account_info(&self) -> Option<Payload>;

    /// Bars counted back from `start_pos` (0 = current bar).
    async fn copy_rates_from_pos(
        &self,
        symbol: &str,
        timeframe: NativeCode,
        start_pos: u32,
        count: u32,
    ) -> Option<Vec<Payload>>;

    /// Submit a trade request.
    async fn order_send(&self, request: &Payload) -> Option<Payload>;

    /// Open positions.
    async fn positions_get(&self, query: &PositionsQuery) -> Option<Vec<Payload>>;

    /// Symbol specification.
    async fn symbol_info(&self, symbol: &str) -> Option<Payload>;

    /// Last tick of a symbol.
    async fn symbol_info_tick(&self, symbol: &str) -> Option<Payload>;

    /// Add or remove a symbol from the terminal's market watch.
    async fn symbol_select(&self, symbol: &str, enable: bool) -> bool;

    /// Deals from the trading history.
    async fn history_deals_get(&self, query: &Payload) -> Option<Vec<Payload>>;
}
