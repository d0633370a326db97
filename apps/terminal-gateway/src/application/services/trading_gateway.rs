//! Trading Gateway
//!
//! The operation set exposed to remote callers. Every operation follows the
//! same pipeline:
//!
//! 1. validate the shape of the arguments
//! 2. take the session lock
//! 3. delegate to the terminal
//! 4. map the terminal's null sentinel to a typed error
//!
//! Successful results are returned unmodified; the gateway never looks inside
//! payloads beyond an order result's `retcode`.

use std::sync::Arc;

use serde::Deserialize;

use crate::application::ports::{Payload, PositionsQuery, TerminalPort};
use crate::application::services::{ConnectionManager, StateChange};
use crate::domain::catalog::{CatalogSnapshot, ConstantCatalog, NativeCode, Timeframe, TradeRetcode};
use crate::domain::session::SessionStatus;
use crate::error::GatewayError;

/// Timeframe argument as sent by callers: a catalog name or a native code.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum TimeframeArg {
    /// Catalog name, e.g. `"M1"`.
    Name(String),
    /// Native code, e.g. `16385`.
    Code(NativeCode),
}

impl TimeframeArg {
    /// Resolve against the catalog.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::InvalidArgument`] for names or codes outside
    /// the catalog.
    pub fn resolve(&self) -> Result<Timeframe, GatewayError> {
        let resolved = match self {
            Self::Name(name) => name.parse(),
            Self::Code(code) => Timeframe::from_native_code(*code),
        };
        resolved.map_err(|e| GatewayError::invalid_argument("timeframe", e.to_string()))
    }
}

impl From<Timeframe> for TimeframeArg {
    fn from(timeframe: Timeframe) -> Self {
        Self::Name(timeframe.name().to_string())
    }
}

/// Facade over the shared terminal session.
#[derive(Debug, Clone)]
pub struct TradingGateway {
    connections: Arc<ConnectionManager>,
}

impl TradingGateway {
    /// Create a gateway over `connections`.
    #[must_use]
    pub const fn new(connections: Arc<ConnectionManager>) -> Self {
        Self { connections }
    }

    /// Current account snapshot.
    ///
    /// # Errors
    ///
    /// [`GatewayError::Precondition`] without a session,
    /// [`GatewayError::DataUnavailable`] if the terminal returns nothing.
    pub async fn account_info(&self) -> Result<Payload, GatewayError> {
        let guard = self.connections.lock().await;
        let terminal = guard.terminal("accountInfo")?;
        let info = terminal.account_info().await;
        present(terminal, info, || "account info".to_string()).await
    }

    /// The most recent `count` bars of `symbol`.
    ///
    /// # Errors
    ///
    /// See [`TradingGateway::copy_rates_from_pos`].
    pub async fn copy_rates(
        &self,
        symbol: &str,
        timeframe: &TimeframeArg,
        count: u32,
    ) -> Result<Vec<Payload>, GatewayError> {
        self.copy_rates_from_pos(symbol, timeframe, 0, count).await
    }

    /// `count` bars of `symbol`, counted back from `start_pos`.
    ///
    /// An empty sequence is reported as unavailable data, the same as null.
    /// A `count` of zero asks for nothing and yields an empty list without
    /// calling the terminal.
    ///
    /// # Errors
    ///
    /// [`GatewayError::InvalidArgument`] for an empty symbol or unknown
    /// timeframe, [`GatewayError::Precondition`] without a session,
    /// [`GatewayError::DataUnavailable`] if the terminal has no bars.
    pub async fn copy_rates_from_pos(
        &self,
        symbol: &str,
        timeframe: &TimeframeArg,
        start_pos: u32,
        count: u32,
    ) -> Result<Vec<Payload>, GatewayError> {
        require_symbol(symbol)?;
        let timeframe = timeframe.resolve()?;

        let guard = self.connections.lock().await;
        let terminal = guard.terminal("copyRates")?;
        if count == 0 {
            return Ok(Vec::new());
        }
        let rates = terminal
            .copy_rates_from_pos(symbol, timeframe.native_code(), start_pos, count)
            .await
            .filter(|rates| !rates.is_empty());
        present(terminal, rates, || format!("rates for {symbol} {timeframe}")).await
    }

    /// Submit a trade request.
    ///
    /// The result is returned unmodified when its `retcode` is a success
    /// code (`PLACED`, `DONE`, `DONE_PARTIAL`).
    ///
    /// # Errors
    ///
    /// [`GatewayError::InvalidArgument`] unless `request` is a JSON object,
    /// [`GatewayError::Precondition`] without a session,
    /// [`GatewayError::OrderRejected`] for a null result, a missing
    /// `retcode` or any other completion code.
    pub async fn order_send(&self, request: &Payload) -> Result<Payload, GatewayError> {
        if !request.is_object() {
            return Err(GatewayError::invalid_argument(
                "request",
                "order request must be an object",
            ));
        }

        let guard = self.connections.lock().await;
        let terminal = guard.terminal("orderSend")?;

        let Some(result) = terminal.order_send(request).await else {
            let native = terminal.last_error().await;
            return Err(GatewayError::OrderRejected {
                retcode: None,
                description: native.description,
            });
        };

        match result.get("retcode").and_then(Payload::as_i64) {
            Some(code) if TradeRetcode::is_success_code(code) => Ok(result),
            Some(code) => {
                let description = match result.get("comment").and_then(Payload::as_str) {
                    Some(comment) if !comment.is_empty() => comment.to_string(),
                    _ => terminal.last_error().await.description,
                };
                Err(GatewayError::OrderRejected {
                    retcode: Some(code),
                    description,
                })
            }
            None => Err(GatewayError::OrderRejected {
                retcode: None,
                description: "order result carries no retcode".to_string(),
            }),
        }
    }

    /// Open positions, optionally filtered.
    ///
    /// # Errors
    ///
    /// [`GatewayError::InvalidArgument`] for an empty symbol filter,
    /// [`GatewayError::Precondition`] without a session,
    /// [`GatewayError::DataUnavailable`] if the terminal returns null.
    pub async fn positions_get(&self, query: &PositionsQuery) -> Result<Vec<Payload>, GatewayError> {
        if let Some(symbol) = &query.symbol {
            require_symbol(symbol)?;
        }

        let guard = self.connections.lock().await;
        let terminal = guard.terminal("positionsGet")?;
        let positions = terminal.positions_get(query).await;
        present(terminal, positions, || "positions".to_string()).await
    }

    /// Symbol specification.
    ///
    /// # Errors
    ///
    /// [`GatewayError::InvalidArgument`] for an empty symbol,
    /// [`GatewayError::Precondition`] without a session,
    /// [`GatewayError::DataUnavailable`] for unknown symbols.
    pub async fn symbol_info(&self, symbol: &str) -> Result<Payload, GatewayError> {
        require_symbol(symbol)?;

        let guard = self.connections.lock().await;
        let terminal = guard.terminal("symbolInfo")?;
        let info = terminal.symbol_info(symbol).await;
        present(terminal, info, || format!("symbol info for {symbol}")).await
    }

    /// Last tick of a symbol.
    ///
    /// # Errors
    ///
    /// As [`TradingGateway::symbol_info`].
    pub async fn symbol_info_tick(&self, symbol: &str) -> Result<Payload, GatewayError> {
        require_symbol(symbol)?;

        let guard = self.connections.lock().await;
        let terminal = guard.terminal("symbolInfoTick")?;
        let tick = terminal.symbol_info_tick(symbol).await;
        present(terminal, tick, || format!("last tick for {symbol}")).await
    }

    /// Show or hide a symbol in the terminal's market watch.
    ///
    /// # Errors
    ///
    /// [`GatewayError::InvalidArgument`] for an empty symbol,
    /// [`GatewayError::Precondition`] without a session.
    pub async fn symbol_select(&self, symbol: &str, enable: bool) -> Result<bool, GatewayError> {
        require_symbol(symbol)?;

        let guard = self.connections.lock().await;
        let terminal = guard.terminal("symbolSelect")?;
        Ok(terminal.symbol_select(symbol, enable).await)
    }

    /// Deals from the trading history matching `query`.
    ///
    /// # Errors
    ///
    /// [`GatewayError::InvalidArgument`] unless `query` is a JSON object,
    /// [`GatewayError::Precondition`] without a session,
    /// [`GatewayError::DataUnavailable`] if the terminal returns null.
    pub async fn history_deals_get(&self, query: &Payload) -> Result<Vec<Payload>, GatewayError> {
        if !query.is_object() {
            return Err(GatewayError::invalid_argument(
                "query",
                "history query must be an object",
            ));
        }

        let guard = self.connections.lock().await;
        let terminal = guard.terminal("historyDealsGet")?;
        let deals = terminal.history_deals_get(query).await;
        present(terminal, deals, || "history deals".to_string()).await
    }

    /// The constant catalog. Identical on every call.
    #[must_use]
    pub fn get_constants(&self) -> &'static CatalogSnapshot {
        ConstantCatalog::snapshot()
    }

    /// Close the terminal session. Idempotent.
    pub async fn shutdown(&self) -> StateChange {
        self.connections.shutdown().await
    }

    /// Published session status. Does not wait behind a running session
    /// operation.
    #[must_use]
    pub fn session_status(&self) -> SessionStatus {
        self.connections.status()
    }
}

fn require_symbol(symbol: &str) -> Result<(), GatewayError> {
    if symbol.trim().is_empty() {
        return Err(GatewayError::invalid_argument(
            "symbol",
            "symbol must not be empty",
        ));
    }
    Ok(())
}

/// Map the terminal's null sentinel to [`GatewayError::DataUnavailable`],
/// reading the terminal's last error while the session is still held.
async fn present<T>(
    terminal: &dyn TerminalPort,
    value: Option<T>,
    resource: impl FnOnce() -> String,
) -> Result<T, GatewayError> {
    match value {
        Some(value) => Ok(value),
        None => Err(GatewayError::DataUnavailable {
            resource: resource(),
            native: terminal.last_error().await,
        }),
    }
}
