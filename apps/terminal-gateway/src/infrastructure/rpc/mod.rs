//! RPC Boundary
//!
//! HTTP/JSON surface through which remote callers reach the
//! [`TradingGateway`](crate::application::services::TradingGateway). Calls are
//! dispatched concurrently; the gateway serializes everything that touches
//! the terminal session.

mod server;

pub use server::{
    ApiError, BoundRpcServer, CopyRatesFromPosRequest, CopyRatesRequest, HistoryDealsRequest,
    OrderSendRequest, RpcServer, RpcServerError, ShutdownResponse, SymbolRequest,
    SymbolSelectRequest, create_router,
};
