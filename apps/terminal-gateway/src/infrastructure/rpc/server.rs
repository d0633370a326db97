//! HTTP/JSON RPC server.
//!
//! Every operation is `POST /{object_id}/{operation}` with a JSON body of
//! named arguments. Successful calls answer `200` with the terminal's result
//! unchanged; failures answer with the status of their error code and an
//! [`ErrorBody`].

use std::future::Future;
use std::net::SocketAddr;
use std::time::Instant;

use axum::{
    Json, Router,
    extract::{State, rejection::JsonRejection},
    response::IntoResponse,
    routing::post,
};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use crate::application::ports::{Payload, PositionsQuery};
use crate::application::services::{StateChange, TimeframeArg, TradingGateway};
use crate::domain::catalog::CatalogSnapshot;
use crate::domain::session::{SessionState, SessionStatus};
use crate::error::{ErrorBody, GatewayError};
use crate::infrastructure::metrics::{Outcome, record_request};

/// Create the RPC router with every operation mounted under `object_id`.
#[must_use]
pub fn create_router(gateway: TradingGateway, object_id: &str) -> Router {
    let route = |operation: &str| format!("/{object_id}/{operation}");

    Router::new()
        .route(&route("accountInfo"), post(account_info))
        .route(&route("copyRates"), post(copy_rates))
        .route(&route("copyRatesFromPos"), post(copy_rates_from_pos))
        .route(&route("orderSend"), post(order_send))
        .route(&route("getConstants"), post(get_constants))
        .route(&route("shutdown"), post(shutdown))
        .route(&route("positionsGet"), post(positions_get))
        .route(&route("symbolInfo"), post(symbol_info))
        .route(&route("symbolInfoTick"), post(symbol_info_tick))
        .route(&route("symbolSelect"), post(symbol_select))
        .route(&route("historyDealsGet"), post(history_deals_get))
        .route(&route("sessionStatus"), post(session_status))
        .with_state(gateway)
}

// =============================================================================
// Requests and Responses
// =============================================================================

/// Arguments of `copyRates`.
#[derive(Debug, Deserialize)]
pub struct CopyRatesRequest {
    /// Symbol name.
    pub symbol: String,
    /// Catalog name or native code.
    pub timeframe: TimeframeArg,
    /// Number of bars.
    pub count: u32,
}

/// Arguments of `copyRatesFromPos`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CopyRatesFromPosRequest {
    /// Symbol name.
    pub symbol: String,
    /// Catalog name or native code.
    pub timeframe: TimeframeArg,
    /// Index of the first bar, counting back from the current one.
    pub start_pos: u32,
    /// Number of bars.
    pub count: u32,
}

/// Arguments of `orderSend`.
#[derive(Debug, Deserialize)]
pub struct OrderSendRequest {
    /// Opaque order request forwarded to the terminal.
    pub request: Payload,
}

/// Arguments of `symbolInfo` and `symbolInfoTick`.
#[derive(Debug, Deserialize)]
pub struct SymbolRequest {
    /// Symbol name.
    pub symbol: String,
}

/// Arguments of `symbolSelect`.
#[derive(Debug, Deserialize)]
pub struct SymbolSelectRequest {
    /// Symbol name.
    pub symbol: String,
    /// Show (`true`) or hide the symbol.
    #[serde(default = "enabled")]
    pub enable: bool,
}

const fn enabled() -> bool {
    true
}

/// Arguments of `historyDealsGet`.
#[derive(Debug, Deserialize)]
pub struct HistoryDealsRequest {
    /// Opaque filter forwarded to the terminal.
    pub query: Payload,
}

/// Answer of `shutdown`.
#[derive(Debug, Serialize)]
pub struct ShutdownResponse {
    /// Always `true`; shutdown cannot fail.
    pub acknowledged: bool,
    /// Whether a live session was closed by this call.
    pub closed: bool,
    /// Session state after the call.
    pub state: SessionState,
}

// =============================================================================
// Handlers
// =============================================================================

async fn account_info(State(gateway): State<TradingGateway>) -> Result<Json<Payload>, ApiError> {
    observe("accountInfo", gateway.account_info()).await
}

async fn copy_rates(
    State(gateway): State<TradingGateway>,
    body: Result<Json<CopyRatesRequest>, JsonRejection>,
) -> Result<Json<Vec<Payload>>, ApiError> {
    observe("copyRates", async {
        let Json(req) = body.map_err(invalid_body)?;
        gateway.copy_rates(&req.symbol, &req.timeframe, req.count).await
    })
    .await
}

async fn copy_rates_from_pos(
    State(gateway): State<TradingGateway>,
    body: Result<Json<CopyRatesFromPosRequest>, JsonRejection>,
) -> Result<Json<Vec<Payload>>, ApiError> {
    observe("copyRatesFromPos", async {
        let Json(req) = body.map_err(invalid_body)?;
        gateway
            .copy_rates_from_pos(&req.symbol, &req.timeframe, req.start_pos, req.count)
            .await
    })
    .await
}

async fn order_send(
    State(gateway): State<TradingGateway>,
    body: Result<Json<OrderSendRequest>, JsonRejection>,
) -> Result<Json<Payload>, ApiError> {
    observe("orderSend", async {
        let Json(req) = body.map_err(invalid_body)?;
        gateway.order_send(&req.request).await
    })
    .await
}

async fn get_constants(
    State(gateway): State<TradingGateway>,
) -> Result<Json<&'static CatalogSnapshot>, ApiError> {
    observe("getConstants", async { Ok(gateway.get_constants()) }).await
}

async fn shutdown(
    State(gateway): State<TradingGateway>,
) -> Result<Json<ShutdownResponse>, ApiError> {
    observe("shutdown", async {
        let change = gateway.shutdown().await;
        Ok(ShutdownResponse {
            acknowledged: true,
            closed: change == StateChange::Applied,
            state: gateway.session_status().state,
        })
    })
    .await
}

async fn positions_get(
    State(gateway): State<TradingGateway>,
    body: Result<Json<PositionsQuery>, JsonRejection>,
) -> Result<Json<Vec<Payload>>, ApiError> {
    observe("positionsGet", async {
        let Json(query) = body.map_err(invalid_body)?;
        gateway.positions_get(&query).await
    })
    .await
}

async fn symbol_info(
    State(gateway): State<TradingGateway>,
    body: Result<Json<SymbolRequest>, JsonRejection>,
) -> Result<Json<Payload>, ApiError> {
    observe("symbolInfo", async {
        let Json(req) = body.map_err(invalid_body)?;
        gateway.symbol_info(&req.symbol).await
    })
    .await
}

async fn symbol_info_tick(
    State(gateway): State<TradingGateway>,
    body: Result<Json<SymbolRequest>, JsonRejection>,
) -> Result<Json<Payload>, ApiError> {
    observe("symbolInfoTick", async {
        let Json(req) = body.map_err(invalid_body)?;
        gateway.symbol_info_tick(&req.symbol).await
    })
    .await
}

async fn symbol_select(
    State(gateway): State<TradingGateway>,
    body: Result<Json<SymbolSelectRequest>, JsonRejection>,
) -> Result<Json<bool>, ApiError> {
    observe("symbolSelect", async {
        let Json(req) = body.map_err(invalid_body)?;
        gateway.symbol_select(&req.symbol, req.enable).await
    })
    .await
}

async fn history_deals_get(
    State(gateway): State<TradingGateway>,
    body: Result<Json<HistoryDealsRequest>, JsonRejection>,
) -> Result<Json<Vec<Payload>>, ApiError> {
    observe("historyDealsGet", async {
        let Json(req) = body.map_err(invalid_body)?;
        gateway.history_deals_get(&req.query).await
    })
    .await
}

async fn session_status(
    State(gateway): State<TradingGateway>,
) -> Result<Json<SessionStatus>, ApiError> {
    observe("sessionStatus", async { Ok(gateway.session_status()) }).await
}

/// Run one call inside a request span and record its outcome.
async fn observe<T, F>(operation: &'static str, call: F) -> Result<Json<T>, ApiError>
where
    F: Future<Output = Result<T, GatewayError>>,
{
    let request_id = Uuid::new_v4();
    let span = tracing::info_span!("rpc", %request_id, operation);
    let started = Instant::now();

    let result = call.instrument(span.clone()).await;
    let elapsed = started.elapsed();

    match &result {
        Ok(_) => {
            let elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
            span.in_scope(|| tracing::debug!(elapsed_ms, "RPC call succeeded"));
            record_request(operation, Outcome::Ok, elapsed);
        }
        Err(e) => {
            span.in_scope(|| tracing::warn!(code = %e.code(), error = %e, "RPC call failed"));
            record_request(operation, Outcome::Error(e.code()), elapsed);
        }
    }

    result.map(Json).map_err(ApiError::from)
}

fn invalid_body(rejection: JsonRejection) -> GatewayError {
    GatewayError::invalid_argument("body", rejection.body_text())
}

// =============================================================================
// Errors
// =============================================================================

/// Gateway error rendered as an HTTP response.
#[derive(Debug)]
pub struct ApiError(GatewayError);

impl ApiError {
    /// Body sent to the caller.
    #[must_use]
    pub fn body(&self) -> ErrorBody {
        self.0.to_body()
    }
}

impl From<GatewayError> for ApiError {
    fn from(error: GatewayError) -> Self {
        Self(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        (self.0.code().http_status(), Json(self.body())).into_response()
    }
}

// =============================================================================
// Server
// =============================================================================

/// RPC HTTP server.
pub struct RpcServer {
    addr: SocketAddr,
    router: Router,
    cancel: CancellationToken,
}

impl RpcServer {
    /// Create a server exposing `gateway` under `object_id`.
    #[must_use]
    pub fn new(
        addr: SocketAddr,
        gateway: TradingGateway,
        object_id: &str,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            addr,
            router: create_router(gateway, object_id),
            cancel,
        }
    }

    /// Bind the listener.
    ///
    /// # Errors
    ///
    /// Returns [`RpcServerError::BindFailed`] if the address is unavailable.
    pub async fn bind(self) -> Result<BoundRpcServer, RpcServerError> {
        let listener = TcpListener::bind(self.addr)
            .await
            .map_err(|e| RpcServerError::BindFailed(self.addr, e.to_string()))?;

        let local_addr = listener
            .local_addr()
            .map_err(|e| RpcServerError::BindFailed(self.addr, e.to_string()))?;

        tracing::info!(addr = %local_addr, "RPC server listening");

        Ok(BoundRpcServer {
            listener,
            local_addr,
            router: self.router,
            cancel: self.cancel,
        })
    }

    /// Bind and serve until cancelled.
    ///
    /// # Errors
    ///
    /// Returns `RpcServerError` if binding fails or the server stops with an
    /// I/O error.
    pub async fn run(self) -> Result<(), RpcServerError> {
        self.bind().await?.serve().await
    }
}

/// RPC server with a bound listener.
pub struct BoundRpcServer {
    listener: TcpListener,
    local_addr: SocketAddr,
    router: Router,
    cancel: CancellationToken,
}

impl BoundRpcServer {
    /// Address the listener is bound to.
    #[must_use]
    pub const fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Serve until cancelled. In-flight requests finish before this returns.
    ///
    /// # Errors
    ///
    /// Returns [`RpcServerError::ServerFailed`] on a fatal I/O error.
    pub async fn serve(self) -> Result<(), RpcServerError> {
        axum::serve(self.listener, self.router)
            .with_graceful_shutdown(self.cancel.cancelled_owned())
            .await
            .map_err(|e| RpcServerError::ServerFailed(e.to_string()))?;

        tracing::info!("RPC server stopped");
        Ok(())
    }
}

/// RPC server errors.
#[derive(Debug, thiserror::Error)]
pub enum RpcServerError {
    /// Failed to bind to address.
    #[error("failed to bind to {0}: {1}")]
    BindFailed(SocketAddr, String),

    /// Server error.
    #[error("server error: {0}")]
    ServerFailed(String),
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode};
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use super::*;
    use crate::application::services::ConnectionManager;
    use crate::domain::session::Credential;
    use crate::error::ErrorCode;
    use crate::infrastructure::config::DEFAULT_OBJECT_ID;
    use crate::infrastructure::terminal::{OrderScript, SimulatedTerminal};
    use crate::resilience::{RetryPolicy, RetryTiers};

    fn manager(terminal: Arc<SimulatedTerminal>) -> Arc<ConnectionManager> {
        Arc::new(ConnectionManager::new(
            terminal,
            RetryTiers::single(RetryPolicy::new(1, Duration::ZERO).unwrap()),
            RetryPolicy::new(1, Duration::ZERO).unwrap(),
        ))
    }

    async fn authenticated() -> (Router, Arc<SimulatedTerminal>) {
        let terminal = Arc::new(SimulatedTerminal::new());
        let connections = manager(Arc::clone(&terminal));
        connections.initialize().await.unwrap();
        connections
            .authenticate(Arc::new(Credential::new(
                SimulatedTerminal::DEMO_ACCOUNT,
                SimulatedTerminal::DEMO_PASSWORD.to_string(),
                SimulatedTerminal::DEMO_SERVER.to_string(),
            )))
            .await
            .unwrap();
        (
            create_router(TradingGateway::new(connections), DEFAULT_OBJECT_ID),
            terminal,
        )
    }

    fn unconnected() -> Router {
        let connections = manager(Arc::new(SimulatedTerminal::new()));
        create_router(TradingGateway::new(connections), DEFAULT_OBJECT_ID)
    }

    async fn call(app: Router, operation: &str, body: Value) -> (StatusCode, Value) {
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(format!("/{DEFAULT_OBJECT_ID}/{operation}"))
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn error_code(body: &Value) -> ErrorCode {
        serde_json::from_value::<ErrorBody>(body.clone()).unwrap().code
    }

    #[tokio::test]
    async fn account_info_passes_payload_through() {
        let (app, _) = authenticated().await;
        let (status, body) = call(app, "accountInfo", json!({})).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["login"], SimulatedTerminal::DEMO_ACCOUNT);
    }

    #[tokio::test]
    async fn copy_rates_accepts_name_or_code() {
        let (app, _) = authenticated().await;

        let (status, body) = call(
            app.clone(),
            "copyRates",
            json!({"symbol": "EURUSD", "timeframe": "M1", "count": 10}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 10);

        let (status, body) = call(
            app,
            "copyRates",
            json!({"symbol": "EURUSD", "timeframe": 16385, "count": 3}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn unavailable_rates_are_not_found() {
        let (app, terminal) = authenticated().await;
        terminal.set_rates_available(false);

        let (status, body) = call(
            app,
            "copyRates",
            json!({"symbol": "EURUSD", "timeframe": "M1", "count": 10}),
        )
        .await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(error_code(&body), ErrorCode::DataUnavailable);
        assert!(body["native_code"].is_i64());
    }

    #[tokio::test]
    async fn unknown_timeframe_is_invalid_argument() {
        let (app, _) = authenticated().await;
        let (status, body) = call(
            app,
            "copyRates",
            json!({"symbol": "EURUSD", "timeframe": "M7", "count": 10}),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(error_code(&body), ErrorCode::InvalidArgument);
    }

    #[tokio::test]
    async fn malformed_body_is_invalid_argument() {
        let (app, _) = authenticated().await;
        let (status, body) = call(app, "copyRates", json!({"symbol": "EURUSD", "count": -1})).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(error_code(&body), ErrorCode::InvalidArgument);
    }

    #[tokio::test]
    async fn filled_order_is_returned_unmodified() {
        let (app, _) = authenticated().await;
        let (status, body) = call(
            app,
            "orderSend",
            json!({"request": {"action": 1, "symbol": "EURUSD", "volume": 0.1, "type": 0}}),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["retcode"], 10009);
    }

    #[tokio::test]
    async fn null_order_result_is_rejected() {
        let (app, terminal) = authenticated().await;
        terminal.set_order_script(OrderScript::Null);

        let (status, body) = call(
            app,
            "orderSend",
            json!({"request": {"action": 1, "symbol": "EURUSD", "volume": 0.1, "type": 0}}),
        )
        .await;

        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(error_code(&body), ErrorCode::OrderRejected);
    }

    #[tokio::test]
    async fn constants_carry_all_categories() {
        let (status, body) = call(unconnected(), "getConstants", json!({})).await;

        assert_eq!(status, StatusCode::OK);
        for key in ["TIMEFRAMES", "ORDER_TYPES", "TRADE_ACTIONS", "ORDER_TIME", "ORDER_FILLING"] {
            assert!(body[key].is_object(), "missing {key}");
        }
        assert_eq!(body["TIMEFRAMES"]["M1"], 1);
    }

    #[tokio::test]
    async fn data_calls_need_a_session() {
        let (status, body) = call(unconnected(), "accountInfo", json!({})).await;

        assert_eq!(status, StatusCode::PRECONDITION_FAILED);
        assert_eq!(error_code(&body), ErrorCode::SessionNotReady);
    }

    #[tokio::test]
    async fn shutdown_is_acknowledged_twice() {
        let (app, terminal) = authenticated().await;

        let (status, body) = call(app.clone(), "shutdown", json!({})).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["closed"], true);
        assert_eq!(body["state"], "UNINITIALIZED");

        let (status, body) = call(app.clone(), "shutdown", json!({})).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["closed"], false);
        assert_eq!(terminal.shutdown_calls(), 1);

        let (status, _) = call(app, "positionsGet", json!({})).await;
        assert_eq!(status, StatusCode::PRECONDITION_FAILED);
    }

    #[tokio::test]
    async fn symbol_select_defaults_to_enable() {
        let (app, _) = authenticated().await;
        let (status, body) = call(app, "symbolSelect", json!({"symbol": "EURUSD"})).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!(true));
    }

    #[tokio::test]
    async fn unknown_symbol_info_is_not_found() {
        let (app, _) = authenticated().await;
        let (status, _) = call(app.clone(), "symbolInfo", json!({"symbol": "NOPE"})).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = call(app, "symbolInfoTick", json!({"symbol": "EURUSD"})).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.is_object());
    }

    #[tokio::test]
    async fn session_status_reports_account() {
        let (app, _) = authenticated().await;
        let (status, body) = call(app, "sessionStatus", json!({})).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["state"], "AUTHENTICATED");
        assert_eq!(body["account"], SimulatedTerminal::DEMO_ACCOUNT);
    }

    #[tokio::test]
    async fn routes_live_under_object_id() {
        let connections = manager(Arc::new(SimulatedTerminal::new()));
        let app = create_router(TradingGateway::new(connections), "custom.Gateway");

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(format!("/{DEFAULT_OBJECT_ID}/getConstants"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn server_drains_on_cancel() {
        let cancel = CancellationToken::new();
        let connections = manager(Arc::new(SimulatedTerminal::new()));
        let server = RpcServer::new(
            "127.0.0.1:0".parse().unwrap(),
            TradingGateway::new(connections),
            DEFAULT_OBJECT_ID,
            cancel.clone(),
        )
        .bind()
        .await
        .unwrap();
        assert_ne!(server.local_addr().port(), 0);

        let handle = tokio::spawn(server.serve());
        cancel.cancel();
        handle.await.unwrap().unwrap();
    }
}
