//! Health Check and Metrics Endpoint
//!
//! HTTP endpoint for health checks, session status reporting, and Prometheus metrics.
//! Used by container orchestrators, load balancers, and monitoring systems.
//!
//! # Endpoints
//!
//! - `GET /health` - Returns JSON health status
//! - `GET /healthz` - Kubernetes liveness probe (simple OK)
//! - `GET /readyz` - Kubernetes readiness probe (session authenticated)
//! - `GET /metrics` - Prometheus metrics in text format
//!
//! Handlers read the published session status, so a probe never waits
//! behind a slow terminal call.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{Json, Router, extract::State, http::StatusCode, response::IntoResponse, routing::get};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::application::services::ConnectionManager;
use crate::domain::session::{SessionState, SessionStatus};
use crate::infrastructure::metrics::get_metrics_handle;

// =============================================================================
// Health Response Types
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Overall status: "healthy", "degraded", or "unhealthy".
    pub status: HealthStatus,
    /// Gateway version.
    pub version: String,
    /// Server uptime in seconds.
    pub uptime_secs: u64,
    /// Current time.
    pub current_time: DateTime<Utc>,
    /// Terminal session status.
    pub session: SessionStatus,
}

/// Overall health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Session authenticated.
    Healthy,
    /// Terminal connected, no account logged in.
    Degraded,
    /// No terminal session.
    Unhealthy,
}

impl From<SessionState> for HealthStatus {
    fn from(state: SessionState) -> Self {
        match state {
            SessionState::Authenticated => Self::Healthy,
            SessionState::Initialized => Self::Degraded,
            SessionState::Uninitialized => Self::Unhealthy,
        }
    }
}

// =============================================================================
// Health Server State
// =============================================================================

/// Shared state for the health server.
pub struct HealthServerState {
    version: String,
    started_at: Instant,
    connections: Arc<ConnectionManager>,
}

impl HealthServerState {
    /// Create new health server state.
    #[must_use]
    pub fn new(version: String, connections: Arc<ConnectionManager>) -> Self {
        Self {
            version,
            started_at: Instant::now(),
            connections,
        }
    }
}

// =============================================================================
// Health Server
// =============================================================================

/// Health check HTTP server.
pub struct HealthServer {
    addr: SocketAddr,
    state: Arc<HealthServerState>,
    cancel: CancellationToken,
}

impl HealthServer {
    /// Create a new health server.
    #[must_use]
    pub const fn new(
        addr: SocketAddr,
        state: Arc<HealthServerState>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            addr,
            state,
            cancel,
        }
    }

    /// Run the health server until cancelled.
    ///
    /// # Errors
    ///
    /// Returns `HealthServerError` if binding fails or the HTTP server
    /// encounters a fatal error while running.
    pub async fn run(self) -> Result<(), HealthServerError> {
        let app = router(self.state);

        let listener = TcpListener::bind(self.addr)
            .await
            .map_err(|e| HealthServerError::BindFailed(self.addr, e.to_string()))?;

        tracing::info!(addr = %self.addr, "Health server listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(self.cancel.cancelled_owned())
            .await
            .map_err(|e| HealthServerError::ServerFailed(e.to_string()))?;

        tracing::info!("Health server stopped");
        Ok(())
    }
}

/// Health routes over `state`.
pub fn router(state: Arc<HealthServerState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/healthz", get(liveness_handler))
        .route("/readyz", get(readiness_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

// =============================================================================
// HTTP Handlers
// =============================================================================

async fn health_handler(State(state): State<Arc<HealthServerState>>) -> impl IntoResponse {
    let response = build_health_response(&state);
    let status_code = match response.status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status_code, Json(response))
}

async fn liveness_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn readiness_handler(State(state): State<Arc<HealthServerState>>) -> impl IntoResponse {
    if state.connections.state() == SessionState::Authenticated {
        (StatusCode::OK, "READY")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "NOT READY")
    }
}

async fn metrics_handler() -> impl IntoResponse {
    get_metrics_handle().map_or_else(
        || {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                [("content-type", "text/plain")],
                "Metrics not initialized".to_string(),
            )
        },
        |handle| {
            let body = handle.render();
            (
                StatusCode::OK,
                [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
                body,
            )
        },
    )
}

fn build_health_response(state: &HealthServerState) -> HealthResponse {
    let session = state.connections.status();

    HealthResponse {
        status: session.state.into(),
        version: state.version.clone(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        current_time: Utc::now(),
        session,
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Health server errors.
#[derive(Debug, thiserror::Error)]
pub enum HealthServerError {
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
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    use super::*;
    use crate::domain::session::Credential;
    use crate::infrastructure::terminal::SimulatedTerminal;
    use crate::resilience::{RetryPolicy, RetryTiers};

    fn state() -> Arc<HealthServerState> {
        let connections = Arc::new(ConnectionManager::new(
            Arc::new(SimulatedTerminal::new()),
            RetryTiers::single(RetryPolicy::new(1, Duration::ZERO).unwrap()),
            RetryPolicy::new(1, Duration::ZERO).unwrap(),
        ));
        Arc::new(HealthServerState::new("0.1.0".to_string(), connections))
    }

    async fn get_status(app: Router, uri: &str) -> StatusCode {
        app.oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
            .status()
    }

    #[test]
    fn health_status_serialization() {
        assert_eq!(
            serde_json::to_string(&HealthStatus::Healthy).unwrap(),
            "\"healthy\""
        );
        assert_eq!(
            serde_json::to_string(&HealthStatus::Unhealthy).unwrap(),
            "\"unhealthy\""
        );
    }

    #[test]
    fn status_follows_session_state() {
        assert_eq!(
            HealthStatus::from(SessionState::Authenticated),
            HealthStatus::Healthy
        );
        assert_eq!(
            HealthStatus::from(SessionState::Initialized),
            HealthStatus::Degraded
        );
        assert_eq!(
            HealthStatus::from(SessionState::Uninitialized),
            HealthStatus::Unhealthy
        );
    }

    #[tokio::test]
    async fn not_ready_without_session() {
        let state = state();
        assert_eq!(
            get_status(router(Arc::clone(&state)), "/readyz").await,
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            get_status(router(Arc::clone(&state)), "/health").await,
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(get_status(router(state), "/healthz").await, StatusCode::OK);
    }

    #[tokio::test]
    async fn ready_once_authenticated() {
        let state = state();
        state.connections.initialize().await.unwrap();
        state
            .connections
            .authenticate(Arc::new(Credential::new(
                SimulatedTerminal::DEMO_ACCOUNT,
                SimulatedTerminal::DEMO_PASSWORD.to_string(),
                SimulatedTerminal::DEMO_SERVER.to_string(),
            )))
            .await
            .unwrap();

        assert_eq!(
            get_status(router(Arc::clone(&state)), "/readyz").await,
            StatusCode::OK
        );
        let response = build_health_response(&state);
        assert_eq!(response.status, HealthStatus::Healthy);
        assert_eq!(response.session.account, Some(SimulatedTerminal::DEMO_ACCOUNT));
    }
}
