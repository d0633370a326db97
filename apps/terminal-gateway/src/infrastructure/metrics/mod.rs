//! Prometheus Metrics Module
//!
//! Exposes gateway metrics via Prometheus format for monitoring.
//!
//! # Metrics Categories
//!
//! - **Requests**: RPC calls by operation and outcome, with latency
//! - **Session**: Lifecycle state of the terminal session
//! - **Retries**: Native call attempts made by the retry engine
//!
//! # Integration
//!
//! Metrics are exposed at `/metrics` on the health server port.

use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

use crate::domain::session::SessionState;
use crate::error::ErrorCode;

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the Prometheus metrics recorder.
///
/// Calling this again returns the handle installed by the first call.
///
/// # Errors
///
/// Returns an error if another global recorder is already installed.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    register_metrics();
    Ok(PROMETHEUS_HANDLE.get_or_init(|| handle).clone())
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    describe_counter!(
        "terminal_gateway_requests_total",
        "Total RPC requests by operation and outcome"
    );
    describe_histogram!(
        "terminal_gateway_request_duration_seconds",
        "RPC request latency, including time spent waiting for the session"
    );

    describe_gauge!(
        "terminal_gateway_session_state",
        "Terminal session state (0 uninitialized, 1 initialized, 2 authenticated)"
    );

    describe_counter!(
        "terminal_gateway_retry_attempts_total",
        "Native terminal calls made by the retry engine"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Outcome label for a finished RPC request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Request succeeded.
    Ok,
    /// Request failed with the given code.
    Error(ErrorCode),
}

impl Outcome {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Error(ErrorCode::ConnectionFailed) => "connection_failed",
            Self::Error(ErrorCode::AuthenticationFailed) => "authentication_failed",
            Self::Error(ErrorCode::SessionNotReady) => "session_not_ready",
            Self::Error(ErrorCode::DataUnavailable) => "data_unavailable",
            Self::Error(ErrorCode::OrderRejected) => "order_rejected",
            Self::Error(ErrorCode::InvalidArgument) => "invalid_argument",
        }
    }
}

/// Record a finished RPC request.
pub fn record_request(operation: &'static str, outcome: Outcome, duration: Duration) {
    counter!(
        "terminal_gateway_requests_total",
        "operation" => operation,
        "outcome" => outcome.as_str()
    )
    .increment(1);
    histogram!(
        "terminal_gateway_request_duration_seconds",
        "operation" => operation
    )
    .record(duration.as_secs_f64());
}

/// Publish the session state.
pub fn set_session_state(state: SessionState) {
    gauge!("terminal_gateway_session_state").set(f64::from(state.level()));
}

/// Record one native call made under retry.
pub fn record_retry_attempt(operation: &'static str) {
    counter!(
        "terminal_gateway_retry_attempts_total",
        "operation" => operation
    )
    .increment(1);
}

// =============================================================================
// Tests
// =============================================================================
