//! Terminal Gateway Binary
//!
//! Opens the terminal session and serves it to remote callers.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin terminal-gateway
//! ```
//!
//! # Environment Variables
//!
//! ## Required
//! - `TERMINAL_ACCOUNT`: Account number
//! - `TERMINAL_PASSWORD`: Account password
//! - `TERMINAL_SERVER`: Trade server name
//!
//! ## Optional
//! - `GATEWAY_HOST`: Listener address (default: 127.0.0.1)
//! - `GATEWAY_RPC_PORT`: RPC server port (default: 9090)
//! - `GATEWAY_HEALTH_PORT`: Health check HTTP port, 0 disables (default: 8083)
//! - `GATEWAY_OBJECT_ID`: RPC namespace (default: trading.platform.TerminalGateway)
//! - `GATEWAY_TERMINAL_BACKEND`: bridge | simulated (default: bridge)
//! - `GATEWAY_BRIDGE_URL`: Terminal bridge URL (default: <http://127.0.0.1:18812>)
//! - `GATEWAY_BRIDGE_TIMEOUT_MS`: Bridge request timeout (default: 10000)
//! - `GATEWAY_LOGIN_ATTEMPTS`: Login attempts (default: 3)
//! - `GATEWAY_LOGIN_DELAY_MS`: Delay between login attempts (default: 500)
//! - `OTEL_ENABLED`: Enable OpenTelemetry (default: true)
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: OTLP endpoint (default: <http://localhost:4317>)
//! - `OTEL_SERVICE_NAME`: Service name (default: terminal-gateway)
//! - `RUST_LOG`: Log level (default: info)

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use terminal_gateway::infrastructure::health::{HealthServer, HealthServerState};
use terminal_gateway::infrastructure::rpc::RpcServer;
use terminal_gateway::infrastructure::telemetry;
use terminal_gateway::{GatewayConfig, GatewayContext, StateChange, init_metrics};
use tokio::signal;
use tokio_util::sync::CancellationToken;

/// Graceful shutdown timeout.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv();

    // Initialize telemetry (OpenTelemetry + tracing)
    let _telemetry_guard = telemetry::init()?;

    tracing::info!("Starting Terminal Gateway");

    // Initialize Prometheus metrics
    if let Err(e) = init_metrics() {
        tracing::warn!(error = %e, "Metrics recorder not installed");
    }

    let config = GatewayConfig::from_env().context("invalid configuration")?;
    log_config(&config);

    let context = GatewayContext::from_config(&config)?;

    if let Err(e) = context.start().await {
        tracing::error!(error = %e, code = %e.code(), "Terminal session could not be opened");
        context.close().await;
        return Err(e).context("startup failed");
    }

    let shutdown_token = CancellationToken::new();

    // Spawn health server
    if let Some(health_addr) = config.server.health_addr() {
        let health_state = Arc::new(HealthServerState::new(
            env!("CARGO_PKG_VERSION").to_string(),
            context.connections(),
        ));
        let health_server = HealthServer::new(health_addr, health_state, shutdown_token.clone());
        tokio::spawn(async move {
            if let Err(e) = health_server.run().await {
                tracing::error!(error = %e, "Health server error");
            }
        });
    }

    // Bind before reporting ready so a taken port fails the process
    let rpc_server = RpcServer::new(
        config.server.rpc_addr(),
        context.gateway(),
        &config.server.object_id,
        shutdown_token.clone(),
    )
    .bind()
    .await?;
    let rpc_handle = tokio::spawn(rpc_server.serve());

    tracing::info!(object_id = %config.server.object_id, "Terminal gateway ready");

    await_shutdown(shutdown_token).await;

    let drained = tokio::time::timeout(SHUTDOWN_TIMEOUT, async {
        match rpc_handle.await {
            Ok(Err(e)) => tracing::error!(error = %e, "RPC server error"),
            Err(e) => tracing::error!(error = %e, "RPC server task failed"),
            Ok(Ok(())) => {}
        }
        context.close().await
    })
    .await;

    match drained {
        Ok(StateChange::Applied) => tracing::info!("Terminal session closed"),
        Ok(StateChange::NoOp) => tracing::info!("Terminal session already closed"),
        Err(_) => tracing::warn!(
            timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
            "Shutdown timed out, terminal session left open"
        ),
    }

    drop(context);
    tracing::info!("Terminal gateway stopped");
    Ok(())
}

/// Load .env file from current or ancestor directories.
fn load_dotenv() {
    if dotenvy::dotenv().is_err() {
        load_dotenv_from_ancestors();
    }
}

/// Log the parsed configuration.
fn log_config(config: &GatewayConfig) {
    tracing::info!(
        account = config.credential.account(),
        server = config.credential.server(),
        backend = config.backend.as_str(),
        rpc_addr = %config.server.rpc_addr(),
        health_port = config.server.health_port,
        "Configuration loaded"
    );
    tracing::debug!(
        bridge_url = %config.bridge.url,
        bridge_timeout_ms = u64::try_from(config.bridge.timeout.as_millis()).unwrap_or(u64::MAX),
        login_attempts = config.login.attempts(),
        "Terminal settings"
    );
}

/// Load .env file from any ancestor directory.
fn load_dotenv_from_ancestors() {
    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
#[allow(clippy::expect_used)]
async fn await_shutdown(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }

    shutdown_token.cancel();

    tracing::info!(
        timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
        "Graceful shutdown started"
    );
}
