//! Infrastructure Layer - Adapters and external integrations.
//!
//! This layer contains the concrete implementations of the port interfaces
//! defined in the application layer, plus the servers facing remote callers.

/// Terminal adapters (bridge client, simulated terminal).
pub mod terminal;

/// HTTP/JSON RPC server.
pub mod rpc;

/// Configuration and dependency injection.
pub mod config;

/// Health check HTTP endpoint.
pub mod health;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// OpenTelemetry tracing integration.
pub mod telemetry;
