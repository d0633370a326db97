//! Domain Layer - Session lifecycle types and the constant catalog.
//!
//! Pure Rust types with no I/O. Everything that touches the terminal lives
//! behind the ports in the application layer.

/// Terminal session, credential and lifecycle state.
pub mod session;

/// Stable names for terminal-native constants.
pub mod catalog;
