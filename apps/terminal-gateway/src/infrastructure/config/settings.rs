//! Gateway Configuration Settings
//!
//! Configuration types for the terminal gateway, loaded from environment
//! variables.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use crate::domain::session::Credential;
use crate::resilience::{RetryPolicy, RetryPolicyError};

/// Default namespaced identifier the RPC operations are registered under.
pub const DEFAULT_OBJECT_ID: &str = "trading.platform.TerminalGateway";

/// Terminal adapter selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TerminalBackend {
    /// HTTP bridge to a running terminal.
    #[default]
    Bridge,
    /// In-memory terminal for local development.
    Simulated,
}

impl TerminalBackend {
    /// Parse backend from string.
    #[must_use]
    pub fn from_str_case_insensitive(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "simulated" => Self::Simulated,
            _ => Self::Bridge,
        }
    }

    /// Get the backend name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Bridge => "bridge",
            Self::Simulated => "simulated",
        }
    }
}

/// Listener settings.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    /// Address both listeners bind to.
    pub host: IpAddr,
    /// RPC server port.
    pub rpc_port: u16,
    /// Health check HTTP port (0 = disabled).
    pub health_port: u16,
    /// Namespace the RPC operations are registered under.
    pub object_id: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            rpc_port: 9090,
            health_port: 8083,
            object_id: DEFAULT_OBJECT_ID.to_string(),
        }
    }
}

impl ServerSettings {
    /// RPC listener address.
    #[must_use]
    pub const fn rpc_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.rpc_port)
    }

    /// Health listener address, if enabled.
    #[must_use]
    pub const fn health_addr(&self) -> Option<SocketAddr> {
        if self.health_port == 0 {
            None
        } else {
            Some(SocketAddr::new(self.host, self.health_port))
        }
    }
}

/// Terminal bridge settings.
#[derive(Debug, Clone)]
pub struct BridgeSettings {
    /// Base URL of the bridge process.
    pub url: String,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:18812".to_string(),
            timeout: Duration::from_secs(10),
        }
    }
}

/// Complete gateway configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Account credential.
    pub credential: Credential,
    /// Listener settings.
    pub server: ServerSettings,
    /// Terminal adapter.
    pub backend: TerminalBackend,
    /// Bridge settings, used with [`TerminalBackend::Bridge`].
    pub bridge: BridgeSettings,
    /// Login retry policy.
    pub login: RetryPolicy,
}

impl GatewayConfig {
    /// Default login attempts.
    pub const DEFAULT_LOGIN_ATTEMPTS: u32 = 3;
    /// Default delay between login attempts.
    pub const DEFAULT_LOGIN_DELAY: Duration = Duration::from_millis(500);

    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if required environment variables are missing or a
    /// value cannot be parsed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary variable source.
    ///
    /// # Errors
    ///
    /// As [`GatewayConfig::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let account_raw = require(&lookup, "TERMINAL_ACCOUNT")?;
        let account = account_raw
            .trim()
            .parse::<u64>()
            .map_err(|_| ConfigError::InvalidValue {
                key: "TERMINAL_ACCOUNT".to_string(),
                value: account_raw.clone(),
            })?;
        let password = require(&lookup, "TERMINAL_PASSWORD")?;
        let server_name = require(&lookup, "TERMINAL_SERVER")?;

        let defaults = ServerSettings::default();
        let host = match lookup("GATEWAY_HOST") {
            Some(raw) => raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
                key: "GATEWAY_HOST".to_string(),
                value: raw,
            })?,
            None => defaults.host,
        };
        let server = ServerSettings {
            host,
            rpc_port: parse_u16(&lookup, "GATEWAY_RPC_PORT", defaults.rpc_port),
            health_port: parse_u16(&lookup, "GATEWAY_HEALTH_PORT", defaults.health_port),
            object_id: lookup("GATEWAY_OBJECT_ID")
                .filter(|id| !id.trim().is_empty())
                .unwrap_or(defaults.object_id),
        };

        let backend = lookup("GATEWAY_TERMINAL_BACKEND")
            .map(|s| TerminalBackend::from_str_case_insensitive(&s))
            .unwrap_or_default();

        let bridge_defaults = BridgeSettings::default();
        let bridge = BridgeSettings {
            url: lookup("GATEWAY_BRIDGE_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or(bridge_defaults.url),
            timeout: parse_duration_millis(
                &lookup,
                "GATEWAY_BRIDGE_TIMEOUT_MS",
                bridge_defaults.timeout,
            ),
        };

        let login = RetryPolicy::new(
            parse_u32(&lookup, "GATEWAY_LOGIN_ATTEMPTS", Self::DEFAULT_LOGIN_ATTEMPTS),
            parse_duration_millis(&lookup, "GATEWAY_LOGIN_DELAY_MS", Self::DEFAULT_LOGIN_DELAY),
        )?;

        Ok(Self {
            credential: Credential::new(account, password, server_name),
            server,
            backend,
            bridge,
            login,
        })
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
    /// Environment variable cannot be parsed.
    #[error("environment variable {key} has invalid value: {value}")]
    InvalidValue {
        /// Variable name.
        key: String,
        /// Raw value.
        value: String,
    },
    /// Login retry settings are invalid.
    #[error("invalid login retry settings: {0}")]
    LoginPolicy(#[from] RetryPolicyError),
}

fn require<F>(lookup: &F, key: &str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let value = lookup(key).ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))?;
    if value.is_empty() {
        return Err(ConfigError::EmptyValue(key.to_string()));
    }
    Ok(value)
}

fn parse_u16<F>(lookup: &F, key: &str, default: u16) -> u16
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_u32<F>(lookup: &F, key: &str, default: u32) -> u32
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_duration_millis<F>(lookup: &F, key: &str, default: Duration) -> Duration
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .and_then(|v| v.parse::<u64>().ok())
        .map_or(default, Duration::from_millis)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    const REQUIRED: [(&str, &str); 3] = [
        ("TERMINAL_ACCOUNT", "5550001"),
        ("TERMINAL_PASSWORD", "secret"),
        ("TERMINAL_SERVER", "Broker-Demo"),
    ];

    #[test]
    fn defaults_apply() {
        let config = GatewayConfig::from_lookup(lookup_from(&REQUIRED)).unwrap();

        assert_eq!(config.credential.account(), 5_550_001);
        assert_eq!(config.credential.server(), "Broker-Demo");
        assert_eq!(config.server.rpc_addr().to_string(), "127.0.0.1:9090");
        assert_eq!(
            config.server.health_addr().map(|a| a.port()),
            Some(8083)
        );
        assert_eq!(config.server.object_id, DEFAULT_OBJECT_ID);
        assert_eq!(config.backend, TerminalBackend::Bridge);
        assert_eq!(config.bridge.url, "http://127.0.0.1:18812");
        assert_eq!(config.bridge.timeout, Duration::from_secs(10));
        assert_eq!(config.login.attempts(), 3);
        assert_eq!(config.login.delay(), Duration::from_millis(500));
    }

    #[test]
    fn overrides_apply() {
        let mut pairs = REQUIRED.to_vec();
        pairs.extend([
            ("GATEWAY_HOST", "0.0.0.0"),
            ("GATEWAY_RPC_PORT", "19090"),
            ("GATEWAY_HEALTH_PORT", "0"),
            ("GATEWAY_OBJECT_ID", "desk.Gateway"),
            ("GATEWAY_TERMINAL_BACKEND", "SIMULATED"),
            ("GATEWAY_BRIDGE_URL", "http://bridge:9000/"),
            ("GATEWAY_LOGIN_ATTEMPTS", "5"),
            ("GATEWAY_LOGIN_DELAY_MS", "0"),
        ]);
        let config = GatewayConfig::from_lookup(lookup_from(&pairs)).unwrap();

        assert_eq!(config.server.rpc_addr().to_string(), "0.0.0.0:19090");
        assert!(config.server.health_addr().is_none());
        assert_eq!(config.server.object_id, "desk.Gateway");
        assert_eq!(config.backend, TerminalBackend::Simulated);
        assert_eq!(config.bridge.url, "http://bridge:9000");
        assert_eq!(config.login.attempts(), 5);
        assert_eq!(config.login.delay(), Duration::ZERO);
    }

    #[test]
    fn missing_password_is_reported() {
        let err = GatewayConfig::from_lookup(lookup_from(&[
            ("TERMINAL_ACCOUNT", "1"),
            ("TERMINAL_SERVER", "Broker-Demo"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(key) if key == "TERMINAL_PASSWORD"));
    }

    #[test]
    fn empty_server_is_reported() {
        let err = GatewayConfig::from_lookup(lookup_from(&[
            ("TERMINAL_ACCOUNT", "1"),
            ("TERMINAL_PASSWORD", "secret"),
            ("TERMINAL_SERVER", ""),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::EmptyValue(key) if key == "TERMINAL_SERVER"));
    }

    #[test]
    fn non_numeric_account_is_invalid() {
        let err = GatewayConfig::from_lookup(lookup_from(&[
            ("TERMINAL_ACCOUNT", "demo"),
            ("TERMINAL_PASSWORD", "secret"),
            ("TERMINAL_SERVER", "Broker-Demo"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "TERMINAL_ACCOUNT"));
    }

    #[test]
    fn zero_login_attempts_is_rejected() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("GATEWAY_LOGIN_ATTEMPTS", "0"));
        let err = GatewayConfig::from_lookup(lookup_from(&pairs)).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::LoginPolicy(RetryPolicyError::ZeroAttempts)
        ));
    }

    #[test]
    fn backend_parsing() {
        assert_eq!(
            TerminalBackend::from_str_case_insensitive("simulated"),
            TerminalBackend::Simulated
        );
        assert_eq!(
            TerminalBackend::from_str_case_insensitive("bridge"),
            TerminalBackend::Bridge
        );
        assert_eq!(
            TerminalBackend::from_str_case_insensitive("unknown"),
            TerminalBackend::Bridge
        );
    }

    #[test]
    fn config_debug_hides_password() {
        let config = GatewayConfig::from_lookup(lookup_from(&REQUIRED)).unwrap();
        assert!(!format!("{config:?}").contains("secret"));
    }
}
