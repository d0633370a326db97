//! Application Context
//!
//! Built once at process start. Owns the connection manager, and through it
//! the only terminal session of the process, together with the credential.
//! Everything that needs the session gets it from here.

use std::sync::Arc;

use crate::application::ports::TerminalPort;
use crate::application::services::{ConnectionManager, StateChange, TradingGateway};
use crate::domain::session::{Credential, SessionState};
use crate::error::GatewayError;
use crate::infrastructure::terminal::{BridgeTerminal, SimulatedTerminal, TerminalError};
use crate::resilience::{RetryPolicy, RetryTiers};

use super::{GatewayConfig, TerminalBackend};

/// Wired application components.
#[derive(Debug)]
pub struct GatewayContext {
    connections: Arc<ConnectionManager>,
    gateway: TradingGateway,
    credential: Arc<Credential>,
}

impl GatewayContext {
    /// Wire the context over an already constructed terminal adapter.
    #[must_use]
    pub fn new(
        terminal: Arc<dyn TerminalPort>,
        credential: Credential,
        connect_tiers: RetryTiers,
        login_policy: RetryPolicy,
    ) -> Self {
        let connections = Arc::new(ConnectionManager::new(
            terminal,
            connect_tiers,
            login_policy,
        ));
        Self {
            gateway: TradingGateway::new(Arc::clone(&connections)),
            connections,
            credential: Arc::new(credential),
        }
    }

    /// Wire the context from configuration, building the selected terminal
    /// adapter.
    ///
    /// # Errors
    ///
    /// Returns an error if the bridge client cannot be built.
    pub fn from_config(config: &GatewayConfig) -> Result<Self, TerminalError> {
        let terminal: Arc<dyn TerminalPort> = match config.backend {
            TerminalBackend::Bridge => Arc::new(BridgeTerminal::new(
                config.bridge.url.clone(),
                config.bridge.timeout,
            )?),
            TerminalBackend::Simulated => Arc::new(SimulatedTerminal::new()),
        };

        Ok(Self::new(
            terminal,
            config.credential.clone(),
            RetryTiers::default(),
            config.login,
        ))
    }

    /// Get the connection manager.
    #[must_use]
    pub fn connections(&self) -> Arc<ConnectionManager> {
        Arc::clone(&self.connections)
    }

    /// Get the RPC facade.
    #[must_use]
    pub fn gateway(&self) -> TradingGateway {
        self.gateway.clone()
    }

    /// Initialize the session and log in with the configured credential.
    /// An already authenticated session is left as it is.
    ///
    /// # Errors
    ///
    /// Returns the first lifecycle error.
    pub async fn start(&self) -> Result<(), GatewayError> {
        let mut session = self.connections.lock().await;
        session.initialize().await?;
        if session.state() == SessionState::Initialized {
            session.authenticate(Arc::clone(&self.credential)).await?;
        }
        Ok(())
    }

    /// Close the session, waiting for any in-flight session operation.
    pub async fn close(&self) -> StateChange {
        self.connections.shutdown().await
    }
}
