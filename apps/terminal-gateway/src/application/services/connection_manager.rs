//! Connection Manager
//!
//! Owns the single terminal session and serializes every native call made
//! against it. Callers take a [`SessionGuard`] with [`ConnectionManager::lock`]
//! and hold it for the whole of a check-then-call sequence, so no two native
//! calls are ever in flight at once.
//!
//! A status snapshot is published on every state change and can be read
//! without waiting for the lock, which keeps health probes responsive while a
//! long-running terminal call holds the session.

use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::{Mutex, MutexGuard};

use crate::application::ports::TerminalPort;
use crate::domain::session::{Credential, Session, SessionState, SessionStatus};
use crate::error::GatewayError;
use crate::infrastructure::metrics;
use crate::resilience::{RetryMessages, RetryPolicy, RetryTiers, retry_tiered, retry_until_valid};

const INITIALIZE_MESSAGES: RetryMessages<'static> = RetryMessages::new(
    "initialize",
    "Terminal initialize failed, retrying",
    "Terminal initialize failed after all attempts",
);

/// Whether a lifecycle call changed the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateChange {
    /// The session moved to a new state.
    Applied,
    /// The session was already in the requested state.
    NoOp,
}

/// Manager of the terminal session lifecycle.
pub struct ConnectionManager {
    terminal: Arc<dyn TerminalPort>,
    session: Mutex<Option<Session>>,
    status: RwLock<SessionStatus>,
    connect_tiers: RetryTiers,
    login_policy: RetryPolicy,
}

impl ConnectionManager {
    /// Create a manager with no session.
    #[must_use]
    pub fn new(
        terminal: Arc<dyn TerminalPort>,
        connect_tiers: RetryTiers,
        login_policy: RetryPolicy,
    ) -> Self {
        metrics::set_session_state(SessionState::Uninitialized);
        Self {
            terminal,
            session: Mutex::new(None),
            status: RwLock::new(SessionStatus::default()),
            connect_tiers,
            login_policy,
        }
    }

    /// Latest published session status. Does not wait for the session lock.
    #[must_use]
    pub fn status(&self) -> SessionStatus {
        self.status.read().clone()
    }

    /// Latest published session state. Does not wait for the session lock.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.status.read().state
    }

    /// Take exclusive access to the session.
    pub async fn lock(&self) -> SessionGuard<'_> {
        SessionGuard {
            manager: self,
            session: self.session.lock().await,
        }
    }

    /// Establish the terminal session. See [`SessionGuard::initialize`].
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Connection`] if every retry tier fails.
    pub async fn initialize(&self) -> Result<StateChange, GatewayError> {
        self.lock().await.initialize().await
    }

    /// Log in to the terminal. See [`SessionGuard::authenticate`].
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Precondition`] without a session, or
    /// [`GatewayError::Authentication`] if the credential is rejected.
    pub async fn authenticate(
        &self,
        credential: Arc<Credential>,
    ) -> Result<StateChange, GatewayError> {
        self.lock().await.authenticate(credential).await
    }

    /// Close the terminal session. See [`SessionGuard::shutdown`].
    pub async fn shutdown(&self) -> StateChange {
        self.lock().await.shutdown().await
    }

    fn publish(&self, session: Option<&Session>) {
        let status = SessionStatus::from_session(session);
        metrics::set_session_state(status.state);
        *self.status.write() = status;
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("status", &*self.status.read())
            .field("connect_tiers", &self.connect_tiers)
            .field("login_policy", &self.login_policy)
            .finish_non_exhaustive()
    }
}

/// Exclusive access to the terminal session.
///
/// Every native call goes through a guard; dropping it lets the next caller
/// in.
pub struct SessionGuard<'a> {
    manager: &'a ConnectionManager,
    session: MutexGuard<'a, Option<Session>>,
}

impl SessionGuard<'_> {
    /// Current session state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.session
            .as_ref()
            .map_or(SessionState::Uninitialized, Session::state)
    }

    /// Current session status.
    #[must_use]
    pub fn status(&self) -> SessionStatus {
        SessionStatus::from_session(self.session.as_ref())
    }

    /// Terminal handle for a native call.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Precondition`] unless a session is open.
    pub fn terminal(&self, operation: &'static str) -> Result<&dyn TerminalPort, GatewayError> {
        let state = self.state();
        if state.is_connected() {
            Ok(&*self.manager.terminal)
        } else {
            Err(GatewayError::Precondition { operation, state })
        }
    }

    /// Establish the terminal session, retrying over the connect tiers.
    ///
    /// A no-op when a session is already open.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Connection`] with the native error of the
    /// final attempt. The session stays `Uninitialized`.
    #[tracing::instrument(skip(self))]
    pub async fn initialize(&mut self) -> Result<StateChange, GatewayError> {
        if self.session.is_some() {
            tracing::debug!(state = %self.state(), "Session already initialized");
            return Ok(StateChange::NoOp);
        }

        let terminal = &*self.manager.terminal;
        retry_tiered(&self.manager.connect_tiers, &INITIALIZE_MESSAGES, move || {
            metrics::record_retry_attempt("initialize");
            terminal.initialize()
        })
        .await
        .map_err(GatewayError::Connection)?;

        *self.session = Some(Session::open());
        self.manager.publish(self.session.as_ref());
        tracing::info!("Terminal session initialized");
        Ok(StateChange::Applied)
    }

    /// Log in to the terminal with `credential`.
    ///
    /// Valid only from `Initialized`. Each attempt is a single native call;
    /// rejected attempts are retried under the login policy.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Precondition`] unless the session is
    /// `Initialized`, or [`GatewayError::Authentication`] if every attempt is
    /// rejected. A rejected login leaves the session `Initialized`.
    #[tracing::instrument(skip_all, fields(account = credential.account()))]
    pub async fn authenticate(
        &mut self,
        credential: Arc<Credential>,
    ) -> Result<StateChange, GatewayError> {
        let state = self.state();
        if state != SessionState::Initialized {
            return Err(GatewayError::Precondition {
                operation: "authenticate",
                state,
            });
        }

        let terminal = self.terminal("authenticate")?;
        let login_credential: &Credential = &credential;

        let outcome = retry_until_valid(
            &self.manager.login_policy,
            "authenticate",
            Result::is_ok,
            move || {
                metrics::record_retry_attempt("authenticate");
                terminal.login(login_credential)
            },
        )
        .await
        .into_inner();

        let Some(session) = self.session.as_mut() else {
            return Err(GatewayError::Precondition {
                operation: "authenticate",
                state: SessionState::Uninitialized,
            });
        };

        match outcome {
            Ok(()) => {
                session.mark_authenticated(Arc::clone(&credential));
                self.manager.publish(self.session.as_ref());
                tracing::info!(server = credential.server(), "Terminal session authenticated");
                Ok(StateChange::Applied)
            }
            Err(native) => {
                tracing::warn!(code = native.code, "Terminal login rejected");
                Err(GatewayError::Authentication {
                    account: credential.account(),
                    native,
                })
            }
        }
    }

    /// Close the terminal session. A no-op without one.
    #[tracing::instrument(skip(self))]
    pub async fn shutdown(&mut self) -> StateChange {
        if self.session.is_none() {
            return StateChange::NoOp;
        }

        self.manager.terminal.shutdown().await;
        *self.session = None;
        self.manager.publish(None);
        tracing::info!("Terminal session closed");
        StateChange::Applied
    }
}

impl std::fmt::Debug for SessionGuard<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionGuard")
            .field("session", &*self.session)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::application::ports::{MockTerminalPort, NativeError};

    fn credential() -> Arc<Credential> {
        Arc::new(Credential::new(
            5_550_001,
            "secret".to_string(),
            "Broker-Demo".to_string(),
        ))
    }

    fn fast_tiers() -> RetryTiers {
        RetryTiers::new(vec![
            RetryPolicy::new(1, Duration::ZERO).unwrap(),
            RetryPolicy::new(1, Duration::ZERO).unwrap(),
        ])
        .unwrap()
    }

    fn manager(terminal: MockTerminalPort) -> ConnectionManager {
        ConnectionManager::new(
            Arc::new(terminal),
            fast_tiers(),
            RetryPolicy::new(3, Duration::ZERO).unwrap(),
        )
    }

    #[tokio::test]
    async fn initialize_opens_session() {
        let mut terminal = MockTerminalPort::new();
        terminal.expect_initialize().times(1).returning(|| Ok(()));
        let manager = manager(terminal);

        assert_eq!(manager.initialize().await, Ok(StateChange::Applied));
        assert_eq!(manager.state(), SessionState::Initialized);
        assert!(manager.status().opened_at.is_some());
    }

    #[tokio::test]
    async fn initialize_twice_is_noop() {
        let mut terminal = MockTerminalPort::new();
        terminal.expect_initialize().times(1).returning(|| Ok(()));
        let manager = manager(terminal);

        assert_eq!(manager.initialize().await, Ok(StateChange::Applied));
        assert_eq!(manager.initialize().await, Ok(StateChange::NoOp));
    }

    #[tokio::test]
    async fn initialize_failure_reports_final_native_error() {
        let mut terminal = MockTerminalPort::new();
        // Two tiers of one guarded attempt plus one unguarded attempt each.
        terminal
            .expect_initialize()
            .times(4)
            .returning(|| Err(NativeError::init_fail("IPC initialize failed")));
        let manager = manager(terminal);

        let err = manager.initialize().await.unwrap_err();
        assert_eq!(
            err,
            GatewayError::Connection(NativeError::init_fail("IPC initialize failed"))
        );
        assert_eq!(manager.state(), SessionState::Uninitialized);
    }

    #[tokio::test]
    async fn initialize_recovers_in_later_tier() {
        let mut terminal = MockTerminalPort::new();
        let mut seq = mockall::Sequence::new();
        terminal
            .expect_initialize()
            .times(2)
            .in_sequence(&mut seq)
            .returning(|| Err(NativeError::connect_fail("No connection")));
        terminal
            .expect_initialize()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Ok(()));
        let manager = manager(terminal);

        assert_eq!(manager.initialize().await, Ok(StateChange::Applied));
    }

    #[tokio::test]
    async fn authenticate_requires_session() {
        let mut terminal = MockTerminalPort::new();
        terminal.expect_login().never();
        let manager = manager(terminal);

        let err = manager.authenticate(credential()).await.unwrap_err();
        assert_eq!(
            err,
            GatewayError::Precondition {
                operation: "authenticate",
                state: SessionState::Uninitialized,
            }
        );
    }

    #[tokio::test]
    async fn authenticate_success() {
        let mut terminal = MockTerminalPort::new();
        terminal.expect_initialize().returning(|| Ok(()));
        terminal
            .expect_login()
            .withf(|c| c.account() == 5_550_001 && c.server() == "Broker-Demo")
            .times(1)
            .returning(|_| Ok(()));
        let manager = manager(terminal);

        manager.initialize().await.unwrap();
        assert_eq!(
            manager.authenticate(credential()).await,
            Ok(StateChange::Applied)
        );

        let status = manager.status();
        assert_eq!(status.state, SessionState::Authenticated);
        assert_eq!(status.account, Some(5_550_001));
    }

    #[tokio::test]
    async fn authenticate_retries_rejected_login() {
        let mut terminal = MockTerminalPort::new();
        terminal.expect_initialize().returning(|| Ok(()));
        let mut seq = mockall::Sequence::new();
        terminal
            .expect_login()
            .times(2)
            .in_sequence(&mut seq)
            .returning(|_| Err(NativeError::timeout("Terminal busy")));
        terminal
            .expect_login()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        let manager = manager(terminal);

        manager.initialize().await.unwrap();
        assert!(manager.authenticate(credential()).await.is_ok());
        assert_eq!(manager.state(), SessionState::Authenticated);
    }

    #[tokio::test]
    async fn rejected_login_stays_initialized() {
        let mut terminal = MockTerminalPort::new();
        terminal.expect_initialize().returning(|| Ok(()));
        terminal
            .expect_login()
            .times(3)
            .returning(|_| Err(NativeError::auth_failed("Authorization failed")));
        let manager = manager(terminal);

        manager.initialize().await.unwrap();
        let err = manager.authenticate(credential()).await.unwrap_err();
        assert_eq!(
            err,
            GatewayError::Authentication {
                account: 5_550_001,
                native: NativeError::auth_failed("Authorization failed"),
            }
        );
        assert_eq!(manager.state(), SessionState::Initialized);
    }

    #[tokio::test]
    async fn authenticate_from_authenticated_is_denied() {
        let mut terminal = MockTerminalPort::new();
        terminal.expect_initialize().returning(|| Ok(()));
        terminal.expect_login().times(1).returning(|_| Ok(()));
        let manager = manager(terminal);

        manager.initialize().await.unwrap();
        manager.authenticate(credential()).await.unwrap();

        let err = manager.authenticate(credential()).await.unwrap_err();
        assert_eq!(
            err,
            GatewayError::Precondition {
                operation: "authenticate",
                state: SessionState::Authenticated,
            }
        );
        let status = manager.status();
        assert_eq!(status.state, SessionState::Authenticated);
        assert_eq!(status.account, Some(5_550_001));
    }

    #[tokio::test]
    async fn shutdown_is_idempotent() {
        let mut terminal = MockTerminalPort::new();
        terminal.expect_initialize().times(2).returning(|| Ok(()));
        terminal.expect_shutdown().times(1).returning(|| ());
        let manager = manager(terminal);

        assert_eq!(manager.shutdown().await, StateChange::NoOp);
        manager.initialize().await.unwrap();
        assert_eq!(manager.shutdown().await, StateChange::Applied);
        assert_eq!(manager.shutdown().await, StateChange::NoOp);
        assert_eq!(manager.state(), SessionState::Uninitialized);

        assert_eq!(manager.initialize().await, Ok(StateChange::Applied));
    }

    #[tokio::test]
    async fn guard_denies_terminal_without_session() {
        let manager = manager(MockTerminalPort::new());
        let guard = manager.lock().await;

        assert!(matches!(
            guard.terminal("accountInfo"),
            Err(GatewayError::Precondition {
                operation: "accountInfo",
                state: SessionState::Uninitialized,
            })
        ));
    }

    #[tokio::test]
    async fn status_readable_while_locked() {
        let mut terminal = MockTerminalPort::new();
        terminal.expect_initialize().returning(|| Ok(()));
        let manager = manager(terminal);
        manager.initialize().await.unwrap();

        let _guard = manager.lock().await;
        assert_eq!(manager.state(), SessionState::Initialized);
    }
}
