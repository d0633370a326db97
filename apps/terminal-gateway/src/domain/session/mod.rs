//! Terminal Session Types
//!
//! The session is the single live connection to the trading terminal.
//! Its lifecycle only moves forward (`Uninitialized` → `Initialized` →
//! `Authenticated`) except for an explicit shutdown, which returns it to
//! `Uninitialized` and allows a fresh initialize.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use zeroize::{Zeroize, ZeroizeOnDrop};

// =============================================================================
// Session State
// =============================================================================

/// Lifecycle state of the terminal session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
    /// No session exists.
    #[default]
    Uninitialized,
    /// Terminal connection established, no account logged in.
    Initialized,
    /// Terminal connection established and account logged in.
    Authenticated,
}

impl SessionState {
    /// Whether native terminal calls may be issued in this state.
    #[must_use]
    pub const fn is_connected(&self) -> bool {
        matches!(self, Self::Initialized | Self::Authenticated)
    }

    /// State name as used in logs and health output.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Initialized => "initialized",
            Self::Authenticated => "authenticated",
        }
    }

    /// Numeric level for gauges (0, 1, 2).
    #[must_use]
    pub const fn level(&self) -> u8 {
        match self {
            Self::Uninitialized => 0,
            Self::Initialized => 1,
            Self::Authenticated => 2,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Credential
// =============================================================================

/// Account credential used to authenticate the session.
///
/// Write-once: there are no setters. The secret is wiped from memory when the
/// last handle is dropped.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Credential {
    account: u64,
    password: String,
    server: String,
}

impl Credential {
    /// Create a new credential.
    #[must_use]
    pub const fn new(account: u64, password: String, server: String) -> Self {
        Self {
            account,
            password,
            server,
        }
    }

    /// Account identifier.
    #[must_use]
    pub const fn account(&self) -> u64 {
        self.account
    }

    /// Account secret.
    #[must_use]
    pub fn password(&self) -> &str {
        &self.password
    }

    /// Server (realm) name.
    #[must_use]
    pub fn server(&self) -> &str {
        &self.server
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("account", &self.account)
            .field("password", &"[REDACTED]")
            .field("server", &self.server)
            .finish()
    }
}

// =============================================================================
// Session
// =============================================================================

/// A live terminal session.
///
/// Only constructed by the connection manager after a successful initialize;
/// dropping it is how the session returns to `Uninitialized`.
#[derive(Debug)]
pub struct Session {
    state: SessionState,
    credential: Option<Arc<Credential>>,
    opened_at: DateTime<Utc>,
}

impl Session {
    /// Open a session in the `Initialized` state.
    #[must_use]
    pub fn open() -> Self {
        Self {
            state: SessionState::Initialized,
            credential: None,
            opened_at: Utc::now(),
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// Credential the session is authenticated with, if any.
    #[must_use]
    pub fn credential(&self) -> Option<&Credential> {
        self.credential.as_deref()
    }

    /// When the terminal connection was established.
    #[must_use]
    pub const fn opened_at(&self) -> DateTime<Utc> {
        self.opened_at
    }

    /// Record a successful login.
    pub fn mark_authenticated(&mut self, credential: Arc<Credential>) {
        self.credential = Some(credential);
        self.state = SessionState::Authenticated;
    }
}

// =============================================================================
// Session Status
// =============================================================================

/// Published view of the session, readable without the session lock.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SessionStatus {
    /// Lifecycle state.
    pub state: SessionState,
    /// Logged-in account, if authenticated.
    pub account: Option<u64>,
    /// Server of the logged-in account, if authenticated.
    pub server: Option<String>,
    /// When the current session was opened.
    pub opened_at: Option<DateTime<Utc>>,
}

impl SessionStatus {
    /// Build the published view from an optional live session.
    #[must_use]
    pub fn from_session(session: Option<&Session>) -> Self {
        session.map_or_else(Self::default, |session| Self {
            state: session.state(),
            account: session.credential().map(Credential::account),
            server: session.credential().map(|c| c.server().to_string()),
            opened_at: Some(session.opened_at()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credential() -> Credential {
        Credential::new(1_000_042, "hunter2".to_string(), "Demo-Server".to_string())
    }

    #[test]
    fn credential_debug_is_redacted() {
        let debug = format!("{:?}", credential());
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("[REDACTED]"));
        assert!(debug.contains("1000042"));
    }

    #[test]
    fn session_opens_initialized() {
        let session = Session::open();
        assert_eq!(session.state(), SessionState::Initialized);
        assert!(session.credential().is_none());
    }

    #[test]
    fn session_login() {
        let mut session = Session::open();
        session.mark_authenticated(Arc::new(credential()));
        assert_eq!(session.state(), SessionState::Authenticated);
        assert_eq!(session.credential().map(Credential::account), Some(1_000_042));
    }

    #[test]
    fn status_without_session_is_uninitialized() {
        let status = SessionStatus::from_session(None);
        assert_eq!(status.state, SessionState::Uninitialized);
        assert!(status.account.is_none());
    }

    #[test]
    fn status_reflects_authenticated_session() {
        let mut session = Session::open();
        session.mark_authenticated(Arc::new(credential()));
        let status = SessionStatus::from_session(Some(&session));
        assert_eq!(status.state, SessionState::Authenticated);
        assert_eq!(status.account, Some(1_000_042));
        assert_eq!(status.server.as_deref(), Some("Demo-Server"));
    }

    #[test]
    fn state_serializes_screaming() {
        assert_eq!(
            serde_json::to_string(&SessionState::Authenticated).unwrap(),
            "\"AUTHENTICATED\""
        );
        assert!(SessionState::Initialized.is_connected());
        assert!(!SessionState::Uninitialized.is_connected());
    }
}
