//! Session context: the credential and operator identity for the process.
//!
//! A [`SessionContext`] is created once (after login, or restored from the
//! credential store at startup) and handed to every component that talks to
//! the backend. It is never read from ambient global state.
//!
//! Lifecycle:
//!
//! ```text
//! establish / restore -> Active -> expire (AuthError) -> Expired
//!                              \-> logout             -> LoggedOut
//! ```
//!
//! Both terminal transitions clear the persisted credential.

use std::sync::Arc;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{info, warn};

use crate::error::ConsoleError;

/// Operator role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Manager,
    Nurse,
    #[serde(other)]
    Unknown,
}

impl Role {
    /// Forecasts and what-if simulations are limited to planning roles.
    pub fn is_planner(&self) -> bool {
        matches!(self, Self::Admin | Self::Manager)
    }

    /// Nurses land on triage; everyone else on the dashboard.
    pub fn prefers_triage(&self) -> bool {
        matches!(self, Self::Nurse)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Admin => "admin",
            Self::Manager => "manager",
            Self::Nurse => "nurse",
            Self::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Response from `POST /api/auth/login`.
#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    pub role: Role,
    pub name: String,
}

/// Minimal operator profile kept alongside the token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub name: String,
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// What survives a process restart.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredSession {
    pub token: String,
    pub profile: UserProfile,
}

/// Persistence for the credential. Implemented by the CLI on top of a file.
pub trait CredentialStore: Send + Sync + 'static {
    fn load(&self) -> Result<Option<StoredSession>>;
    fn save(&self, session: &StoredSession) -> Result<()>;
    fn clear(&self) -> Result<()>;
}

/// Session lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Active,
    /// The backend rejected the credential.
    Expired,
    /// The operator logged out.
    LoggedOut,
}

struct SessionInner {
    token: String,
    profile: UserProfile,
    state: watch::Sender<SessionState>,
    store: Arc<dyn CredentialStore>,
}

/// Cloneable handle to the process-wide session.
#[derive(Clone)]
pub struct SessionContext {
    inner: Arc<SessionInner>,
}

impl std::fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionContext")
            .field("profile", &self.inner.profile)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl SessionContext {
    /// Start a session after a successful login and persist it.
    pub fn establish(
        login: LoginResponse,
        email: Option<String>,
        store: Arc<dyn CredentialStore>,
    ) -> Result<Self> {
        let stored = StoredSession {
            token: login.access_token,
            profile: UserProfile {
                name: login.name,
                role: login.role,
                email,
            },
        };
        store.save(&stored)?;

        info!(name = %stored.profile.name, role = %stored.profile.role, "Session established");
        Ok(Self::from_stored(stored, store))
    }

    /// Restore a session persisted by an earlier process, if any.
    pub fn restore(store: Arc<dyn CredentialStore>) -> Result<Option<Self>> {
        Ok(store
            .load()?
            .map(|stored| Self::from_stored(stored, store)))
    }

    /// Build a session without touching the store. Used by tests and tools
    /// that receive a token out of band.
    pub fn from_stored(stored: StoredSession, store: Arc<dyn CredentialStore>) -> Self {
        let (state, _) = watch::channel(SessionState::Active);
        Self {
            inner: Arc::new(SessionInner {
                token: stored.token,
                profile: stored.profile,
                state,
                store,
            }),
        }
    }

    pub fn profile(&self) -> &UserProfile {
        &self.inner.profile
    }

    pub fn state(&self) -> SessionState {
        *self.inner.state.borrow()
    }

    pub fn is_active(&self) -> bool {
        self.state() == SessionState::Active
    }

    /// The bearer token, while the session is active.
    pub fn token(&self) -> Result<&str, ConsoleError> {
        if self.is_active() {
            Ok(&self.inner.token)
        } else {
            Err(ConsoleError::NoSession)
        }
    }

    /// Watch lifecycle transitions.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.inner.state.subscribe()
    }

    /// Force logout after the backend rejected the credential.
    pub fn expire(&self) {
        if self.transition(SessionState::Expired) {
            warn!(name = %self.inner.profile.name, "Credential rejected, session expired");
            self.clear_store();
        }
    }

    /// Explicit logout.
    pub fn logout(&self) -> Result<()> {
        if self.transition(SessionState::LoggedOut) {
            info!(name = %self.inner.profile.name, "Logged out");
        }
        self.inner.store.clear()
    }

    /// Inspect an error on its way out; expire the session if it is an auth failure.
    pub fn observe<T>(&self, result: Result<T, ConsoleError>) -> Result<T, ConsoleError> {
        if let Err(ConsoleError::Auth(_)) = &result {
            self.expire();
        }
        result
    }

    fn transition(&self, next: SessionState) -> bool {
        self.inner.state.send_if_modified(|state| {
            if *state == SessionState::Active {
                *state = next;
                true
            } else {
                false
            }
        })
    }

    fn clear_store(&self) {
        if let Err(e) = self.inner.store.clear() {
            warn!(error = %e, "Failed to clear stored credential");
        }
    }
}

/// Credential store that keeps nothing. Useful for one-shot tokens.
#[derive(Debug, Default)]
pub struct EphemeralStore;

impl CredentialStore for EphemeralStore {
    fn load(&self) -> Result<Option<StoredSession>> {
        Ok(None)
    }

    fn save(&self, _session: &StoredSession) -> Result<()> {
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        Ok(())
    }
}
