//! Error taxonomy for the reconciliation core.
//!
//! Every failure here is local and recoverable. Fetch and commit failures are
//! recorded against the region they affect; only [`ConsoleError::Auth`]
//! has a side effect beyond that (the session is expired).

use thiserror::Error;

/// Errors produced by backend calls, the live channel, and the console task.
///
/// Variants carry strings rather than source errors so a failure can be
/// stored in a view region and cloned into snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConsoleError {
    /// The credential was rejected. Forces logout.
    #[error("not authenticated: {0}")]
    Auth(String),

    /// Transport failure (connect, reset, timeout).
    #[error("network error: {0}")]
    Network(String),

    /// The backend refused the request.
    ///
    /// Stale suggestions (bed taken, patient no longer queued) arrive here.
    #[error("rejected by backend ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// A response or push frame could not be decoded.
    #[error("failed to decode {what}: {message}")]
    Decode { what: String, message: String },

    /// Invalid input caught before any request was sent.
    #[error("invalid input: {0}")]
    Invalid(String),

    /// The session is not active (logged out or expired).
    #[error("no active session")]
    NoSession,

    /// The console task is no longer running.
    #[error("console stopped")]
    ConsoleStopped,
}

/// Coarse classification used for display and hints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Credential problems; the operator must log in again.
    Auth,
    /// Everything retryable: transport, decode, rejection.
    Network,
    /// Local problems: bad input, stopped task.
    Local,
}

impl ConsoleError {
    /// Create a decode error.
    pub fn decode(what: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::Decode {
            what: what.into(),
            message: message.to_string(),
        }
    }

    /// Create a rejection error.
    pub fn rejected(status: u16, message: impl Into<String>) -> Self {
        Self::Rejected {
            status,
            message: message.into(),
        }
    }

    /// Returns true if this error must force a logout.
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Auth(_) | Self::NoSession)
    }

    /// Classify the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Auth(_) | Self::NoSession => ErrorKind::Auth,
            Self::Network(_) | Self::Rejected { .. } | Self::Decode { .. } => ErrorKind::Network,
            Self::Invalid(_) | Self::ConsoleStopped => ErrorKind::Local,
        }
    }
}

impl From<reqwest::Error> for ConsoleError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::decode("response body", err)
        } else {
            Self::Network(err.to_string())
        }
    }
}
