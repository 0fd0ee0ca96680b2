//! Plain data describing a session: its status, a snapshot for
//! observers, and the failure kinds it remembers.

use std::fmt;

use authline_token::TokenError;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// SessionStatus
// ---------------------------------------------------------------------------

/// Where the session is in its lifecycle.
///
/// ```text
///                begin_login            complete_login
///   Anonymous ───────────────→ Authenticating ──────────→ Authenticated
///       ↑                          │ fail_login              │     ↑
///       └──────────────────────────┘                 begin_refresh │
///       ↑                                                    ▼     │ complete_refresh
///       └──── fail_refresh / invalidate / logout ──────── Refreshing
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// No credentials.
    Anonymous,
    /// A login request is in flight.
    Authenticating,
    /// Credentials are stored and believed usable.
    Authenticated,
    /// Credentials are stored but the access token needs replacing.
    Refreshing,
}

impl SessionStatus {
    /// Returns `true` for the two statuses that carry a username.
    pub fn is_signed_in(self) -> bool {
        matches!(self, Self::Authenticated | Self::Refreshing)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Anonymous => "anonymous",
            Self::Authenticating => "authenticating",
            Self::Authenticated => "authenticated",
            Self::Refreshing => "refreshing",
        })
    }
}

// ---------------------------------------------------------------------------
// ErrorKind
// ---------------------------------------------------------------------------

/// The category of the last failure a session saw.
///
/// Kept on the snapshot so a UI can explain why it is showing the login
/// form ("your session expired") without holding on to the error itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Username/password (or signup fields) rejected.
    InvalidCredentials,
    /// The refresh token was rejected.
    RefreshExpired,
    /// The session can no longer be used; sign in again.
    SessionExpired,
    /// The server could not be reached, or took too long.
    Network,
    /// The server answered with a 5xx or an unusable body.
    Server,
    /// A token was not a decodable JWT.
    MalformedToken,
    /// A token decoded but lacked `exp` or a subject.
    ClaimsMissing,
}

impl From<&TokenError> for ErrorKind {
    fn from(err: &TokenError) -> Self {
        match err {
            TokenError::Malformed(_) => Self::MalformedToken,
            TokenError::ClaimsMissing(_) => Self::ClaimsMissing,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::InvalidCredentials => "invalid credentials",
            Self::RefreshExpired => "refresh token expired",
            Self::SessionExpired => "session expired",
            Self::Network => "network error",
            Self::Server => "server error",
            Self::MalformedToken => "malformed token",
            Self::ClaimsMissing => "token claims missing",
        })
    }
}

// ---------------------------------------------------------------------------
// OperationKind
// ---------------------------------------------------------------------------

/// The network operations that may only run once at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Login,
    Refresh,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Login => "login",
            Self::Refresh => "refresh",
        })
    }
}

// ---------------------------------------------------------------------------
// SessionSnapshot
// ---------------------------------------------------------------------------

/// A point-in-time copy of the session, handed to observers and the UI.
///
/// `username` is `Some` exactly when `status` is `Authenticated` or
/// `Refreshing`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub status: SessionStatus,
    pub username: Option<String>,
    pub last_error: Option<ErrorKind>,
}

impl SessionSnapshot {
    /// Convenience for `status.is_signed_in()`.
    pub fn is_authenticated(&self) -> bool {
        self.status.is_signed_in()
    }
}
