//! Unified error type for Authline.

use authline_client::{AuthError, FieldErrors};
use authline_session::{ErrorKind, SessionError};

use crate::TransportError;

/// The error the UI sees.
///
/// Lower layers have their own error enums; they are folded into the
/// handful of outcomes a UI actually reacts to:
///
/// | Variant | UI reaction |
/// |---------|-------------|
/// | `InvalidCredentials` | show the field messages, stay on the form |
/// | `SessionExpired` | drop to the login page (see [`redirect`](crate::redirect)) |
/// | `Network` | "can't reach the server", let the user retry |
/// | `Server` | generic failure |
/// | `Session` | programming error: wrong call for the current state |
///
/// `Clone` because one refresh outcome is delivered to every request
/// that was waiting on it.
#[derive(Debug, Clone, thiserror::Error)]
pub enum AuthlineError {
    #[error("invalid credentials{}", .0.as_suffix())]
    InvalidCredentials(FieldErrors),

    /// A rejected refresh token, a second 401, or local credentials that
    /// could not be read, decoded or written.
    #[error("session expired, sign in again")]
    SessionExpired,

    #[error("network error: {0}")]
    Network(String),

    #[error("server error ({status}): {message}")]
    Server { status: u16, message: String },

    /// The facade was called in a state that does not allow it (login
    /// while signed in, a second concurrent login).
    #[error(transparent)]
    Session(SessionError),
}

impl AuthlineError {
    /// The category recorded on session snapshots. `None` for
    /// [`AuthlineError::Session`], which reports misuse rather than a
    /// failure of the session itself.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            Self::InvalidCredentials(_) => Some(ErrorKind::InvalidCredentials),
            Self::SessionExpired => Some(ErrorKind::SessionExpired),
            Self::Network(_) => Some(ErrorKind::Network),
            Self::Server { .. } => Some(ErrorKind::Server),
            Self::Session(_) => None,
        }
    }

    /// Returns `true` if the UI should send the user to the login page.
    pub fn is_session_expired(&self) -> bool {
        matches!(self, Self::SessionExpired)
    }
}

impl From<AuthError> for AuthlineError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidCredentials(fields) => Self::InvalidCredentials(fields),
            AuthError::RefreshExpired => Self::SessionExpired,
            AuthError::Network(message) => Self::Network(message),
            AuthError::Server { status, message } => Self::Server { status, message },
        }
    }
}

/// Unusable or unstorable credentials end the session; state-machine
/// misuse is passed through.
impl From<SessionError> for AuthlineError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::Token(_) | SessionError::Storage(_) => Self::SessionExpired,
            other @ (SessionError::InvalidTransition { .. } | SessionError::InFlight(_)) => {
                Self::Session(other)
            }
        }
    }
}

impl From<TransportError> for AuthlineError {
    fn from(err: TransportError) -> Self {
        Self::Network(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use authline_session::{OperationKind, SessionStatus};
    use authline_token::TokenError;

    use super::*;

    #[test]
    fn test_from_auth_error_refresh_expired_is_session_expired() {
        let err: AuthlineError = AuthError::RefreshExpired.into();
        assert!(err.is_session_expired());
        assert_eq!(err.kind(), Some(ErrorKind::SessionExpired));
    }

    #[test]
    fn test_from_auth_error_keeps_field_errors() {
        let fields = FieldErrors::from_body(r#"{"detail":"nope"}"#);
        let err: AuthlineError = AuthError::InvalidCredentials(fields.clone()).into();
        assert!(matches!(err, AuthlineError::InvalidCredentials(f) if f == fields));
    }

    #[test]
    fn test_from_auth_error_server_keeps_status() {
        let err: AuthlineError = AuthError::Server {
            status: 502,
            message: "Bad Gateway".into(),
        }
        .into();
        assert_eq!(err.to_string(), "server error (502): Bad Gateway");
    }

    #[test]
    fn test_from_session_error_token_is_session_expired() {
        let err: AuthlineError = SessionError::Token(TokenError::Malformed("x")).into();
        assert!(err.is_session_expired());
    }

    #[test]
    fn test_from_session_error_in_flight_is_passed_through() {
        let err: AuthlineError = SessionError::InFlight(OperationKind::Login).into();
        assert!(matches!(
            err,
            AuthlineError::Session(SessionError::InFlight(OperationKind::Login))
        ));
        assert_eq!(err.kind(), None);
    }

    #[test]
    fn test_from_session_error_invalid_transition_message() {
        let err: AuthlineError = SessionError::InvalidTransition {
            from: SessionStatus::Authenticated,
            event: "begin_login",
        }
        .into();
        assert_eq!(err.to_string(), "cannot begin_login while authenticated");
    }

    #[test]
    fn test_from_transport_error_is_network() {
        let err: AuthlineError = TransportError::Network("connection reset".into()).into();
        assert_eq!(err.kind(), Some(ErrorKind::Network));
        assert!(err.to_string().contains("connection reset"));
    }
}
