//! Error types for the auth client.

use authline_session::ErrorKind;

use crate::FieldErrors;

/// How an auth call failed.
///
/// `Clone` because one refresh failure is reported to every caller that
/// was waiting on that refresh.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    /// The server rejected what was submitted. Recoverable: show the
    /// messages next to the form fields.
    #[error("invalid credentials{}", .0.as_suffix())]
    InvalidCredentials(FieldErrors),

    /// The refresh token was rejected. The session is over.
    #[error("refresh token rejected")]
    RefreshExpired,

    /// Connect failure, dropped connection or timeout.
    #[error("network error: {0}")]
    Network(String),

    /// 5xx, or a response that could not be used.
    #[error("server error ({status}): {message}")]
    Server { status: u16, message: String },
}

impl AuthError {
    /// The category recorded on the session for this failure.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidCredentials(_) => ErrorKind::InvalidCredentials,
            Self::RefreshExpired => ErrorKind::RefreshExpired,
            Self::Network(_) => ErrorKind::Network,
            Self::Server { .. } => ErrorKind::Server,
        }
    }
}
