//! Error types for the session layer.

use std::sync::Arc;

use authline_store::StoreError;
use authline_token::TokenError;

use crate::{OperationKind, SessionStatus};

/// Errors returned by [`SessionState`](crate::SessionState) transitions.
///
/// `Clone` so one failed refresh can be handed to every caller that was
/// waiting on it; the store error sits behind an `Arc` for that reason.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SessionError {
    /// The event is not allowed in the current status. Nothing changed.
    #[error("cannot {event} while {from}")]
    InvalidTransition {
        from: SessionStatus,
        event: &'static str,
    },

    /// The server issued an access token that cannot be decoded. The
    /// session has been reset to anonymous.
    #[error("received an unusable access token: {0}")]
    Token(#[from] TokenError),

    /// The new credentials could not be persisted. The session has been
    /// reset to anonymous.
    #[error("failed to persist credentials: {0}")]
    Storage(#[source] Arc<StoreError>),

    /// The same operation is already running; wait for it instead.
    #[error("a {0} is already in progress")]
    InFlight(OperationKind),
}

impl From<StoreError> for SessionError {
    fn from(err: StoreError) -> Self {
        Self::Storage(Arc::new(err))
    }
}
