//! The auth API seam.

use std::fmt;
use std::future::Future;

use authline_store::TokenPair;
use serde::Serialize;

use crate::AuthError;

/// The token endpoints as the client sees them.
///
/// Implementations make exactly one attempt per call. Deciding whether to
/// try again is the caller's job.
///
/// # Trait bounds
///
/// `Send + Sync + 'static` so one instance can be shared by every task
/// that dispatches requests, including a refresh task spawned off the
/// caller's own.
pub trait AuthApi: Send + Sync + 'static {
    /// Exchanges a username and password for a token pair.
    ///
    /// # Errors
    /// - [`AuthError::InvalidCredentials`]: the server rejected the
    ///   credentials (any 4xx), with its field messages
    /// - [`AuthError::Network`]: no usable response
    /// - [`AuthError::Server`]: 5xx, or a 2xx without both tokens
    fn obtain(
        &self,
        username: &str,
        password: &str,
    ) -> impl Future<Output = Result<TokenPair, AuthError>> + Send;

    /// Exchanges a refresh token for a new pair.
    ///
    /// If the server does not rotate refresh tokens, the returned pair
    /// carries `refresh_token` unchanged.
    ///
    /// # Errors
    /// - [`AuthError::RefreshExpired`]: 4xx. The refresh token is dead;
    ///   do not try it again.
    /// - [`AuthError::Network`] / [`AuthError::Server`]: as for `obtain`
    fn refresh(
        &self,
        refresh_token: &str,
    ) -> impl Future<Output = Result<TokenPair, AuthError>> + Send;

    /// Creates an account. Success does not sign anybody in.
    ///
    /// # Errors
    /// [`AuthError::InvalidCredentials`] carries the server's per-field
    /// complaints (username taken, password too short).
    fn register(
        &self,
        account: &NewAccount,
    ) -> impl Future<Output = Result<(), AuthError>> + Send;
}

/// A signup request.
#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct NewAccount {
    pub username: String,
    pub password: String,
    pub email: String,
}

impl NewAccount {
    pub fn new(
        username: impl Into<String>,
        password: impl Into<String>,
        email: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            email: email.into(),
        }
    }
}

impl fmt::Debug for NewAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NewAccount")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("email", &self.email)
            .finish()
    }
}
