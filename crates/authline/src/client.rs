//! `SessionClient`: the facade UI code talks to, and its builder.

use std::sync::Arc;

use authline_client::{AuthApi, AuthError, HttpAuthClient, NewAccount};
use authline_session::{
    ErrorKind, Join, OperationKind, SessionError, SessionSnapshot, SessionState,
    SessionStatus, SubscriptionId,
};
use authline_store::{CredentialStore, StorageBackend};
use authline_token::{Clock, SystemClock};

use crate::{
    ApiRequest, ApiResponse, ApiTransport, AuthlineConfig, AuthlineError, Dispatcher,
    ReqwestTransport,
};

/// Builder for a [`SessionClient`].
///
/// # Example
///
/// ```rust,no_run
/// use authline::prelude::*;
///
/// # fn main() -> Result<(), AuthlineError> {
/// let client = SessionClient::builder()
///     .config(AuthlineConfig::with_base_url("https://games.example"))
///     .build_http(MemoryStorage::new())?;
/// # Ok(())
/// # }
/// ```
pub struct SessionClientBuilder {
    config: AuthlineConfig,
    clock: Arc<dyn Clock>,
}

impl SessionClientBuilder {
    /// Default config, wall clock.
    pub fn new() -> Self {
        Self {
            config: AuthlineConfig::default(),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn config(mut self, config: AuthlineConfig) -> Self {
        self.config = config;
        self
    }

    /// Replaces the clock used for expiry checks.
    pub fn clock(mut self, clock: impl Clock) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Restores the session from `storage` and wires it to `auth` and
    /// `transport`.
    pub fn build<B, A, T>(self, storage: B, auth: A, transport: T) -> SessionClient<B, A, T>
    where
        B: StorageBackend,
        A: AuthApi,
        T: ApiTransport,
    {
        let session = Arc::new(SessionState::restore(
            CredentialStore::new(storage),
            self.clock,
        ));
        let snapshot = session.snapshot();
        tracing::debug!(status = %snapshot.status, "session client ready");
        SessionClient {
            dispatcher: Dispatcher::new(session, auth, transport, self.config),
        }
    }

    /// Like [`build`](Self::build) with the HTTP implementations, both
    /// bounded by the configured request timeout.
    pub fn build_http<B: StorageBackend>(
        self,
        storage: B,
    ) -> Result<SessionClient<B, HttpAuthClient, ReqwestTransport>, AuthlineError> {
        let timeout = self.config.request_timeout();
        let auth = HttpAuthClient::new(self.config.endpoints.clone(), timeout)?;
        let transport = ReqwestTransport::new(self.config.api_base_url(), timeout)?;
        Ok(self.build(storage, auth, transport))
    }
}

impl Default for SessionClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// The UI-facing session API.
///
/// Login, signup and logout drive the session; `send` makes protected
/// calls; `subscribe` and `snapshot` tell the UI what to render. Token
/// material never comes out of this type.
pub struct SessionClient<B: StorageBackend, A: AuthApi, T: ApiTransport> {
    dispatcher: Dispatcher<B, A, T>,
}

impl<B: StorageBackend, A: AuthApi, T: ApiTransport> Clone for SessionClient<B, A, T> {
    fn clone(&self) -> Self {
        Self {
            dispatcher: self.dispatcher.clone(),
        }
    }
}

impl SessionClient<authline_store::MemoryStorage, HttpAuthClient, ReqwestTransport> {
    /// Creates a builder.
    pub fn builder() -> SessionClientBuilder {
        SessionClientBuilder::new()
    }
}

impl<B: StorageBackend, A: AuthApi, T: ApiTransport> SessionClient<B, A, T> {
    /// Signs in with a username and password.
    ///
    /// # Errors
    /// - [`AuthlineError::InvalidCredentials`]: wrong password or unknown
    ///   user; the session is Anonymous and storage untouched
    /// - [`AuthlineError::Session`]: already signed in
    ///   ([`SessionError::InvalidTransition`]) or another login is running
    ///   ([`SessionError::InFlight`])
    /// - [`AuthlineError::Network`] / [`AuthlineError::Server`]
    /// - [`AuthlineError::SessionExpired`]: the issued token could not
    ///   be decoded or stored
    pub async fn login(
        &self,
        username: &str,
        password: &str,
    ) -> Result<SessionSnapshot, AuthlineError> {
        let _leader = match self.dispatcher.flights().join(OperationKind::Login) {
            Join::Leader(leader) => leader,
            Join::Follower(_) => {
                return Err(SessionError::InFlight(OperationKind::Login).into());
            }
        };

        let session = self.session();
        session.begin_login()?;
        let pending = PendingLogin {
            session,
            armed: true,
        };

        let result = match tokio::time::timeout(
            self.config().request_timeout(),
            self.dispatcher.auth().obtain(username, password),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(AuthError::Network("login timed out".into())),
        };
        // From here on every path leaves Authenticating itself.
        pending.disarm();

        match result {
            Ok(pair) => {
                let claims = session.complete_login(pair)?;
                tracing::info!(username = %claims.subject, "logged in");
                Ok(session.snapshot())
            }
            Err(e) => {
                tracing::info!(%username, error = %e, "login failed");
                // Already Anonymous if a logout raced the request.
                let _ = session.fail_login(e.kind());
                Err(e.into())
            }
        }
    }

    /// Creates an account. Does not sign in; route the user to the login
    /// page afterwards.
    ///
    /// # Errors
    /// - [`AuthlineError::InvalidCredentials`]: per-field rejections
    /// - [`AuthlineError::Session`]: someone is signed in
    pub async fn signup(&self, account: &NewAccount) -> Result<(), AuthlineError> {
        let status = self.session().status();
        if status.is_signed_in() {
            return Err(SessionError::InvalidTransition {
                from: status,
                event: "signup",
            }
            .into());
        }

        let result = match tokio::time::timeout(
            self.config().request_timeout(),
            self.dispatcher.auth().register(account),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(AuthError::Network("signup timed out".into())),
        };
        match result {
            Ok(()) => {
                tracing::info!(username = %account.username, "account created");
                Ok(())
            }
            Err(e) => {
                tracing::info!(username = %account.username, error = %e, "signup rejected");
                Err(e.into())
            }
        }
    }

    /// Signs out and forgets stored credentials. Safe to call at any time,
    /// any number of times.
    pub fn logout(&self) {
        self.session().logout();
    }

    /// Sends a protected API call. See [`Dispatcher::send`].
    pub async fn send(&self, request: ApiRequest) -> Result<ApiResponse, AuthlineError> {
        self.dispatcher.send(request).await
    }

    /// Calls `observer` after every status change.
    pub fn subscribe(
        &self,
        observer: impl Fn(&SessionSnapshot) + Send + Sync + 'static,
    ) -> SubscriptionId {
        self.session().subscribe(observer)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.session().unsubscribe(id)
    }

    /// Drops all observers.
    pub fn teardown(&self) {
        self.session().teardown();
    }

    /// The signed-in username, or `None`.
    pub fn username(&self) -> Option<String> {
        self.session().username()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.session().snapshot()
    }

    pub fn status(&self) -> SessionStatus {
        self.session().status()
    }

    pub fn is_authenticated(&self) -> bool {
        self.status().is_signed_in()
    }

    pub fn config(&self) -> &AuthlineConfig {
        self.dispatcher.config()
    }

    /// The dispatcher, for handing to code that only makes API calls.
    pub fn dispatcher(&self) -> &Dispatcher<B, A, T> {
        &self.dispatcher
    }

    fn session(&self) -> &SessionState<B> {
        self.dispatcher.session()
    }
}

/// Fails the login if its future is dropped while the request is still
/// out. Storage is left alone.
struct PendingLogin<'a, B: StorageBackend> {
    session: &'a SessionState<B>,
    armed: bool,
}

impl<B: StorageBackend> PendingLogin<'_, B> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl<B: StorageBackend> Drop for PendingLogin<'_, B> {
    fn drop(&mut self) {
        if self.armed && self.session.fail_login(ErrorKind::Network).is_ok() {
            tracing::debug!("login abandoned");
        }
    }
}
