//! The request dispatcher: attaches credentials to protected calls and
//! refreshes them when they go stale.
//!
//! # Send path
//!
//! ```text
//! send(req)
//!   │
//!   ├─ Anonymous / Authenticating ─────────────→ Err(SessionExpired), no I/O
//!   ├─ Refreshing ─────────────────────┐
//!   └─ Authenticated ─ token expired? ─┤ yes
//!          │ no                        ▼
//!          │                   join Refresh flight ── leader spawns refresh
//!          ▼                           │              followers wait
//!     transmit(token) ◀────────────────┘
//!          │
//!          ├─ 401 ─→ refresh once ─→ transmit again ─→ 401 again ─→ invalidate, SessionExpired
//!          ├─ 5xx ─→ Err(Server)
//!          └─ else ─→ Ok(response)
//! ```
//!
//! # Single-flight refresh
//!
//! However many requests find the token stale at once, exactly one
//! refresh goes out. The first caller becomes the flight leader and
//! spawns the refresh as its own task, so a caller that gives up
//! waiting (navigation, dropped future) doesn't abort it halfway and
//! leave the session stuck in `Refreshing`. Everyone else waits on the
//! flight and gets the same outcome.

use std::fmt;
use std::sync::Arc;

use authline_client::{AuthApi, AuthError};
use authline_session::{
    ErrorKind, Join, OperationKind, SessionState, SessionStatus, SingleFlight,
};
use authline_store::{StorageBackend, TokenPair};
use reqwest::StatusCode;

use crate::{ApiRequest, ApiResponse, ApiTransport, AuthlineConfig, AuthlineError};

/// What a refresh flight publishes: the new access token. Login flights
/// never publish; a second login is refused while one holds the slot.
pub(crate) type FlightOutcome = Result<String, AuthlineError>;

/// State shared by every clone of a [`Dispatcher`] and by refresh tasks.
pub(crate) struct Shared<B: StorageBackend, A: AuthApi, T: ApiTransport> {
    pub(crate) session: Arc<SessionState<B>>,
    pub(crate) auth: A,
    pub(crate) transport: T,
    pub(crate) flights: SingleFlight<OperationKind, FlightOutcome>,
    pub(crate) config: AuthlineConfig,
}

/// Sends protected API calls on behalf of the signed-in user.
///
/// Cheap to clone; clones share the session and the refresh flight.
pub struct Dispatcher<B: StorageBackend, A: AuthApi, T: ApiTransport> {
    shared: Arc<Shared<B, A, T>>,
}

impl<B: StorageBackend, A: AuthApi, T: ApiTransport> Clone for Dispatcher<B, A, T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<B: StorageBackend, A: AuthApi, T: ApiTransport> fmt::Debug for Dispatcher<B, A, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("session", &self.shared.session)
            .field("flights", &self.shared.flights)
            .finish_non_exhaustive()
    }
}

impl<B: StorageBackend, A: AuthApi, T: ApiTransport> Dispatcher<B, A, T> {
    pub fn new(
        session: Arc<SessionState<B>>,
        auth: A,
        transport: T,
        config: AuthlineConfig,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                session,
                auth,
                transport,
                flights: SingleFlight::new(),
                config,
            }),
        }
    }

    /// Sends `request` with the current access token, refreshing it first
    /// if needed and once more on a 401.
    ///
    /// # Errors
    /// - [`AuthlineError::SessionExpired`]: nobody is signed in, the
    ///   refresh token was rejected, or the retried request got another 401
    /// - [`AuthlineError::Network`]: the API or the refresh endpoint was
    ///   unreachable
    /// - [`AuthlineError::Server`]: the API answered 5xx
    pub async fn send(&self, request: ApiRequest) -> Result<ApiResponse, AuthlineError> {
        let token = self.access_token().await?;
        let response = self.transmit(&request, &token).await?;
        if response.status != StatusCode::UNAUTHORIZED.as_u16() {
            return self.classify(&request, response);
        }

        // The server disagrees with our view of the token (revoked,
        // clock drift). One refresh, one retry.
        tracing::debug!(path = %request.path, "request rejected with 401, refreshing");
        let token = self.refresh(Some(token)).await?;
        let response = self.transmit(&request, &token).await?;
        if response.status == StatusCode::UNAUTHORIZED.as_u16() {
            tracing::info!(path = %request.path, "retry rejected with 401, session expired");
            let _ = self.shared.session.invalidate(ErrorKind::SessionExpired);
            return Err(AuthlineError::SessionExpired);
        }
        self.classify(&request, response)
    }

    pub fn session(&self) -> &Arc<SessionState<B>> {
        &self.shared.session
    }

    pub fn auth(&self) -> &A {
        &self.shared.auth
    }

    pub fn config(&self) -> &AuthlineConfig {
        &self.shared.config
    }

    pub(crate) fn flights(&self) -> &SingleFlight<OperationKind, FlightOutcome> {
        &self.shared.flights
    }

    // -- Token selection ----------------------------------------------------

    /// A token that is believed valid right now.
    async fn access_token(&self) -> Result<String, AuthlineError> {
        match self.shared.session.status() {
            SessionStatus::Anonymous | SessionStatus::Authenticating => {
                return Err(AuthlineError::SessionExpired);
            }
            SessionStatus::Refreshing => return self.refresh(None).await,
            SessionStatus::Authenticated => {}
        }

        let pair = stored_pair(&self.shared)?;
        match authline_token::decode(&pair.access_token) {
            Ok(claims) if claims.is_expired(self.now(), self.shared.config.expiry_skew_secs) => {
                tracing::debug!(expires_at = claims.expires_at, "access token stale");
                self.refresh(Some(pair.access_token)).await
            }
            Ok(_) => Ok(pair.access_token),
            Err(e) => {
                tracing::warn!(error = %e, "stored access token is unusable");
                let _ = self.shared.session.invalidate(ErrorKind::from(&e));
                Err(AuthlineError::SessionExpired)
            }
        }
    }

    /// Joins (or leads) the refresh flight. `stale` is the token the
    /// caller found wanting; the leader skips the network if the store
    /// already holds something newer.
    async fn refresh(&self, stale: Option<String>) -> Result<String, AuthlineError> {
        match self.shared.flights.join(OperationKind::Refresh) {
            Join::Follower(flight) => {
                tracing::debug!("waiting on in-flight refresh");
                flight.wait().await.unwrap_or_else(|| {
                    Err(AuthlineError::Network("refresh was abandoned".into()))
                })
            }
            Join::Leader(leader) => {
                let shared = Arc::clone(&self.shared);
                let task = tokio::spawn(async move {
                    let outcome = run_refresh(&shared, stale.as_deref()).await;
                    leader.finish(outcome.clone());
                    outcome
                });
                task.await.unwrap_or_else(|e| {
                    Err(AuthlineError::Network(format!("refresh task failed: {e}")))
                })
            }
        }
    }

    // -- Sending ------------------------------------------------------------

    async fn transmit(
        &self,
        request: &ApiRequest,
        token: &str,
    ) -> Result<ApiResponse, AuthlineError> {
        tracing::debug!(method = %request.method, path = %request.path, "dispatching request");
        let authorization = self.shared.config.authorization(token);
        Ok(self.shared.transport.send(request, &authorization).await?)
    }

    /// 5xx becomes an error; everything else goes back to the caller.
    fn classify(
        &self,
        request: &ApiRequest,
        response: ApiResponse,
    ) -> Result<ApiResponse, AuthlineError> {
        if response.status < 500 {
            return Ok(response);
        }
        tracing::warn!(
            status = response.status,
            path = %request.path,
            "protected API returned a server error"
        );
        let message = response
            .json::<serde_json::Value>()
            .ok()
            .and_then(|v| v.get("detail").and_then(|d| d.as_str()).map(str::to_string))
            .or_else(|| {
                StatusCode::from_u16(response.status)
                    .ok()
                    .and_then(|s| s.canonical_reason())
                    .map(str::to_string)
            })
            .unwrap_or_else(|| "server error".to_string());
        Err(AuthlineError::Server {
            status: response.status,
            message,
        })
    }

    fn now(&self) -> u64 {
        self.shared.session.clock().now()
    }
}

// ---------------------------------------------------------------------------
// Refresh task
// ---------------------------------------------------------------------------

/// Runs one refresh against the auth API and feeds the result to the
/// session. Executed by the flight leader's spawned task only.
async fn run_refresh<B: StorageBackend, A: AuthApi, T: ApiTransport>(
    shared: &Shared<B, A, T>,
    stale: Option<&str>,
) -> FlightOutcome {
    let session = &shared.session;
    let pair = stored_pair(shared)?;

    // A flight that finished just before this one started may already
    // have stored a fresh token.
    if session.status() == SessionStatus::Authenticated
        && stale != Some(pair.access_token.as_str())
    {
        let now = session.clock().now();
        if let Ok(claims) = authline_token::decode(&pair.access_token) {
            if !claims.is_expired(now, shared.config.expiry_skew_secs) {
                tracing::debug!("access token already replaced, skipping refresh");
                return Ok(pair.access_token);
            }
        }
    }

    session.begin_refresh().map_err(|e| {
        tracing::debug!(error = %e, "session ended before refresh started");
        AuthlineError::SessionExpired
    })?;

    let result = match tokio::time::timeout(
        shared.config.request_timeout(),
        shared.auth.refresh(&pair.refresh_token),
    )
    .await
    {
        Ok(result) => result,
        Err(_) => Err(AuthError::Network("refresh timed out".into())),
    };

    match result {
        Ok(new_pair) => {
            let access_token = new_pair.access_token.clone();
            match session.complete_refresh(new_pair) {
                Ok(claims) => {
                    tracing::info!(username = %claims.subject, "access token refreshed");
                    Ok(access_token)
                }
                Err(e) => {
                    tracing::warn!(error = %e, "refreshed credentials not accepted");
                    Err(AuthlineError::SessionExpired)
                }
            }
        }
        Err(e @ (AuthError::RefreshExpired | AuthError::InvalidCredentials(_))) => {
            tracing::info!(error = %e, "refresh token rejected, session expired");
            let _ = session.fail_refresh(ErrorKind::RefreshExpired);
            Err(AuthlineError::SessionExpired)
        }
        Err(e) => {
            tracing::warn!(error = %e, "refresh failed, will retry on next request");
            let _ = session.abort_refresh(e.kind());
            Err(e.into())
        }
    }
}

/// Reads the stored pair for a session that claims to be signed in. A
/// missing or unreadable pair ends the session.
fn stored_pair<B: StorageBackend, A: AuthApi, T: ApiTransport>(
    shared: &Shared<B, A, T>,
) -> Result<TokenPair, AuthlineError> {
    match shared.session.credentials() {
        Ok(Some(pair)) => Ok(pair),
        Ok(None) => {
            tracing::warn!("signed-in session has no stored credentials");
            let _ = shared.session.invalidate(ErrorKind::SessionExpired);
            Err(AuthlineError::SessionExpired)
        }
        Err(e) => {
            tracing::warn!(error = %e, "could not read stored credentials");
            let _ = shared.session.invalidate(ErrorKind::SessionExpired);
            Err(AuthlineError::SessionExpired)
        }
    }
}
