//! # Authline
//!
//! Client-side session layer for single-page apps and other API clients.
//!
//! Authline acquires an access/refresh token pair, stores it, attaches
//! the access token to every protected call, and refreshes it before it
//! expires. Concurrent calls that find the token stale share a single
//! refresh, and every unrecoverable failure ends in a clean signed-out
//! state with nothing left in storage.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use authline::prelude::*;
//!
//! # async fn run() -> Result<(), AuthlineError> {
//! let client = SessionClient::builder()
//!     .config(AuthlineConfig::with_base_url("http://127.0.0.1:8000"))
//!     .build_http(MemoryStorage::new())?;
//!
//! client.login("alice", "correct-pw").await?;
//! let games = client.send(ApiRequest::get("/games/")).await?;
//! println!("{}", games.text());
//! # Ok(())
//! # }
//! ```
//!
//! ## Crates
//!
//! | Layer | Crate |
//! |-------|-------|
//! | Credential store | `authline-store` |
//! | Token inspector | `authline-token` |
//! | Session state | `authline-session` |
//! | Auth client | `authline-client` |
//! | Dispatcher, facade, config | `authline` (this crate) |

mod client;
mod config;
mod dispatcher;
mod error;
pub mod redirect;
mod transport;

pub use client::{SessionClient, SessionClientBuilder};
pub use config::AuthlineConfig;
pub use dispatcher::Dispatcher;
pub use error::AuthlineError;
pub use transport::{ApiRequest, ApiResponse, ApiTransport, ReqwestTransport, TransportError};

/// Convenience re-exports for UI code.
///
/// ```rust
/// use authline::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        ApiRequest, ApiResponse, ApiTransport, AuthlineConfig, AuthlineError, Dispatcher,
        ReqwestTransport, SessionClient, SessionClientBuilder, TransportError, redirect,
    };
    pub use authline_client::{
        AuthApi, AuthEndpoints, AuthError, FieldErrors, HttpAuthClient, NewAccount,
    };
    pub use authline_session::{
        ErrorKind, SessionError, SessionSnapshot, SessionStatus, SubscriptionId,
    };
    pub use authline_store::{FileStorage, MemoryStorage, StorageBackend, TokenPair};
    pub use authline_token::{Clock, ManualClock, SystemClock};
}
