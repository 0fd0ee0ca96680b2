//! Network operations against the token endpoints.
//!
//! Three calls, no retries, no state:
//!
//! - `obtain(username, password)`: exchange a password for a token pair
//! - `refresh(refresh_token)`: exchange a refresh token for a new access token
//! - `register(account)`: create an account (does not sign in)
//!
//! They are declared on the [`AuthApi`] trait so the layers above can be
//! tested against an in-process fake. [`HttpAuthClient`] is the real
//! implementation over `reqwest`.
//!
//! # How it fits in the stack
//!
//! ```text
//! Dispatcher / SessionClient (above)  ← decide when to call, feed results to the session
//!     ↕
//! Auth Client (this crate)  ← HTTP and response classification
//!     ↕
//! Auth API (remote)
//! ```

mod api;
mod endpoints;
mod error;
mod fields;
mod http;

pub use api::{AuthApi, NewAccount};
pub use endpoints::AuthEndpoints;
pub use error::AuthError;
pub use fields::FieldErrors;
pub use http::{
    HttpAuthClient, parse_obtain_response, parse_refresh_response, parse_register_response,
};
