//! Client configuration.

use std::time::Duration;

use authline_client::AuthEndpoints;
use serde::{Deserialize, Serialize};

/// Everything tunable about a [`SessionClient`](crate::SessionClient).
///
/// Start from `AuthlineConfig::default()` and override what differs:
///
/// ```rust
/// use authline::AuthlineConfig;
///
/// let config = AuthlineConfig {
///     auth_scheme: "JWT".into(),
///     ..AuthlineConfig::default()
/// };
/// assert_eq!(config.authorization("abc"), "JWT abc");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthlineConfig {
    /// Token endpoints.
    pub endpoints: AuthEndpoints,

    /// Base URL of the protected API. `None` means the same host as the
    /// token endpoints.
    pub api_base_url: Option<String>,

    /// First word of the `Authorization` header. Default: `Bearer`.
    pub auth_scheme: String,

    /// An access token is treated as expired this many seconds early.
    /// Default: 30.
    pub expiry_skew_secs: u64,

    /// Upper bound on any single auth or API request. Default: 30.
    pub request_timeout_secs: u64,

    /// Where to send a user whose session expired.
    pub login_path: String,

    /// Where to land after login when no usable `next` was given.
    pub default_landing: String,
}

impl Default for AuthlineConfig {
    fn default() -> Self {
        Self {
            endpoints: AuthEndpoints::default(),
            api_base_url: None,
            auth_scheme: "Bearer".into(),
            expiry_skew_secs: 30,
            request_timeout_secs: 30,
            login_path: "/account/login/".into(),
            default_landing: "/games/".into(),
        }
    }
}

impl AuthlineConfig {
    /// Default settings for a server at `base_url`.
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            endpoints: AuthEndpoints::with_base_url(base_url),
            ..Self::default()
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Base URL for protected calls.
    pub fn api_base_url(&self) -> &str {
        self.api_base_url
            .as_deref()
            .unwrap_or(&self.endpoints.base_url)
    }

    /// The `Authorization` header value for `access_token`.
    pub fn authorization(&self, access_token: &str) -> String {
        format!("{} {}", self.auth_scheme, access_token)
    }
}
