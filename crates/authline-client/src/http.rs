//! `reqwest` implementation of [`AuthApi`].
//!
//! The HTTP wrapper is thin; classifying a response is done by the pure
//! `parse_*` functions below so it can be tested without a server.

use std::time::Duration;

use authline_store::TokenPair;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::{AuthApi, AuthEndpoints, AuthError, FieldErrors, NewAccount};

const CONNECT_TIMEOUT_SECS: u64 = 10;

// =============================================================================
// CLIENT
// =============================================================================

/// Talks to the token endpoints over HTTP.
#[derive(Debug, Clone)]
pub struct HttpAuthClient {
    http: reqwest::Client,
    endpoints: AuthEndpoints,
}

impl HttpAuthClient {
    /// Builds a client whose every request gives up after `timeout`.
    pub fn new(endpoints: AuthEndpoints, timeout: Duration) -> Result<Self, AuthError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout.min(Duration::from_secs(CONNECT_TIMEOUT_SECS)))
            .build()
            .map_err(|e| AuthError::Network(e.to_string()))?;
        Ok(Self { http, endpoints })
    }

    /// Uses an existing `reqwest` client (shared connection pool, custom
    /// TLS roots).
    pub fn with_client(http: reqwest::Client, endpoints: AuthEndpoints) -> Self {
        Self { http, endpoints }
    }

    pub fn endpoints(&self) -> &AuthEndpoints {
        &self.endpoints
    }

    async fn post<B: Serialize + ?Sized>(
        &self,
        url: Result<Url, url::ParseError>,
        body: &B,
    ) -> Result<(u16, String), AuthError> {
        let url = url.map_err(|e| AuthError::Network(format!("invalid auth URL: {e}")))?;
        tracing::debug!(%url, "auth request");

        let response = self
            .http
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| AuthError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| AuthError::Network(e.to_string()))?;
        if status >= 500 {
            tracing::warn!(status, "auth endpoint returned a server error");
        }
        Ok((status, text))
    }
}

impl AuthApi for HttpAuthClient {
    async fn obtain(&self, username: &str, password: &str) -> Result<TokenPair, AuthError> {
        let body = ObtainRequest { username, password };
        let (status, text) = self.post(self.endpoints.obtain_url(), &body).await?;
        parse_obtain_response(status, &text)
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, AuthError> {
        let body = RefreshRequest {
            refresh: refresh_token,
        };
        let (status, text) = self.post(self.endpoints.refresh_url(), &body).await?;
        parse_refresh_response(status, &text, refresh_token)
    }

    async fn register(&self, account: &NewAccount) -> Result<(), AuthError> {
        let (status, text) = self.post(self.endpoints.register_url(), account).await?;
        parse_register_response(status, &text)
    }
}

// =============================================================================
// WIRE TYPES
// =============================================================================

#[derive(Serialize)]
struct ObtainRequest<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct RefreshRequest<'a> {
    refresh: &'a str,
}

#[derive(Deserialize)]
struct TokenResponse {
    #[serde(default, alias = "accessToken")]
    access: Option<String>,
    #[serde(default, alias = "refreshToken")]
    refresh: Option<String>,
}

// =============================================================================
// PARSING
// =============================================================================

/// Classifies a response from the obtain endpoint.
pub fn parse_obtain_response(status: u16, body: &str) -> Result<TokenPair, AuthError> {
    match status {
        200..=299 => {
            let tokens = parse_tokens(status, body)?;
            match (non_empty(tokens.access), non_empty(tokens.refresh)) {
                (Some(access), Some(refresh)) => Ok(TokenPair::new(access, refresh)),
                _ => Err(unusable(status, "token response lacks access or refresh token")),
            }
        }
        400..=499 => Err(AuthError::InvalidCredentials(FieldErrors::from_body(body))),
        _ => Err(server_error(status, body)),
    }
}

/// Classifies a response from the refresh endpoint.
///
/// `presented` is the refresh token that was sent; it is kept when the
/// server does not rotate it.
pub fn parse_refresh_response(
    status: u16,
    body: &str,
    presented: &str,
) -> Result<TokenPair, AuthError> {
    match status {
        200..=299 => {
            let tokens = parse_tokens(status, body)?;
            let access = non_empty(tokens.access)
                .ok_or_else(|| unusable(status, "refresh response lacks an access token"))?;
            let refresh = non_empty(tokens.refresh).unwrap_or_else(|| presented.to_string());
            Ok(TokenPair::new(access, refresh))
        }
        400..=499 => Err(AuthError::RefreshExpired),
        _ => Err(server_error(status, body)),
    }
}

/// Classifies a response from the registration endpoint.
pub fn parse_register_response(status: u16, body: &str) -> Result<(), AuthError> {
    match status {
        200..=299 => Ok(()),
        400..=499 => Err(AuthError::InvalidCredentials(FieldErrors::from_body(body))),
        _ => Err(server_error(status, body)),
    }
}

fn parse_tokens(status: u16, body: &str) -> Result<TokenResponse, AuthError> {
    serde_json::from_str(body).map_err(|e| unusable(status, &format!("token response: {e}")))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.is_empty())
}

fn unusable(status: u16, message: &str) -> AuthError {
    AuthError::Server {
        status,
        message: message.to_string(),
    }
}

/// The server's own `detail` if it sent one, else the status reason.
fn server_error(status: u16, body: &str) -> AuthError {
    let message = FieldErrors::from_body(body)
        .detail()
        .map(str::to_string)
        .or_else(|| {
            StatusCode::from_u16(status)
                .ok()
                .and_then(|s| s.canonical_reason())
                .map(str::to_string)
        })
        .unwrap_or_else(|| "unexpected response".to_string());
    AuthError::Server { status, message }
}

#[cfg(test)]
mod tests {
    use super::*;

    // =====================================================================
    // parse_obtain_response()
    // =====================================================================

    #[test]
    fn test_parse_obtain_success_returns_pair() {
        let pair = parse_obtain_response(200, r#"{"access":"a1","refresh":"r1"}"#).unwrap();
        assert_eq!(pair, TokenPair::new("a1", "r1"));
    }

    #[test]
    fn test_parse_obtain_camel_case_aliases_accepted() {
        let pair =
            parse_obtain_response(201, r#"{"accessToken":"a1","refreshToken":"r1"}"#).unwrap();
        assert_eq!(pair, TokenPair::new("a1", "r1"));
    }

    #[test]
    fn test_parse_obtain_401_is_invalid_credentials_with_detail() {
        let err = parse_obtain_response(
            401,
            r#"{"detail":"No active account found with the given credentials"}"#,
        )
        .unwrap_err();

        match err {
            AuthError::InvalidCredentials(fields) => assert_eq!(
                fields.detail(),
                Some("No active account found with the given credentials")
            ),
            other => panic!("expected InvalidCredentials, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_obtain_400_field_errors_structured() {
        let err = parse_obtain_response(400, r#"{"password":["This field may not be blank."]}"#)
            .unwrap_err();
        let AuthError::InvalidCredentials(fields) = err else {
            panic!("expected InvalidCredentials");
        };
        assert_eq!(fields.get("password"), ["This field may not be blank."]);
    }

    #[test]
    fn test_parse_obtain_missing_refresh_is_server_error() {
        let err = parse_obtain_response(200, r#"{"access":"a1"}"#).unwrap_err();
        assert!(matches!(err, AuthError::Server { status: 200, .. }));
    }

    #[test]
    fn test_parse_obtain_non_json_success_is_server_error() {
        let err = parse_obtain_response(200, "<html>").unwrap_err();
        assert_eq!(err.kind(), authline_session::ErrorKind::Server);
    }

    #[test]
    fn test_parse_obtain_503_uses_status_reason() {
        let err = parse_obtain_response(503, "").unwrap_err();
        assert_eq!(
            err,
            AuthError::Server {
                status: 503,
                message: "Service Unavailable".into()
            }
        );
    }

    // =====================================================================
    // parse_refresh_response()
    // =====================================================================

    #[test]
    fn test_parse_refresh_without_refresh_keeps_presented() {
        let pair = parse_refresh_response(200, r#"{"access":"a2"}"#, "r1").unwrap();
        assert_eq!(pair, TokenPair::new("a2", "r1"));
    }

    #[test]
    fn test_parse_refresh_rotated_replaces_presented() {
        let pair = parse_refresh_response(200, r#"{"access":"a2","refresh":"r2"}"#, "r1").unwrap();
        assert_eq!(pair, TokenPair::new("a2", "r2"));
    }

    #[test]
    fn test_parse_refresh_401_is_refresh_expired() {
        let err = parse_refresh_response(
            401,
            r#"{"detail":"Token is invalid or expired","code":"token_not_valid"}"#,
            "r1",
        )
        .unwrap_err();
        assert_eq!(err, AuthError::RefreshExpired);
    }

    #[test]
    fn test_parse_refresh_500_is_server_with_detail() {
        let err = parse_refresh_response(500, r#"{"detail":"database down"}"#, "r1").unwrap_err();
        assert_eq!(
            err,
            AuthError::Server {
                status: 500,
                message: "database down".into()
            }
        );
    }

    #[test]
    fn test_parse_refresh_empty_access_is_server_error() {
        let err = parse_refresh_response(200, r#"{"access":""}"#, "r1").unwrap_err();
        assert!(matches!(err, AuthError::Server { .. }));
    }

    // =====================================================================
    // parse_register_response()
    // =====================================================================

    #[test]
    fn test_parse_register_created_is_ok() {
        assert_eq!(
            parse_register_response(201, r#"{"username":"bob","email":"b@x.io"}"#),
            Ok(())
        );
    }

    #[test]
    fn test_parse_register_conflict_returns_field_errors() {
        let err = parse_register_response(
            400,
            r#"{"username":["A user with that username already exists."]}"#,
        )
        .unwrap_err();
        assert_eq!(err.kind(), authline_session::ErrorKind::InvalidCredentials);
        assert_eq!(
            err.to_string(),
            "invalid credentials: username: A user with that username already exists."
        );
    }

    #[test]
    fn test_parse_register_redirect_is_server_error() {
        let err = parse_register_response(302, "").unwrap_err();
        assert!(matches!(err, AuthError::Server { status: 302, .. }));
    }
}
