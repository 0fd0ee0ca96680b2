//! Where the token endpoints live.

use serde::{Deserialize, Serialize};
use url::Url;

/// Base URL and paths of the three auth endpoints.
///
/// Paths are appended to `base_url` verbatim, so a base with a path
/// prefix (`https://host/api`) keeps it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthEndpoints {
    pub base_url: String,
    pub obtain_path: String,
    pub refresh_path: String,
    pub register_path: String,
}

impl Default for AuthEndpoints {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000".into(),
            obtain_path: "/auth/token/obtain/".into(),
            refresh_path: "/auth/token/refresh/".into(),
            register_path: "/auth/user/create/".into(),
        }
    }
}

impl AuthEndpoints {
    /// Default paths under `base_url`.
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    pub fn obtain_url(&self) -> Result<Url, url::ParseError> {
        self.join(&self.obtain_path)
    }

    pub fn refresh_url(&self) -> Result<Url, url::ParseError> {
        self.join(&self.refresh_path)
    }

    pub fn register_url(&self) -> Result<Url, url::ParseError> {
        self.join(&self.register_path)
    }

    fn join(&self, path: &str) -> Result<Url, url::ParseError> {
        Url::parse(&format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_urls_match_token_endpoints() {
        let endpoints = AuthEndpoints::default();
        assert_eq!(
            endpoints.obtain_url().unwrap().as_str(),
            "http://127.0.0.1:8000/auth/token/obtain/"
        );
        assert_eq!(
            endpoints.refresh_url().unwrap().as_str(),
            "http://127.0.0.1:8000/auth/token/refresh/"
        );
        assert_eq!(
            endpoints.register_url().unwrap().as_str(),
            "http://127.0.0.1:8000/auth/user/create/"
        );
    }

    #[test]
    fn test_join_keeps_base_path_prefix() {
        let endpoints = AuthEndpoints::with_base_url("https://example.com/api/");
        assert_eq!(
            endpoints.obtain_url().unwrap().as_str(),
            "https://example.com/api/auth/token/obtain/"
        );
    }

    #[test]
    fn test_join_invalid_base_is_error() {
        let endpoints = AuthEndpoints::with_base_url("not a url");
        assert!(endpoints.refresh_url().is_err());
    }

    #[test]
    fn test_deserialize_partial_fills_defaults() {
        let endpoints: AuthEndpoints =
            serde_json::from_str(r#"{"base_url":"https://auth.example"}"#).unwrap();
        assert_eq!(endpoints.base_url, "https://auth.example");
        assert_eq!(endpoints.obtain_path, "/auth/token/obtain/");
    }
}
