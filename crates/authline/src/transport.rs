//! The protected-API seam: how a request actually leaves the process.
//!
//! The dispatcher only decides *which* token goes on a request. Sending
//! it is delegated to an [`ApiTransport`], so tests can swap in a fake
//! that counts calls and scripts status codes.

use std::future::Future;
use std::time::Duration;

use reqwest::Method;
use reqwest::header::AUTHORIZATION;
use serde::de::DeserializeOwned;
use url::Url;

// ---------------------------------------------------------------------------
// Request / response
// ---------------------------------------------------------------------------

/// A call to the protected API, minus credentials.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    /// Path (and query) relative to the API base URL, e.g. `/games/?page=2`.
    pub path: String,
    /// JSON body, if any.
    pub body: Option<serde_json::Value>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>, body: serde_json::Value) -> Self {
        Self::new(Method::POST, path).with_body(body)
    }

    pub fn put(path: impl Into<String>, body: serde_json::Value) -> Self {
        Self::new(Method::PUT, path).with_body(body)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn with_body(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }
}

/// What came back from the protected API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl ApiResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// The body as UTF-8, with invalid sequences replaced.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Deserializes the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }
}

/// Why a request got no response at all.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The request path does not form a valid URL with the base.
    #[error("invalid request URL: {0}")]
    InvalidUrl(String),

    /// Connect failure, reset, timeout.
    #[error("{0}")]
    Network(String),
}

// ---------------------------------------------------------------------------
// ApiTransport
// ---------------------------------------------------------------------------

/// Sends an [`ApiRequest`] with a ready-made `Authorization` header value.
///
/// Any HTTP status is a successful send. Only a missing response is an
/// error.
pub trait ApiTransport: Send + Sync + 'static {
    fn send(
        &self,
        request: &ApiRequest,
        authorization: &str,
    ) -> impl Future<Output = Result<ApiResponse, TransportError>> + Send;
}

/// [`ApiTransport`] over `reqwest`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    http: reqwest::Client,
    base_url: String,
}

impl ReqwestTransport {
    /// Creates a transport for the API at `base_url`, giving up on any
    /// request after `timeout`.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, TransportError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Network(e.to_string()))?;
        Ok(Self::with_client(http, base_url))
    }

    pub fn with_client(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
        }
    }

    fn url(&self, path: &str) -> Result<Url, TransportError> {
        let joined = format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        );
        Url::parse(&joined).map_err(|e| TransportError::InvalidUrl(format!("{joined}: {e}")))
    }
}

impl ApiTransport for ReqwestTransport {
    async fn send(
        &self,
        request: &ApiRequest,
        authorization: &str,
    ) -> Result<ApiResponse, TransportError> {
        let url = self.url(&request.path)?;
        let mut builder = self
            .http
            .request(request.method.clone(), url)
            .header(AUTHORIZATION, authorization);
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;
        Ok(ApiResponse::new(status, body.to_vec()))
    }
}
