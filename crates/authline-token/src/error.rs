//! Error types for token inspection.

/// Why an access token could not be turned into [`Claims`](crate::Claims).
///
/// Both variants mean the same thing to the session layer: the local
/// credentials are corrupt and must be discarded.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    /// The token is not `header.payload.signature`, or the payload is not
    /// base64url-encoded JSON.
    #[error("malformed token: {0}")]
    Malformed(&'static str),

    /// The payload parsed but lacks a required claim (or it has the wrong
    /// type).
    #[error("token is missing the `{0}` claim")]
    ClaimsMissing(&'static str),
}
