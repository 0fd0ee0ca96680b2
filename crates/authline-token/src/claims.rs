//! Claim extraction from an unverified JWT.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde_json::{Map, Value};

use crate::TokenError;

/// The claims Authline reads from an access token.
///
/// Times are unix seconds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Claims {
    /// Who the token belongs to: the `username` claim, else `sub`.
    pub subject: String,
    /// `iat`, when the issuer includes it.
    pub issued_at: Option<u64>,
    /// `exp`.
    pub expires_at: u64,
}

impl Claims {
    /// Returns `true` if the token should be treated as expired at `now`.
    /// See [`is_expired`].
    pub fn is_expired(&self, now: u64, skew_secs: u64) -> bool {
        is_expired(self, now, skew_secs)
    }

    /// Seconds left before expiry at `now` (zero once expired).
    pub fn remaining(&self, now: u64) -> u64 {
        self.expires_at.saturating_sub(now)
    }
}

/// Returns `true` iff `now + skew_secs >= claims.expires_at`.
///
/// A positive skew makes a token count as expired slightly before the
/// server would reject it, so a request isn't sent with a token that
/// dies in flight.
pub fn is_expired(claims: &Claims, now: u64, skew_secs: u64) -> bool {
    now.saturating_add(skew_secs) >= claims.expires_at
}

/// Decodes the claims of `token` without checking its signature.
///
/// # Errors
/// - [`TokenError::Malformed`]: not three non-empty dot-separated parts,
///   payload not base64url, or payload not a JSON object
/// - [`TokenError::ClaimsMissing`]: no usable `exp`, or neither
///   `username` nor `sub` is a string
pub fn decode(token: &str) -> Result<Claims, TokenError> {
    let mut parts = token.split('.');
    let (Some(header), Some(payload), Some(_signature), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(TokenError::Malformed("expected three dot-separated parts"));
    };
    if header.is_empty() || payload.is_empty() {
        return Err(TokenError::Malformed("empty header or payload"));
    }

    // Some issuers pad their segments even though JWT says not to.
    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|_| TokenError::Malformed("payload is not base64url"))?;
    let object: Map<String, Value> = serde_json::from_slice(&bytes)
        .map_err(|_| TokenError::Malformed("payload is not a JSON object"))?;

    let subject = ["username", "sub"]
        .iter()
        .find_map(|key| object.get(*key).and_then(Value::as_str))
        .filter(|s| !s.is_empty())
        .ok_or(TokenError::ClaimsMissing("sub"))?
        .to_string();
    let expires_at = object
        .get("exp")
        .and_then(timestamp)
        .ok_or(TokenError::ClaimsMissing("exp"))?;
    let issued_at = object.get("iat").and_then(timestamp);

    Ok(Claims {
        subject,
        issued_at,
        expires_at,
    })
}

/// Reads a NumericDate. Fractional seconds are truncated.
fn timestamp(value: &Value) -> Option<u64> {
    value.as_u64().or_else(|| {
        value
            .as_f64()
            .filter(|f| f.is_finite() && *f >= 0.0)
            .map(|f| f as u64)
    })
}
