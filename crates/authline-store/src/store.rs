//! The credential store: a token pair under two stable keys.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{StorageBackend, StoreError};

/// Storage key for the access token.
pub const ACCESS_TOKEN_KEY: &str = "access_token";

/// Storage key for the refresh token.
pub const REFRESH_TOKEN_KEY: &str = "refresh_token";

// ---------------------------------------------------------------------------
// TokenPair
// ---------------------------------------------------------------------------

/// An access/refresh token pair as issued by the token endpoint.
///
/// Both values are opaque signed strings. `Debug` prints only their
/// lengths so a pair can sit inside logged structs without leaking.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    /// Short-lived credential attached to every protected call.
    pub access_token: String,
    /// Longer-lived credential used only to mint a new access token.
    pub refresh_token: String,
}

impl TokenPair {
    /// Creates a pair from its two tokens.
    pub fn new(
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
        }
    }
}

impl fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenPair")
            .field("access_token", &format_args!("<{} bytes>", self.access_token.len()))
            .field("refresh_token", &format_args!("<{} bytes>", self.refresh_token.len()))
            .finish()
    }
}

// ---------------------------------------------------------------------------
// CredentialStore
// ---------------------------------------------------------------------------

/// Persists one [`TokenPair`] on top of a [`StorageBackend`].
///
/// A pair is only considered present when BOTH keys are set. A lone
/// access or refresh token (left behind by an older client, or a
/// half-finished clear) loads as `None`.
#[derive(Debug)]
pub struct CredentialStore<B: StorageBackend> {
    backend: B,
}

impl<B: StorageBackend> CredentialStore<B> {
    /// Wraps a backend.
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    /// Writes both tokens, refresh token first.
    pub fn save(&self, pair: &TokenPair) -> Result<(), StoreError> {
        self.backend.set(REFRESH_TOKEN_KEY, &pair.refresh_token)?;
        self.backend.set(ACCESS_TOKEN_KEY, &pair.access_token)?;
        Ok(())
    }

    /// Reads the stored pair, or `None` if either key is absent.
    pub fn load(&self) -> Result<Option<TokenPair>, StoreError> {
        let access = self.backend.get(ACCESS_TOKEN_KEY)?;
        let refresh = self.backend.get(REFRESH_TOKEN_KEY)?;
        Ok(match (access, refresh) {
            (Some(access_token), Some(refresh_token)) => Some(TokenPair {
                access_token,
                refresh_token,
            }),
            _ => None,
        })
    }

    /// Removes both tokens. Clearing an empty store is a no-op.
    pub fn clear(&self) -> Result<(), StoreError> {
        self.backend.remove(ACCESS_TOKEN_KEY)?;
        self.backend.remove(REFRESH_TOKEN_KEY)?;
        Ok(())
    }

    /// Returns the underlying backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }
}
