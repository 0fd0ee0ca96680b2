//! Error types for the credential store.

/// Errors that can occur while reading or writing persisted credentials.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The storage medium could not be read or written.
    #[error("storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// The storage file exists but does not hold a JSON object of strings.
    /// Usually a half-written file or something else writing to our path.
    #[error("storage file is corrupt: {0}")]
    Corrupt(#[source] serde_json::Error),
}
