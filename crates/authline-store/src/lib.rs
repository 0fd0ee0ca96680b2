//! Credential persistence for Authline.
//!
//! This crate is the only place that knows how a token pair is laid out
//! in storage. Everything above it talks to a [`CredentialStore`]:
//!
//! - **Backends** ([`StorageBackend`], [`MemoryStorage`], [`FileStorage`]):
//!   the raw key/value medium, scoped to one origin.
//! - **Store** ([`CredentialStore`]): `save` / `load` / `clear` of a
//!   [`TokenPair`] under two stable keys.
//! - **Errors** ([`StoreError`]): I/O and corrupt-file failures.
//!
//! # How it fits in the stack
//!
//! ```text
//! Session State (above)  ← the only writer of credentials
//!     ↕
//! Credential Store (this crate)  ← two strings under stable keys
//!     ↕
//! Storage medium  ← memory map or one JSON file per origin
//! ```
//!
//! No network or cryptographic work happens here.

mod backend;
mod error;
mod store;

pub use backend::{FileStorage, MemoryStorage, StorageBackend};
pub use error::StoreError;
pub use store::{ACCESS_TOKEN_KEY, CredentialStore, REFRESH_TOKEN_KEY, TokenPair};
