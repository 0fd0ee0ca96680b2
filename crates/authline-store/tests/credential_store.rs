//! Integration tests for file-backed credential persistence.
//!
//! A "reload" is modeled by dropping the store and building a new one
//! over the same directory and origin.

use authline_store::{CredentialStore, FileStorage, TokenPair};

fn file_store(
    dir: &std::path::Path,
    origin: &str,
) -> CredentialStore<FileStorage> {
    CredentialStore::new(FileStorage::new(dir, origin))
}

#[test]
fn test_pair_survives_reload() {
    let dir = tempfile::tempdir().unwrap();
    let pair = TokenPair::new("access-1", "refresh-1");

    {
        let store = file_store(dir.path(), "https://play.example.com");
        store.save(&pair).unwrap();
    }

    let reloaded = file_store(dir.path(), "https://play.example.com");
    assert_eq!(reloaded.load().unwrap(), Some(pair));
}

#[test]
fn test_origins_do_not_share_credentials() {
    let dir = tempfile::tempdir().unwrap();
    let ours = file_store(dir.path(), "https://play.example.com");
    let theirs = file_store(dir.path(), "https://evil.example.com");

    ours.save(&TokenPair::new("access-1", "refresh-1")).unwrap();

    assert_eq!(theirs.load().unwrap(), None);
}

#[test]
fn test_clear_is_visible_after_reload() {
    let dir = tempfile::tempdir().unwrap();
    let store = file_store(dir.path(), "origin");
    store.save(&TokenPair::new("access-1", "refresh-1")).unwrap();

    store.clear().unwrap();

    let reloaded = file_store(dir.path(), "origin");
    assert_eq!(reloaded.load().unwrap(), None);
}

#[test]
fn test_save_overwrites_previous_pair() {
    let dir = tempfile::tempdir().unwrap();
    let store = file_store(dir.path(), "origin");
    store.save(&TokenPair::new("access-1", "refresh-1")).unwrap();

    store.save(&TokenPair::new("access-2", "refresh-1")).unwrap();

    assert_eq!(
        store.load().unwrap(),
        Some(TokenPair::new("access-2", "refresh-1"))
    );
}
