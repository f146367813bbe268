//! Durable storage for the opaque session token.
//!
//! The token is a capability the server alone can revoke: the client never
//! inspects or parses it, only stores and replays it. The store is the one
//! piece of shared mutable state between the pipeline and the session
//! manager, and every operation on it is synchronous and atomic.

use std::fmt;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::Mutex;

use secrecy::{ExposeSecret, SecretString};

/// Opaque session credential issued by the backend at login.
#[derive(Clone)]
pub struct SessionToken(SecretString);

impl SessionToken {
    /// Wrap a raw token string.
    #[must_use]
    pub fn new(raw: impl Into<String>) -> Self {
        Self(SecretString::from(raw.into()))
    }

    /// Expose the raw token for the `Authorization` header.
    #[must_use]
    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }
}

impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionToken([REDACTED])")
    }
}

/// Client-side credential storage.
///
/// Pure key-value semantics with no validation and no client-side expiry
/// logic. `clear` must succeed even when no token is present.
pub trait CredentialStore: Send + Sync {
    /// Current token, if any.
    fn get(&self) -> Option<SessionToken>;

    /// Replace the stored token.
    fn set(&self, token: &SessionToken);

    /// Remove the stored token. Idempotent.
    fn clear(&self);
}

/// In-memory credential store for tests and short-lived embeddings.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    token: Mutex<Option<SessionToken>>,
}

impl MemoryCredentialStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn get(&self) -> Option<SessionToken> {
        self.token
            .lock()
            .expect("credential store mutex poisoned")
            .clone()
    }

    fn set(&self, token: &SessionToken) {
        *self.token.lock().expect("credential store mutex poisoned") = Some(token.clone());
    }

    fn clear(&self) {
        *self.token.lock().expect("credential store mutex poisoned") = None;
    }
}

/// Credential store backed by a single token file.
///
/// The durable analog of browser local storage. A missing file simply means
/// no session; read and delete tolerate it.
#[derive(Debug)]
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    /// Create a store over the given token file path.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl CredentialStore for FileCredentialStore {
    fn get(&self) -> Option<SessionToken> {
        match fs::read_to_string(&self.path) {
            Ok(raw) => {
                let raw = raw.trim();
                if raw.is_empty() {
                    None
                } else {
                    Some(SessionToken::new(raw))
                }
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => None,
            Err(err) => {
                tracing::warn!(
                    error = %err,
                    path = %self.path.display(),
                    "failed to read credential file"
                );
                None
            }
        }
    }

    fn set(&self, token: &SessionToken) {
        if let Err(err) = fs::write(&self.path, token.expose()) {
            tracing::error!(
                error = %err,
                path = %self.path.display(),
                "failed to persist credential file"
            );
        }
    }

    fn clear(&self) {
        match fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => {
                tracing::warn!(
                    error = %err,
                    path = %self.path.display(),
                    "failed to remove credential file"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store_roundtrip_and_idempotent_clear() {
        let store = MemoryCredentialStore::new();
        assert!(store.get().is_none());

        store.set(&SessionToken::new("tok-1"));
        assert_eq!(store.get().map(|t| t.expose().to_string()), Some("tok-1".to_string()));

        store.clear();
        assert!(store.get().is_none());
        // Clearing again is a no-op, not an error.
        store.clear();
        assert!(store.get().is_none());
    }

    #[test]
    fn test_token_debug_is_redacted() {
        let token = SessionToken::new("very-secret");
        let rendered = format!("{token:?}");
        assert!(!rendered.contains("very-secret"));
        assert!(rendered.contains("REDACTED"));
    }

    #[test]
    fn test_file_store_roundtrip() {
        let path = std::env::temp_dir().join(format!(
            "shopfront-token-{}-{:?}",
            std::process::id(),
            std::thread::current().id()
        ));
        let store = FileCredentialStore::new(&path);

        assert!(store.get().is_none());
        store.set(&SessionToken::new("tok-file"));
        assert_eq!(
            store.get().map(|t| t.expose().to_string()),
            Some("tok-file".to_string())
        );

        store.clear();
        assert!(store.get().is_none());
        store.clear();
    }
}
