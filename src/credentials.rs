//! In-memory credential cache shared by the connection and the login flow.
//!
//! Credentials are keyed by URL origin, so every feed on the same host shares
//! one login. A login accepted for one feed is immediately visible to every
//! other feed that faults on the same origin.

use std::collections::HashMap;
use std::sync::RwLock;

/// Username/password pair
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Account name
    pub username: String,
    /// Secret
    pub password: String,
}

impl Credentials {
    /// Create a credential pair
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Thread-safe credential cache keyed by URL origin
#[derive(Debug, Default)]
pub struct CredentialStore {
    entries: RwLock<HashMap<String, Credentials>>,
}

impl CredentialStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Credentials for the origin of `url`, if known
    pub fn get(&self, url: &str) -> Option<Credentials> {
        let key = origin_key(url)?;
        self.entries
            .read()
            .ok()
            .and_then(|entries| entries.get(&key).cloned())
    }

    /// Remember credentials for the origin of `url`
    pub fn set(&self, url: &str, credentials: Credentials) {
        let Some(key) = origin_key(url) else {
            tracing::warn!(url, "Cannot store credentials for unparsable URL");
            return;
        };
        if let Ok(mut entries) = self.entries.write() {
            entries.insert(key, credentials);
        }
    }

    /// Forget credentials for the origin of `url`
    pub fn remove(&self, url: &str) -> Option<Credentials> {
        let key = origin_key(url)?;
        self.entries
            .write()
            .ok()
            .and_then(|mut entries| entries.remove(&key))
    }
}

/// Origin string used as cache key; synchronized accounts key by account name
fn origin_key(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    let host = parsed.host_str()?;
    match parsed.port_or_known_default() {
        Some(port) => Some(format!("{}://{}:{}", parsed.scheme(), host, port)),
        None => Some(format!("{}://{}", parsed.scheme(), host)),
    }
}
