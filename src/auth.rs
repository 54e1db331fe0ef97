//! Single-flight login prompts.
//!
//! At most one login dialog is visible at any time. Ordinary bookmarks queue up
//! behind the prompt lock and each gets its own turn. Bookmarks of a synchronized
//! account share one login, so a task that finds the lock taken does not wait:
//! the prompt already on screen is for the same account.

use crate::credentials::{CredentialStore, Credentials};
use crate::types::Bookmark;
use crate::ui::{LoginRequest, UiShell};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// Result of asking for credentials after an authentication challenge
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AuthDecision {
    /// The user entered credentials; they are now in the credential store
    Supplied(Credentials),
    /// Another prompt stored new credentials while this task waited; retry the fetch
    AlreadySupplied,
    /// The user dismissed the prompt
    Cancelled,
    /// A synchronized-account prompt is already visible
    Contended,
    /// The reload stopped (cancellation, deletion or shutdown) before a prompt was shown
    Aborted,
}

/// A challenged fetch waiting for credentials
#[derive(Clone, Copy, Debug)]
pub struct AuthChallenge<'a> {
    /// Bookmark whose fetch was challenged
    pub bookmark: &'a Bookmark,
    /// Realm announced by the server
    pub realm: Option<&'a str>,
    /// Credentials the failed fetch was sent with
    pub attempted: Option<&'a Credentials>,
}

/// Gate around the login prompt
pub struct AuthenticationCoordinator {
    credentials: Arc<CredentialStore>,
    prompt_lock: Mutex<()>,
    sync_cancels: RwLock<HashMap<String, Instant>>,
}

impl AuthenticationCoordinator {
    /// Create a coordinator storing accepted logins in `credentials`
    pub fn new(credentials: Arc<CredentialStore>) -> Self {
        Self {
            credentials,
            prompt_lock: Mutex::new(()),
            sync_cancels: RwLock::new(HashMap::new()),
        }
    }

    /// Obtain credentials for a challenged fetch
    ///
    /// Ordinary bookmarks wait for the prompt lock (or for `token`), synchronized
    /// bookmarks only try it. Under the lock the reload is re-checked through
    /// `proceed`, then the credential store: if it now holds something other than
    /// what the failed fetch was sent with, a concurrent prompt already answered
    /// and no dialog is shown.
    pub async fn authenticate(
        &self,
        challenge: AuthChallenge<'_>,
        shell: &dyn UiShell,
        token: &CancellationToken,
        proceed: impl Fn() -> bool,
    ) -> AuthDecision {
        let bookmark = challenge.bookmark;
        let sync_account = bookmark.sync_account();

        let _guard = if sync_account.is_some() {
            match self.prompt_lock.try_lock() {
                Ok(guard) => guard,
                Err(_) => {
                    tracing::debug!(
                        bookmark_id = bookmark.id.0,
                        account = sync_account.as_deref(),
                        "Login prompt for synchronized account already visible"
                    );
                    return AuthDecision::Contended;
                }
            }
        } else {
            tokio::select! {
                guard = self.prompt_lock.lock() => guard,
                _ = token.cancelled() => return AuthDecision::Aborted,
            }
        };

        if !proceed() {
            return AuthDecision::Aborted;
        }

        let current = self.credentials.get(&bookmark.url);
        if current.is_some() && current.as_ref() != challenge.attempted {
            tracing::debug!(
                bookmark_id = bookmark.id.0,
                "Credentials supplied by a concurrent prompt, retrying"
            );
            return AuthDecision::AlreadySupplied;
        }

        let request = LoginRequest {
            bookmark: bookmark.clone(),
            realm: challenge.realm.map(str::to_string),
            sync_account: sync_account.clone(),
        };

        match shell.prompt_login(request).await {
            Some(credentials) => {
                self.credentials.set(&bookmark.url, credentials.clone());
                tracing::info!(bookmark_id = bookmark.id.0, realm = challenge.realm, "Login accepted");
                AuthDecision::Supplied(credentials)
            }
            None => {
                if let Some(account) = sync_account
                    && let Ok(mut cancels) = self.sync_cancels.write()
                {
                    cancels.insert(account, Instant::now());
                }
                AuthDecision::Cancelled
            }
        }
    }

    /// When the user last dismissed a login prompt for a synchronized `account`
    pub fn last_sync_cancel(&self, account: &str) -> Option<Instant> {
        self.sync_cancels
            .read()
            .ok()
            .and_then(|cancels| cancels.get(account).copied())
    }

    /// Whether automatic reloads of `account` should still back off
    ///
    /// A zero `backoff` disables the policy.
    pub fn in_sync_backoff(&self, account: &str, backoff: Duration) -> bool {
        if backoff.is_zero() {
            return false;
        }
        self.last_sync_cancel(account)
            .is_some_and(|cancelled| cancelled.elapsed() < backoff)
    }
}
