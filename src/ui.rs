//! Seam to the UI shell hosting the orchestrator.
//!
//! The orchestrator never touches widgets. It asks the shell to show a login
//! prompt or an error, and to tell whether a bookmark is currently on screen.
//! Implementations marshal these calls onto their UI thread and resolve the
//! returned future once the user has answered.

use crate::credentials::Credentials;
use crate::types::{Bookmark, BookmarkId};
use async_trait::async_trait;

/// What the shell needs to render a login prompt
#[derive(Clone, Debug)]
pub struct LoginRequest {
    /// Bookmark whose fetch was challenged
    pub bookmark: Bookmark,
    /// Realm announced by the server, if any
    pub realm: Option<String>,
    /// Account name when the bookmark belongs to a synchronized account
    pub sync_account: Option<String>,
}

/// UI operations the reload pipeline depends on
#[async_trait]
pub trait UiShell: Send + Sync {
    /// Show a modal login dialog and wait for the answer (`None` = cancelled)
    async fn prompt_login(&self, request: LoginRequest) -> Option<Credentials>;

    /// Show an error dialog for a bookmark
    async fn show_error(&self, bookmark: &Bookmark, message: &str);

    /// Whether the bookmark, or a folder containing it, is currently displayed
    fn is_displaying(&self, id: BookmarkId) -> bool;
}

/// Shell used when no UI is attached: every login is cancelled, errors are logged
#[derive(Debug, Default, Clone, Copy)]
pub struct HeadlessShell;

#[async_trait]
impl UiShell for HeadlessShell {
    async fn prompt_login(&self, request: LoginRequest) -> Option<Credentials> {
        tracing::debug!(
            bookmark_id = request.bookmark.id.0,
            realm = ?request.realm,
            "No UI attached, declining login prompt"
        );
        None
    }

    async fn show_error(&self, bookmark: &Bookmark, message: &str) {
        tracing::warn!(bookmark_id = bookmark.id.0, url = %bookmark.url, message, "Reload error");
    }

    fn is_displaying(&self, _id: BookmarkId) -> bool {
        false
    }
}
