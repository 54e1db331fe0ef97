//! Reload of a single bookmark -- fetch, react to the outcome, hand off the save.
//!
//! Split into focused submodules:
//! - [`context`] - Collaborators shared by all reloads, proceed checks, listener guard
//! - [`pipeline`] - Fetch loop and per-outcome handling
//! - [`favicon`] - Favicon refresh for bookmarks that have none yet

mod context;
mod favicon;
mod pipeline;


pub(crate) use context::ReloadContext;

use crate::types::{Bookmark, BookmarkId, Priority, ReloadOptions};
use crate::ui::UiShell;
use std::sync::Arc;

/// Request to reload one bookmark
///
/// Two tasks for the same bookmark are equal whatever else they carry; the
/// scheduler relies on this for deduplication.
#[derive(Clone)]
pub struct ReloadTask {
    bookmark: Bookmark,
    priority: Priority,
    options: ReloadOptions,
    shell: Option<Arc<dyn UiShell>>,
}

impl ReloadTask {
    /// Create a task with default options and no UI shell
    pub fn new(bookmark: Bookmark, priority: Priority) -> Self {
        Self {
            bookmark,
            priority,
            options: ReloadOptions::default(),
            shell: None,
        }
    }

    /// Use these caller overrides
    pub fn with_options(mut self, options: ReloadOptions) -> Self {
        self.options = options;
        self
    }

    /// Report login prompts and errors of this task to `shell`
    pub fn with_shell(mut self, shell: Arc<dyn UiShell>) -> Self {
        self.shell = Some(shell);
        self
    }

    /// Bookmark ID (the task's identity)
    pub fn id(&self) -> BookmarkId {
        self.bookmark.id
    }

    /// Scheduling priority
    pub fn priority(&self) -> Priority {
        self.priority
    }

    /// Bookmark to reload
    pub fn bookmark(&self) -> &Bookmark {
        &self.bookmark
    }

    /// Caller overrides
    pub fn options(&self) -> &ReloadOptions {
        &self.options
    }

    /// Shell attached by the caller, if any
    pub fn shell(&self) -> Option<&Arc<dyn UiShell>> {
        self.shell.as_ref()
    }
}

impl PartialEq for ReloadTask {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for ReloadTask {}

impl std::hash::Hash for ReloadTask {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id().hash(state);
    }
}

impl std::fmt::Debug for ReloadTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReloadTask")
            .field("id", &self.bookmark.id)
            .field("url", &self.bookmark.url)
            .field("priority", &self.priority)
            .field("has_shell", &self.shell.is_some())
            .finish()
    }
}

/// How a reload ended
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReloadOutcome {
    /// New content was fetched and handed to the save queue
    Loaded,
    /// The server reported no change
    NotModified,
    /// The reload stopped (cancel, shutdown or deletion) without side effects
    Cancelled,
    /// The bookmark is now in an error state with this message
    Failed {
        /// Message stored on the bookmark
        message: String,
    },
    /// A login prompt for the same synchronized account is already visible;
    /// the bookmark was flagged instead of prompting again
    AuthPending,
    /// Credentials were just supplied; the bookmark must be reloaded again
    Resubmit,
}
