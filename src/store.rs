//! Persistence seam used by the reload pipeline.
//!
//! [`crate::db::Database`] is the SQLite implementation. Embedders with their own
//! storage implement this trait instead.

use crate::error::Result;
use crate::types::{
    Bookmark, BookmarkId, ConditionalGetRecord, Feed, MergeSummary, RetentionPolicy,
};
use async_trait::async_trait;

/// Storage operations the orchestrator needs
#[async_trait]
pub trait FeedStore: Send + Sync {
    /// Load a bookmark by ID
    async fn load_bookmark(&self, id: BookmarkId) -> Result<Option<Bookmark>>;

    /// Persist a bookmark's URL, title, error flag and property bag
    async fn save_bookmark(&self, bookmark: &Bookmark) -> Result<()>;

    /// Load the conditional GET record of a feed URL
    async fn load_conditional_get(&self, url: &str) -> Result<Option<ConditionalGetRecord>>;

    /// Insert or update the conditional GET record of its URL
    async fn save_conditional_get(&self, record: &ConditionalGetRecord) -> Result<()>;

    /// Load the cached favicon of a bookmark
    async fn load_favicon(&self, id: BookmarkId) -> Result<Option<Vec<u8>>>;

    /// Store the favicon of a bookmark
    async fn save_favicon(&self, id: BookmarkId, data: &[u8]) -> Result<()>;

    /// Merge fetched items into the bookmark's stored items.
    ///
    /// The conditional GET record, when given, is written in the same unit of work.
    /// `cleanup` applies retention after the merge; `None` skips cleanup.
    async fn merge_feed(
        &self,
        bookmark: &Bookmark,
        feed: &Feed,
        conditional_get: Option<&ConditionalGetRecord>,
        cleanup: Option<RetentionPolicy>,
    ) -> Result<MergeSummary>;
}
