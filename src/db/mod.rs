//! Database layer for feed-reloader
//!
//! Handles SQLite persistence for bookmarks, stored items, conditional GET
//! records and favicons.
//!
//! ## Submodules
//!
//! Methods on [`Database`] are organized by domain:
//! - [`migrations`] - Database lifecycle, schema migrations
//! - [`bookmarks`] - Bookmark CRUD
//! - [`conditional_get`] - Conditional GET validators per feed URL
//! - [`items`] - Feed merge and retention cleanup
//! - [`favicons`] - Favicon cache

use crate::error::{DatabaseError, Error, Result};
use crate::store::FeedStore;
use crate::types::{
    Bookmark, BookmarkId, ConditionalGetRecord, Feed, MergeSummary, RetentionPolicy,
};
use async_trait::async_trait;
use sqlx::{FromRow, sqlite::SqlitePool};
use std::collections::BTreeMap;

mod bookmarks;
mod conditional_get;
mod favicons;
mod items;
mod migrations;

/// Bookmark record from database
#[derive(Debug, Clone, FromRow)]
pub struct BookmarkRow {
    /// Unique database ID
    pub id: i64,
    /// Feed URL
    pub url: String,
    /// Display name
    pub title: String,
    /// Error flag (0 = ok, 1 = failing)
    pub error_loading: i32,
    /// Property bag as a JSON object
    pub properties: String,
}

impl TryFrom<BookmarkRow> for Bookmark {
    type Error = Error;

    fn try_from(row: BookmarkRow) -> Result<Self> {
        let properties: BTreeMap<String, String> = serde_json::from_str(&row.properties)?;
        Ok(Bookmark {
            id: BookmarkId(row.id),
            url: row.url,
            title: row.title,
            error_loading: row.error_loading != 0,
            properties,
        })
    }
}

/// Stored item record from database
#[derive(Debug, Clone, FromRow)]
pub struct ItemRow {
    /// Unique database ID
    pub id: i64,
    /// Owning bookmark
    pub bookmark_id: i64,
    /// Item GUID (unique per bookmark)
    pub guid: String,
    /// Item title
    pub title: String,
    /// Item link
    pub link: Option<String>,
    /// Unix timestamp of publication
    pub published_at: Option<i64>,
    /// Summary or description
    pub summary: Option<String>,
    /// Unix timestamp when the item was first stored
    pub received_at: i64,
}

/// Database handle for feed-reloader
pub struct Database {
    pool: SqlitePool,
}

/// Map a sqlx failure to a query error carrying what was being attempted
fn query_failed(context: &'static str) -> impl FnOnce(sqlx::Error) -> Error {
    move |e| Error::Database(DatabaseError::QueryFailed(format!("{}: {}", context, e)))
}

#[async_trait]
impl FeedStore for Database {
    async fn load_bookmark(&self, id: BookmarkId) -> Result<Option<Bookmark>> {
        self.get_bookmark(id).await
    }

    async fn save_bookmark(&self, bookmark: &Bookmark) -> Result<()> {
        self.update_bookmark(bookmark).await
    }

    async fn load_conditional_get(&self, url: &str) -> Result<Option<ConditionalGetRecord>> {
        self.get_conditional_get(url).await
    }

    async fn save_conditional_get(&self, record: &ConditionalGetRecord) -> Result<()> {
        self.upsert_conditional_get(record).await
    }

    async fn load_favicon(&self, id: BookmarkId) -> Result<Option<Vec<u8>>> {
        self.get_favicon(id).await
    }

    async fn save_favicon(&self, id: BookmarkId, data: &[u8]) -> Result<()> {
        self.set_favicon(id, data).await
    }

    async fn merge_feed(
        &self,
        bookmark: &Bookmark,
        feed: &Feed,
        conditional_get: Option<&ConditionalGetRecord>,
        cleanup: Option<RetentionPolicy>,
    ) -> Result<MergeSummary> {
        self.merge_items(bookmark.id, feed, conditional_get, cleanup)
            .await
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
