//! Feed merge and retention cleanup.

use crate::error::DatabaseError;
use crate::types::{
    BookmarkId, ConditionalGetRecord, Feed, FeedItem, MergeSummary, RetentionPolicy,
};
use crate::{Error, Result};
use sqlx::SqliteConnection;

use super::{Database, ItemRow, query_failed};

const SECONDS_PER_DAY: i64 = 86_400;

impl Database {
    /// Merge fetched items into a bookmark's stored items in one transaction
    ///
    /// New GUIDs are inserted, known GUIDs are updated when their content changed.
    /// The conditional GET record is written in the same transaction, and retention
    /// cleanup runs last when `cleanup` is given.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError::NotFound` if the bookmark no longer exists; nothing
    /// is written in that case.
    pub async fn merge_items(
        &self,
        bookmark_id: BookmarkId,
        feed: &Feed,
        conditional_get: Option<&ConditionalGetRecord>,
        cleanup: Option<RetentionPolicy>,
    ) -> Result<MergeSummary> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(query_failed("Failed to begin merge transaction"))?;

        let exists: Option<i64> = sqlx::query_scalar("SELECT id FROM bookmarks WHERE id = ?")
            .bind(bookmark_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(query_failed("Failed to look up bookmark"))?;
        if exists.is_none() {
            return Err(Error::Database(DatabaseError::NotFound(format!(
                "Bookmark {} not found",
                bookmark_id
            ))));
        }

        let mut summary = MergeSummary::default();
        let now = chrono::Utc::now().timestamp();

        for item in &feed.items {
            match upsert_item(&mut tx, bookmark_id, item, now).await? {
                ItemChange::Added => summary.added += 1,
                ItemChange::Updated => summary.updated += 1,
                ItemChange::Unchanged => {}
            }
        }

        if let Some(record) = conditional_get {
            sqlx::query(
                r#"
                INSERT INTO conditional_gets (url, if_modified_since, if_none_match, updated_at)
                VALUES (?, ?, ?, ?)
                ON CONFLICT(url) DO UPDATE SET
                    if_modified_since = excluded.if_modified_since,
                    if_none_match = excluded.if_none_match,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(&record.url)
            .bind(&record.if_modified_since)
            .bind(&record.if_none_match)
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(query_failed("Failed to save conditional GET record"))?;
        }

        if let Some(policy) = cleanup {
            summary.removed = apply_retention(&mut tx, bookmark_id, policy, now).await?;
        }

        tx.commit()
            .await
            .map_err(query_failed("Failed to commit merge transaction"))?;

        tracing::debug!(
            bookmark_id = bookmark_id.0,
            added = summary.added,
            updated = summary.updated,
            removed = summary.removed,
            "Merged feed into storage"
        );

        Ok(summary)
    }

    /// Stored items of a bookmark, newest first
    pub async fn get_items(&self, bookmark_id: BookmarkId) -> Result<Vec<ItemRow>> {
        sqlx::query_as::<_, ItemRow>(
            r#"
            SELECT id, bookmark_id, guid, title, link, published_at, summary, received_at
            FROM news_items
            WHERE bookmark_id = ?
            ORDER BY COALESCE(published_at, received_at) DESC, id DESC
            "#,
        )
        .bind(bookmark_id)
        .fetch_all(&self.pool)
        .await
        .map_err(query_failed("Failed to get items"))
    }

    /// Number of stored items of a bookmark
    pub async fn count_items(&self, bookmark_id: BookmarkId) -> Result<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM news_items WHERE bookmark_id = ?")
            .bind(bookmark_id)
            .fetch_one(&self.pool)
            .await
            .map_err(query_failed("Failed to count items"))
    }
}

enum ItemChange {
    Added,
    Updated,
    Unchanged,
}

async fn upsert_item(
    conn: &mut SqliteConnection,
    bookmark_id: BookmarkId,
    item: &FeedItem,
    now: i64,
) -> Result<ItemChange> {
    let published_at = item.published.map(|d| d.timestamp());

    let existing: Option<(i64, String, Option<String>, Option<i64>, Option<String>)> =
        sqlx::query_as(
            r#"
            SELECT id, title, link, published_at, summary
            FROM news_items
            WHERE bookmark_id = ? AND guid = ?
            "#,
        )
        .bind(bookmark_id)
        .bind(&item.guid)
        .fetch_optional(&mut *conn)
        .await
        .map_err(query_failed("Failed to look up item"))?;

    match existing {
        None => {
            sqlx::query(
                r#"
                INSERT INTO news_items (bookmark_id, guid, title, link, published_at, summary, received_at)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(bookmark_id)
            .bind(&item.guid)
            .bind(&item.title)
            .bind(&item.link)
            .bind(published_at)
            .bind(&item.summary)
            .bind(now)
            .execute(&mut *conn)
            .await
            .map_err(query_failed("Failed to insert item"))?;
            Ok(ItemChange::Added)
        }
        Some((id, title, link, published, summary))
            if title != item.title
                || link != item.link
                || published != published_at
                || summary != item.summary =>
        {
            sqlx::query(
                r#"
                UPDATE news_items
                SET title = ?, link = ?, published_at = ?, summary = ?
                WHERE id = ?
                "#,
            )
            .bind(&item.title)
            .bind(&item.link)
            .bind(published_at)
            .bind(&item.summary)
            .bind(id)
            .execute(&mut *conn)
            .await
            .map_err(query_failed("Failed to update item"))?;
            Ok(ItemChange::Updated)
        }
        Some(_) => Ok(ItemChange::Unchanged),
    }
}

async fn apply_retention(
    conn: &mut SqliteConnection,
    bookmark_id: BookmarkId,
    policy: RetentionPolicy,
    now: i64,
) -> Result<usize> {
    let mut removed = 0u64;

    if let Some(days) = policy.max_age_days {
        let cutoff = now - i64::from(days) * SECONDS_PER_DAY;
        let result = sqlx::query(
            r#"
            DELETE FROM news_items
            WHERE bookmark_id = ? AND COALESCE(published_at, received_at) < ?
            "#,
        )
        .bind(bookmark_id)
        .bind(cutoff)
        .execute(&mut *conn)
        .await
        .map_err(query_failed("Failed to delete expired items"))?;
        removed += result.rows_affected();
    }

    if let Some(max_items) = policy.max_items {
        let result = sqlx::query(
            r#"
            DELETE FROM news_items
            WHERE bookmark_id = ?1 AND id NOT IN (
                SELECT id FROM news_items
                WHERE bookmark_id = ?1
                ORDER BY COALESCE(published_at, received_at) DESC, id DESC
                LIMIT ?2
            )
            "#,
        )
        .bind(bookmark_id)
        .bind(max_items as i64)
        .execute(&mut *conn)
        .await
        .map_err(query_failed("Failed to trim items"))?;
        removed += result.rows_affected();
    }

    Ok(removed as usize)
}
