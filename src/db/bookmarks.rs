//! Bookmark CRUD operations.

use crate::error::DatabaseError;
use crate::types::{Bookmark, BookmarkId};
use crate::{Error, Result};

use super::{BookmarkRow, Database, query_failed};

impl Database {
    /// Insert a new bookmark, returning its ID
    pub async fn insert_bookmark(&self, url: &str, title: &str) -> Result<BookmarkId> {
        let result = sqlx::query(
            r#"
            INSERT INTO bookmarks (url, title, error_loading, properties, created_at)
            VALUES (?, ?, 0, '{}', ?)
            "#,
        )
        .bind(url)
        .bind(title)
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await
        .map_err(query_failed("Failed to insert bookmark"))?;

        Ok(BookmarkId(result.last_insert_rowid()))
    }

    /// Get bookmark by ID
    pub async fn get_bookmark(&self, id: BookmarkId) -> Result<Option<Bookmark>> {
        let row = sqlx::query_as::<_, BookmarkRow>(
            r#"
            SELECT id, url, title, error_loading, properties
            FROM bookmarks
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(query_failed("Failed to get bookmark"))?;

        row.map(Bookmark::try_from).transpose()
    }

    /// Get all bookmarks ordered by ID
    pub async fn get_all_bookmarks(&self) -> Result<Vec<Bookmark>> {
        let rows = sqlx::query_as::<_, BookmarkRow>(
            r#"
            SELECT id, url, title, error_loading, properties
            FROM bookmarks
            ORDER BY id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(query_failed("Failed to get bookmarks"))?;

        rows.into_iter().map(Bookmark::try_from).collect()
    }

    /// Overwrite a bookmark's URL, title, error flag and properties
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError::NotFound` if the bookmark no longer exists.
    pub async fn update_bookmark(&self, bookmark: &Bookmark) -> Result<()> {
        let properties = serde_json::to_string(&bookmark.properties)?;

        let result = sqlx::query(
            r#"
            UPDATE bookmarks
            SET url = ?, title = ?, error_loading = ?, properties = ?
            WHERE id = ?
            "#,
        )
        .bind(&bookmark.url)
        .bind(&bookmark.title)
        .bind(bookmark.error_loading as i32)
        .bind(properties)
        .bind(bookmark.id)
        .execute(&self.pool)
        .await
        .map_err(query_failed("Failed to update bookmark"))?;

        if result.rows_affected() == 0 {
            return Err(Error::Database(DatabaseError::NotFound(format!(
                "Bookmark {} not found",
                bookmark.id
            ))));
        }
        Ok(())
    }

    /// Delete a bookmark together with its items and favicon
    pub async fn delete_bookmark(&self, id: BookmarkId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM bookmarks WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(query_failed("Failed to delete bookmark"))?;

        Ok(result.rows_affected() > 0)
    }
}
