//! Favicon cache.

use crate::Result;
use crate::types::BookmarkId;

use super::{Database, query_failed};

impl Database {
    /// Get the stored favicon of a bookmark
    pub async fn get_favicon(&self, id: BookmarkId) -> Result<Option<Vec<u8>>> {
        sqlx::query_scalar("SELECT data FROM favicons WHERE bookmark_id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(query_failed("Failed to get favicon"))
    }

    /// Store or replace the favicon of a bookmark
    pub async fn set_favicon(&self, id: BookmarkId, data: &[u8]) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO favicons (bookmark_id, data, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(bookmark_id) DO UPDATE SET
                data = excluded.data,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(id)
        .bind(data)
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await
        .map_err(query_failed("Failed to save favicon"))?;

        Ok(())
    }
}
