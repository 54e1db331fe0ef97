//! Conditional GET validators, one row per feed URL.

use crate::Result;
use crate::types::ConditionalGetRecord;

use super::{Database, query_failed};

impl Database {
    /// Get the conditional GET record of a feed URL
    pub async fn get_conditional_get(&self, url: &str) -> Result<Option<ConditionalGetRecord>> {
        let row: Option<(String, Option<String>, Option<String>)> = sqlx::query_as(
            r#"
            SELECT url, if_modified_since, if_none_match
            FROM conditional_gets
            WHERE url = ?
            "#,
        )
        .bind(url)
        .fetch_optional(&self.pool)
        .await
        .map_err(query_failed("Failed to get conditional GET record"))?;

        Ok(row.map(|(url, if_modified_since, if_none_match)| ConditionalGetRecord {
            url,
            if_modified_since,
            if_none_match,
        }))
    }

    /// Insert the record, or update the existing row for the same URL in place
    pub async fn upsert_conditional_get(&self, record: &ConditionalGetRecord) -> Result<()> {
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
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await
        .map_err(query_failed("Failed to save conditional GET record"))?;

        Ok(())
    }

    /// Number of stored conditional GET records
    pub async fn count_conditional_gets(&self) -> Result<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM conditional_gets")
            .fetch_one(&self.pool)
            .await
            .map_err(query_failed("Failed to count conditional GET records"))
    }
}
