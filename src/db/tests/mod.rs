use crate::db::Database;
use tempfile::NamedTempFile;

mod bookmarks;
mod conditional_get;

/// Helper: create a fresh database with migrations applied
async fn setup_db() -> (Database, NamedTempFile) {
    let temp_file = NamedTempFile::new().unwrap();
    let db = Database::new(temp_file.path()).await.unwrap();
    (db, temp_file)
}
