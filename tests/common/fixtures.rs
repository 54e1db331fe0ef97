//! Feed documents, mock servers and orchestrators wired to SQLite

use feed_reloader::{
    Bookmark, Config, CredentialStore, Database, HeadlessShell, HttpFeedConnection,
    ReloadOrchestrator,
};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// An orchestrator over a temporary SQLite database, plus a second handle
/// on that database for assertions
pub struct TestStack {
    pub orchestrator: ReloadOrchestrator,
    pub db: Arc<Database>,
    pub credentials: Arc<CredentialStore>,
    _temp_dir: TempDir,
}

/// Build the HTTP + SQLite stack with a headless shell
pub async fn create_stack(max_concurrent: usize) -> TestStack {
    let temp_dir = tempfile::tempdir().unwrap();

    let mut config = Config::default();
    config.reload.max_concurrent_reloads = max_concurrent;
    config.reload.connection_timeout = Duration::from_secs(5);
    config.persistence.database_path = temp_dir.path().join("feeds.db");

    let db = Arc::new(Database::new(&config.persistence.database_path).await.unwrap());
    let credentials = Arc::new(CredentialStore::new());
    let connection = HttpFeedConnection::new(&config, Arc::clone(&credentials)).unwrap();

    let orchestrator = ReloadOrchestrator::new(
        config,
        Arc::new(connection),
        db.clone(),
        Arc::new(HeadlessShell),
        Arc::clone(&credentials),
    )
    .unwrap();

    TestStack {
        orchestrator,
        db,
        credentials,
        _temp_dir: temp_dir,
    }
}

/// Insert a bookmark for `url` and return it as stored
pub async fn add_bookmark(db: &Database, url: &str, title: &str) -> Bookmark {
    let id = db.insert_bookmark(url, title).await.unwrap();
    db.get_bookmark(id).await.unwrap().unwrap()
}

/// An RSS 2.0 document whose channel links back to `homepage`
pub fn rss_document(homepage: &str, guids: &[&str]) -> String {
    let items: String = guids
        .iter()
        .map(|guid| {
            format!(
                "<item><title>Post {guid}</title><guid>{guid}</guid>\
                 <link>{homepage}/posts/{guid}</link></item>"
            )
        })
        .collect();
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0"><channel><title>Test feed</title><link>{homepage}</link>
<description>Fixture</description>{items}</channel></rss>"#
    )
}

/// An Atom document with one entry per id
pub fn atom_document(homepage: &str, ids: &[&str]) -> String {
    let entries: String = ids
        .iter()
        .map(|id| {
            format!(
                "<entry><id>urn:test:{id}</id><title>Entry {id}</title>\
                 <updated>2026-01-01T00:00:00Z</updated>\
                 <link rel=\"alternate\" href=\"{homepage}/entries/{id}\"/></entry>"
            )
        })
        .collect();
    format!(
        r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom"><title>Atom fixture</title>
<id>urn:test:feed</id><updated>2026-01-01T00:00:00Z</updated>
<link rel="alternate" href="{homepage}"/>{entries}</feed>"#
    )
}

/// Serve `body` at `route` with an ETag; matching conditional requests get a 304
pub async fn mount_feed_with_etag(server: &MockServer, route: &str, body: String, etag: &str) {
    Mock::given(method("GET"))
        .and(path(route.to_string()))
        .and(header("If-None-Match", etag))
        .respond_with(ResponseTemplate::new(304))
        .with_priority(1)
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path(route.to_string()))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("ETag", etag)
                .insert_header("Content-Type", "application/rss+xml")
                .set_body_string(body),
        )
        .with_priority(2)
        .mount(server)
        .await;
}
