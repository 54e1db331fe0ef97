use super::setup_db;
use crate::types::ConditionalGetRecord;

fn record(url: &str, modified: Option<&str>, etag: Option<&str>) -> ConditionalGetRecord {
    ConditionalGetRecord {
        url: url.to_string(),
        if_modified_since: modified.map(str::to_string),
        if_none_match: etag.map(str::to_string),
    }
}

#[tokio::test]
async fn test_upsert_creates_then_updates_same_row() {
    let (db, _temp_file) = setup_db().await;
    let url = "https://example.com/feed.xml";

    db.upsert_conditional_get(&record(url, Some("Mon, 01 Jan 2024 00:00:00 GMT"), None))
        .await
        .unwrap();
    db.upsert_conditional_get(&record(url, None, Some("\"v2\"")))
        .await
        .unwrap();

    assert_eq!(
        db.count_conditional_gets().await.unwrap(),
        1,
        "one URL must never produce two records"
    );
    let stored = db.get_conditional_get(url).await.unwrap().unwrap();
    assert_eq!(stored, record(url, None, Some("\"v2\"")));
}

#[tokio::test]
async fn test_get_unknown_url_returns_none() {
    let (db, _temp_file) = setup_db().await;

    assert!(
        db.get_conditional_get("https://nowhere.example/feed")
            .await
            .unwrap()
            .is_none()
    );
}
