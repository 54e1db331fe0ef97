use super::setup_db;
use crate::error::{DatabaseError, Error};
use crate::types::{Bookmark, BookmarkId, property_keys};

#[tokio::test]
async fn test_insert_and_get_bookmark() {
    let (db, _temp_file) = setup_db().await;

    let id = db
        .insert_bookmark("https://example.com/feed.xml", "Example")
        .await
        .unwrap();
    let bookmark = db.get_bookmark(id).await.unwrap().expect("bookmark should exist");

    assert_eq!(bookmark.id, id);
    assert_eq!(bookmark.url, "https://example.com/feed.xml");
    assert_eq!(bookmark.title, "Example");
    assert!(!bookmark.error_loading);
    assert!(bookmark.properties.is_empty());
}

#[tokio::test]
async fn test_get_missing_bookmark_returns_none() {
    let (db, _temp_file) = setup_db().await;

    assert!(db.get_bookmark(BookmarkId(4242)).await.unwrap().is_none());
}

#[tokio::test]
async fn test_update_bookmark_persists_error_state_and_properties() {
    let (db, _temp_file) = setup_db().await;
    let id = db
        .insert_bookmark("https://example.com/feed.xml", "Example")
        .await
        .unwrap();

    let mut bookmark = db.get_bookmark(id).await.unwrap().unwrap();
    bookmark.error_loading = true;
    bookmark.properties.insert(
        property_keys::ERROR_MESSAGE.to_string(),
        "HTTP 500".to_string(),
    );
    db.update_bookmark(&bookmark).await.unwrap();

    let reloaded = db.get_bookmark(id).await.unwrap().unwrap();
    assert!(reloaded.error_loading);
    assert_eq!(reloaded.error_message(), Some("HTTP 500"));
}

#[tokio::test]
async fn test_update_deleted_bookmark_returns_not_found() {
    let (db, _temp_file) = setup_db().await;
    let id = db
        .insert_bookmark("https://example.com/feed.xml", "Example")
        .await
        .unwrap();
    assert!(db.delete_bookmark(id).await.unwrap());

    let result = db
        .update_bookmark(&Bookmark::new(id, "https://example.com/feed.xml", "Example"))
        .await;

    match result {
        Err(Error::Database(DatabaseError::NotFound(msg))) => {
            assert!(msg.contains(&id.to_string()), "got: {msg}")
        }
        other => panic!("expected NotFound, got {other:?}"),
    }
}

#[tokio::test]
async fn test_delete_bookmark_cascades_to_favicon() {
    let (db, _temp_file) = setup_db().await;
    let id = db
        .insert_bookmark("https://example.com/feed.xml", "Example")
        .await
        .unwrap();
    db.set_favicon(id, &[1, 2, 3]).await.unwrap();
    assert_eq!(db.get_favicon(id).await.unwrap(), Some(vec![1, 2, 3]));

    db.delete_bookmark(id).await.unwrap();

    assert_eq!(db.get_favicon(id).await.unwrap(), None);
    assert!(!db.delete_bookmark(id).await.unwrap(), "second delete is a no-op");
}

#[tokio::test]
async fn test_get_all_bookmarks_is_ordered_by_id() {
    let (db, _temp_file) = setup_db().await;
    let first = db.insert_bookmark("https://a.example/feed", "A").await.unwrap();
    let second = db.insert_bookmark("https://b.example/feed", "B").await.unwrap();

    let all = db.get_all_bookmarks().await.unwrap();

    assert_eq!(
        all.iter().map(|b| b.id).collect::<Vec<_>>(),
        vec![first, second]
    );
}
