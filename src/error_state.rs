//! Sticky per-bookmark error indicator.
//!
//! A failing bookmark keeps its error flag, message and optional link until a
//! later reload succeeds or reports `NotModified`. Writes only happen when the
//! visible state changes, and all of them go through one async lock so two
//! workers never interleave a read-modify-write of the same property bag.

use crate::error::Result;
use crate::store::FeedStore;
use crate::tracking::DeletedIdSet;
use crate::types::{Bookmark, BookmarkId, property_keys};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Guarded writer of a bookmark's error-related properties
pub struct ErrorStateTracker {
    store: Arc<dyn FeedStore>,
    deleted: Arc<DeletedIdSet>,
    write_lock: Mutex<()>,
}

impl ErrorStateTracker {
    /// Create a tracker writing through `store`
    pub fn new(store: Arc<dyn FeedStore>, deleted: Arc<DeletedIdSet>) -> Self {
        Self {
            store,
            deleted,
            write_lock: Mutex::new(()),
        }
    }

    /// Mark the bookmark as failing with `message` and an optional `link`
    ///
    /// Returns `true` if anything was written; an identical stored error is left
    /// alone.
    pub async fn set_error(
        &self,
        id: BookmarkId,
        message: &str,
        link: Option<&str>,
    ) -> Result<bool> {
        self.modify(id, |bookmark| {
            if bookmark.error_loading
                && bookmark.error_message() == Some(message)
                && bookmark.error_link() == link
            {
                return false;
            }

            bookmark.error_loading = true;
            bookmark
                .properties
                .insert(property_keys::ERROR_MESSAGE.to_string(), message.to_string());
            match link {
                Some(link) => {
                    bookmark
                        .properties
                        .insert(property_keys::ERROR_LINK.to_string(), link.to_string());
                }
                None => {
                    bookmark.properties.remove(property_keys::ERROR_LINK);
                }
            }
            true
        })
        .await
    }

    /// Clear the error indicator; a bookmark that is not failing is not written
    pub async fn clear(&self, id: BookmarkId) -> Result<bool> {
        self.modify(id, |bookmark| {
            let had_message = bookmark.properties.remove(property_keys::ERROR_MESSAGE).is_some();
            let had_link = bookmark.properties.remove(property_keys::ERROR_LINK).is_some();
            let was_failing = std::mem::replace(&mut bookmark.error_loading, false);
            was_failing || had_message || had_link
        })
        .await
    }

    /// Remember the realm a login was accepted for
    pub async fn remember_realm(&self, id: BookmarkId, realm: &str) -> Result<bool> {
        self.modify(id, |bookmark| {
            if bookmark.realm() == Some(realm) {
                return false;
            }
            bookmark
                .properties
                .insert(property_keys::AUTH_REALM.to_string(), realm.to_string());
            true
        })
        .await
    }

    async fn modify(&self, id: BookmarkId, change: impl FnOnce(&mut Bookmark) -> bool) -> Result<bool> {
        let _guard = self.write_lock.lock().await;

        if self.deleted.contains(id) {
            return Ok(false);
        }
        let Some(mut bookmark) = self.store.load_bookmark(id).await? else {
            tracing::debug!(bookmark_id = id.0, "Bookmark vanished before error state update");
            return Ok(false);
        };

        if !change(&mut bookmark) {
            return Ok(false);
        }

        self.store.save_bookmark(&bookmark).await?;
        Ok(true)
    }
}
