//! Favicon refresh for bookmarks without a stored icon.

use super::ReloadContext;
use crate::error::FetchError;
use crate::types::Bookmark;
use tokio_util::sync::CancellationToken;

impl ReloadContext {
    /// Store an icon for `bookmark` unless it already has one
    ///
    /// Synchronized virtual feeds use the connection's built-in icon. Everything
    /// else is looked up at the feed's homepage first and at the feed URL second.
    /// Failures are logged and otherwise ignored.
    pub(super) async fn refresh_favicon(
        &self,
        bookmark: &Bookmark,
        homepage: Option<&str>,
        token: &CancellationToken,
    ) {
        let id = bookmark.id;
        if !self.should_proceed(id, token) {
            return;
        }

        match self.store.load_favicon(id).await {
            Ok(Some(_)) => return,
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(bookmark_id = id.0, error = %e, "Failed to look up favicon");
                return;
            }
        }

        let provided = if bookmark.is_sync_virtual_feed() {
            self.connection.provider_icon(&bookmark.url)
        } else {
            None
        };
        let icon = match provided {
            Some(icon) => Some(icon),
            None => self.download_favicon(bookmark, homepage, token).await,
        };
        let Some(icon) = icon else {
            return;
        };

        if !self.should_proceed(id, token) {
            return;
        }
        match self.store.save_favicon(id, &icon).await {
            Ok(()) => tracing::debug!(bookmark_id = id.0, bytes = icon.len(), "Stored favicon"),
            Err(e) => tracing::warn!(bookmark_id = id.0, error = %e, "Failed to store favicon"),
        }
    }

    async fn download_favicon(
        &self,
        bookmark: &Bookmark,
        homepage: Option<&str>,
        token: &CancellationToken,
    ) -> Option<Vec<u8>> {
        // The icon is looked up at the origin, so a same-origin homepage adds nothing
        let candidates = homepage
            .filter(|homepage| !same_origin(homepage, &bookmark.url))
            .into_iter()
            .chain(std::iter::once(bookmark.url.as_str()));

        for url in candidates {
            if !self.should_proceed(bookmark.id, token) {
                return None;
            }
            match self.connection.fetch_favicon(url, token).await {
                Ok(Some(icon)) => return Some(icon),
                Ok(None) => {}
                Err(FetchError::Cancelled) => return None,
                Err(e) => {
                    tracing::debug!(bookmark_id = bookmark.id.0, url, error = %e, "Favicon lookup failed");
                }
            }
        }

        None
    }
}

fn same_origin(a: &str, b: &str) -> bool {
    if a == b {
        return true;
    }
    match (url::Url::parse(a), url::Url::parse(b)) {
        (Ok(a), Ok(b)) => a.origin() == b.origin(),
        _ => false,
    }
}
