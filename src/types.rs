//! Core types for feed-reloader

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

/// URL scheme marking a bookmark mirrored from a synchronized account
pub const SYNC_SCHEME: &str = "sync";

/// Virtual feeds a synchronized account exposes next to its regular subscriptions
pub const SYNC_VIRTUAL_FEEDS: [&str; 3] = ["starred", "shared", "recommended"];

/// Property bag keys written by the reload pipeline
pub mod property_keys {
    /// Last error message shown for a failing bookmark
    pub const ERROR_MESSAGE: &str = "error.message";
    /// Optional user-facing link attached to the last error
    pub const ERROR_LINK: &str = "error.link";
    /// Authentication realm hint remembered after a successful login
    pub const AUTH_REALM: &str = "auth.realm";
}

/// Unique identifier for a bookmark
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BookmarkId(pub i64);

impl BookmarkId {
    /// Create a new BookmarkId
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    /// Get the inner i64 value
    pub fn get(&self) -> i64 {
        self.0
    }
}

impl From<i64> for BookmarkId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl From<BookmarkId> for i64 {
    fn from(id: BookmarkId) -> Self {
        id.0
    }
}

impl std::fmt::Display for BookmarkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl sqlx::Type<sqlx::Sqlite> for BookmarkId {
    fn type_info() -> sqlx::sqlite::SqliteTypeInfo {
        <i64 as sqlx::Type<sqlx::Sqlite>>::type_info()
    }

    fn compatible(ty: &sqlx::sqlite::SqliteTypeInfo) -> bool {
        <i64 as sqlx::Type<sqlx::Sqlite>>::compatible(ty)
    }
}

impl<'q> sqlx::Encode<'q, sqlx::Sqlite> for BookmarkId {
    fn encode_by_ref(
        &self,
        args: &mut Vec<sqlx::sqlite::SqliteArgumentValue<'q>>,
    ) -> std::result::Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
        <i64 as sqlx::Encode<'q, sqlx::Sqlite>>::encode_by_ref(&self.0, args)
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Sqlite> for BookmarkId {
    fn decode(
        value: sqlx::sqlite::SqliteValueRef<'r>,
    ) -> std::result::Result<Self, sqlx::error::BoxDynError> {
        Ok(Self(<i64 as sqlx::Decode<'r, sqlx::Sqlite>>::decode(value)?))
    }
}

/// Reload priority
///
/// Ordering follows dispatch order: `Short` sorts above `Default`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Batch and background reloads
    #[default]
    Default = 0,
    /// Interactive reload of a single bookmark
    Short = 1,
}

impl Priority {
    /// Pick the priority for a request covering `count` bookmarks.
    ///
    /// A request for exactly one bookmark is treated as interactive.
    pub fn for_request_size(count: usize) -> Self {
        if count == 1 {
            Priority::Short
        } else {
            Priority::Default
        }
    }
}

/// A subscribed feed source
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bookmark {
    /// Stable identity
    pub id: BookmarkId,
    /// Feed URL
    pub url: String,
    /// Display name
    pub title: String,
    /// Whether the last reload left this bookmark in a failing state
    pub error_loading: bool,
    /// Open string-keyed property bag (see [`property_keys`])
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

impl Bookmark {
    /// Create a bookmark with an empty property bag
    pub fn new(id: impl Into<BookmarkId>, url: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
            title: title.into(),
            error_loading: false,
            properties: BTreeMap::new(),
        }
    }

    /// Whether this bookmark mirrors content from a synchronized account
    pub fn is_synchronized(&self) -> bool {
        url::Url::parse(&self.url)
            .map(|u| u.scheme() == SYNC_SCHEME)
            .unwrap_or(false)
    }

    /// Account name of a synchronized bookmark (`sync://<account>/...`)
    pub fn sync_account(&self) -> Option<String> {
        let url = url::Url::parse(&self.url).ok()?;
        if url.scheme() != SYNC_SCHEME {
            return None;
        }
        url.host_str().map(str::to_string)
    }

    /// Whether this is one of the account-wide virtual feeds of a synchronized account
    pub fn is_sync_virtual_feed(&self) -> bool {
        if !self.is_synchronized() {
            return false;
        }
        url::Url::parse(&self.url)
            .ok()
            .and_then(|u| {
                u.path_segments()
                    .and_then(|mut segments| segments.next().map(str::to_string))
            })
            .is_some_and(|first| SYNC_VIRTUAL_FEEDS.contains(&first.as_str()))
    }

    /// Last stored error message, if any
    pub fn error_message(&self) -> Option<&str> {
        self.properties
            .get(property_keys::ERROR_MESSAGE)
            .map(String::as_str)
    }

    /// Last stored error link, if any
    pub fn error_link(&self) -> Option<&str> {
        self.properties
            .get(property_keys::ERROR_LINK)
            .map(String::as_str)
    }

    /// Remembered authentication realm, if any
    pub fn realm(&self) -> Option<&str> {
        self.properties
            .get(property_keys::AUTH_REALM)
            .map(String::as_str)
    }
}

/// Last-seen HTTP validators for one feed URL
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConditionalGetRecord {
    /// Feed URL (unique key)
    pub url: String,
    /// `Last-Modified` value to send back as `If-Modified-Since`
    pub if_modified_since: Option<String>,
    /// `ETag` value to send back as `If-None-Match`
    pub if_none_match: Option<String>,
}

impl ConditionalGetRecord {
    /// Whether at least one validator is present
    pub fn has_validators(&self) -> bool {
        self.if_modified_since.is_some() || self.if_none_match.is_some()
    }
}

/// Validators returned by a successful fetch
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Validators {
    /// `Last-Modified` response header
    pub last_modified: Option<String>,
    /// `ETag` response header
    pub etag: Option<String>,
}

impl Validators {
    /// Whether the response carried any validator
    pub fn is_empty(&self) -> bool {
        self.last_modified.is_none() && self.etag.is_none()
    }
}

/// A parsed feed
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Feed {
    /// Channel title
    pub title: Option<String>,
    /// Homepage of the site publishing the feed
    pub homepage: Option<String>,
    /// Items in document order
    pub items: Vec<FeedItem>,
}

/// One entry of a feed
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FeedItem {
    /// Unique identifier (RSS guid, Atom id, or link/title fallback)
    pub guid: String,
    /// Item title
    pub title: String,
    /// Item link
    pub link: Option<String>,
    /// Publication date
    pub published: Option<DateTime<Utc>>,
    /// Summary or description
    pub summary: Option<String>,
}

/// Result of a successful fetch
#[derive(Clone, Debug)]
pub struct FetchResponse {
    /// The parsed feed
    pub feed: Feed,
    /// Conditional GET validators returned by the server
    pub validators: Validators,
    /// URL the content was finally served from (after redirects)
    pub resolved_url: String,
}

/// Caller-supplied overrides for one reload request
#[derive(Clone, Debug, Default)]
pub struct ReloadOptions {
    /// Connection timeout override
    pub timeout: Option<Duration>,
    /// Retention override: keep at most this many items
    pub max_items: Option<usize>,
    /// Retention override: drop items older than this many days
    pub max_age_days: Option<u32>,
    /// Free-form properties forwarded to the connection
    pub properties: HashMap<String, String>,
}

/// Properties handed to the connection for one fetch
#[derive(Clone, Debug, Default)]
pub struct FetchProperties {
    /// Connection timeout
    pub timeout: Duration,
    /// Item count limit (synchronized accounts only)
    pub max_items: Option<usize>,
    /// Item age limit in days (synchronized accounts only)
    pub max_age_days: Option<u32>,
    /// Synchronized items whose state change is not yet committed upstream
    pub uncommitted_sync_items: Vec<String>,
    /// Conditional GET validators
    pub conditional_get: Option<ConditionalGetRecord>,
    /// Free-form properties
    pub extra: HashMap<String, String>,
}

/// Retention applied when merging a feed into storage
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RetentionPolicy {
    /// Keep at most this many items (newest first)
    pub max_items: Option<usize>,
    /// Drop items published more than this many days ago
    pub max_age_days: Option<u32>,
}

impl RetentionPolicy {
    /// Whether the policy would remove anything at all
    pub fn is_unbounded(&self) -> bool {
        self.max_items.is_none() && self.max_age_days.is_none()
    }
}

/// Outcome of merging a fetched feed into storage
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MergeSummary {
    /// Items that did not exist before
    pub added: usize,
    /// Existing items whose content changed
    pub updated: usize,
    /// Items deleted by retention cleanup
    pub removed: usize,
}

/// Event emitted during the reload lifecycle
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Reload accepted by the scheduler
    ReloadQueued {
        /// Bookmark ID
        id: BookmarkId,
        /// Assigned priority
        priority: Priority,
    },

    /// A reload task is starting
    AboutToLoad {
        /// Bookmark ID
        id: BookmarkId,
    },

    /// A reload task finished (whatever the outcome)
    DoneLoading {
        /// Bookmark ID
        id: BookmarkId,
    },

    /// Fetched content is being merged into storage (indeterminate progress)
    Saving {
        /// Bookmark ID
        id: BookmarkId,
    },

    /// Fetched content was merged into storage
    Saved {
        /// Bookmark ID
        id: BookmarkId,
        /// New items
        added: usize,
        /// Changed items
        updated: usize,
        /// Items removed by retention cleanup
        removed: usize,
    },

    /// Reload ended in a sticky error state
    ReloadFailed {
        /// Bookmark ID
        id: BookmarkId,
        /// Error message
        error: String,
    },

    /// Orchestrator shut down
    Shutdown,
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_bookmark_requests_are_interactive() {
        assert_eq!(Priority::for_request_size(1), Priority::Short);
        assert_eq!(Priority::for_request_size(0), Priority::Default);
        assert_eq!(Priority::for_request_size(7), Priority::Default);
    }

    #[test]
    fn short_priority_sorts_above_default() {
        assert!(Priority::Short > Priority::Default);
    }

    #[test]
    fn sync_scheme_marks_synchronized_bookmarks() {
        let synced = Bookmark::new(1, "sync://alice/feed/42", "Synced");
        let plain = Bookmark::new(2, "https://example.com/feed.xml", "Plain");

        assert!(synced.is_synchronized());
        assert_eq!(synced.sync_account().as_deref(), Some("alice"));
        assert!(!plain.is_synchronized());
        assert_eq!(plain.sync_account(), None);
    }

    #[test]
    fn virtual_feeds_are_detected_only_for_sync_accounts() {
        assert!(Bookmark::new(1, "sync://alice/starred", "Starred").is_sync_virtual_feed());
        assert!(!Bookmark::new(2, "sync://alice/feed/9", "Feed").is_sync_virtual_feed());
        assert!(!Bookmark::new(3, "https://example.com/starred", "Web").is_sync_virtual_feed());
    }

    #[test]
    fn unparsable_url_is_not_synchronized() {
        let bookmark = Bookmark::new(1, "not a url", "Broken");
        assert!(!bookmark.is_synchronized());
        assert!(!bookmark.is_sync_virtual_feed());
    }

    #[test]
    fn event_serializes_with_snake_case_tag() {
        let json = serde_json::to_value(Event::AboutToLoad { id: BookmarkId(5) }).unwrap();
        assert_eq!(json["type"], "about_to_load");
        assert_eq!(json["id"], 5);
    }
}
