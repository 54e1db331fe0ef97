//! Error types for feed-reloader
//!
//! Two layers:
//! - [`FetchError`] is the closed set of outcomes a fetch can fail with. The reload
//!   pipeline matches on it exhaustively to pick its reaction.
//! - [`Error`] is the crate-wide error returned by fallible operations (storage,
//!   configuration, setup).

use crate::types::BookmarkId;
use thiserror::Error;

/// Result type alias for feed-reloader operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for feed-reloader
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "max_concurrent_reloads")
        key: Option<String>,
    },

    /// Database operation failed
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),

    /// SQLx database error
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// Fetch failure surfaced outside the reload pipeline
    #[error("fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// HTTP client error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Bookmark not found
    #[error("bookmark not found: {0}")]
    NotFound(String),

    /// Shutdown in progress - not accepting new reloads
    #[error("shutdown in progress: not accepting new reloads")]
    ShuttingDown,

    /// A reload of the bookmark is already queued or running
    #[error("reload already in progress for bookmark {0}")]
    InProgress(BookmarkId),

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Database-related errors
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Failed to connect to database
    #[error("failed to connect to database: {0}")]
    ConnectionFailed(String),

    /// Failed to run migrations
    #[error("failed to run migrations: {0}")]
    MigrationFailed(String),

    /// Query failed
    #[error("query failed: {0}")]
    QueryFailed(String),

    /// Record not found
    #[error("record not found: {0}")]
    NotFound(String),
}

/// Every way a feed fetch can end other than with content
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FetchError {
    /// Server confirmed the conditional GET validators: nothing changed
    #[error("feed not modified")]
    NotModified,

    /// Server demands credentials
    #[error("authentication required{}", realm_suffix(.realm))]
    AuthRequired {
        /// Authentication realm announced by the server
        realm: Option<String>,
    },

    /// Transport failure or unsuccessful HTTP status
    #[error("{message}")]
    Connection {
        /// Human-readable message
        message: String,
        /// Optional link the user can follow for details
        link: Option<String>,
    },

    /// URL scheme the connection cannot handle
    #[error("unsupported protocol '{scheme}'")]
    UnknownProtocol {
        /// The offending scheme
        scheme: String,
    },

    /// Content is not well-formed
    #[error("{message}")]
    Parse {
        /// Human-readable message
        message: String,
        /// Optional link the user can follow for details
        link: Option<String>,
    },

    /// Content is well-formed but not a feed this reader understands
    #[error("{message}")]
    Interpret {
        /// Human-readable message
        message: String,
        /// Optional link the user can follow for details
        link: Option<String>,
    },

    /// Fetch was cancelled through its progress monitor
    #[error("fetch cancelled")]
    Cancelled,

    /// Unexpected failure while setting up the fetch
    #[error("internal error: {message}")]
    Internal {
        /// Human-readable message
        message: String,
    },
}

fn realm_suffix(realm: &Option<String>) -> String {
    realm
        .as_deref()
        .map(|r| format!(" for realm '{r}'"))
        .unwrap_or_default()
}

impl FetchError {
    /// Outcomes that never produce an error flag or a log line
    pub fn is_benign(&self) -> bool {
        matches!(self, FetchError::NotModified | FetchError::Cancelled)
    }

    /// Failures caused by the document itself, where the feed URL still resolved
    pub fn is_content_error(&self) -> bool {
        matches!(self, FetchError::Parse { .. } | FetchError::Interpret { .. })
    }

    /// User-facing link attached to the failure, if any
    pub fn link(&self) -> Option<&str> {
        match self {
            FetchError::Connection { link, .. }
            | FetchError::Parse { link, .. }
            | FetchError::Interpret { link, .. } => link.as_deref(),
            _ => None,
        }
    }
}
