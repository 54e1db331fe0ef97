//! # feed-reloader
//!
//! Reload orchestration for desktop feed readers.
//!
//! ## Design Philosophy
//!
//! feed-reloader is designed to be:
//! - **Bounded** - A fixed pool of workers fetches feeds; everything else waits in a priority queue
//! - **Deduplicated** - A bookmark is queued or running at most once
//! - **Serialized where it matters** - Login prompts and feed merges happen one at a time
//! - **Event-driven** - Consumers subscribe to events or register listeners, no polling required
//!
//! ## Quick Start
//!
//! ```no_run
//! use feed_reloader::{Bookmark, Config, ReloadOptions, ReloadOrchestrator};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut config = Config::default();
//!     config.reload.max_concurrent_reloads = 4;
//!
//!     let orchestrator = ReloadOrchestrator::from_config(config).await?;
//!
//!     // Subscribe to events
//!     let mut events = orchestrator.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     let feeds = vec![
//!         Bookmark::new(1, "https://blog.rust-lang.org/feed.xml", "Rust Blog"),
//!         Bookmark::new(2, "https://this-week-in-rust.org/atom.xml", "This Week in Rust"),
//!     ];
//!     orchestrator.reload_queued(&feeds, ReloadOptions::default(), None);
//!
//!     orchestrator.shutdown(false).await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Login prompt coordination
pub mod auth;
/// Conditional GET validator cache
pub mod conditional_get;
/// Configuration types
pub mod config;
/// Feed fetching and parsing
pub mod connection;
/// Reload orchestrator facade (decomposed into focused submodules)
pub mod controller;
/// Site credentials
pub mod credentials;
/// Database persistence layer
pub mod db;
/// Error types
pub mod error;
/// Persisted bookmark error flags
pub mod error_state;
/// Reload observers
pub mod listener;
/// Per-bookmark reload pipeline
pub mod reload_task;
/// Serialized feed merges
pub mod save_queue;
/// Bounded priority worker pool
pub mod scheduler;
/// Storage abstraction
pub mod store;
/// Shutdown, deletion and synchronized-item tracking
pub mod tracking;
/// Core types and events
pub mod types;
/// User interface seam
pub mod ui;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod test_helpers;

// Re-export commonly used types
pub use config::Config;
pub use connection::{FeedConnection, HttpFeedConnection};
pub use controller::ReloadOrchestrator;
pub use credentials::{CredentialStore, Credentials};
pub use db::Database;
pub use error::{DatabaseError, Error, FetchError, Result};
pub use listener::{ListenerId, ReloadListener};
pub use reload_task::{ReloadOutcome, ReloadTask};
pub use store::FeedStore;
pub use types::{
    Bookmark, BookmarkId, ConditionalGetRecord, Event, Feed, FeedItem, FetchResponse,
    MergeSummary, Priority, ReloadOptions,
};
pub use ui::{HeadlessShell, LoginRequest, UiShell};

/// Helper function to run the orchestrator with graceful signal handling.
///
/// Waits for a termination signal and then shuts the orchestrator down
/// gracefully, letting running reloads and pending saves finish.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use feed_reloader::{Config, ReloadOrchestrator, run_with_shutdown};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let orchestrator = ReloadOrchestrator::from_config(Config::default()).await?;
///
///     // Run with automatic signal handling
///     run_with_shutdown(orchestrator).await?;
///
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(orchestrator: ReloadOrchestrator) -> Result<()> {
    wait_for_signal().await;
    orchestrator.shutdown(false).await
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Set up signal handlers - these may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            if let Ok(mut sigint) = signal(SignalKind::interrupt()) {
                sigint.recv().await;
                tracing::info!("Received SIGINT signal (Ctrl+C)");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM signal");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
