//! Custom waits and assertions for integration tests

use feed_reloader::{BookmarkId, Event, ReloadOrchestrator};
use std::collections::HashSet;
use std::time::Duration;
use tokio::sync::broadcast;

/// Result of waiting for a set of reloads
#[derive(Debug, PartialEq, Eq)]
pub enum WaitResult {
    /// Every bookmark reported DoneLoading
    Done,
    /// Timeout waiting for the remaining bookmarks
    Timeout(usize),
    /// Channel closed unexpectedly
    ChannelClosed,
}

/// Wait until every ID in `ids` has finished loading
///
/// Subscribe before queueing the reloads, otherwise fast reloads are missed.
pub async fn wait_for_done(
    events: &mut broadcast::Receiver<Event>,
    ids: &[BookmarkId],
    timeout: Duration,
) -> WaitResult {
    wait_for_each(events, ids, timeout, |event| match event {
        Event::DoneLoading { id } => Some(*id),
        _ => None,
    })
    .await
}

/// Wait until the feed of every ID in `ids` has been merged into storage
///
/// Graceful shutdown drops saves that have not started yet, so tests wait for
/// these before shutting down.
pub async fn wait_for_saved(
    events: &mut broadcast::Receiver<Event>,
    ids: &[BookmarkId],
    timeout: Duration,
) -> WaitResult {
    wait_for_each(events, ids, timeout, |event| match event {
        Event::Saved { id, .. } => Some(*id),
        _ => None,
    })
    .await
}

async fn wait_for_each(
    events: &mut broadcast::Receiver<Event>,
    ids: &[BookmarkId],
    timeout: Duration,
    matching_id: impl Fn(&Event) -> Option<BookmarkId>,
) -> WaitResult {
    let mut pending: HashSet<BookmarkId> = ids.iter().copied().collect();

    let result = tokio::time::timeout(timeout, async {
        while !pending.is_empty() {
            match events.recv().await {
                Ok(event) => {
                    if let Some(id) = matching_id(&event) {
                        pending.remove(&id);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return WaitResult::ChannelClosed,
            }
        }
        WaitResult::Done
    })
    .await;

    match result {
        Ok(wait_result) => wait_result,
        Err(_) => WaitResult::Timeout(pending.len()),
    }
}

/// Wait for the first event matching `predicate`
pub async fn wait_for_event<F>(
    events: &mut broadcast::Receiver<Event>,
    timeout: Duration,
    predicate: F,
) -> Option<Event>
where
    F: Fn(&Event) -> bool,
{
    tokio::time::timeout(timeout, async {
        loop {
            match events.recv().await {
                Ok(event) if predicate(&event) => return Some(event),
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    })
    .await
    .unwrap_or(None)
}

/// Assert the orchestrator has nothing queued or running
pub fn assert_idle(orchestrator: &ReloadOrchestrator) {
    assert_eq!(orchestrator.queued_len(), 0, "reloads still queued");
    assert_eq!(orchestrator.running_len(), 0, "reloads still running");
}
