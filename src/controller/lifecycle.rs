//! Shutdown, stop and deletion handling.

use crate::error::Result;
use crate::types::{BookmarkId, Event};
use std::sync::atomic::Ordering;

use super::ReloadOrchestrator;

impl ReloadOrchestrator {
    /// Shut the orchestrator down
    ///
    /// The shutting-down flag is raised first, so every reload stops at its next
    /// step boundary. A normal shutdown then cancels outstanding reloads, waits
    /// for running ones to finish, and drains the save queue. An emergency
    /// shutdown seals both queues and returns immediately; it is meant for exit
    /// paths where blocking could hang the process.
    ///
    /// Calling it again is a no-op.
    ///
    /// # Errors
    ///
    /// Currently infallible; the `Result` leaves room for shutdown steps that
    /// touch storage.
    pub async fn shutdown(&self, emergency: bool) -> Result<()> {
        if self.context.proceed.begin_shutdown() {
            tracing::debug!("Shutdown already in progress");
            return Ok(());
        }

        if emergency {
            tracing::warn!("Emergency shutdown, abandoning in-flight reloads");
            self.scheduler.seal();
            self.context.saves.seal();
        } else {
            tracing::info!("Initiating graceful shutdown");

            self.scheduler.cancel_all(true, false).await;
            tracing::info!("All running reloads finished");

            self.scheduler.seal();
            self.context.saves.join().await;
            tracing::info!("Save queue drained");
        }

        self.context.event_tx.send(Event::Shutdown).ok();
        tracing::info!(emergency, "Reload orchestrator shut down");
        Ok(())
    }

    /// Whether [`ReloadOrchestrator::shutdown`] was called
    pub fn is_shutting_down(&self) -> bool {
        self.context.proceed.is_shutting_down()
    }

    /// Cancel queued and running reloads without waiting
    ///
    /// Unlike shutdown, new reloads are accepted again right away.
    pub async fn stop_update(&self) {
        tracing::info!(
            queued = self.scheduler.queued_len(),
            running = self.scheduler.running_len(),
            "Stopping feed update"
        );
        self.scheduler.cancel_all(false, false).await;
    }

    /// Record that a bookmark was deleted
    ///
    /// Its queued or running reload is cancelled, and any step still in flight
    /// ends without writing to storage.
    pub fn bookmark_deleted(&self, id: BookmarkId) {
        self.context.proceed.deleted().insert(id);
        if self.scheduler.cancel(id) {
            tracing::debug!(bookmark_id = id.0, "Cancelled reload of deleted bookmark");
        }
    }

    /// Record several deleted bookmarks
    pub fn bookmarks_deleted(&self, ids: impl IntoIterator<Item = BookmarkId>) {
        for id in ids {
            self.bookmark_deleted(id);
        }
    }

    /// Switch offline mode; while offline, queued reloads are refused
    pub fn set_offline(&self, offline: bool) {
        let was = self.offline.swap(offline, Ordering::SeqCst);
        if was != offline {
            tracing::info!(offline, "Offline mode changed");
        }
    }

    /// Whether offline mode is on
    pub fn is_offline(&self) -> bool {
        self.offline.load(Ordering::SeqCst)
    }
}
