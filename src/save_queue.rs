//! Serialized persistence of fetched feeds.
//!
//! One worker task drains a channel of capacity 1. Reload workers hand their
//! merge jobs to it and wait in `schedule` while the slot is taken, so a burst
//! of fast fetches is backpressured instead of buffered, and no two merges ever
//! touch storage at the same time. The validators a job carries only reach the
//! conditional GET cache once its merge succeeded.

use crate::conditional_get::ConditionalGetCache;
use crate::error::{Error, Result};
use crate::store::FeedStore;
use crate::tracking::ProceedCheck;
use crate::types::{Bookmark, ConditionalGetRecord, Event, Feed, RetentionPolicy};
use crate::ui::UiShell;
use std::sync::{Arc, Mutex};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// One merge of a fetched feed into storage
pub struct SaveJob {
    /// Bookmark the feed belongs to
    pub bookmark: Bookmark,
    /// Fetched content
    pub feed: Feed,
    /// Validators to persist together with the items, committed to the cache
    /// after the merge
    pub conditional_get: Option<ConditionalGetRecord>,
    /// Retention to apply after the merge
    pub retention: RetentionPolicy,
    /// Shell asked whether the bookmark is on screen before cleaning up
    pub shell: Arc<dyn UiShell>,
}

/// Single-worker, depth-1 save queue
pub struct SaveScheduler {
    sender: Mutex<Option<mpsc::Sender<SaveJob>>>,
    worker: tokio::sync::Mutex<Option<JoinHandle<()>>>,
    sealed: CancellationToken,
}

impl SaveScheduler {
    /// Spawn the save worker
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(
        store: Arc<dyn FeedStore>,
        conditional_gets: Arc<ConditionalGetCache>,
        events: broadcast::Sender<Event>,
        proceed: ProceedCheck,
    ) -> Self {
        let (tx, rx) = mpsc::channel(1);
        let sealed = CancellationToken::new();

        let worker = SaveWorker {
            store,
            conditional_gets,
            events,
            proceed,
        };
        let handle = tokio::spawn(worker.run(rx, sealed.clone()));

        Self {
            sender: Mutex::new(Some(tx)),
            worker: tokio::sync::Mutex::new(Some(handle)),
            sealed,
        }
    }

    /// Hand a job to the worker, waiting while the queue slot is taken
    ///
    /// # Errors
    ///
    /// Returns `Error::ShuttingDown` once the queue was joined or sealed.
    pub async fn schedule(&self, job: SaveJob) -> Result<()> {
        let sender = self
            .sender
            .lock()
            .ok()
            .and_then(|sender| sender.clone())
            .ok_or(Error::ShuttingDown)?;

        tokio::select! {
            biased;
            _ = self.sealed.cancelled() => Err(Error::ShuttingDown),
            sent = sender.send(job) => sent.map_err(|_| Error::ShuttingDown),
        }
    }

    /// Stop accepting jobs and wait until the queued ones are processed
    pub async fn join(&self) {
        self.close();

        let handle = self.worker.lock().await.take();
        if let Some(handle) = handle
            && let Err(e) = handle.await
        {
            tracing::error!(error = %e, "Save worker terminated abnormally");
        }
    }

    /// Stop immediately, dropping queued jobs. Never waits.
    pub fn seal(&self) {
        self.sealed.cancel();
        self.close();
        tracing::info!("Save queue sealed");
    }

    fn close(&self) {
        if let Ok(mut sender) = self.sender.lock() {
            sender.take();
        }
    }
}

struct SaveWorker {
    store: Arc<dyn FeedStore>,
    conditional_gets: Arc<ConditionalGetCache>,
    events: broadcast::Sender<Event>,
    proceed: ProceedCheck,
}

impl SaveWorker {
    async fn run(self, mut rx: mpsc::Receiver<SaveJob>, sealed: CancellationToken) {
        loop {
            let job = tokio::select! {
                biased;
                _ = sealed.cancelled() => break,
                job = rx.recv() => match job {
                    Some(job) => job,
                    None => break,
                },
            };
            self.save(job).await;
        }

        tracing::debug!("Save worker stopped");
    }

    async fn save(&self, job: SaveJob) {
        let id = job.bookmark.id;
        if !self.proceed.allows(id) {
            tracing::debug!(bookmark_id = id.0, "Skipping save of deleted bookmark or during shutdown");
            return;
        }

        let cleanup = if job.retention.is_unbounded() {
            None
        } else if job.shell.is_displaying(id) {
            tracing::debug!(bookmark_id = id.0, "Bookmark on screen, skipping retention cleanup");
            None
        } else {
            Some(job.retention)
        };

        self.events.send(Event::Saving { id }).ok();

        match self
            .store
            .merge_feed(&job.bookmark, &job.feed, job.conditional_get.as_ref(), cleanup)
            .await
        {
            Ok(summary) => {
                tracing::debug!(
                    bookmark_id = id.0,
                    added = summary.added,
                    updated = summary.updated,
                    removed = summary.removed,
                    "Saved feed"
                );
                if let Some(record) = &job.conditional_get {
                    self.conditional_gets.commit(record);
                }
                self.events
                    .send(Event::Saved {
                        id,
                        added: summary.added,
                        updated: summary.updated,
                        removed: summary.removed,
                    })
                    .ok();
            }
            Err(e) => {
                // The previous validators stay, so the next fetch gets the items again
                tracing::error!(bookmark_id = id.0, error = %e, "Failed to save feed");
            }
        }
    }
}
