//! The reload orchestrator facade split into focused submodules.
//!
//! - this module - Construction, queued and foreground reloads, observers
//! - [`lifecycle`] - Shutdown, stop, deletion and offline handling

mod lifecycle;


use crate::auth::AuthenticationCoordinator;
use crate::conditional_get::ConditionalGetCache;
use crate::config::Config;
use crate::connection::{FeedConnection, HttpFeedConnection};
use crate::credentials::CredentialStore;
use crate::db::Database;
use crate::error::{Error, Result};
use crate::error_state::ErrorStateTracker;
use crate::listener::{ListenerId, ListenerSet, ReloadListener};
use crate::reload_task::{ReloadContext, ReloadOutcome, ReloadTask};
use crate::save_queue::SaveScheduler;
use crate::scheduler::ReloadScheduler;
use crate::store::FeedStore;
use crate::tracking::{ProceedCheck, SyncItemBuffer};
use crate::types::{Bookmark, BookmarkId, Event, Priority, ReloadOptions};
use crate::ui::{HeadlessShell, UiShell};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

/// Orchestrates feed reloads: queueing, fetching, login prompts and saving
///
/// One instance per application. Dropping it stops dispatching; in-flight
/// reloads observe their cancellation at the next step boundary.
pub struct ReloadOrchestrator {
    context: Arc<ReloadContext>,
    scheduler: ReloadScheduler,
    offline: AtomicBool,
}

impl ReloadOrchestrator {
    /// Wire an orchestrator to its collaborators
    ///
    /// Spawns the reload dispatcher and the save worker, so it must be called
    /// from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `config` does not validate.
    pub fn new(
        config: Config,
        connection: Arc<dyn FeedConnection>,
        store: Arc<dyn FeedStore>,
        shell: Arc<dyn UiShell>,
        credentials: Arc<CredentialStore>,
    ) -> Result<Self> {
        config.validate()?;

        let (event_tx, _rx) = broadcast::channel(1000);
        let proceed = ProceedCheck::new();
        let max_concurrent = config.reload.max_concurrent_reloads;

        let conditional_gets = Arc::new(ConditionalGetCache::new(Arc::clone(&store)));

        let context = Arc::new(ReloadContext {
            errors: ErrorStateTracker::new(Arc::clone(&store), Arc::clone(proceed.deleted())),
            auth: AuthenticationCoordinator::new(Arc::clone(&credentials)),
            saves: SaveScheduler::start(
                Arc::clone(&store),
                Arc::clone(&conditional_gets),
                event_tx.clone(),
                proceed.clone(),
            ),
            conditional_gets,
            listeners: ListenerSet::new(),
            sync_items: SyncItemBuffer::new(),
            config: Arc::new(config),
            connection,
            store,
            credentials,
            proceed,
            event_tx,
            shell,
        });
        let scheduler = ReloadScheduler::start(max_concurrent, context.clone());

        tracing::info!(max_concurrent, "Reload orchestrator started");

        Ok(Self {
            context,
            scheduler,
            offline: AtomicBool::new(false),
        })
    }

    /// Build the default stack from configuration: SQLite storage, HTTP
    /// connection and a headless shell
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid, the database cannot be
    /// opened or migrated, or the HTTP client cannot be created.
    pub async fn from_config(config: Config) -> Result<Self> {
        config.validate()?;

        let db = Database::new(&config.persistence.database_path).await?;
        let credentials = Arc::new(CredentialStore::new());
        let connection = HttpFeedConnection::new(&config, Arc::clone(&credentials))?;

        Self::new(
            config,
            Arc::new(connection),
            Arc::new(db),
            Arc::new(HeadlessShell),
            credentials,
        )
    }

    /// Queue reloads of `bookmarks`; returns how many were accepted
    ///
    /// A single bookmark is reloaded at interactive priority, a batch at default
    /// priority. Nothing is queued while offline or shutting down; bookmarks that
    /// are already queued, were deleted, or belong to a synchronized account the
    /// user recently declined to log in to (batches only) are skipped.
    pub fn reload_queued(
        &self,
        bookmarks: &[Bookmark],
        options: ReloadOptions,
        shell: Option<Arc<dyn UiShell>>,
    ) -> usize {
        if self.is_shutting_down() {
            tracing::debug!(requested = bookmarks.len(), "Shutting down, ignoring reload request");
            return 0;
        }
        if self.is_offline() {
            tracing::debug!(requested = bookmarks.len(), "Offline, ignoring reload request");
            return 0;
        }

        let priority = Priority::for_request_size(bookmarks.len());
        let backoff = self.context.config.auth.sync_cancel_backoff;
        let deleted = self.context.proceed.deleted();

        let mut scheduled = 0;
        for bookmark in bookmarks {
            if deleted.contains(bookmark.id) || self.scheduler.is_queued(bookmark.id) {
                continue;
            }
            if priority == Priority::Default
                && let Some(account) = bookmark.sync_account()
                && self.context.auth.in_sync_backoff(&account, backoff)
            {
                tracing::debug!(bookmark_id = bookmark.id.0, account = %account, "Login recently declined, skipping");
                continue;
            }

            let mut task =
                ReloadTask::new(bookmark.clone(), priority).with_options(options.clone());
            if let Some(shell) = &shell {
                task = task.with_shell(Arc::clone(shell));
            }
            if self.scheduler.schedule(task) {
                scheduled += 1;
                self.context
                    .event_tx
                    .send(Event::ReloadQueued {
                        id: bookmark.id,
                        priority,
                    })
                    .ok();
            }
        }

        tracing::debug!(requested = bookmarks.len(), scheduled, ?priority, "Queued reloads");
        scheduled
    }

    /// Reload one bookmark in the caller's task, bypassing the worker pool
    ///
    /// Login prompts and saves still go through the shared coordinator and save
    /// queue. A login supplied during the reload is retried right away. The
    /// bookmark counts as queued while this runs.
    ///
    /// # Errors
    ///
    /// Returns `Error::ShuttingDown` during shutdown, `Error::InProgress` if the
    /// bookmark is already being reloaded, and storage errors hit on the way.
    pub async fn reload(
        &self,
        bookmark: Bookmark,
        shell: Option<Arc<dyn UiShell>>,
        token: &CancellationToken,
    ) -> Result<ReloadOutcome> {
        if self.is_shutting_down() {
            return Err(Error::ShuttingDown);
        }

        let id = bookmark.id;
        let token = token.child_token();
        let Some(_claim) = self.scheduler.claim(id, token.clone()) else {
            return Err(Error::InProgress(id));
        };

        let mut task = ReloadTask::new(bookmark, Priority::Short);
        if let Some(shell) = shell {
            task = task.with_shell(shell);
        }

        loop {
            match self.context.execute(&task, &token).await? {
                ReloadOutcome::Resubmit => {
                    tracing::debug!(bookmark_id = id.0, "Login supplied, reloading again");
                }
                outcome => return Ok(outcome),
            }
        }
    }

    /// Whether a reload of `id` is queued or running
    pub fn is_queued(&self, id: BookmarkId) -> bool {
        self.scheduler.is_queued(id)
    }

    /// Number of reloads waiting for a worker
    pub fn queued_len(&self) -> usize {
        self.scheduler.queued_len()
    }

    /// Number of reloads currently running in the pool
    pub fn running_len(&self) -> usize {
        self.scheduler.running_len()
    }

    /// Register an observer notified around every reload
    pub fn add_listener(&self, listener: Arc<dyn ReloadListener>) -> ListenerId {
        self.context.listeners.add(listener)
    }

    /// Unregister an observer; returns whether it was registered
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.context.listeners.remove(id)
    }

    /// Subscribe to reload events
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.context.event_tx.subscribe()
    }

    /// Pending synchronized-item changes handed to synchronized reloads
    pub fn sync_items(&self) -> &SyncItemBuffer {
        &self.context.sync_items
    }

    /// Credentials shared by the connection and the login prompt
    pub fn credentials(&self) -> &Arc<CredentialStore> {
        &self.context.credentials
    }

    /// Active configuration
    pub fn config(&self) -> &Config {
        &self.context.config
    }
}
