//! Reload context -- collaborators shared by every reload and the scheduler hook.

use super::{ReloadOutcome, ReloadTask};
use crate::auth::AuthenticationCoordinator;
use crate::conditional_get::ConditionalGetCache;
use crate::config::Config;
use crate::connection::FeedConnection;
use crate::credentials::CredentialStore;
use crate::error_state::ErrorStateTracker;
use crate::listener::ListenerSet;
use crate::save_queue::SaveScheduler;
use crate::scheduler::TaskRunner;
use crate::store::FeedStore;
use crate::tracking::{ProceedCheck, SyncItemBuffer};
use crate::types::{Bookmark, BookmarkId, Event, RetentionPolicy};
use crate::ui::UiShell;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

/// Everything a reload needs, owned once by the orchestrator
pub(crate) struct ReloadContext {
    pub(crate) config: Arc<Config>,
    pub(crate) connection: Arc<dyn FeedConnection>,
    pub(crate) store: Arc<dyn FeedStore>,
    pub(crate) credentials: Arc<CredentialStore>,
    pub(crate) conditional_gets: Arc<ConditionalGetCache>,
    pub(crate) errors: ErrorStateTracker,
    pub(crate) auth: AuthenticationCoordinator,
    pub(crate) saves: SaveScheduler,
    pub(crate) listeners: ListenerSet,
    pub(crate) proceed: ProceedCheck,
    pub(crate) sync_items: SyncItemBuffer,
    pub(crate) event_tx: broadcast::Sender<Event>,
    /// Shell used when a task carries none
    pub(crate) shell: Arc<dyn UiShell>,
}

impl ReloadContext {
    /// Whether work on `id` may continue: not shutting down, not deleted, not cancelled
    pub(super) fn should_proceed(&self, id: BookmarkId, token: &CancellationToken) -> bool {
        !token.is_cancelled() && self.proceed.allows(id)
    }

    /// Retention for a task: caller overrides win over configuration
    pub(super) fn retention(&self, task: &ReloadTask) -> RetentionPolicy {
        let configured = self.config.retention.policy();
        RetentionPolicy {
            max_items: task.options().max_items.or(configured.max_items),
            max_age_days: task.options().max_age_days.or(configured.max_age_days),
        }
    }

    pub(super) fn shell_for(&self, task: &ReloadTask) -> Arc<dyn UiShell> {
        task.shell()
            .cloned()
            .unwrap_or_else(|| Arc::clone(&self.shell))
    }
}

#[async_trait]
impl TaskRunner for ReloadContext {
    async fn run(&self, task: ReloadTask, token: CancellationToken) -> Option<ReloadTask> {
        let id = task.id();
        match self.execute(&task, &token).await {
            Ok(ReloadOutcome::Resubmit) => Some(task),
            Ok(outcome) => {
                tracing::debug!(bookmark_id = id.0, ?outcome, "Reload finished");
                None
            }
            Err(e) => {
                tracing::error!(bookmark_id = id.0, error = %e, "Reload aborted by unexpected error");
                None
            }
        }
    }
}

/// Fires the start notifications on creation and the finish notifications on
/// drop, so every exit path (including a panic) reports `done_loading` once
pub(super) struct LoadingGuard<'a> {
    context: &'a ReloadContext,
    bookmark: &'a Bookmark,
}

impl<'a> LoadingGuard<'a> {
    pub(super) fn begin(context: &'a ReloadContext, bookmark: &'a Bookmark) -> Self {
        context.listeners.notify_about_to_load(bookmark);
        context
            .event_tx
            .send(Event::AboutToLoad { id: bookmark.id })
            .ok();
        Self { context, bookmark }
    }
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        self.context.listeners.notify_done_loading(self.bookmark);
        self.context
            .event_tx
            .send(Event::DoneLoading {
                id: self.bookmark.id,
            })
            .ok();
    }
}
