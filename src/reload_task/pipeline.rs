//! Fetch loop and outcome handling for one reload.

use super::context::LoadingGuard;
use super::{ReloadContext, ReloadOutcome, ReloadTask};
use crate::auth::{AuthChallenge, AuthDecision};
use crate::error::{Error, FetchError, Result};
use crate::save_queue::SaveJob;
use crate::types::{Event, FetchProperties, FetchResponse, Priority};
use crate::ui::UiShell;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Fetches retried in place after another prompt supplied credentials
const MAX_AUTH_RETRIES: usize = 3;

impl ReloadContext {
    /// Run one reload to completion
    ///
    /// Expected failures end in a [`ReloadOutcome`]; `Err` is reserved for
    /// storage failures and unexpected connection errors.
    pub(crate) async fn execute(
        &self,
        task: &ReloadTask,
        token: &CancellationToken,
    ) -> Result<ReloadOutcome> {
        let bookmark = task.bookmark();
        let id = bookmark.id;
        let _loading = LoadingGuard::begin(self, bookmark);

        if !self.should_proceed(id, token) {
            return Ok(ReloadOutcome::Cancelled);
        }

        let properties = self.fetch_properties(task).await?;
        let shell = self.shell_for(task);
        let mut auth_retries = 0;

        loop {
            if !self.should_proceed(id, token) {
                return Ok(ReloadOutcome::Cancelled);
            }

            let attempted = self.credentials.get(&bookmark.url);
            let result = self
                .connection
                .fetch(&bookmark.url, token, properties.clone())
                .await;

            if !self.should_proceed(id, token) {
                return Ok(ReloadOutcome::Cancelled);
            }

            let error = match result {
                Ok(response) => return self.on_loaded(task, response, &shell, token).await,
                Err(error) => error,
            };

            match error {
                FetchError::NotModified => {
                    self.refresh_favicon(bookmark, None, token).await;
                    if !self.should_proceed(id, token) {
                        return Ok(ReloadOutcome::Cancelled);
                    }
                    self.errors.clear(id).await?;
                    return Ok(ReloadOutcome::NotModified);
                }
                FetchError::Cancelled => return Ok(ReloadOutcome::Cancelled),
                FetchError::AuthRequired { realm } => {
                    tracing::debug!(bookmark_id = id.0, realm = realm.as_deref(), "Authentication required");
                    let challenge = AuthChallenge {
                        bookmark,
                        realm: realm.as_deref(),
                        attempted: attempted.as_ref(),
                    };
                    let decision = self
                        .auth
                        .authenticate(challenge, shell.as_ref(), token, || {
                            self.should_proceed(id, token)
                        })
                        .await;

                    match decision {
                        AuthDecision::AlreadySupplied if auth_retries < MAX_AUTH_RETRIES => {
                            auth_retries += 1;
                        }
                        AuthDecision::AlreadySupplied | AuthDecision::Cancelled => {
                            let message = FetchError::AuthRequired { realm }.to_string();
                            return self.fail(task, &message, None, token).await;
                        }
                        AuthDecision::Supplied(_) => {
                            if let Some(realm) = &realm {
                                self.errors.remember_realm(id, realm).await?;
                            }
                            return Ok(ReloadOutcome::Resubmit);
                        }
                        AuthDecision::Contended => {
                            let message = FetchError::AuthRequired { realm }.to_string();
                            return match self.fail(task, &message, None, token).await? {
                                ReloadOutcome::Failed { .. } => Ok(ReloadOutcome::AuthPending),
                                outcome => Ok(outcome),
                            };
                        }
                        AuthDecision::Aborted => return Ok(ReloadOutcome::Cancelled),
                    }
                }
                FetchError::Internal { .. } => return Err(Error::Fetch(error)),
                FetchError::Connection { .. }
                | FetchError::UnknownProtocol { .. }
                | FetchError::Parse { .. }
                | FetchError::Interpret { .. } => {
                    if error.is_content_error() {
                        self.refresh_favicon(bookmark, None, token).await;
                    }
                    return self
                        .fail(task, &error.to_string(), error.link(), token)
                        .await;
                }
            }
        }
    }

    async fn fetch_properties(&self, task: &ReloadTask) -> Result<FetchProperties> {
        let bookmark = task.bookmark();
        let mut properties = FetchProperties {
            timeout: task
                .options()
                .timeout
                .unwrap_or(self.config.reload.connection_timeout),
            extra: task.options().properties.clone(),
            ..Default::default()
        };

        if let Some(account) = bookmark.sync_account() {
            let retention = self.retention(task);
            properties.max_items = retention.max_items;
            properties.max_age_days = retention.max_age_days;
            properties.uncommitted_sync_items = self.sync_items.snapshot(&account);
        }

        properties.conditional_get = self.conditional_gets.get(&bookmark.url).await?;
        Ok(properties)
    }

    async fn on_loaded(
        &self,
        task: &ReloadTask,
        response: FetchResponse,
        shell: &Arc<dyn UiShell>,
        token: &CancellationToken,
    ) -> Result<ReloadOutcome> {
        let bookmark = task.bookmark();
        let id = bookmark.id;

        let conditional_get = self
            .conditional_gets
            .prepare(&bookmark.url, &response.validators);
        self.refresh_favicon(bookmark, response.feed.homepage.as_deref(), token)
            .await;

        if !self.should_proceed(id, token) {
            return Ok(ReloadOutcome::Cancelled);
        }

        tracing::debug!(
            bookmark_id = id.0,
            items = response.feed.items.len(),
            resolved_url = %response.resolved_url,
            "Feed fetched, scheduling save"
        );
        let job = SaveJob {
            bookmark: bookmark.clone(),
            feed: response.feed,
            conditional_get,
            retention: self.retention(task),
            shell: Arc::clone(shell),
        };
        let scheduled = tokio::select! {
            biased;
            _ = token.cancelled() => return Ok(ReloadOutcome::Cancelled),
            scheduled = self.saves.schedule(job) => scheduled,
        };
        match scheduled {
            Ok(()) => {}
            Err(Error::ShuttingDown) => return Ok(ReloadOutcome::Cancelled),
            Err(e) => return Err(e),
        }

        if !self.should_proceed(id, token) {
            return Ok(ReloadOutcome::Cancelled);
        }
        self.errors.clear(id).await?;
        Ok(ReloadOutcome::Loaded)
    }

    /// Put the bookmark into the error state
    ///
    /// Only interactive reloads that carry their own shell show a dialog; batch
    /// reloads leave the sticky indicator alone.
    async fn fail(
        &self,
        task: &ReloadTask,
        message: &str,
        link: Option<&str>,
        token: &CancellationToken,
    ) -> Result<ReloadOutcome> {
        let bookmark = task.bookmark();
        let id = bookmark.id;
        if !self.should_proceed(id, token) {
            return Ok(ReloadOutcome::Cancelled);
        }

        tracing::info!(bookmark_id = id.0, url = %bookmark.url, error = message, "Reload failed");
        self.errors.set_error(id, message, link).await?;
        self.event_tx
            .send(Event::ReloadFailed {
                id,
                error: message.to_string(),
            })
            .ok();

        if task.priority() == Priority::Short
            && let Some(shell) = task.shell()
        {
            shell.show_error(bookmark, message).await;
        }

        Ok(ReloadOutcome::Failed {
            message: message.to_string(),
        })
    }
}
