//! Shared fakes for orchestrator tests: an instrumented in-memory store, a
//! scriptable connection and a scriptable UI shell.

use crate::config::Config;
use crate::connection::FeedConnection;
use crate::controller::ReloadOrchestrator;
use crate::credentials::{CredentialStore, Credentials};
use crate::error::{DatabaseError, Error, FetchError, Result};
use crate::store::FeedStore;
use crate::types::{
    Bookmark, BookmarkId, ConditionalGetRecord, Feed, FeedItem, FetchProperties, FetchResponse,
    MergeSummary, RetentionPolicy, Validators,
};
use crate::ui::{LoginRequest, UiShell};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Upper bound for every wait in tests so a regression fails instead of hanging
pub(crate) const TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Build a fetch response with one item per GUID and an ETag validator
pub(crate) fn sample_response(url: &str, guids: &[&str]) -> FetchResponse {
    FetchResponse {
        feed: Feed {
            title: Some("Sample".to_string()),
            homepage: Some("https://example.com/".to_string()),
            items: guids
                .iter()
                .map(|guid| FeedItem {
                    guid: guid.to_string(),
                    title: format!("Item {guid}"),
                    link: Some(format!("https://example.com/{guid}")),
                    published: None,
                    summary: None,
                })
                .collect(),
        },
        validators: Validators {
            last_modified: None,
            etag: Some("\"sample\"".to_string()),
        },
        resolved_url: url.to_string(),
    }
}

/// Counter that tests can await
#[derive(Debug)]
pub(crate) struct Signal {
    tx: watch::Sender<usize>,
}

impl Default for Signal {
    fn default() -> Self {
        Self {
            tx: watch::channel(0).0,
        }
    }
}

impl Signal {
    pub(crate) fn bump(&self) {
        self.tx.send_modify(|n| *n += 1);
    }

    pub(crate) fn get(&self) -> usize {
        *self.tx.borrow()
    }

    pub(crate) async fn wait_for(&self, n: usize) {
        let mut rx = self.tx.subscribe();
        tokio::time::timeout(TEST_TIMEOUT, rx.wait_for(|count| *count >= n))
            .await
            .expect("timed out waiting for signal")
            .expect("signal sender dropped");
    }
}

/// Open/closed latch used to hold fakes mid-operation
#[derive(Debug)]
pub(crate) struct Gate {
    open: watch::Sender<bool>,
}

impl Gate {
    pub(crate) fn new(open: bool) -> Self {
        Self {
            open: watch::channel(open).0,
        }
    }

    pub(crate) fn close(&self) {
        self.open.send_replace(false);
    }

    pub(crate) fn release(&self) {
        self.open.send_replace(true);
    }

    /// Wait until open; `false` if `token` fired first
    pub(crate) async fn pass(&self, token: &CancellationToken) -> bool {
        let mut rx = self.open.subscribe();
        tokio::select! {
            result = rx.wait_for(|open| *open) => result.is_ok(),
            _ = token.cancelled() => false,
        }
    }
}

/// In-memory [`FeedStore`] recording every write
#[derive(Default)]
pub(crate) struct MemoryStore {
    bookmarks: Mutex<HashMap<BookmarkId, Bookmark>>,
    conditional_gets: Mutex<HashMap<String, ConditionalGetRecord>>,
    favicons: Mutex<HashMap<BookmarkId, Vec<u8>>>,
    merges: Mutex<Vec<(BookmarkId, usize, Option<RetentionPolicy>)>>,
    merge_delay: Mutex<Option<Duration>>,
    fail_merges: AtomicBool,
    bookmark_writes: AtomicUsize,
    favicon_writes: AtomicUsize,
    active_merges: AtomicUsize,
    max_active_merges: AtomicUsize,
    pub(crate) merge_started: Signal,
    pub(crate) merged: Signal,
}

impl MemoryStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn put_bookmark(&self, bookmark: Bookmark) {
        self.bookmarks.lock().unwrap().insert(bookmark.id, bookmark);
    }

    pub(crate) fn put_conditional_get(&self, record: ConditionalGetRecord) {
        self.conditional_gets
            .lock()
            .unwrap()
            .insert(record.url.clone(), record);
    }

    pub(crate) fn put_favicon(&self, id: BookmarkId, data: &[u8]) {
        self.favicons.lock().unwrap().insert(id, data.to_vec());
    }

    pub(crate) fn set_merge_delay(&self, delay: Duration) {
        *self.merge_delay.lock().unwrap() = Some(delay);
    }

    /// Make every later merge fail after it started
    pub(crate) fn set_failing_merges(&self, fail: bool) {
        self.fail_merges.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn bookmark(&self, id: BookmarkId) -> Option<Bookmark> {
        self.bookmarks.lock().unwrap().get(&id).cloned()
    }

    pub(crate) fn conditional_get(&self, url: &str) -> Option<ConditionalGetRecord> {
        self.conditional_gets.lock().unwrap().get(url).cloned()
    }

    pub(crate) fn favicon(&self, id: BookmarkId) -> Option<Vec<u8>> {
        self.favicons.lock().unwrap().get(&id).cloned()
    }

    pub(crate) fn merges(&self) -> Vec<(BookmarkId, usize, Option<RetentionPolicy>)> {
        self.merges.lock().unwrap().clone()
    }

    pub(crate) fn bookmark_writes(&self) -> usize {
        self.bookmark_writes.load(Ordering::SeqCst)
    }

    pub(crate) fn favicon_writes(&self) -> usize {
        self.favicon_writes.load(Ordering::SeqCst)
    }

    pub(crate) fn max_concurrent_merges(&self) -> usize {
        self.max_active_merges.load(Ordering::SeqCst)
    }

    fn not_found(id: BookmarkId) -> Error {
        Error::Database(DatabaseError::NotFound(format!("Bookmark {} not found", id)))
    }
}

#[async_trait]
impl FeedStore for MemoryStore {
    async fn load_bookmark(&self, id: BookmarkId) -> Result<Option<Bookmark>> {
        Ok(self.bookmark(id))
    }

    async fn save_bookmark(&self, bookmark: &Bookmark) -> Result<()> {
        let mut bookmarks = self.bookmarks.lock().unwrap();
        let Some(slot) = bookmarks.get_mut(&bookmark.id) else {
            return Err(Self::not_found(bookmark.id));
        };
        *slot = bookmark.clone();
        self.bookmark_writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn load_conditional_get(&self, url: &str) -> Result<Option<ConditionalGetRecord>> {
        Ok(self.conditional_get(url))
    }

    async fn save_conditional_get(&self, record: &ConditionalGetRecord) -> Result<()> {
        self.put_conditional_get(record.clone());
        Ok(())
    }

    async fn load_favicon(&self, id: BookmarkId) -> Result<Option<Vec<u8>>> {
        Ok(self.favicon(id))
    }

    async fn save_favicon(&self, id: BookmarkId, data: &[u8]) -> Result<()> {
        self.put_favicon(id, data);
        self.favicon_writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn merge_feed(
        &self,
        bookmark: &Bookmark,
        feed: &Feed,
        conditional_get: Option<&ConditionalGetRecord>,
        cleanup: Option<RetentionPolicy>,
    ) -> Result<MergeSummary> {
        if self.bookmark(bookmark.id).is_none() {
            return Err(Self::not_found(bookmark.id));
        }

        let active = self.active_merges.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active_merges.fetch_max(active, Ordering::SeqCst);
        self.merge_started.bump();

        if self.fail_merges.load(Ordering::SeqCst) {
            self.active_merges.fetch_sub(1, Ordering::SeqCst);
            return Err(Error::Database(DatabaseError::QueryFailed(
                "disk I/O error".to_string(),
            )));
        }

        let delay = *self.merge_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(record) = conditional_get {
            self.put_conditional_get(record.clone());
        }
        self.merges
            .lock()
            .unwrap()
            .push((bookmark.id, feed.items.len(), cleanup));

        self.active_merges.fetch_sub(1, Ordering::SeqCst);
        self.merged.bump();

        Ok(MergeSummary {
            added: feed.items.len(),
            updated: 0,
            removed: 0,
        })
    }
}

/// Scripted answer of the fake connection for one URL
#[derive(Clone, Debug)]
pub(crate) enum Script {
    /// Always answer with this result
    Respond(std::result::Result<FetchResponse, FetchError>),
    /// Challenge until the credential store holds the expected login
    RequireLogin {
        realm: Option<String>,
        accept: Credentials,
    },
}

/// [`FeedConnection`] answering from per-URL scripts
pub(crate) struct FakeConnection {
    credentials: Arc<CredentialStore>,
    scripts: Mutex<HashMap<String, Script>>,
    calls: Mutex<Vec<(String, FetchProperties)>>,
    favicons: Mutex<HashMap<String, Vec<u8>>>,
    favicon_calls: Mutex<Vec<String>>,
    provider_icons: Mutex<HashMap<String, Vec<u8>>>,
    cancel_on_favicon: AtomicBool,
    pub(crate) gate: Gate,
    pub(crate) fetches: Signal,
    pub(crate) finished: Signal,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl FakeConnection {
    pub(crate) fn new(credentials: Arc<CredentialStore>) -> Self {
        Self {
            credentials,
            scripts: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            favicons: Mutex::new(HashMap::new()),
            favicon_calls: Mutex::new(Vec::new()),
            provider_icons: Mutex::new(HashMap::new()),
            cancel_on_favicon: AtomicBool::new(false),
            gate: Gate::new(true),
            fetches: Signal::default(),
            finished: Signal::default(),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
        }
    }

    pub(crate) fn script(&self, url: &str, script: Script) {
        self.scripts.lock().unwrap().insert(url.to_string(), script);
    }

    pub(crate) fn respond(&self, url: &str, result: std::result::Result<FetchResponse, FetchError>) {
        self.script(url, Script::Respond(result));
    }

    pub(crate) fn favicon_at(&self, url: &str, data: &[u8]) {
        self.favicons
            .lock()
            .unwrap()
            .insert(url.to_string(), data.to_vec());
    }

    pub(crate) fn provider_icon_for(&self, url: &str, data: &[u8]) {
        self.provider_icons
            .lock()
            .unwrap()
            .insert(url.to_string(), data.to_vec());
    }

    /// Cancel the reload's token from inside the favicon download
    pub(crate) fn cancel_on_favicon(&self, cancel: bool) {
        self.cancel_on_favicon.store(cancel, Ordering::SeqCst);
    }

    pub(crate) fn calls(&self) -> Vec<(String, FetchProperties)> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn calls_for(&self, url: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(called, _)| called == url)
            .count()
    }

    pub(crate) fn favicon_calls(&self) -> Vec<String> {
        self.favicon_calls.lock().unwrap().clone()
    }

    pub(crate) fn max_concurrent_fetches(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FeedConnection for FakeConnection {
    async fn fetch(
        &self,
        url: &str,
        token: &CancellationToken,
        properties: FetchProperties,
    ) -> std::result::Result<FetchResponse, FetchError> {
        self.calls
            .lock()
            .unwrap()
            .push((url.to_string(), properties));
        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(active, Ordering::SeqCst);
        self.fetches.bump();

        let passed = self.gate.pass(token).await;
        self.active.fetch_sub(1, Ordering::SeqCst);
        self.finished.bump();
        if !passed {
            return Err(FetchError::Cancelled);
        }

        let script = self.scripts.lock().unwrap().get(url).cloned();
        match script {
            Some(Script::Respond(result)) => result,
            Some(Script::RequireLogin { realm, accept }) => {
                if self.credentials.get(url).as_ref() == Some(&accept) {
                    Ok(sample_response(url, &["private"]))
                } else {
                    Err(FetchError::AuthRequired { realm })
                }
            }
            None => Ok(sample_response(url, &["a", "b"])),
        }
    }

    async fn fetch_favicon(
        &self,
        url: &str,
        token: &CancellationToken,
    ) -> std::result::Result<Option<Vec<u8>>, FetchError> {
        self.favicon_calls.lock().unwrap().push(url.to_string());
        if self.cancel_on_favicon.load(Ordering::SeqCst) {
            token.cancel();
        }
        Ok(self.favicons.lock().unwrap().get(url).cloned())
    }

    fn provider_icon(&self, url: &str) -> Option<Vec<u8>> {
        self.provider_icons.lock().unwrap().get(url).cloned()
    }
}

/// [`UiShell`] with a canned login answer and optional hold on the prompt
pub(crate) struct ScriptedShell {
    answer: Mutex<Option<Credentials>>,
    gate: Gate,
    requests: Mutex<Vec<LoginRequest>>,
    errors: Mutex<Vec<(BookmarkId, String)>>,
    displayed: Mutex<HashSet<BookmarkId>>,
    prompts: Signal,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl ScriptedShell {
    /// Shell answering every prompt immediately
    pub(crate) fn answering(answer: Option<Credentials>) -> Self {
        Self::build(answer, true)
    }

    /// Shell holding every prompt open until [`ScriptedShell::release`]
    pub(crate) fn gated(answer: Option<Credentials>) -> Self {
        Self::build(answer, false)
    }

    fn build(answer: Option<Credentials>, open: bool) -> Self {
        Self {
            answer: Mutex::new(answer),
            gate: Gate::new(open),
            requests: Mutex::new(Vec::new()),
            errors: Mutex::new(Vec::new()),
            displayed: Mutex::new(HashSet::new()),
            prompts: Signal::default(),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
        }
    }

    pub(crate) fn release(&self) {
        self.gate.release();
    }

    pub(crate) fn display(&self, id: BookmarkId) {
        self.displayed.lock().unwrap().insert(id);
    }

    pub(crate) async fn wait_for_prompts(&self, n: usize) {
        self.prompts.wait_for(n).await;
    }

    pub(crate) fn requests(&self) -> Vec<LoginRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub(crate) fn errors(&self) -> Vec<(BookmarkId, String)> {
        self.errors.lock().unwrap().clone()
    }

    pub(crate) fn max_concurrent_prompts(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl UiShell for ScriptedShell {
    async fn prompt_login(&self, request: LoginRequest) -> Option<Credentials> {
        self.requests.lock().unwrap().push(request);
        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(active, Ordering::SeqCst);
        self.prompts.bump();

        self.gate.pass(&CancellationToken::new()).await;

        self.active.fetch_sub(1, Ordering::SeqCst);
        self.answer.lock().unwrap().clone()
    }

    async fn show_error(&self, bookmark: &Bookmark, message: &str) {
        self.errors
            .lock()
            .unwrap()
            .push((bookmark.id, message.to_string()));
    }

    fn is_displaying(&self, id: BookmarkId) -> bool {
        self.displayed.lock().unwrap().contains(&id)
    }
}

/// Orchestrator wired to fresh fakes
pub(crate) struct TestHarness {
    pub(crate) orchestrator: ReloadOrchestrator,
    pub(crate) connection: Arc<FakeConnection>,
    pub(crate) store: Arc<MemoryStore>,
    pub(crate) shell: Arc<ScriptedShell>,
    pub(crate) credentials: Arc<CredentialStore>,
}

/// Create an orchestrator over fakes, with `bookmarks` already in the store
pub(crate) fn create_test_orchestrator(
    config: Config,
    shell: ScriptedShell,
    bookmarks: &[Bookmark],
) -> TestHarness {
    let credentials = Arc::new(CredentialStore::new());
    let connection = Arc::new(FakeConnection::new(credentials.clone()));
    let store = Arc::new(MemoryStore::new());
    for bookmark in bookmarks {
        store.put_bookmark(bookmark.clone());
    }
    let shell = Arc::new(shell);

    let orchestrator = ReloadOrchestrator::new(
        config,
        connection.clone(),
        store.clone(),
        shell.clone(),
        credentials.clone(),
    )
    .unwrap();

    TestHarness {
        orchestrator,
        connection,
        store,
        shell,
        credentials,
    }
}
