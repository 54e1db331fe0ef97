//! Observer registration for reload start/finish notifications.

use crate::types::Bookmark;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

/// Observer notified around every reload task
pub trait ReloadListener: Send + Sync {
    /// A reload task for `bookmark` is starting
    fn about_to_load(&self, bookmark: &Bookmark);

    /// The reload task for `bookmark` finished, whatever the outcome
    fn done_loading(&self, bookmark: &Bookmark);
}

/// Handle returned by [`ListenerSet::add`], used to unregister
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Registered listeners. A panicking listener is logged and skipped; it never
/// reaches the reload task or the other listeners.
#[derive(Default)]
pub struct ListenerSet {
    next_id: AtomicU64,
    listeners: RwLock<Vec<(ListenerId, Arc<dyn ReloadListener>)>>,
}

impl ListenerSet {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener
    pub fn add(&self, listener: Arc<dyn ReloadListener>) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        if let Ok(mut listeners) = self.listeners.write() {
            listeners.push((id, listener));
        }
        id
    }

    /// Unregister a listener; returns whether it was registered
    pub fn remove(&self, id: ListenerId) -> bool {
        let Ok(mut listeners) = self.listeners.write() else {
            return false;
        };
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() < before
    }

    /// Number of registered listeners
    pub fn len(&self) -> usize {
        self.listeners.read().map(|l| l.len()).unwrap_or(0)
    }

    /// Whether no listener is registered
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn notify_about_to_load(&self, bookmark: &Bookmark) {
        self.each(bookmark, "about_to_load", |l| l.about_to_load(bookmark));
    }

    pub(crate) fn notify_done_loading(&self, bookmark: &Bookmark) {
        self.each(bookmark, "done_loading", |l| l.done_loading(bookmark));
    }

    fn each(&self, bookmark: &Bookmark, callback: &str, f: impl Fn(&dyn ReloadListener)) {
        // Snapshot so listeners may (un)register from inside a callback
        let snapshot: Vec<Arc<dyn ReloadListener>> = match self.listeners.read() {
            Ok(listeners) => listeners.iter().map(|(_, l)| Arc::clone(l)).collect(),
            Err(_) => return,
        };

        for listener in snapshot {
            if catch_unwind(AssertUnwindSafe(|| f(listener.as_ref()))).is_err() {
                tracing::error!(
                    bookmark_id = bookmark.id.0,
                    callback,
                    "Reload listener panicked"
                );
            }
        }
    }
}
