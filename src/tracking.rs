//! Concurrent sets shared between reload workers.

use crate::types::BookmarkId;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

/// Orchestrator-wide conditions every reload step re-checks before it mutates
/// anything: the shutdown flag and the set of deleted bookmarks
#[derive(Clone, Debug, Default)]
pub struct ProceedCheck {
    shutting_down: Arc<AtomicBool>,
    deleted: Arc<DeletedIdSet>,
}

impl ProceedCheck {
    /// Fresh flags: running, nothing deleted
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether work on `id` may continue
    pub fn allows(&self, id: BookmarkId) -> bool {
        !self.is_shutting_down() && !self.deleted.contains(id)
    }

    /// Raise the shutdown flag; returns whether it was already raised
    pub fn begin_shutdown(&self) -> bool {
        self.shutting_down.swap(true, Ordering::SeqCst)
    }

    /// Whether shutdown has begun
    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    /// Set of bookmarks deleted during this session
    pub fn deleted(&self) -> &Arc<DeletedIdSet> {
        &self.deleted
    }
}

/// Bookmarks deleted while a reload may still be in flight
///
/// Consulted before every state-mutating step of a reload so that a deleted
/// bookmark's work ends as a no-op instead of resurrecting it in storage.
#[derive(Debug, Default)]
pub struct DeletedIdSet {
    ids: RwLock<HashSet<BookmarkId>>,
}

impl DeletedIdSet {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a bookmark as deleted
    pub fn insert(&self, id: BookmarkId) {
        if let Ok(mut ids) = self.ids.write() {
            ids.insert(id);
        }
    }

    /// Whether the bookmark was deleted
    pub fn contains(&self, id: BookmarkId) -> bool {
        self.ids.read().map(|ids| ids.contains(&id)).unwrap_or(false)
    }

    /// Number of deleted bookmarks seen
    pub fn len(&self) -> usize {
        self.ids.read().map(|ids| ids.len()).unwrap_or(0)
    }

    /// Whether no deletion was recorded
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Synchronized items whose state change (read, starred, ...) has not been
/// committed to the account yet, per account
///
/// A reload of a synchronized feed hands a snapshot of the pending items to the
/// connection so the server copy does not overwrite local changes.
#[derive(Debug, Default)]
pub struct SyncItemBuffer {
    pending: RwLock<HashMap<String, BTreeSet<String>>>,
}

impl SyncItemBuffer {
    /// Create an empty buffer
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a local change of `item_id` on `account`
    pub fn add(&self, account: &str, item_id: impl Into<String>) {
        if let Ok(mut pending) = self.pending.write() {
            pending
                .entry(account.to_string())
                .or_default()
                .insert(item_id.into());
        }
    }

    /// Forget items once the account acknowledged them
    pub fn commit(&self, account: &str, item_ids: &[String]) {
        let Ok(mut pending) = self.pending.write() else {
            return;
        };
        if let Some(items) = pending.get_mut(account) {
            for id in item_ids {
                items.remove(id);
            }
            if items.is_empty() {
                pending.remove(account);
            }
        }
    }

    /// Copy of the pending items of `account`, sorted
    pub fn snapshot(&self, account: &str) -> Vec<String> {
        self.pending
            .read()
            .ok()
            .and_then(|pending| pending.get(account).map(|items| items.iter().cloned().collect()))
            .unwrap_or_default()
    }
}
