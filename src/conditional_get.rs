//! In-memory view of the conditional GET records, keyed by feed URL.
//!
//! Records are loaded lazily from the store the first time a URL is reloaded and
//! kept for the lifetime of the orchestrator. A successful fetch only prepares
//! the new record; it is committed here by the save worker once the merged items
//! are in storage, which writes the store copy in the same transaction. A merge
//! that never happens leaves the previous validators in place.

use crate::error::Result;
use crate::store::FeedStore;
use crate::types::{ConditionalGetRecord, Validators};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// URL → last-seen validators
pub struct ConditionalGetCache {
    store: Arc<dyn FeedStore>,
    records: RwLock<HashMap<String, ConditionalGetRecord>>,
}

impl ConditionalGetCache {
    /// Create an empty cache backed by `store`
    pub fn new(store: Arc<dyn FeedStore>) -> Self {
        Self {
            store,
            records: RwLock::new(HashMap::new()),
        }
    }

    /// Validators to send for `url`, if any are known
    ///
    /// Falls back to the store on a cache miss. Records without any validator are
    /// treated as absent.
    pub async fn get(&self, url: &str) -> Result<Option<ConditionalGetRecord>> {
        if let Some(record) = self.cached(url) {
            return Ok(Some(record).filter(ConditionalGetRecord::has_validators));
        }

        let loaded = self.store.load_conditional_get(url).await?;
        if let Some(record) = &loaded
            && let Ok(mut records) = self.records.write()
        {
            // A concurrent update wins over the stored copy
            records
                .entry(url.to_string())
                .or_insert_with(|| record.clone());
        }

        Ok(self
            .cached(url)
            .or(loaded)
            .filter(ConditionalGetRecord::has_validators))
    }

    /// Record to persist for the validators a successful fetch of `url` returned
    ///
    /// Nothing is cached yet; see [`ConditionalGetCache::commit`]. Returns `None`
    /// when the server sent no validators and nothing was known before, so an
    /// existing record is always updated rather than duplicated.
    pub fn prepare(&self, url: &str, validators: &Validators) -> Option<ConditionalGetRecord> {
        if validators.is_empty() && self.cached(url).is_none() {
            return None;
        }
        Some(ConditionalGetRecord {
            url: url.to_string(),
            if_modified_since: validators.last_modified.clone(),
            if_none_match: validators.etag.clone(),
        })
    }

    /// Make `record` the one sent with the next fetch of its URL
    ///
    /// Called after the items fetched with these validators were stored.
    pub fn commit(&self, record: &ConditionalGetRecord) {
        if let Ok(mut records) = self.records.write() {
            records.insert(record.url.clone(), record.clone());
        }
    }

    /// Number of URLs held in memory
    pub fn len(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or(0)
    }

    /// Whether no URL is held in memory
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn cached(&self, url: &str) -> Option<ConditionalGetRecord> {
        self.records
            .read()
            .ok()
            .and_then(|records| records.get(url).cloned())
    }
}
