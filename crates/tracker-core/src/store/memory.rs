// # Memory Tracker Store
//
// In-memory implementation of TrackerStore.
//
// ## Purpose
//
// Provides a simple, fast store that doesn't persist across restarts.
// Useful for testing and for deployments that are happy to re-fetch
// every feed after a restart.
//
// ## Crash Behavior
//
// - All trackers are lost on restart/crash
// - The first cycle per source after a restart inserts everything again

use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::Error;
use crate::config::StoreConfig;
use crate::model::{StoredTracker, Tracker, TrackerId};
use crate::traits::store::{TrackerStore, TrackerStoreFactory};

/// In-memory tracker store
///
/// Records live in a `BTreeMap` keyed by identity behind a `RwLock`, so
/// listings come back in identity order.
///
/// # Example
///
/// ```rust,no_run
/// use tracker_core::store::MemoryTrackerStore;
/// use tracker_core::{Tracker, TrackerStore};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = MemoryTrackerStore::new();
///
///     store.insert(&Tracker::new("1", "armaqi", "Kentron", 40.18, 44.51)).await?;
///     assert_eq!(store.list_sources().await?, vec!["armaqi".to_string()]);
///
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryTrackerStore {
    inner: Arc<RwLock<BTreeMap<TrackerId, StoredTracker>>>,
}

impl MemoryTrackerStore {
    /// Create a new empty memory store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with trackers
    pub fn with_trackers(trackers: impl IntoIterator<Item = Tracker>) -> Self {
        let records = trackers
            .into_iter()
            .map(|tracker| (tracker.id(), StoredTracker::now(tracker)))
            .collect();

        Self {
            inner: Arc::new(RwLock::new(records)),
        }
    }

    /// Get the number of trackers in the store
    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    /// Check if the store is empty
    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }

    /// Look up a single tracker
    pub async fn get(&self, id: &TrackerId) -> Option<StoredTracker> {
        self.inner.read().await.get(id).cloned()
    }
}

#[async_trait]
impl TrackerStore for MemoryTrackerStore {
    async fn insert(&self, tracker: &Tracker) -> Result<(), Error> {
        let id = tracker.id();
        let mut guard = self.inner.write().await;
        if guard.contains_key(&id) {
            return Err(Error::already_exists(id.to_string()));
        }
        guard.insert(id, StoredTracker::now(tracker.clone()));
        Ok(())
    }

    async fn update(&self, tracker: &Tracker) -> Result<(), Error> {
        let id = tracker.id();
        let mut guard = self.inner.write().await;
        match guard.get_mut(&id) {
            Some(record) => {
                *record = StoredTracker::now(tracker.clone());
                Ok(())
            }
            None => Err(Error::not_found(format!("tracker {}", id))),
        }
    }

    async fn delete(&self, id: &TrackerId) -> Result<(), Error> {
        self.inner.write().await.remove(id);
        Ok(())
    }

    async fn list_all(&self) -> Result<Vec<Tracker>, Error> {
        let guard = self.inner.read().await;
        Ok(guard.values().map(|r| r.tracker.clone()).collect())
    }

    async fn list_since(
        &self,
        since: chrono::DateTime<chrono::Utc>,
    ) -> Result<Vec<StoredTracker>, Error> {
        let guard = self.inner.read().await;
        Ok(guard
            .values()
            .filter(|r| r.updated_at >= since)
            .cloned()
            .collect())
    }

    async fn list_sources(&self) -> Result<Vec<String>, Error> {
        let guard = self.inner.read().await;
        let sources: BTreeSet<&str> = guard.values().map(|r| r.tracker.source.as_str()).collect();
        if sources.is_empty() {
            return Err(Error::not_found("no sources stored"));
        }
        Ok(sources.into_iter().map(str::to_string).collect())
    }

    async fn list_ids_by_source(&self, source: &str) -> Result<Vec<String>, Error> {
        let guard = self.inner.read().await;
        let ids: Vec<String> = guard
            .values()
            .filter(|r| r.tracker.source == source)
            .map(|r| r.tracker.origin_id.clone())
            .collect();
        if ids.is_empty() {
            return Err(Error::not_found(format!("source {}", source)));
        }
        Ok(ids)
    }

    async fn flush(&self) -> Result<(), Error> {
        // Nothing buffered
        Ok(())
    }
}

/// Factory for in-memory stores
pub struct MemoryTrackerStoreFactory;

#[async_trait]
impl TrackerStoreFactory for MemoryTrackerStoreFactory {
    async fn create(&self, config: &StoreConfig) -> Result<Arc<dyn TrackerStore>, Error> {
        match config {
            StoreConfig::Memory => Ok(Arc::new(MemoryTrackerStore::new())),
            _ => Err(Error::config("Invalid config for memory store")),
        }
    }
}
