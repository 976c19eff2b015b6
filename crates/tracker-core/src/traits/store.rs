// # Tracker Store Trait
//
// Defines the interface for tracker persistence.
//
// ## Purpose
//
// The store holds the merged result of every source's latest snapshot and
// serves it to queries. The engine only ever issues the minimal writes
// (insert/update/delete) needed to bring it in line with a new snapshot.
//
// ## Implementations
//
// - In-memory: `MemoryTrackerStore`
// - File-based: `FileTrackerStore` (JSON, write-behind with explicit flush)
//
// ## Usage
//
// ```rust,ignore
// use tracker_core::{Tracker, TrackerStore};
//
// #[tokio::main]
// async fn main() -> anyhow::Result<()> {
//     let store = /* TrackerStore implementation */;
//
//     store.insert(&Tracker::new("1", "armaqi", "Kentron", 40.18, 44.51)).await?;
//     let ids = store.list_ids_by_source("armaqi").await?;
//     assert_eq!(ids, vec!["1".to_string()]);
//
//     Ok(())
// }
// ```

use async_trait::async_trait;

use crate::model::{StoredTracker, Tracker, TrackerId};

/// Trait for tracker store implementations
///
/// Implementations must be thread-safe and usable across async tasks.
///
/// # Consistency
///
/// Each operation must be individually consistent. Cross-operation snapshot
/// isolation is not required: queries may observe a reconciliation cycle
/// half-applied.
///
/// # Idempotency
///
/// The engine does not roll back partially applied cycles; it re-diffs on
/// the next one. Stores must therefore report [`Error::AlreadyExists`] on a
/// duplicate insert and [`Error::NotFound`] on an update of a missing
/// record (the engine falls back to the other write), and treat a delete of
/// a missing record as success.
///
/// [`Error::AlreadyExists`]: crate::Error::AlreadyExists
/// [`Error::NotFound`]: crate::Error::NotFound
#[async_trait]
pub trait TrackerStore: Send + Sync {
    /// Insert a new tracker
    ///
    /// # Returns
    ///
    /// - `Ok(())`: Inserted
    /// - `Err(Error::AlreadyExists)`: The identity is already stored
    /// - `Err(Error)`: Storage error
    async fn insert(&self, tracker: &Tracker) -> Result<(), crate::Error>;

    /// Overwrite the mutable fields of a stored tracker
    ///
    /// # Returns
    ///
    /// - `Ok(())`: Updated
    /// - `Err(Error::NotFound)`: The identity is not stored
    /// - `Err(Error)`: Storage error
    async fn update(&self, tracker: &Tracker) -> Result<(), crate::Error>;

    /// Delete a tracker by identity
    ///
    /// Deleting an identity that is not stored succeeds.
    async fn delete(&self, id: &TrackerId) -> Result<(), crate::Error>;

    /// All stored trackers
    async fn list_all(&self) -> Result<Vec<Tracker>, crate::Error>;

    /// Trackers inserted or updated at or after `since`
    async fn list_since(
        &self,
        since: chrono::DateTime<chrono::Utc>,
    ) -> Result<Vec<StoredTracker>, crate::Error>;

    /// Distinct source names present in the store
    ///
    /// Fails with `Error::NotFound` when the store is empty.
    async fn list_sources(&self) -> Result<Vec<String>, crate::Error>;

    /// Origin ids stored for one source
    ///
    /// Fails with `Error::NotFound` when the source is unknown or has no records.
    async fn list_ids_by_source(&self, source: &str) -> Result<Vec<String>, crate::Error>;

    /// Persist any pending changes
    ///
    /// Some implementations buffer writes. The engine flushes after every
    /// cycle that reached the store and when polling stops.
    async fn flush(&self) -> Result<(), crate::Error>;
}

/// Helper trait for constructing stores from configuration
#[async_trait]
pub trait TrackerStoreFactory: Send + Sync {
    /// Create a TrackerStore instance from configuration
    ///
    /// # Parameters
    ///
    /// - `config`: Store configuration
    ///
    /// # Returns
    ///
    /// A shareable TrackerStore trait object
    async fn create(
        &self,
        config: &crate::config::StoreConfig,
    ) -> Result<std::sync::Arc<dyn TrackerStore>, crate::Error>;
}
