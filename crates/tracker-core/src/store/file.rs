// # File Tracker Store
//
// File-based implementation of TrackerStore with crash recovery.
//
// ## Purpose
//
// Keeps the reconciled trackers across daemon restarts so the engine can
// hydrate its fingerprint cache instead of re-inserting every station.
//
// ## Write-behind
//
// Mutations only touch memory and mark the state dirty. `flush()` writes the
// whole file; the engine flushes after every reconciliation cycle. A crash
// between a write and the next flush loses at most that cycle, which the
// next cycle recomputes.
//
// ## Crash Recovery
//
// - Atomic writes: Uses write-then-rename for atomicity
// - Corruption detection: Validates JSON on load
// - Automatic backup: Keeps .backup of last known good state
// - Recovery: Falls back to backup if corruption detected
//
// ## File Format
//
// ```json
// {
//   "version": "1.0",
//   "trackers": {
//     "armaqi|76921": {
//       "tracker": {
//         "origin_id": "76921",
//         "source": "armaqi",
//         "description": "Kentron",
//         "latitude": 40.182,
//         "longitude": 44.516
//       },
//       "updated_at": "2025-01-09T12:00:00Z"
//     }
//   }
// }
// ```

use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;

use crate::Error;
use crate::config::StoreConfig;
use crate::model::{StoredTracker, Tracker, TrackerId};
use crate::traits::store::{TrackerStore, TrackerStoreFactory};

/// Store file format version
/// Used for future migration if format changes
const STORE_FILE_VERSION: &str = "1.0";

/// File-based tracker store with crash recovery
///
/// # Example
///
/// ```rust,no_run
/// use tracker_core::store::FileTrackerStore;
/// use tracker_core::{Tracker, TrackerStore};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = FileTrackerStore::new("/var/lib/trackerd/trackers.json").await?;
///
///     store.insert(&Tracker::new("1", "armaqi", "Kentron", 40.18, 44.51)).await?;
///     store.flush().await?; // written atomically
///
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct FileTrackerStore {
    path: PathBuf,
    state: Arc<RwLock<FileState>>,
}

/// Internal state for file-based store
#[derive(Debug)]
struct FileState {
    trackers: BTreeMap<TrackerId, StoredTracker>,
    dirty: bool,
}

/// Serializable store file format
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct StoreFileFormat {
    version: String,
    trackers: BTreeMap<TrackerId, StoredTracker>,
}

impl FileTrackerStore {
    /// Create or load a file store
    ///
    /// This will:
    /// 1. Try to load the existing store file
    /// 2. If corruption detected, try to load from backup
    /// 3. If both fail, start with empty state
    /// 4. Create parent directories if needed
    pub async fn new<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            fs::create_dir_all(parent).await.map_err(|e| {
                Error::config(format!(
                    "Failed to create store directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let trackers = Self::load_with_recovery(&path).await?;

        Ok(Self {
            path,
            state: Arc::new(RwLock::new(FileState {
                trackers,
                dirty: false,
            })),
        })
    }

    /// Load the store file, falling back to the backup on corruption
    async fn load_with_recovery(
        path: &Path,
    ) -> Result<BTreeMap<TrackerId, StoredTracker>, Error> {
        match Self::load(path).await {
            Ok(trackers) => {
                tracing::debug!("Loaded {} trackers from {}", trackers.len(), path.display());
                Ok(trackers)
            }
            Err(Error::Json(e)) => {
                tracing::warn!(
                    "Store file {} appears corrupted: {}. Attempting recovery from backup.",
                    path.display(),
                    e
                );

                let backup_path = Self::backup_path(path);
                if !backup_path.exists() {
                    tracing::warn!("No backup file found. Starting with empty store.");
                    return Ok(BTreeMap::new());
                }

                match Self::load(&backup_path).await {
                    Ok(trackers) => {
                        tracing::info!("Recovered {} trackers from backup", trackers.len());

                        if let Err(restore_err) = fs::copy(&backup_path, path).await {
                            tracing::error!(
                                "Failed to restore store file from backup: {}",
                                restore_err
                            );
                        }

                        Ok(trackers)
                    }
                    Err(backup_err) => {
                        tracing::error!(
                            "Backup also unreadable: {}. Starting with empty store.",
                            backup_err
                        );
                        Ok(BTreeMap::new())
                    }
                }
            }
            Err(e) => Err(e),
        }
    }

    /// Load the store from a file
    async fn load(path: &Path) -> Result<BTreeMap<TrackerId, StoredTracker>, Error> {
        if !path.exists() {
            tracing::debug!("Store file does not exist: {}", path.display());
            return Ok(BTreeMap::new());
        }

        let content = fs::read_to_string(path).await.map_err(|e| {
            Error::store(format!("Failed to read store file {}: {}", path.display(), e))
        })?;

        let file: StoreFileFormat = serde_json::from_str(&content)?;

        if file.version != STORE_FILE_VERSION {
            tracing::warn!(
                "Store file version mismatch: expected {}, got {}. Attempting to load anyway.",
                STORE_FILE_VERSION,
                file.version
            );
        }

        Ok(file.trackers)
    }

    /// Write the store to disk atomically
    async fn write(&self) -> Result<(), Error> {
        // Held for the whole write so concurrent mutations wait and the
        // dirty flag cannot be cleared over an unwritten change.
        let mut guard = self.state.write().await;

        let file = StoreFileFormat {
            version: STORE_FILE_VERSION.to_string(),
            trackers: guard.trackers.clone(),
        };
        let json = serde_json::to_string_pretty(&file)?;

        let temp_path = self.temp_path();
        {
            let mut out = fs::File::create(&temp_path).await.map_err(|e| {
                Error::store(format!(
                    "Failed to create temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;

            out.write_all(json.as_bytes()).await.map_err(|e| {
                Error::store(format!(
                    "Failed to write temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;

            out.flush().await.map_err(|e| {
                Error::store(format!(
                    "Failed to flush temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;
        }

        if self.path.exists() {
            let backup_path = Self::backup_path(&self.path);
            if let Err(e) = fs::copy(&self.path, &backup_path).await {
                tracing::warn!("Failed to create backup: {}", e);
            }
        }

        fs::rename(&temp_path, &self.path).await.map_err(|e| {
            Error::store(format!(
                "Failed to rename {} to {}: {}",
                temp_path.display(),
                self.path.display(),
                e
            ))
        })?;

        guard.dirty = false;
        tracing::trace!("Store written to file: {}", self.path.display());
        Ok(())
    }

    /// Get path to temporary file for atomic writes
    fn temp_path(&self) -> PathBuf {
        let mut temp = self.path.clone();
        temp.set_extension("tmp");
        temp
    }

    /// Get path to backup file
    fn backup_path(path: &Path) -> PathBuf {
        let mut backup = path.to_path_buf();
        backup.set_extension("backup");
        backup
    }

    /// Whether there are changes not yet flushed
    pub async fn is_dirty(&self) -> bool {
        self.state.read().await.dirty
    }
}

#[async_trait]
impl TrackerStore for FileTrackerStore {
    async fn insert(&self, tracker: &Tracker) -> Result<(), Error> {
        let id = tracker.id();
        let mut guard = self.state.write().await;
        if guard.trackers.contains_key(&id) {
            return Err(Error::already_exists(id.to_string()));
        }
        guard.trackers.insert(id, StoredTracker::now(tracker.clone()));
        guard.dirty = true;
        Ok(())
    }

    async fn update(&self, tracker: &Tracker) -> Result<(), Error> {
        let id = tracker.id();
        let mut guard = self.state.write().await;
        match guard.trackers.get_mut(&id) {
            Some(record) => *record = StoredTracker::now(tracker.clone()),
            None => return Err(Error::not_found(format!("tracker {}", id))),
        }
        guard.dirty = true;
        Ok(())
    }

    async fn delete(&self, id: &TrackerId) -> Result<(), Error> {
        let mut guard = self.state.write().await;
        if guard.trackers.remove(id).is_some() {
            guard.dirty = true;
        }
        Ok(())
    }

    async fn list_all(&self) -> Result<Vec<Tracker>, Error> {
        let guard = self.state.read().await;
        Ok(guard.trackers.values().map(|r| r.tracker.clone()).collect())
    }

    async fn list_since(
        &self,
        since: chrono::DateTime<chrono::Utc>,
    ) -> Result<Vec<StoredTracker>, Error> {
        let guard = self.state.read().await;
        Ok(guard
            .trackers
            .values()
            .filter(|r| r.updated_at >= since)
            .cloned()
            .collect())
    }

    async fn list_sources(&self) -> Result<Vec<String>, Error> {
        let guard = self.state.read().await;
        let sources: BTreeSet<&str> = guard
            .trackers
            .values()
            .map(|r| r.tracker.source.as_str())
            .collect();
        if sources.is_empty() {
            return Err(Error::not_found("no sources stored"));
        }
        Ok(sources.into_iter().map(str::to_string).collect())
    }

    async fn list_ids_by_source(&self, source: &str) -> Result<Vec<String>, Error> {
        let guard = self.state.read().await;
        let ids: Vec<String> = guard
            .trackers
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
        if self.is_dirty().await {
            self.write().await
        } else {
            Ok(())
        }
    }
}

/// Factory for file stores
pub struct FileTrackerStoreFactory;

#[async_trait]
impl TrackerStoreFactory for FileTrackerStoreFactory {
    async fn create(&self, config: &StoreConfig) -> Result<Arc<dyn TrackerStore>, Error> {
        match config {
            StoreConfig::File { path } => Ok(Arc::new(FileTrackerStore::new(path).await?)),
            _ => Err(Error::config("Invalid config for file store")),
        }
    }
}
