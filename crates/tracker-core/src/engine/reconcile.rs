//! Diff/apply algorithm
//!
//! Compares one source's full snapshot against that source's cache
//! partition and issues the minimal store writes:
//!
//! - identity not cached → insert
//! - identity cached with a different fingerprint → update
//! - identity cached with the same fingerprint → nothing
//! - cached identity missing from the snapshot → delete
//!
//! The partition is replaced only after every write succeeded. A failed
//! write aborts the cycle and leaves the partition as it was, so the next
//! cycle re-diffs against the same view. Writes already applied are not
//! rolled back; the fallbacks below keep the retry idempotent.

use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::cache::{FingerprintCache, Partition};
use crate::error::{Error, Result};
use crate::model::{Tracker, TrackerId};
use crate::traits::TrackerStore;

/// Store writes issued by one reconciliation cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Trackers inserted
    pub inserted: usize,
    /// Trackers whose fingerprint changed
    pub updated: usize,
    /// Trackers no longer reported by the source
    pub deleted: usize,
    /// Trackers seen with an unchanged fingerprint
    pub unchanged: usize,
}

impl CycleReport {
    /// Total number of store writes
    pub fn writes(&self) -> usize {
        self.inserted + self.updated + self.deleted
    }
}

/// Reconcile one source's snapshot into the store and the cache
///
/// Must not run concurrently with another cycle for the same source.
pub(crate) async fn reconcile(
    store: &dyn TrackerStore,
    cache: &Mutex<FingerprintCache>,
    source: &str,
    snapshot: &[Tracker],
) -> Result<CycleReport> {
    // An empty feed is far more likely an upstream hiccup than every
    // station disappearing at once.
    if snapshot.is_empty() {
        return Err(Error::EmptySnapshot(source.to_string()));
    }

    if let Some(stray) = snapshot.iter().find(|t| t.source != source) {
        return Err(Error::fetch(
            source,
            format!(
                "tracker {} reports source {:?}",
                stray.origin_id, stray.source
            ),
        ));
    }

    let mut stale = cache.lock().await.snapshot(source);
    let mut next = Partition::with_capacity(snapshot.len());
    let mut report = CycleReport::default();

    for tracker in snapshot {
        let id = tracker.id();
        if next.contains_key(&id) {
            warn!("Duplicate tracker {} in snapshot of {}, keeping the first", id, source);
            continue;
        }

        let fingerprint = tracker.fingerprint();
        match stale.remove(&id) {
            None => {
                insert(store, tracker)
                    .await
                    .map_err(|e| abort(source, &id, e))?;
                report.inserted += 1;
            }
            Some(previous) if previous != fingerprint => {
                update(store, tracker)
                    .await
                    .map_err(|e| abort(source, &id, e))?;
                report.updated += 1;
            }
            Some(_) => report.unchanged += 1,
        }
        next.insert(id, fingerprint);
    }

    for id in stale.keys() {
        delete(store, id).await.map_err(|e| abort(source, id, e))?;
        report.deleted += 1;
    }

    cache.lock().await.replace(source, next);
    Ok(report)
}

/// Insert, falling back to update if a previous aborted cycle already inserted
async fn insert(store: &dyn TrackerStore, tracker: &Tracker) -> Result<()> {
    match store.insert(tracker).await {
        Err(Error::AlreadyExists(_)) => {
            debug!("Tracker {} already stored, updating instead", tracker.id());
            store.update(tracker).await
        }
        other => other,
    }
}

/// Update, falling back to insert if the record vanished from the store
async fn update(store: &dyn TrackerStore, tracker: &Tracker) -> Result<()> {
    match store.update(tracker).await {
        Err(Error::NotFound(_)) => {
            debug!("Tracker {} missing from store, inserting instead", tracker.id());
            store.insert(tracker).await
        }
        other => other,
    }
}

/// Delete, treating an already-missing record as success
async fn delete(store: &dyn TrackerStore, id: &TrackerId) -> Result<()> {
    match store.delete(id).await {
        Err(Error::NotFound(_)) => Ok(()),
        other => other,
    }
}

fn abort(source: &str, id: &TrackerId, err: Error) -> Error {
    Error::reconcile(source, id.as_str(), err.to_string())
}
