//! Change-detection cache
//!
//! One partition per source, mapping identity to the fingerprint that was
//! last reconciled into the store. At rest a partition mirrors the store's
//! records for that source.

use std::collections::HashMap;

use crate::model::{Fingerprint, Tracker, TrackerId};

/// Fingerprints of one source's trackers, keyed by identity
pub type Partition = HashMap<TrackerId, Fingerprint>;

/// Per-source fingerprint cache
#[derive(Debug, Default)]
pub struct FingerprintCache {
    partitions: HashMap<String, Partition>,
}

impl FingerprintCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a cache from stored trackers
    pub fn hydrate<'a>(trackers: impl IntoIterator<Item = &'a Tracker>) -> Self {
        let mut cache = Self::new();
        for tracker in trackers {
            cache
                .partitions
                .entry(tracker.source.clone())
                .or_default()
                .insert(tracker.id(), tracker.fingerprint());
        }
        cache
    }

    /// Create an empty partition for a source unless one exists
    pub fn ensure_partition(&mut self, source: &str) {
        if !self.partitions.contains_key(source) {
            self.partitions.insert(source.to_string(), Partition::new());
        }
    }

    /// Copy of a source's partition (empty if the source is unknown)
    pub fn snapshot(&self, source: &str) -> Partition {
        self.partitions.get(source).cloned().unwrap_or_default()
    }

    /// Replace a source's partition wholesale
    pub fn replace(&mut self, source: &str, partition: Partition) {
        self.partitions.insert(source.to_string(), partition);
    }

    /// Fingerprint cached for an identity
    pub fn get(&self, source: &str, id: &TrackerId) -> Option<&Fingerprint> {
        self.partitions.get(source).and_then(|p| p.get(id))
    }

    /// Number of identities cached for a source
    pub fn partition_len(&self, source: &str) -> usize {
        self.partitions.get(source).map_or(0, HashMap::len)
    }

    /// Whether a partition exists for a source
    pub fn has_partition(&self, source: &str) -> bool {
        self.partitions.contains_key(source)
    }
}
