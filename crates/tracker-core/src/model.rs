//! Tracker data model
//!
//! A [`Tracker`] is one monitoring station as reported by one source.
//! Its [`TrackerId`] is the source-scoped identity and its [`Fingerprint`]
//! is a digest over the mutable fields, used to decide whether a stored
//! record needs to be rewritten.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// One monitored station reported by one source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tracker {
    /// Identifier assigned by the source
    pub origin_id: String,
    /// Name of the source that reported this station
    pub source: String,
    /// Human-readable station description
    pub description: String,
    /// Latitude in degrees
    pub latitude: f64,
    /// Longitude in degrees
    pub longitude: f64,
}

impl Tracker {
    /// Create a new tracker
    pub fn new(
        origin_id: impl Into<String>,
        source: impl Into<String>,
        description: impl Into<String>,
        latitude: f64,
        longitude: f64,
    ) -> Self {
        Self {
            origin_id: origin_id.into(),
            source: source.into(),
            description: description.into(),
            latitude,
            longitude,
        }
    }

    /// Composite identity `(source, origin_id)`
    pub fn id(&self) -> TrackerId {
        TrackerId::new(&self.source, &self.origin_id)
    }

    /// Digest over `description`, `latitude` and `longitude`
    ///
    /// Not a security primitive. Floats use the shortest round-trip
    /// representation so any change in value changes the digest.
    pub fn fingerprint(&self) -> Fingerprint {
        let fields = format!("{}|{}|{}", self.description, self.latitude, self.longitude);
        let mut hasher = Sha256::new();
        hasher.update(fields.as_bytes());
        Fingerprint(hex::encode(hasher.finalize()))
    }
}

/// Source-scoped tracker identity, rendered as `source|origin_id`
///
/// `|` and `\` inside the source name are backslash-escaped, so the first
/// unescaped `|` always ends the source and no two `(source, origin_id)`
/// pairs share a key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackerId(String);

impl TrackerId {
    /// Build the identity for a source and its origin id
    pub fn new(source: &str, origin_id: &str) -> Self {
        let mut key = String::with_capacity(source.len() + origin_id.len() + 1);
        for c in source.chars() {
            if c == '|' || c == '\\' {
                key.push('\\');
            }
            key.push(c);
        }
        key.push('|');
        key.push_str(origin_id);
        Self(key)
    }

    /// The identity string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TrackerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Content digest used for change detection
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Hex representation of the digest
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A tracker as persisted by a store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredTracker {
    /// The tracker itself
    pub tracker: Tracker,
    /// When the store last inserted or updated this record
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl StoredTracker {
    /// Wrap a tracker, stamping it with the current time
    pub(crate) fn now(tracker: Tracker) -> Self {
        Self {
            tracker,
            updated_at: chrono::Utc::now(),
        }
    }
}
