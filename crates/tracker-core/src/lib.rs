// # tracker-core
//
// Core library for the tracker reconciliation service.
//
// ## Architecture Overview
//
// This library keeps a store of geolocated trackers in line with one or more
// external station feeds:
// - **TrackerSource**: Trait for fetching a full snapshot from a feed
// - **TrackerStore**: Trait for persisting trackers and serving queries
// - **TrackerEngine**: Polls every source, diffs each snapshot against a
//   fingerprint cache and applies the minimal insert/update/delete set
// - **ComponentRegistry**: Plugin-based registry for sources and stores
//
// ## Design Principles
//
// 1. **Separation of Concerns**: Core logic is separate from adapters and backends
// 2. **Full Snapshots**: Sources report everything; deletions are inferred
// 3. **Plugin-Based**: Sources and stores are registered dynamically
// 4. **Library-First**: All core functionality can be used as a library
// 5. **Idempotency**: A failed cycle is simply re-diffed on the next tick

pub mod config;
pub mod engine;
pub mod error;
pub mod model;
pub mod registry;
pub mod store;
pub mod traits;

// Re-export core types for convenience
pub use config::{EngineConfig, SourceConfig, StoreConfig, TrackerConfig};
pub use engine::{CycleReport, EngineEvent, EngineState, TrackerEngine};
pub use error::{Error, ErrorCode, Result};
pub use model::{Fingerprint, StoredTracker, Tracker, TrackerId};
pub use registry::ComponentRegistry;
pub use store::{FileTrackerStore, MemoryTrackerStore};
pub use traits::{TrackerSource, TrackerSourceFactory, TrackerStore, TrackerStoreFactory};
