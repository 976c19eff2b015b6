//! Core traits for the tracker system
//!
//! This module defines the abstract interfaces that all implementations must follow.
//!
//! - [`TrackerSource`]: Fetch full station snapshots from a feed
//! - [`TrackerStore`]: Persist the reconciled trackers and serve queries

pub mod source;
pub mod store;

pub use source::{TrackerSource, TrackerSourceFactory};
pub use store::{TrackerStore, TrackerStoreFactory};
