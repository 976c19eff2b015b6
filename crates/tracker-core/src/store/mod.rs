// # Tracker Store Implementations
//
// This module provides implementations of the TrackerStore trait for
// different persistence strategies.

pub mod file;
pub mod memory;

pub use file::{FileTrackerStore, FileTrackerStoreFactory};
pub use memory::{MemoryTrackerStore, MemoryTrackerStoreFactory};
