//! Plugin-based component registry
//!
//! The registry allows source adapters and store backends to be registered
//! dynamically at runtime, avoiding hardcoded if-else chains.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use tracker_core::registry::ComponentRegistry;
//! use tracker_core::config::{SourceConfig, StoreConfig};
//!
//! let registry = ComponentRegistry::new();
//! registry.register_builtin_stores();
//! tracker_source_armaqi::register(&registry);
//!
//! let store = registry.create_store(&StoreConfig::Memory).await?;
//! let source = registry.create_source(&SourceConfig::armaqi())?;
//! ```
//!
//! ## Registration
//!
//! Adapter crates expose a `register` function:
//!
//! ```rust,ignore
//! pub fn register(registry: &ComponentRegistry) {
//!     registry.register_source_factory("armaqi", Box::new(ArmaqiFactory));
//! }
//! ```

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use crate::config::{SourceConfig, StoreConfig};
use crate::error::{Error, Result};
use crate::store::{FileTrackerStoreFactory, MemoryTrackerStoreFactory};
use crate::traits::{TrackerSource, TrackerSourceFactory, TrackerStore, TrackerStoreFactory};

/// Registry of source and store factories, keyed by type name
///
/// ## Thread Safety
///
/// Interior mutability with `RwLock` allows concurrent lookups and exclusive
/// registration. A poisoned lock is recovered; the maps are never left
/// half-updated.
#[derive(Default)]
pub struct ComponentRegistry {
    sources: RwLock<HashMap<String, Box<dyn TrackerSourceFactory>>>,
    stores: RwLock<HashMap<String, Arc<dyn TrackerStoreFactory>>>,
}

impl ComponentRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a source factory
    ///
    /// # Parameters
    ///
    /// - `name`: Source type name as used in `SourceConfig` (e.g., "armaqi")
    /// - `factory`: Factory object for creating source instances
    pub fn register_source_factory(
        &self,
        name: impl Into<String>,
        factory: Box<dyn TrackerSourceFactory>,
    ) {
        self.sources
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.into(), factory);
    }

    /// Register a store factory
    pub fn register_store_factory(
        &self,
        name: impl Into<String>,
        factory: Box<dyn TrackerStoreFactory>,
    ) {
        self.stores
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.into(), Arc::from(factory));
    }

    /// Register the `memory` and `file` stores shipped with this crate
    pub fn register_builtin_stores(&self) {
        self.register_store_factory("memory", Box::new(MemoryTrackerStoreFactory));
        self.register_store_factory("file", Box::new(FileTrackerStoreFactory));
    }

    /// Create a source from configuration
    ///
    /// # Returns
    ///
    /// - `Ok(Box<dyn TrackerSource>)`: Created source instance
    /// - `Err(Error::Config)`: If the source type is not registered
    /// - `Err(Error)`: If creation fails
    pub fn create_source(&self, config: &SourceConfig) -> Result<Box<dyn TrackerSource>> {
        let source_type = config.type_name();
        let sources = self.sources.read().unwrap_or_else(PoisonError::into_inner);

        let factory = sources
            .get(source_type)
            .ok_or_else(|| Error::config(format!("Unknown source type: {}", source_type)))?;

        factory.create(config)
    }

    /// Create a store from configuration
    ///
    /// # Returns
    ///
    /// - `Ok(Arc<dyn TrackerStore>)`: Created store instance
    /// - `Err(Error::Config)`: If the store type is not registered
    /// - `Err(Error)`: If creation fails (e.g., unreadable file)
    pub async fn create_store(&self, config: &StoreConfig) -> Result<Arc<dyn TrackerStore>> {
        let store_type = config.type_name();

        // Clone the factory out so the lock is not held across the await
        let factory = self
            .stores
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(store_type)
            .cloned()
            .ok_or_else(|| Error::config(format!("Unknown store type: {}", store_type)))?;

        factory.create(config).await
    }

    /// Registered source type names, sorted
    pub fn list_sources(&self) -> Vec<String> {
        let sources = self.sources.read().unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<String> = sources.keys().cloned().collect();
        names.sort();
        names
    }

    /// Registered store type names, sorted
    pub fn list_stores(&self) -> Vec<String> {
        let stores = self.stores.read().unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<String> = stores.keys().cloned().collect();
        names.sort();
        names
    }

    /// Check if a source type is registered
    pub fn has_source(&self, name: &str) -> bool {
        self.sources
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }

    /// Check if a store type is registered
    pub fn has_store(&self, name: &str) -> bool {
        self.stores
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }
}
