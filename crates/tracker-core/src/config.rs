//! Configuration types for the tracker system
//!
//! This module defines all configuration structures used throughout the crate.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

/// Default armaqi feed endpoint
pub const DEFAULT_ARMAQI_URL: &str = "https://armaqi.org/api/waqi/list";

/// Default armaqi source name
pub const DEFAULT_ARMAQI_NAME: &str = "armaqi";

/// Main tracker service configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrackerConfig {
    /// Store configuration
    #[serde(default)]
    pub store: StoreConfig,

    /// Sources to poll
    pub sources: Vec<SourceConfig>,

    /// Optional engine settings
    #[serde(default)]
    pub engine: EngineConfig,
}

impl TrackerConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.sources.is_empty() {
            return Err(crate::Error::config("No sources configured"));
        }

        self.store.validate()?;
        self.engine.validate()?;

        let mut names = HashSet::new();
        for source in &self.sources {
            source.validate()?;
            if !names.insert(source.name()) {
                return Err(crate::Error::config(format!(
                    "Duplicate source name: {}",
                    source.name()
                )));
            }
        }

        Ok(())
    }
}

/// Store configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StoreConfig {
    /// In-memory store (not persistent)
    #[default]
    Memory,

    /// JSON file store
    File {
        /// Path to the store file
        path: String,
    },

    /// Custom store
    Custom {
        /// Factory name to use
        factory: String,
        /// Custom configuration data
        config: serde_json::Value,
    },
}

impl StoreConfig {
    /// Validate the store configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            StoreConfig::Memory => Ok(()),
            StoreConfig::File { path } => {
                if path.is_empty() {
                    return Err(crate::Error::config("File store path cannot be empty"));
                }
                Ok(())
            }
            StoreConfig::Custom { factory, .. } => {
                if factory.is_empty() {
                    return Err(crate::Error::config("Custom store factory cannot be empty"));
                }
                Ok(())
            }
        }
    }

    /// Get the store type name
    pub fn type_name(&self) -> &str {
        match self {
            StoreConfig::Memory => "memory",
            StoreConfig::File { .. } => "file",
            StoreConfig::Custom { factory, .. } => factory,
        }
    }
}

/// Source configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SourceConfig {
    /// armaqi.org station list
    Armaqi {
        /// Source name (partition key)
        #[serde(default = "default_armaqi_name")]
        name: String,
        /// Feed URL
        #[serde(default = "default_armaqi_url")]
        url: String,
        /// Poll interval in seconds
        #[serde(default = "default_interval_secs")]
        interval_secs: u64,
        /// HTTP request timeout in seconds
        #[serde(default = "default_timeout_secs")]
        timeout_secs: u64,
    },

    /// Custom source
    Custom {
        /// Factory name to use
        factory: String,
        /// Source name (partition key)
        name: String,
        /// Custom configuration data
        config: serde_json::Value,
    },
}

impl SourceConfig {
    /// armaqi source with default settings
    pub fn armaqi() -> Self {
        SourceConfig::Armaqi {
            name: default_armaqi_name(),
            url: default_armaqi_url(),
            interval_secs: default_interval_secs(),
            timeout_secs: default_timeout_secs(),
        }
    }

    /// Validate the source configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            SourceConfig::Armaqi {
                name,
                url,
                interval_secs,
                timeout_secs,
            } => {
                if name.is_empty() {
                    return Err(crate::Error::config("armaqi source name cannot be empty"));
                }
                if url.is_empty() {
                    return Err(crate::Error::config("armaqi source URL cannot be empty"));
                }
                if *interval_secs == 0 {
                    return Err(crate::Error::config("armaqi poll interval must be > 0"));
                }
                if *timeout_secs == 0 {
                    return Err(crate::Error::config("armaqi HTTP timeout must be > 0"));
                }
                Ok(())
            }
            SourceConfig::Custom { factory, name, .. } => {
                if factory.is_empty() {
                    return Err(crate::Error::config("Custom source factory cannot be empty"));
                }
                if name.is_empty() {
                    return Err(crate::Error::config("Custom source name cannot be empty"));
                }
                Ok(())
            }
        }
    }

    /// Get the source type name (registry key)
    pub fn type_name(&self) -> &str {
        match self {
            SourceConfig::Armaqi { .. } => "armaqi",
            SourceConfig::Custom { factory, .. } => factory,
        }
    }

    /// Get the configured source name
    pub fn name(&self) -> &str {
        match self {
            SourceConfig::Armaqi { name, .. } | SourceConfig::Custom { name, .. } => name,
        }
    }
}

fn default_armaqi_name() -> String {
    DEFAULT_ARMAQI_NAME.to_string()
}

fn default_armaqi_url() -> String {
    DEFAULT_ARMAQI_URL.to_string()
}

fn default_interval_secs() -> u64 {
    600
}

fn default_timeout_secs() -> u64 {
    10
}

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Capacity of the engine event channel
    ///
    /// When full, new events are dropped (with a warning log).
    ///
    /// Default: 1000 events
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,

    /// Seed the fingerprint cache from the store at construction
    ///
    /// With this disabled every stored tracker is re-inserted on the first
    /// cycle after a restart (and the store reports `AlreadyExists`).
    #[serde(default = "default_hydrate_cache")]
    pub hydrate_cache: bool,

    /// Upper bound on waiting for pollers to drain on shutdown (seconds)
    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,
}

impl EngineConfig {
    /// Validate the engine configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.event_channel_capacity == 0 {
            return Err(crate::Error::config("Event channel capacity must be > 0"));
        }
        Ok(())
    }

    /// Shutdown timeout as a duration
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            event_channel_capacity: default_event_channel_capacity(),
            hydrate_cache: default_hydrate_cache(),
            shutdown_timeout_secs: default_shutdown_timeout_secs(),
        }
    }
}

fn default_event_channel_capacity() -> usize {
    1000
}

fn default_hydrate_cache() -> bool {
    true
}

fn default_shutdown_timeout_secs() -> u64 {
    30
}
