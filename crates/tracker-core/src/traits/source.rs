// # Tracker Source Trait
//
// Defines the interface for pluggable station feeds.
//
// ## Implementations
//
// - armaqi.org JSON feed: `tracker-source-armaqi` crate
// - Test doubles: `tests/common`
//
// ## Usage
//
// ```rust,ignore
// use tracker_core::TrackerSource;
//
// #[tokio::main]
// async fn main() -> anyhow::Result<()> {
//     let source = /* TrackerSource implementation */;
//
//     // Full snapshot of everything the feed currently reports
//     let trackers = source.fetch().await?;
//     println!("{} reported {} stations", source.name(), trackers.len());
//
//     Ok(())
// }
// ```

use async_trait::async_trait;
use std::time::Duration;

use crate::model::Tracker;

/// Trait for station feed implementations
///
/// A source reports the **complete** current set of stations it knows about
/// on every call to [`fetch`](TrackerSource::fetch). The engine infers
/// deletions from stations missing in the latest snapshot, so returning a
/// delta would delete everything not in it.
///
/// # Thread Safety
///
/// Implementations must be thread-safe and usable across async tasks.
///
/// # Responsibilities
///
/// ## Allowed
/// - ✅ Perform HTTP (or other) I/O against their own feed
/// - ✅ Bound their own request latency (timeouts)
/// - ✅ Map the feed's wire format onto [`Tracker`]
///
/// ## Forbidden
/// - ❌ Spawn polling loops (the engine owns the schedule)
/// - ❌ Retry internally (the engine waits for the next tick)
/// - ❌ Access the store or cache (owned by `TrackerEngine`)
/// - ❌ Return partial snapshots
///
/// # Cancellation
///
/// The engine races `fetch` against its stop signal and drops the future
/// when stop wins, so implementations must be cancellation-safe.
#[async_trait]
pub trait TrackerSource: Send + Sync {
    /// Stable, non-empty name; partitions the cache and the store
    fn name(&self) -> &str;

    /// How often the engine polls this source; must be positive
    fn poll_interval(&self) -> Duration;

    /// Fetch the full current snapshot
    ///
    /// Every returned tracker must carry `source == self.name()`.
    ///
    /// # Returns
    ///
    /// - `Ok(Vec<Tracker>)`: The complete snapshot
    /// - `Err(Error)`: The feed could not be reached or parsed
    async fn fetch(&self) -> Result<Vec<Tracker>, crate::Error>;
}

/// Helper trait for constructing sources from configuration
pub trait TrackerSourceFactory: Send + Sync {
    /// Create a TrackerSource instance from configuration
    ///
    /// # Parameters
    ///
    /// - `config`: Configuration for this source
    ///
    /// # Returns
    ///
    /// A boxed TrackerSource trait object
    fn create(
        &self,
        config: &crate::config::SourceConfig,
    ) -> Result<Box<dyn TrackerSource>, crate::Error>;
}
