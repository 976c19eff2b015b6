//! Tracker reconciliation engine
//!
//! The TrackerEngine is responsible for:
//! - Holding the registry of sources
//! - Polling every source on its own cadence
//! - Diffing each snapshot against the fingerprint cache
//! - Applying the minimal store writes and advancing the cache
//! - Serving read-through queries from the store
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐ ┌──────────────┐
//! │ TrackerSource│ │ TrackerSource│   one poller task per source
//! └──────┬───────┘ └──────┬───────┘
//!        │ snapshot       │ snapshot
//!        ▼                ▼
//!   ┌─────────────────────────────┐      ┌──────────────────┐
//!   │        TrackerEngine        │◄────►│ FingerprintCache │
//!   │   diff/apply per source     │      │ (one Mutex)      │
//!   └──────────────┬──────────────┘      └──────────────────┘
//!                  │ insert/update/delete
//!                  ▼
//!          ┌──────────────┐          ┌─────────────┐
//!          │ TrackerStore │◄─────────│   Queries   │
//!          └──────────────┘          └─────────────┘
//! ```
//!
//! ## Lifecycle
//!
//! `Constructed → Running → Stopped`, and `Stopped → Running` again.
//! Sources can only be registered while not running. `start_update` spawns
//! one poller per source plus a supervisor that waits for all of them and
//! flips the state back to `Stopped`. `stop_update` only signals; use
//! [`TrackerEngine::wait_stopped`] or [`TrackerEngine::shutdown`] to wait.
//! [`TrackerEngine::start_update_until`] additionally ties the run to a
//! caller-owned `watch` token, so setting that token stops it too.

mod cache;
mod reconcile;

pub use cache::FingerprintCache;
pub use reconcile::CycleReport;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, mpsc, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::model::{Tracker, TrackerId};
use crate::traits::{TrackerSource, TrackerStore};

/// Events emitted by the TrackerEngine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// A source was added
    SourceRegistered { source: String },

    /// Polling started
    Started { sources_count: usize },

    /// A source could not be fetched; the cycle was skipped
    FetchFailed { source: String, error: String },

    /// A snapshot was ignored without touching the store
    CycleSkipped { source: String, reason: String },

    /// A snapshot was fully reconciled
    CycleCompleted { source: String, report: CycleReport },

    /// A store write failed; the cache was left as it was
    CycleAborted { source: String, error: String },

    /// All pollers exited
    Stopped,
}

/// Engine lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// Never started
    Constructed,
    /// Pollers are active
    Running,
    /// All pollers have exited
    Stopped,
}

/// A source plus the lock that serializes its cycles
#[derive(Clone)]
struct RegisteredSource {
    adapter: Arc<dyn TrackerSource>,
    interval: Duration,
    cycle: Arc<Mutex<()>>,
}

impl RegisteredSource {
    fn name(&self) -> &str {
        self.adapter.name()
    }
}

/// Registration and lifecycle state, guarded as a unit
#[derive(Default)]
struct Control {
    sources: BTreeMap<String, RegisteredSource>,
    shutdown: Option<Arc<watch::Sender<bool>>>,
}

/// State shared with the poller tasks
struct EngineCore {
    store: Arc<dyn TrackerStore>,
    cache: Mutex<FingerprintCache>,
    event_tx: mpsc::Sender<EngineEvent>,
}

/// Core reconciliation engine
///
/// ## Concurrency
///
/// Sources are polled in parallel; only the fingerprint cache is shared
/// between pollers, behind one mutex that is never held across a store
/// call. Cycles for the same source are serialized by a per-source lock,
/// which also covers [`TrackerEngine::sync_source`].
///
/// Queries read the store directly and may observe a cycle half-applied.
///
/// ## Observability
///
/// The engine does not touch process-wide providers. Progress is reported
/// through `tracing` and through the bounded [`EngineEvent`] channel
/// returned by [`TrackerEngine::new`]; when the channel is full events are
/// dropped with a warning.
pub struct TrackerEngine {
    core: Arc<EngineCore>,
    control: Mutex<Control>,
    state: Arc<watch::Sender<EngineState>>,
}

impl TrackerEngine {
    /// Create a new engine
    ///
    /// With `hydrate_cache` set the fingerprint cache is seeded from
    /// `store.list_all()`, so an engine restarted over a persistent store
    /// only writes what actually changed.
    ///
    /// # Returns
    ///
    /// A tuple of (engine, event_receiver) where event_receiver yields engine events
    pub async fn new(
        store: Arc<dyn TrackerStore>,
        config: EngineConfig,
    ) -> Result<(Self, mpsc::Receiver<EngineEvent>)> {
        config.validate()?;

        let cache = if config.hydrate_cache {
            let stored = store.list_all().await?;
            debug!("Hydrating fingerprint cache from {} stored trackers", stored.len());
            FingerprintCache::hydrate(&stored)
        } else {
            FingerprintCache::new()
        };

        let (tx, rx) = mpsc::channel(config.event_channel_capacity);
        let (state, _) = watch::channel(EngineState::Constructed);

        let engine = Self {
            core: Arc::new(EngineCore {
                store,
                cache: Mutex::new(cache),
                event_tx: tx,
            }),
            control: Mutex::new(Control::default()),
            state: Arc::new(state),
        };

        Ok((engine, rx))
    }

    /// Add a source
    ///
    /// Fails with `Error::Validation` if the name is empty, the interval is
    /// zero, the engine is running, or the name is already registered.
    pub async fn register_source(&self, source: Box<dyn TrackerSource>) -> Result<()> {
        let name = source.name().to_string();
        let interval = source.poll_interval();

        if name.is_empty() {
            return Err(Error::validation("source name is empty"));
        }
        if interval.is_zero() {
            return Err(Error::validation(format!(
                "source {}: poll interval must be positive",
                name
            )));
        }

        let mut control = self.control.lock().await;

        if self.state() == EngineState::Running {
            return Err(Error::validation(format!(
                "cannot register source {} while update is running",
                name
            )));
        }
        if control.sources.contains_key(&name) {
            return Err(Error::validation(format!("source {} already registered", name)));
        }

        info!("Adding source {} (poll interval {:?})", name, interval);
        self.core.cache.lock().await.ensure_partition(&name);
        control.sources.insert(
            name.clone(),
            RegisteredSource {
                adapter: Arc::from(source),
                interval,
                cycle: Arc::new(Mutex::new(())),
            },
        );
        drop(control);

        self.core.emit(EngineEvent::SourceRegistered { source: name });
        Ok(())
    }

    /// Start polling every registered source
    ///
    /// Fails with `Error::InvalidState` if already running. An engine with no
    /// sources starts and immediately reports `Stopped`.
    pub async fn start_update(&self) -> Result<()> {
        self.start(None).await
    }

    /// Start polling, stopping again once `parent` turns `true`
    ///
    /// Equivalent to calling [`TrackerEngine::stop_update`] when the token
    /// is set. A token whose sender is dropped never fires.
    pub async fn start_update_until(&self, parent: watch::Receiver<bool>) -> Result<()> {
        self.start(Some(parent)).await
    }

    async fn start(&self, parent: Option<watch::Receiver<bool>>) -> Result<()> {
        let mut control = self.control.lock().await;

        if self.state() == EngineState::Running {
            return Err(Error::invalid_state("tracker update is already running"));
        }

        info!("Trackers update started ({} sources)", control.sources.len());
        self.state.send_replace(EngineState::Running);
        self.core.emit(EngineEvent::Started {
            sources_count: control.sources.len(),
        });

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let shutdown_tx = Arc::new(shutdown_tx);
        let pollers: Vec<_> = control
            .sources
            .values()
            .map(|source| {
                tokio::spawn(poll_source(
                    Arc::clone(&self.core),
                    source.clone(),
                    shutdown_rx.clone(),
                ))
            })
            .collect();
        drop(shutdown_rx);

        if let Some(mut parent) = parent {
            let relay = Arc::clone(&shutdown_tx);
            tokio::spawn(async move {
                tokio::select! {
                    _ = parent_cancelled(&mut parent) => {
                        info!("Trackers update cancelled by caller");
                        let _ = relay.send(true);
                    }
                    // Every poller has exited
                    _ = relay.closed() => {}
                }
            });
        }
        control.shutdown = Some(shutdown_tx);

        let core = Arc::clone(&self.core);
        let state = Arc::clone(&self.state);
        tokio::spawn(async move {
            for poller in pollers {
                if let Err(e) = poller.await {
                    error!("Source poller terminated abnormally: {}", e);
                }
            }

            if let Err(e) = core.store.flush().await {
                warn!("Failed to flush store after stop: {}", e);
            }

            state.send_replace(EngineState::Stopped);
            core.emit(EngineEvent::Stopped);
            info!("Trackers update stopped");
        });

        Ok(())
    }

    /// Signal every poller to stop
    ///
    /// Does not wait for them. Safe to call in any state; calling it when
    /// nothing is running is a no-op.
    pub async fn stop_update(&self) {
        let shutdown = self.control.lock().await.shutdown.take();
        match shutdown {
            Some(tx) => {
                info!("Trackers update stopping");
                // Pollers hold receivers until they exit; a send error just
                // means they are all gone already.
                let _ = tx.send(true);
            }
            None => debug!("Stop requested but tracker update is not running"),
        }
    }

    /// Wait until no pollers are running
    ///
    /// Returns immediately if the engine is not running.
    pub async fn wait_stopped(&self) {
        let mut rx = self.state.subscribe();
        // The sender is owned by `self`, so the channel cannot close here.
        let _ = rx.wait_for(|state| *state != EngineState::Running).await;
    }

    /// Stop polling and wait up to `timeout` for the pollers to drain
    pub async fn shutdown(&self, timeout: Duration) -> Result<()> {
        self.stop_update().await;
        tokio::time::timeout(timeout, self.wait_stopped())
            .await
            .map_err(|_| Error::Other(format!("pollers did not stop within {:?}", timeout)))
    }

    /// Current lifecycle state
    pub fn state(&self) -> EngineState {
        *self.state.borrow()
    }

    /// Whether pollers are active
    pub fn is_running(&self) -> bool {
        self.state() == EngineState::Running
    }

    /// Fetch and reconcile one source now
    ///
    /// Serialized with the source's poller, if any. Unlike background
    /// cycles, failures are returned to the caller (they are also logged
    /// and emitted as events).
    ///
    /// A sync issued while update is running belongs to that run: stopping
    /// it abandons the sync with `Error::InvalidState` as long as the sync
    /// is still waiting for its turn or fetching.
    pub async fn sync_source(&self, source: &str) -> Result<CycleReport> {
        if source.is_empty() {
            return Err(Error::invalid_input("source string is empty"));
        }

        let (registered, stop) = {
            let control = self.control.lock().await;
            let registered = control
                .sources
                .get(source)
                .cloned()
                .ok_or_else(|| Error::not_found(format!("source {} is not registered", source)))?;
            let stop = match &control.shutdown {
                Some(tx) if self.is_running() => Some(tx.subscribe()),
                _ => None,
            };
            (registered, stop)
        };

        let fetch = async {
            let cycle = registered.cycle.lock().await;
            (cycle, registered.adapter.fetch().await)
        };
        let (_cycle, fetched) = match stop {
            Some(mut stop) => tokio::select! {
                biased;
                _ = cancelled(&mut stop) => {
                    info!("Sync of {} abandoned, tracker update stopped", source);
                    return Err(Error::invalid_state(format!(
                        "tracker update stopped while syncing {}",
                        source
                    )));
                }
                done = fetch => done,
            },
            None => fetch.await,
        };
        self.core.run_cycle(&registered, fetched).await
    }

    /// Names of the registered sources, sorted
    pub async fn sources(&self) -> Result<Vec<String>> {
        let control = self.control.lock().await;
        if control.sources.is_empty() {
            return Err(Error::not_found("no sources"));
        }
        Ok(control.sources.keys().cloned().collect())
    }

    /// Origin ids stored for one source
    pub async fn ids_by_source(&self, source: &str) -> Result<Vec<String>> {
        if source.is_empty() {
            return Err(Error::invalid_input("source string is empty"));
        }
        self.core.store.list_ids_by_source(source).await
    }

    /// Every stored tracker
    pub async fn list(&self) -> Result<Vec<Tracker>> {
        let trackers = self.core.store.list_all().await?;
        if trackers.is_empty() {
            return Err(Error::not_found("no trackers stored"));
        }
        Ok(trackers)
    }

    /// Trackers inserted or updated at or after `since`
    pub async fn list_since(&self, since: chrono::DateTime<chrono::Utc>) -> Result<Vec<Tracker>> {
        let trackers: Vec<Tracker> = self
            .core
            .store
            .list_since(since)
            .await?
            .into_iter()
            .map(|stored| stored.tracker)
            .collect();
        if trackers.is_empty() {
            return Err(Error::not_found(format!("no trackers modified since {}", since)));
        }
        Ok(trackers)
    }

    /// Identities currently cached for a source, sorted
    pub async fn cached_ids(&self, source: &str) -> Vec<TrackerId> {
        let mut ids: Vec<TrackerId> = self
            .core
            .cache
            .lock()
            .await
            .snapshot(source)
            .into_keys()
            .collect();
        ids.sort();
        ids
    }
}

impl EngineCore {
    /// Reconcile a fetch result and report the outcome
    async fn run_cycle(
        &self,
        source: &RegisteredSource,
        fetched: Result<Vec<Tracker>>,
    ) -> Result<CycleReport> {
        let name = source.name();

        let snapshot = match fetched {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!("Fetch \"{}\" failed: {}", name, e);
                self.emit(EngineEvent::FetchFailed {
                    source: name.to_string(),
                    error: e.to_string(),
                });
                return Err(e);
            }
        };

        debug!("Updating source {} ({} trackers)", name, snapshot.len());
        match reconcile::reconcile(self.store.as_ref(), &self.cache, name, &snapshot).await {
            Ok(report) => {
                info!(
                    "Source {} reconciled: {} inserted, {} updated, {} deleted, {} unchanged",
                    name, report.inserted, report.updated, report.deleted, report.unchanged
                );
                self.flush(name).await;
                self.emit(EngineEvent::CycleCompleted {
                    source: name.to_string(),
                    report,
                });
                Ok(report)
            }
            Err(e @ Error::EmptySnapshot(_)) => {
                warn!("{}; keeping stored trackers", e);
                self.emit(EngineEvent::CycleSkipped {
                    source: name.to_string(),
                    reason: e.to_string(),
                });
                Err(e)
            }
            Err(e @ Error::Fetch { .. }) => {
                warn!("Rejected snapshot: {}", e);
                self.emit(EngineEvent::FetchFailed {
                    source: name.to_string(),
                    error: e.to_string(),
                });
                Err(e)
            }
            Err(e) => {
                error!("Update \"{}\" failed: {}", name, e);
                self.flush(name).await;
                self.emit(EngineEvent::CycleAborted {
                    source: name.to_string(),
                    error: e.to_string(),
                });
                Err(e)
            }
        }
    }

    /// Persist whatever a cycle managed to write
    async fn flush(&self, source: &str) {
        if let Err(e) = self.store.flush().await {
            warn!("Failed to flush store after cycle for {}: {}", source, e);
        }
    }

    /// Emit an engine event
    fn emit(&self, event: EngineEvent) {
        if self.event_tx.try_send(event).is_err() {
            warn!(
                "Event channel full, dropping event. Consider increasing event_channel_capacity."
            );
        }
    }
}

/// Poll one source until shutdown is signalled
///
/// Each iteration takes the source's cycle lock, fetches, reconciles, then
/// waits for the next tick. Stop is observed while queued for the lock,
/// while fetching and while waiting; a cycle past its fetch always runs to
/// completion.
async fn poll_source(
    core: Arc<EngineCore>,
    source: RegisteredSource,
    mut shutdown: watch::Receiver<bool>,
) {
    info!("Fetcher \"{}\" started, update interval {:?}", source.name(), source.interval);

    let mut ticker = tokio::time::interval(source.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately.
    ticker.tick().await;

    loop {
        {
            let _cycle = tokio::select! {
                biased;
                _ = cancelled(&mut shutdown) => break,
                cycle = source.cycle.lock() => cycle,
            };
            let fetched = tokio::select! {
                biased;
                _ = cancelled(&mut shutdown) => break,
                fetched = source.adapter.fetch() => fetched,
            };
            // Outcome is logged and emitted by run_cycle; the loop carries on regardless.
            let _ = core.run_cycle(&source, fetched).await;
        }

        tokio::select! {
            biased;
            _ = cancelled(&mut shutdown) => break,
            _ = ticker.tick() => {}
        }
    }

    info!("Fetcher \"{}\" stopped", source.name());
}

/// Resolves once shutdown is signalled or the engine is dropped
async fn cancelled(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}

/// Resolves once a caller's token is set; a dropped token never fires
async fn parent_cancelled(parent: &mut watch::Receiver<bool>) {
    if parent.wait_for(|stop| *stop).await.is_err() {
        std::future::pending::<()>().await;
    }
}
