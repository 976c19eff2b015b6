//! Test doubles and common utilities for engine contract tests
//!
//! The doubles count every port call so tests can assert on exactly which
//! storage writes a cycle issued.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::{Notify, mpsc};
use tracker_core::engine::EngineEvent;
use tracker_core::error::{Error, Result};
use tracker_core::model::{StoredTracker, Tracker, TrackerId};
use tracker_core::store::MemoryTrackerStore;
use tracker_core::{EngineConfig, TrackerEngine, TrackerSource, TrackerStore};

/// Upper bound on waiting for anything asynchronous in a test
pub const TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Interval long enough that only the immediate first cycle runs
pub const IDLE_INTERVAL: Duration = Duration::from_secs(3600);

/// A memory store that counts calls and can be told to fail writes
///
/// Clones share counters and records.
#[derive(Clone, Default)]
pub struct CountingStore {
    inner: MemoryTrackerStore,
    inserts: Arc<AtomicUsize>,
    updates: Arc<AtomicUsize>,
    deletes: Arc<AtomicUsize>,
    flushes: Arc<AtomicUsize>,
    fail_writes: Arc<AtomicBool>,
    write_budget: Arc<std::sync::Mutex<Option<usize>>>,
}

impl CountingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated with trackers; the seeding is not counted
    pub fn with_trackers(trackers: impl IntoIterator<Item = Tracker>) -> Self {
        Self {
            inner: MemoryTrackerStore::with_trackers(trackers),
            ..Self::default()
        }
    }

    pub fn inserts(&self) -> usize {
        self.inserts.load(Ordering::SeqCst)
    }

    pub fn updates(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }

    pub fn deletes(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }

    pub fn flushes(&self) -> usize {
        self.flushes.load(Ordering::SeqCst)
    }

    /// Total insert, update and delete calls
    pub fn writes(&self) -> usize {
        self.inserts() + self.updates() + self.deletes()
    }

    /// Make every subsequent write fail with a store error
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Allow `n` more successful writes, then fail; `None` lifts the limit
    pub fn set_write_budget(&self, n: Option<usize>) {
        *self.write_budget.lock().unwrap() = n;
    }

    /// Stored identities, sorted
    pub async fn ids(&self) -> Vec<TrackerId> {
        let mut ids: Vec<TrackerId> = self
            .inner
            .list_all()
            .await
            .unwrap()
            .iter()
            .map(Tracker::id)
            .collect();
        ids.sort();
        ids
    }

    pub async fn get(&self, id: &TrackerId) -> Option<Tracker> {
        self.inner.get(id).await.map(|stored| stored.tracker)
    }

    fn check_writable(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::store("injected write failure"));
        }
        let mut budget = self.write_budget.lock().unwrap();
        match *budget {
            Some(0) => Err(Error::store("write budget exhausted")),
            Some(n) => {
                *budget = Some(n - 1);
                Ok(())
            }
            None => Ok(()),
        }
    }
}

#[async_trait::async_trait]
impl TrackerStore for CountingStore {
    async fn insert(&self, tracker: &Tracker) -> Result<()> {
        self.inserts.fetch_add(1, Ordering::SeqCst);
        self.check_writable()?;
        self.inner.insert(tracker).await
    }

    async fn update(&self, tracker: &Tracker) -> Result<()> {
        self.updates.fetch_add(1, Ordering::SeqCst);
        self.check_writable()?;
        self.inner.update(tracker).await
    }

    async fn delete(&self, id: &TrackerId) -> Result<()> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        self.check_writable()?;
        self.inner.delete(id).await
    }

    async fn list_all(&self) -> Result<Vec<Tracker>> {
        self.inner.list_all().await
    }

    async fn list_since(&self, since: chrono::DateTime<chrono::Utc>) -> Result<Vec<StoredTracker>> {
        self.inner.list_since(since).await
    }

    async fn list_sources(&self) -> Result<Vec<String>> {
        self.inner.list_sources().await
    }

    async fn list_ids_by_source(&self, source: &str) -> Result<Vec<String>> {
        self.inner.list_ids_by_source(source).await
    }

    async fn flush(&self) -> Result<()> {
        self.flushes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// A source whose snapshot and failure mode are set by the test
///
/// Clones share state, so a test keeps one clone as a handle after handing
/// the other to the engine.
#[derive(Clone)]
pub struct ScriptedSource {
    name: String,
    interval: Duration,
    snapshot: Arc<std::sync::Mutex<Vec<Tracker>>>,
    fail: Arc<AtomicBool>,
    hang: Arc<AtomicBool>,
    fetches: Arc<AtomicUsize>,
    /// Notified whenever a fetch starts hanging
    pub entered: Arc<Notify>,
}

impl ScriptedSource {
    pub fn new(name: &str, interval: Duration) -> Self {
        Self {
            name: name.to_string(),
            interval,
            snapshot: Arc::new(std::sync::Mutex::new(Vec::new())),
            fail: Arc::new(AtomicBool::new(false)),
            hang: Arc::new(AtomicBool::new(false)),
            fetches: Arc::new(AtomicUsize::new(0)),
            entered: Arc::new(Notify::new()),
        }
    }

    /// Source that reports `stations` as `(origin_id, description)` pairs
    pub fn with_stations(name: &str, stations: &[(&str, &str)]) -> Self {
        let source = Self::new(name, IDLE_INTERVAL);
        source.set_stations(stations);
        source
    }

    pub fn set_snapshot(&self, trackers: Vec<Tracker>) {
        *self.snapshot.lock().unwrap() = trackers;
    }

    pub fn set_stations(&self, stations: &[(&str, &str)]) {
        self.set_snapshot(
            stations
                .iter()
                .map(|(id, description)| station(&self.name, id, description))
                .collect(),
        );
    }

    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Make every subsequent fetch hang until the caller gives up on it
    pub fn set_hang(&self, hang: bool) {
        self.hang.store(hang, Ordering::SeqCst);
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn boxed(&self) -> Box<dyn TrackerSource> {
        Box::new(self.clone())
    }
}

#[async_trait::async_trait]
impl TrackerSource for ScriptedSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn poll_interval(&self) -> Duration {
        self.interval
    }

    async fn fetch(&self) -> Result<Vec<Tracker>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.hang.load(Ordering::SeqCst) {
            self.entered.notify_one();
            return std::future::pending::<Result<Vec<Tracker>>>().await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::fetch(&self.name, "feed unreachable"));
        }
        Ok(self.snapshot.lock().unwrap().clone())
    }
}

/// A source whose fetch never completes
pub struct HangingSource {
    name: String,
    pub entered: Arc<Notify>,
}

impl HangingSource {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            entered: Arc::new(Notify::new()),
        }
    }
}

#[async_trait::async_trait]
impl TrackerSource for HangingSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn poll_interval(&self) -> Duration {
        IDLE_INTERVAL
    }

    async fn fetch(&self) -> Result<Vec<Tracker>> {
        self.entered.notify_one();
        std::future::pending::<Result<Vec<Tracker>>>().await
    }
}

/// Tracker with fixed coordinates
pub fn station(source: &str, origin_id: &str, description: &str) -> Tracker {
    Tracker::new(origin_id, source, description, 40.18, 44.51)
}

/// Engine over `store` with default settings
pub async fn engine_with(store: &CountingStore) -> (TrackerEngine, mpsc::Receiver<EngineEvent>) {
    TrackerEngine::new(Arc::new(store.clone()), EngineConfig::default())
        .await
        .expect("engine construction succeeds")
}

/// Wait for the first event matching `pred`, skipping others
pub async fn wait_for_event(
    rx: &mut mpsc::Receiver<EngineEvent>,
    pred: impl Fn(&EngineEvent) -> bool,
) -> EngineEvent {
    tokio::time::timeout(TEST_TIMEOUT, async {
        loop {
            let event = rx.recv().await.expect("event channel open");
            if pred(&event) {
                return event;
            }
        }
    })
    .await
    .expect("event arrives in time")
}

/// Drain events that are already queued
pub fn drain_events(rx: &mut mpsc::Receiver<EngineEvent>) -> Vec<EngineEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
