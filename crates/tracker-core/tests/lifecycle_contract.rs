//! Contract Test: Polling Lifecycle & Shutdown
//!
//! Constraints verified:
//! - Start polls every source immediately and then on its own interval
//! - Stop is observed even while a fetch is hanging
//! - All pollers exit, the store is flushed and the engine reports Stopped
//! - Stop is safe in any state; double start is rejected; restart works
//! - A failing source neither stops its own loop nor affects other sources
//! - A hanging source does not hold up cycles of other sources
//! - Stop reaches pollers queued behind a manual sync, and abandons a
//!   sync that is still fetching
//! - A caller-owned token stops the run like `stop_update`
//!
//! If this test fails, someone has added:
//! - Detached background tasks
//! - Tasks that ignore cancellation
//! - Error paths that kill a poller

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::*;
use tokio::sync::watch;
use tracker_core::engine::{EngineEvent, EngineState};
use tracker_core::{Error, TrackerId};

fn completed_for(source: &'static str) -> impl Fn(&EngineEvent) -> bool {
    move |event: &EngineEvent| {
        matches!(event, EngineEvent::CycleCompleted { source: s, .. } if s == source)
    }
}

#[tokio::test]
async fn start_runs_first_cycle_immediately() {
    let store = CountingStore::new();
    let (engine, mut rx) = engine_with(&store).await;
    engine
        .register_source(ScriptedSource::with_stations("armaqi", &[("1", "a"), ("2", "b")]).boxed())
        .await
        .unwrap();

    engine.start_update().await.unwrap();
    assert!(engine.is_running());

    let event = wait_for_event(&mut rx, completed_for("armaqi")).await;
    match event {
        EngineEvent::CycleCompleted { report, .. } => assert_eq!(report.inserted, 2),
        other => panic!("unexpected event {:?}", other),
    }
    assert_eq!(store.inserts(), 2);

    engine.shutdown(TEST_TIMEOUT).await.unwrap();
}

#[tokio::test]
async fn stop_drains_pollers_and_flushes() {
    let store = CountingStore::new();
    let (engine, mut rx) = engine_with(&store).await;
    engine
        .register_source(ScriptedSource::with_stations("source1", &[("1", "a")]).boxed())
        .await
        .unwrap();
    engine
        .register_source(ScriptedSource::with_stations("source2", &[("1", "b")]).boxed())
        .await
        .unwrap();

    engine.start_update().await.unwrap();
    wait_for_event(&mut rx, completed_for("source1")).await;
    wait_for_event(&mut rx, completed_for("source2")).await;
    let flushes = store.flushes();

    engine.stop_update().await;
    tokio::time::timeout(TEST_TIMEOUT, engine.wait_stopped())
        .await
        .expect("pollers exit");

    assert_eq!(engine.state(), EngineState::Stopped);
    assert_eq!(store.flushes(), flushes + 1);
    wait_for_event(&mut rx, |e| *e == EngineEvent::Stopped).await;
}

#[tokio::test]
async fn stop_interrupts_hanging_fetch() {
    let store = CountingStore::new();
    let (engine, _rx) = engine_with(&store).await;
    let source = HangingSource::new("slow");
    let entered = Arc::clone(&source.entered);
    engine.register_source(Box::new(source)).await.unwrap();

    engine.start_update().await.unwrap();
    tokio::time::timeout(TEST_TIMEOUT, entered.notified())
        .await
        .expect("fetch started");

    engine.shutdown(TEST_TIMEOUT).await.unwrap();

    assert_eq!(engine.state(), EngineState::Stopped);
    assert_eq!(store.writes(), 0);
}

#[tokio::test]
async fn stop_before_start_is_safe() {
    let (engine, _rx) = engine_with(&CountingStore::new()).await;

    engine.stop_update().await;
    engine.stop_update().await;
    engine.shutdown(TEST_TIMEOUT).await.unwrap();

    assert_eq!(engine.state(), EngineState::Constructed);
}

#[tokio::test]
async fn stop_twice_is_safe() {
    let (engine, _rx) = engine_with(&CountingStore::new()).await;
    engine
        .register_source(ScriptedSource::with_stations("armaqi", &[("1", "a")]).boxed())
        .await
        .unwrap();

    engine.start_update().await.unwrap();
    engine.stop_update().await;
    engine.stop_update().await;
    engine.wait_stopped().await;
    engine.stop_update().await;

    assert_eq!(engine.state(), EngineState::Stopped);
}

#[tokio::test]
async fn double_start_rejected() {
    let (engine, _rx) = engine_with(&CountingStore::new()).await;
    engine
        .register_source(ScriptedSource::with_stations("armaqi", &[("1", "a")]).boxed())
        .await
        .unwrap();

    engine.start_update().await.unwrap();
    let err = engine.start_update().await.unwrap_err();
    assert!(matches!(err, Error::InvalidState(_)));

    engine.shutdown(TEST_TIMEOUT).await.unwrap();
}

#[tokio::test]
async fn restart_after_stop() {
    let store = CountingStore::new();
    let (engine, mut rx) = engine_with(&store).await;
    let source = ScriptedSource::with_stations("armaqi", &[("1", "a")]);
    engine.register_source(source.boxed()).await.unwrap();

    engine.start_update().await.unwrap();
    wait_for_event(&mut rx, completed_for("armaqi")).await;
    engine.shutdown(TEST_TIMEOUT).await.unwrap();

    source.set_stations(&[("2", "b")]);
    engine.start_update().await.unwrap();
    wait_for_event(&mut rx, completed_for("armaqi")).await;
    engine.shutdown(TEST_TIMEOUT).await.unwrap();

    assert_eq!(source.fetches(), 2);
    assert_eq!(store.ids().await, vec![TrackerId::new("armaqi", "2")]);
}

#[tokio::test]
async fn failing_source_keeps_polling() {
    let store = CountingStore::new();
    let (engine, mut rx) = engine_with(&store).await;
    let source = ScriptedSource::new("flaky", Duration::from_millis(10));
    source.set_fail(true);
    engine.register_source(source.boxed()).await.unwrap();

    engine.start_update().await.unwrap();
    for _ in 0..3 {
        wait_for_event(&mut rx, |e| matches!(e, EngineEvent::FetchFailed { .. })).await;
    }
    assert!(engine.is_running());

    source.set_fail(false);
    source.set_stations(&[("1", "a")]);
    wait_for_event(&mut rx, completed_for("flaky")).await;

    engine.shutdown(TEST_TIMEOUT).await.unwrap();
    assert!(source.fetches() >= 4);
}

#[tokio::test]
async fn sources_are_isolated() {
    let store = CountingStore::new();
    let (engine, mut rx) = engine_with(&store).await;
    let broken = ScriptedSource::with_stations("broken", &[("1", "x")]);
    broken.set_fail(true);
    engine.register_source(broken.boxed()).await.unwrap();
    engine
        .register_source(ScriptedSource::with_stations("healthy", &[("1", "a")]).boxed())
        .await
        .unwrap();

    engine.start_update().await.unwrap();
    wait_for_event(&mut rx, completed_for("healthy")).await;
    engine.shutdown(TEST_TIMEOUT).await.unwrap();

    assert_eq!(store.ids().await, vec![TrackerId::new("healthy", "1")]);
}

#[tokio::test]
async fn sync_serialized_with_poller() {
    let store = CountingStore::new();
    let (engine, mut rx) = engine_with(&store).await;
    let source = ScriptedSource::with_stations("armaqi", &[("1", "a")]);
    engine.register_source(source.boxed()).await.unwrap();

    engine.start_update().await.unwrap();
    let report = engine.sync_source("armaqi").await.unwrap();
    wait_for_event(&mut rx, completed_for("armaqi")).await;
    engine.shutdown(TEST_TIMEOUT).await.unwrap();

    // Whichever cycle ran first inserted; the other saw no change
    assert_eq!(store.inserts(), 1);
    assert!(report.inserted + report.unchanged == 1);
}

#[tokio::test]
async fn empty_engine_starts_and_stops() {
    let (engine, mut rx) = engine_with(&CountingStore::new()).await;

    engine.start_update().await.unwrap();
    engine.wait_stopped().await;

    assert_eq!(engine.state(), EngineState::Stopped);
    wait_for_event(&mut rx, |e| *e == EngineEvent::Stopped).await;
}

#[tokio::test]
async fn hanging_source_does_not_block_others() {
    let store = CountingStore::new();
    let (engine, mut rx) = engine_with(&store).await;
    let slow = HangingSource::new("slow");
    let entered = Arc::clone(&slow.entered);
    engine.register_source(Box::new(slow)).await.unwrap();
    let healthy = ScriptedSource::new("healthy", Duration::from_millis(10));
    healthy.set_stations(&[("1", "a")]);
    engine.register_source(healthy.boxed()).await.unwrap();

    engine.start_update().await.unwrap();
    tokio::time::timeout(TEST_TIMEOUT, entered.notified())
        .await
        .expect("slow fetch started");
    drain_events(&mut rx);

    // The slow fetch never returns, so these all complete while it is pending
    for _ in 0..2 {
        wait_for_event(&mut rx, completed_for("healthy")).await;
    }
    assert!(healthy.fetches() >= 2);

    engine.shutdown(TEST_TIMEOUT).await.unwrap();
    assert_eq!(store.ids().await, vec![TrackerId::new("healthy", "1")]);
}

#[tokio::test]
async fn stop_reaches_poller_queued_behind_sync() {
    let store = CountingStore::new();
    let (engine, _rx) = engine_with(&store).await;
    let engine = Arc::new(engine);
    let source = HangingSource::new("slow");
    let entered = Arc::clone(&source.entered);
    engine.register_source(Box::new(source)).await.unwrap();

    let sync = tokio::spawn({
        let engine = Arc::clone(&engine);
        async move { engine.sync_source("slow").await }
    });
    tokio::time::timeout(TEST_TIMEOUT, entered.notified())
        .await
        .expect("sync fetch started");

    engine.start_update().await.unwrap();
    engine.shutdown(TEST_TIMEOUT).await.unwrap();

    assert_eq!(engine.state(), EngineState::Stopped);
    // Issued before the run, so stopping the run does not abandon it
    assert!(!sync.is_finished());
    sync.abort();
}

#[tokio::test]
async fn stop_abandons_sync_in_flight() {
    let store = CountingStore::new();
    let (engine, mut rx) = engine_with(&store).await;
    let engine = Arc::new(engine);
    let source = ScriptedSource::with_stations("armaqi", &[("1", "a")]);
    engine.register_source(source.boxed()).await.unwrap();

    engine.start_update().await.unwrap();
    wait_for_event(&mut rx, completed_for("armaqi")).await;

    source.set_hang(true);
    let sync = tokio::spawn({
        let engine = Arc::clone(&engine);
        async move { engine.sync_source("armaqi").await }
    });
    tokio::time::timeout(TEST_TIMEOUT, source.entered.notified())
        .await
        .expect("sync fetch started");

    engine.shutdown(TEST_TIMEOUT).await.unwrap();
    let result = tokio::time::timeout(TEST_TIMEOUT, sync)
        .await
        .expect("sync returns")
        .unwrap();

    assert!(matches!(result, Err(Error::InvalidState(_))));
    assert_eq!(store.writes(), 1);
}

#[tokio::test]
async fn caller_token_stops_update() {
    let store = CountingStore::new();
    let (engine, mut rx) = engine_with(&store).await;
    engine
        .register_source(ScriptedSource::with_stations("armaqi", &[("1", "a")]).boxed())
        .await
        .unwrap();
    let (token, parent) = watch::channel(false);

    engine.start_update_until(parent).await.unwrap();
    wait_for_event(&mut rx, completed_for("armaqi")).await;
    token.send(true).unwrap();

    tokio::time::timeout(TEST_TIMEOUT, engine.wait_stopped())
        .await
        .expect("token stops pollers");
    assert_eq!(engine.state(), EngineState::Stopped);
    wait_for_event(&mut rx, |e| *e == EngineEvent::Stopped).await;
}

#[tokio::test]
async fn dropped_caller_token_keeps_running() {
    let (engine, mut rx) = engine_with(&CountingStore::new()).await;
    engine
        .register_source(ScriptedSource::with_stations("armaqi", &[("1", "a")]).boxed())
        .await
        .unwrap();
    let (token, parent) = watch::channel(false);

    engine.start_update_until(parent).await.unwrap();
    drop(token);
    wait_for_event(&mut rx, completed_for("armaqi")).await;
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert!(engine.is_running());
    engine.shutdown(TEST_TIMEOUT).await.unwrap();
}
