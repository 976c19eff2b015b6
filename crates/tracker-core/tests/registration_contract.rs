//! Contract Test: Source Registration
//!
//! Constraints verified:
//! - Empty names, zero intervals and duplicate names are rejected
//! - Well-formed unique registrations succeed
//! - Registration is refused while the engine is running and allowed again
//!   once it has stopped
//! - `sources()` reports exactly the registered names

mod common;

use std::time::Duration;

use common::*;
use tracker_core::engine::EngineEvent;
use tracker_core::{Error, ErrorCode};

#[tokio::test]
async fn empty_name_rejected() {
    let (engine, _rx) = engine_with(&CountingStore::new()).await;

    let err = engine
        .register_source(ScriptedSource::new("", IDLE_INTERVAL).boxed())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Validation(_)));
    assert!(matches!(engine.sources().await, Err(Error::NotFound(_))));
}

#[tokio::test]
async fn zero_interval_rejected() {
    let (engine, _rx) = engine_with(&CountingStore::new()).await;

    let err = engine
        .register_source(ScriptedSource::new("armaqi", Duration::ZERO).boxed())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Validation(_)));
}

#[tokio::test]
async fn duplicate_name_rejected() {
    let (engine, _rx) = engine_with(&CountingStore::new()).await;

    engine
        .register_source(ScriptedSource::new("armaqi", IDLE_INTERVAL).boxed())
        .await
        .unwrap();
    let err = engine
        .register_source(ScriptedSource::new("armaqi", Duration::from_secs(5)).boxed())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Validation(_)));
    assert_eq!(engine.sources().await.unwrap(), vec!["armaqi"]);
}

#[tokio::test]
async fn unique_registrations_listed_sorted() {
    let (engine, mut rx) = engine_with(&CountingStore::new()).await;

    for name in ["source2", "armaqi", "source1"] {
        engine
            .register_source(ScriptedSource::new(name, IDLE_INTERVAL).boxed())
            .await
            .unwrap();
    }

    assert_eq!(
        engine.sources().await.unwrap(),
        vec!["armaqi", "source1", "source2"]
    );
    assert_eq!(
        drain_events(&mut rx),
        vec![
            EngineEvent::SourceRegistered { source: "source2".into() },
            EngineEvent::SourceRegistered { source: "armaqi".into() },
            EngineEvent::SourceRegistered { source: "source1".into() },
        ]
    );
}

#[tokio::test]
async fn no_sources_is_not_found() {
    let (engine, _rx) = engine_with(&CountingStore::new()).await;

    let err = engine.sources().await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::NotFound);
}

#[tokio::test]
async fn registration_refused_while_running() {
    let (engine, _rx) = engine_with(&CountingStore::new()).await;
    engine
        .register_source(ScriptedSource::with_stations("source1", &[("1", "a")]).boxed())
        .await
        .unwrap();

    engine.start_update().await.unwrap();
    let err = engine
        .register_source(ScriptedSource::new("source2", IDLE_INTERVAL).boxed())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));

    engine.shutdown(TEST_TIMEOUT).await.unwrap();

    engine
        .register_source(ScriptedSource::new("source2", IDLE_INTERVAL).boxed())
        .await
        .unwrap();
    assert_eq!(engine.sources().await.unwrap(), vec!["source1", "source2"]);
}
