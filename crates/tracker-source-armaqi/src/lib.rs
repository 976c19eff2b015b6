// # armaqi Tracker Source
//
// This crate provides a TrackerSource for the armaqi.org air-quality
// station list.
//
// ## Wire Format
//
// `GET <url>` returns
//
// ```json
// { "stations": [ { "id": 76921, "title": "Kentron",
//                   "position": { "lat": 40.182, "lng": 44.516 }, "aqi": 15 } ] }
// ```
//
// Each station becomes one Tracker keyed by its numeric id. Fields the
// engine does not track (`aqi` and friends) are ignored.
//
// ## Architecture
//
// The source is stateless: every fetch downloads and parses the whole list.
// Scheduling, change detection and retries belong to the engine.

use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use tracker_core::config::SourceConfig;
use tracker_core::{ComponentRegistry, Error, Result, Tracker, TrackerSource, TrackerSourceFactory};

/// Registry type name of this source
pub const SOURCE_TYPE: &str = "armaqi";

#[derive(Debug, Deserialize)]
struct StationList {
    stations: Vec<Station>,
}

#[derive(Debug, Deserialize)]
struct Station {
    id: i64,
    title: String,
    position: Position,
}

#[derive(Debug, Deserialize)]
struct Position {
    lat: f64,
    lng: f64,
}

/// Parse an armaqi station list into trackers attributed to `source`
///
/// Pure function; kept separate from the HTTP path so it can be tested
/// without a server.
pub fn parse_stations(body: &str, source: &str) -> Result<Vec<Tracker>> {
    let list: StationList = serde_json::from_str(body)
        .map_err(|e| Error::fetch(source, format!("Failed to parse station list: {}", e)))?;

    Ok(list
        .stations
        .into_iter()
        .map(|station| {
            Tracker::new(
                station.id.to_string(),
                source,
                station.title,
                station.position.lat,
                station.position.lng,
            )
        })
        .collect())
}

/// armaqi.org station list source
pub struct ArmaqiSource {
    name: String,
    url: String,
    poll_interval: Duration,
    client: reqwest::Client,
}

impl ArmaqiSource {
    /// Create a new armaqi source
    ///
    /// # Parameters
    ///
    /// - `name`: Source name; partitions the cache and the store
    /// - `url`: Station list URL
    /// - `poll_interval`: How often the engine fetches
    /// - `timeout`: Upper bound on one HTTP request
    pub fn new(
        name: impl Into<String>,
        url: impl Into<String>,
        poll_interval: Duration,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::http(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            name: name.into(),
            url: url.into(),
            poll_interval,
            client,
        })
    }

    /// Station list URL
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait::async_trait]
impl TrackerSource for ArmaqiSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    async fn fetch(&self) -> Result<Vec<Tracker>> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| Error::fetch(&self.name, format!("HTTP request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::fetch(
                &self.name,
                format!("HTTP error: {}", response.status()),
            ));
        }

        let body = response
            .text()
            .await
            .map_err(|e| Error::fetch(&self.name, format!("Failed to read response: {}", e)))?;

        let trackers = parse_stations(&body, &self.name)?;
        debug!("Fetched {} stations from {}", trackers.len(), self.url);
        Ok(trackers)
    }
}

/// Factory for creating armaqi sources
pub struct ArmaqiFactory;

impl TrackerSourceFactory for ArmaqiFactory {
    fn create(&self, config: &SourceConfig) -> Result<Box<dyn TrackerSource>> {
        match config {
            SourceConfig::Armaqi {
                name,
                url,
                interval_secs,
                timeout_secs,
            } => {
                config.validate()?;
                Ok(Box::new(ArmaqiSource::new(
                    name.clone(),
                    url.clone(),
                    Duration::from_secs(*interval_secs),
                    Duration::from_secs(*timeout_secs),
                )?))
            }
            _ => Err(Error::config("Invalid config for armaqi source")),
        }
    }
}

/// Register the armaqi source with a registry
pub fn register(registry: &ComponentRegistry) {
    registry.register_source_factory(SOURCE_TYPE, Box::new(ArmaqiFactory));
}
