// # trackerd - Tracker Reconciliation Daemon
//
// The daemon is a thin integration layer. All reconciliation logic lives in
// tracker-core; this binary is responsible for:
// 1. Reading configuration from environment variables
// 2. Initializing logging and the runtime
// 3. Registering sources and stores
// 4. Running the engine until SIGTERM/SIGINT
//
// ## Configuration
//
// All configuration is done via environment variables:
//
// ### Store
// - `TRACKERD_STORE_TYPE`: Type of store (memory, file). Default: memory
// - `TRACKERD_STORE_PATH`: Path to the JSON file (for file store)
//
// ### armaqi source
// - `TRACKERD_ARMAQI_URL`: Station list URL
// - `TRACKERD_POLL_INTERVAL_SECS`: Poll interval in seconds. Default: 600
// - `TRACKERD_HTTP_TIMEOUT_SECS`: HTTP request timeout in seconds. Default: 10
//
// ### Engine
// - `TRACKERD_SHUTDOWN_TIMEOUT_SECS`: Max wait for pollers on shutdown. Default: 30
// - `TRACKERD_LOG_LEVEL`: trace, debug, info, warn, error. Default: info
//
// ## Example
//
// ```bash
// export TRACKERD_STORE_TYPE=file
// export TRACKERD_STORE_PATH=/var/lib/trackerd/trackers.json
// export TRACKERD_POLL_INTERVAL_SECS=300
//
// trackerd
// ```

use anyhow::{Context, Result};
use std::env;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

use tracker_core::config::{DEFAULT_ARMAQI_NAME, DEFAULT_ARMAQI_URL};
use tracker_core::{
    ComponentRegistry, EngineConfig, EngineEvent, SourceConfig, StoreConfig, TrackerConfig,
    TrackerEngine,
};

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy)]
enum TrackerdExitCode {
    /// Clean shutdown (normal exit)
    CleanShutdown = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error (unexpected failure)
    RuntimeError = 2,
}

impl From<TrackerdExitCode> for ExitCode {
    fn from(code: TrackerdExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Application configuration
struct Config {
    store_type: String,
    store_path: Option<String>,
    armaqi_url: String,
    poll_interval_secs: u64,
    http_timeout_secs: u64,
    shutdown_timeout_secs: u64,
    log_level: String,
}

impl Config {
    /// Load configuration from environment variables
    fn from_env() -> Result<Self> {
        Ok(Self {
            store_type: env::var("TRACKERD_STORE_TYPE").unwrap_or_else(|_| "memory".to_string()),
            store_path: env::var("TRACKERD_STORE_PATH").ok(),
            armaqi_url: env::var("TRACKERD_ARMAQI_URL")
                .unwrap_or_else(|_| DEFAULT_ARMAQI_URL.to_string()),
            poll_interval_secs: env_secs("TRACKERD_POLL_INTERVAL_SECS", 600)?,
            http_timeout_secs: env_secs("TRACKERD_HTTP_TIMEOUT_SECS", 10)?,
            shutdown_timeout_secs: env_secs("TRACKERD_SHUTDOWN_TIMEOUT_SECS", 30)?,
            log_level: env::var("TRACKERD_LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        })
    }

    /// Validate the daemon-specific settings
    ///
    /// Store, source and engine settings are validated by
    /// `TrackerConfig::validate` once assembled.
    fn validate(&self) -> Result<()> {
        match self.store_type.as_str() {
            "file" | "memory" => {}
            _ => anyhow::bail!(
                "TRACKERD_STORE_TYPE '{}' is not supported. \
                Supported types: file, memory",
                self.store_type
            ),
        }

        if self.store_type == "file" {
            match self.store_path.as_deref() {
                None | Some("") => anyhow::bail!(
                    "TRACKERD_STORE_PATH is required when TRACKERD_STORE_TYPE=file. \
                    Set it via: export TRACKERD_STORE_PATH=/var/lib/trackerd/trackers.json"
                ),
                Some(path) => {
                    if let Some(parent) = std::path::Path::new(path).parent()
                        && !parent.as_os_str().is_empty()
                        && !parent.exists()
                    {
                        anyhow::bail!(
                            "TRACKERD_STORE_PATH parent directory does not exist: {}",
                            parent.display()
                        );
                    }
                }
            }
        }

        if !self.armaqi_url.starts_with("https://") && !self.armaqi_url.starts_with("http://") {
            anyhow::bail!(
                "TRACKERD_ARMAQI_URL must use HTTP or HTTPS scheme. Got: {}",
                self.armaqi_url
            );
        }

        parse_level(&self.log_level)?;
        Ok(())
    }

    /// Assemble the library configuration
    fn tracker_config(&self) -> TrackerConfig {
        let store = match (self.store_type.as_str(), &self.store_path) {
            ("file", Some(path)) => StoreConfig::File { path: path.clone() },
            _ => StoreConfig::Memory,
        };

        TrackerConfig {
            store,
            sources: vec![SourceConfig::Armaqi {
                name: DEFAULT_ARMAQI_NAME.to_string(),
                url: self.armaqi_url.clone(),
                interval_secs: self.poll_interval_secs,
                timeout_secs: self.http_timeout_secs,
            }],
            engine: EngineConfig {
                shutdown_timeout_secs: self.shutdown_timeout_secs,
                ..EngineConfig::default()
            },
        }
    }
}

/// Read a seconds value, falling back to `default` when unset
fn env_secs(name: &str, default: u64) -> Result<u64> {
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .with_context(|| format!("{} must be a whole number of seconds. Got: {}", name, value)),
        Err(_) => Ok(default),
    }
}

fn parse_level(level: &str) -> Result<Level> {
    match level.to_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        _ => anyhow::bail!(
            "TRACKERD_LOG_LEVEL '{}' is not valid. \
            Valid levels: trace, debug, info, warn, error",
            level
        ),
    }
}

fn main() -> ExitCode {
    // Load configuration from environment
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            return TrackerdExitCode::ConfigError.into();
        }
    };

    if let Err(e) = config.validate() {
        eprintln!("Configuration validation error: {}", e);
        return TrackerdExitCode::ConfigError.into();
    }

    let tracker_config = config.tracker_config();
    if let Err(e) = tracker_config.validate() {
        eprintln!("Configuration validation error: {}", e);
        return TrackerdExitCode::ConfigError.into();
    }

    // Initialize tracing
    let log_level = parse_level(&config.log_level).unwrap_or(Level::INFO);
    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return TrackerdExitCode::ConfigError.into();
    }

    info!("Starting trackerd");
    info!(
        "Configuration loaded: {} store, {} source(s)",
        tracker_config.store.type_name(),
        tracker_config.sources.len()
    );

    // Enter tokio runtime
    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return TrackerdExitCode::RuntimeError.into();
        }
    };

    let result = rt.block_on(async {
        if let Err(e) = run_daemon(tracker_config).await {
            error!("Daemon error: {:#}", e);
            TrackerdExitCode::RuntimeError
        } else {
            TrackerdExitCode::CleanShutdown
        }
    });

    result.into()
}

/// Run the daemon
async fn run_daemon(config: TrackerConfig) -> Result<()> {
    let registry = ComponentRegistry::new();
    registry.register_builtin_stores();

    #[cfg(feature = "armaqi")]
    {
        info!("Registering armaqi source");
        tracker_source_armaqi::register(&registry);
    }

    #[cfg(not(feature = "armaqi"))]
    warn!("Built without the armaqi feature; no source types are available");

    let store = registry
        .create_store(&config.store)
        .await
        .context("Failed to create store")?;

    let (engine, mut events) = TrackerEngine::new(Arc::clone(&store), config.engine.clone())
        .await
        .context("Failed to create engine")?;

    for source_config in &config.sources {
        let source = registry
            .create_source(source_config)
            .with_context(|| format!("Failed to create source {}", source_config.name()))?;
        engine.register_source(source).await?;
    }

    // Keep the event channel drained; tracing already covers the details
    let event_logger = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                EngineEvent::CycleAborted { source, error } => {
                    warn!("Cycle for {} aborted: {}", source, error)
                }
                other => debug!("Engine event: {:?}", other),
            }
        }
    });

    engine.start_update().await?;
    info!("Tracker update running");

    let signal = wait_for_shutdown().await?;
    info!("Received shutdown signal: {}", signal);

    let timeout = config.engine.shutdown_timeout();
    if let Err(e) = engine.shutdown(timeout).await {
        warn!("Engine did not stop cleanly: {}", e);
    }

    drop(engine);
    event_logger.abort();

    store.flush().await.context("Failed to flush store")?;
    info!("Store flushed, trackerd stopped");

    Ok(())
}

/// Wait for shutdown signals (SIGTERM, SIGINT)
///
/// # Returns
///
/// Returns the name of the signal received.
#[cfg(unix)]
async fn wait_for_shutdown() -> Result<&'static str> {
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGINT handler: {}", e))?;

    Ok(tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    })
}

/// Wait for shutdown signals (SIGINT only)
///
/// Fallback implementation for non-Unix platforms.
#[cfg(not(unix))]
async fn wait_for_shutdown() -> Result<&'static str> {
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to wait for CTRL-C: {}", e))?;
    Ok("SIGINT")
}
