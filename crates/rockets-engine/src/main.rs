//! Engine binary for the rocket telemetry service.
//!
//! Wires the `PostgreSQL` stores to the dispatcher and runs it until the
//! process is asked to stop.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `rockets-config.yaml` (or `ROCKETS_CONFIG`)
//! 2. Initialize structured logging (tracing)
//! 3. Connect to `PostgreSQL`, run migrations, and check it answers
//! 4. Build the stores and the dispatcher
//! 5. Start the dispatcher
//! 6. Wait for SIGINT or SIGTERM
//! 7. Stop the dispatcher within the shutdown timeout
//! 8. Close the pool

mod error;

use std::path::PathBuf;
use std::sync::Arc;

use rockets_core::config::{EngineConfig, LogFormat, LoggingConfig};
use rockets_core::dispatcher::{Dispatcher, DispatcherConfig};
use rockets_db::{EventRecordStore, PostgresConfig, PostgresPool, RocketStore};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::error::EngineError;

/// Config file used when `ROCKETS_CONFIG` is unset.
const DEFAULT_CONFIG_PATH: &str = "rockets-config.yaml";

/// Application entry point for the engine.
///
/// # Errors
///
/// Returns an error if configuration, the database, or signal handling
/// fails.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Load configuration.
    let config_path = config_path(|var| std::env::var(var).ok());
    let config = load_config(&config_path)?;

    // 2. Initialize structured logging.
    init_logging(&config.logging);
    info!(
        config_path = %config_path.display(),
        workers = config.polling.worker_count,
        batch_size = config.polling.batch_size,
        interval_ms = config.polling.interval_ms,
        reclaim_after_secs = config.polling.reclaim_after_secs,
        "rockets-engine starting"
    );

    // 3. Connect to PostgreSQL.
    let pool = PostgresPool::connect(
        &PostgresConfig::new(&config.database.url)
            .with_max_connections(config.database.max_connections)
            .with_connect_timeout(config.database.connect_timeout())
            .with_idle_timeout(config.database.idle_timeout()),
    )
    .await
    .map_err(EngineError::from)?;
    pool.run_migrations().await.map_err(EngineError::from)?;
    pool.ping().await.map_err(EngineError::from)?;
    info!("Database ready");

    // 4. Build the engine.
    let events: Arc<dyn EventRecordStore> = Arc::new(pool.event_store());
    let rockets: Arc<dyn RocketStore> = Arc::new(pool.rocket_store());
    let dispatcher = Dispatcher::new(events, rockets, DispatcherConfig::from(&config.polling))
        .map_err(EngineError::from)?;

    // 5. Start processing.
    dispatcher.start().await;

    // 6. Run until asked to stop.
    wait_for_shutdown().await.map_err(EngineError::from)?;
    info!("Shutdown requested");

    // 7. Drain workers within the timeout.
    let timeout = config.shutdown.timeout();
    if tokio::time::timeout(timeout, dispatcher.stop()).await.is_err() {
        warn!(?timeout, "Dispatcher did not stop in time; records in flight will be reclaimed");
    }

    // 8. Release connections.
    pool.close().await;
    info!("rockets-engine stopped");
    Ok(())
}

/// Resolve the configuration file path.
fn config_path<F>(lookup: F) -> PathBuf
where
    F: Fn(&str) -> Option<String>,
{
    lookup("ROCKETS_CONFIG").map_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH), PathBuf::from)
}

/// Load configuration from `path`, or from defaults and the environment
/// when the file does not exist.
fn load_config(path: &std::path::Path) -> Result<EngineConfig, EngineError> {
    if path.exists() {
        Ok(EngineConfig::from_file(path)?)
    } else {
        Ok(EngineConfig::parse("")?)
    }
}

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins over the configured level.
fn init_logging(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&logging.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    match logging.format {
        LogFormat::Text => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .init(),
    }
}

/// Resolve when the process receives SIGINT or SIGTERM.
#[cfg(unix)]
async fn wait_for_shutdown() -> std::io::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result,
        _ = terminate.recv() => Ok(()),
    }
}

/// Resolve when the process receives Ctrl-C.
#[cfg(not(unix))]
async fn wait_for_shutdown() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}
