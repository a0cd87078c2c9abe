//! Execution Ingest Binary
//!
//! Starts the batch ingestion service.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin execution-ingest
//! ```
//!
//! # Environment Variables
//!
//! - `INGEST_CONFIG`: Path to the YAML config file (default: config.yaml,
//!   falling back to built-in defaults when absent)
//! - `RUST_LOG`: Log filter (overrides `observability.logging.level`)
//! - `OTEL_ENABLED`: Export spans over OTLP when `true`
//!
//! Any `${VAR}` referenced from the config file is read from the
//! environment, after `.env` has been loaded.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use execution_ingest::application::ports::EventStreamPort;
use execution_ingest::config::{CONFIG_PATH_ENV, Config, load_config};
use execution_ingest::infrastructure::config::Container;
use execution_ingest::infrastructure::http::create_router;
use execution_ingest::infrastructure::messaging::{HttpEventStreamClient, InMemoryEventStream};
use execution_ingest::infrastructure::persistence::{ConnectionPool, InMemoryExecutionStore};
use execution_ingest::observability::{MetricsConfig, init_metrics};
use execution_ingest::telemetry::init_telemetry;
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Config file read when `INGEST_CONFIG` is unset.
const DEFAULT_CONFIG_PATH: &str = "config.yaml";

/// Concrete container type.
type IngestContainer = Container<InMemoryExecutionStore>;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv();

    let config = read_config()?;

    let _telemetry = init_telemetry(&config.observability.logging);

    tracing::info!("Starting Execution Ingest");
    log_config(&config);

    let metrics = create_metrics(&config);
    let shutdown_timeout = Duration::from_secs(config.server.shutdown_timeout_secs);
    let container = create_container(config)?;

    let shutdown_token = CancellationToken::new();
    let monitor_handle = container.start_background(shutdown_token.clone());

    let http_handle = start_http_server(&container, metrics, shutdown_token.clone()).await?;

    tracing::info!("Execution ingest ready");

    await_shutdown(http_handle, monitor_handle, &container, shutdown_token, shutdown_timeout).await;

    tracing::info!("Execution ingest stopped");
    Ok(())
}

/// Load .env file from current or ancestor directories.
fn load_dotenv() {
    if dotenvy::dotenv().is_err() {
        load_dotenv_from_ancestors();
    }
}

/// Read the config file named by `INGEST_CONFIG`, else `config.yaml` when
/// present, else built-in defaults.
fn read_config() -> anyhow::Result<Config> {
    match std::env::var(CONFIG_PATH_ENV) {
        Ok(path) => load_config(Some(&path))
            .with_context(|| format!("failed to load configuration from {path}")),
        Err(_) if Path::new(DEFAULT_CONFIG_PATH).exists() => {
            load_config(None).context("failed to load configuration")
        }
        Err(_) => Ok(Config::default()),
    }
}

/// Log the loaded configuration.
fn log_config(config: &Config) {
    tracing::info!(
        http_port = config.server.http_port,
        max_items_per_request = config.batch.max_items_per_request,
        bulk_chunk_size = config.batch.bulk_chunk_size,
        adaptive_enabled = config.batch.adaptive.enabled,
        pool_max_size = config.persistence.pool_max_size,
        topic = %config.publisher.topic,
        dead_letter_enabled = config.publisher.dead_letter_enabled,
        failure_threshold = config.circuit_breaker.failure_threshold,
        "Configuration loaded"
    );
}

/// Install the Prometheus recorder when metrics are enabled.
fn create_metrics(config: &Config) -> Option<PrometheusHandle> {
    if !config.server.metrics_enabled {
        return None;
    }
    match init_metrics(&MetricsConfig::default()) {
        Ok(handle) => Some(handle),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to install metrics recorder, continuing without it");
            None
        }
    }
}

/// Create the event stream client.
///
/// Without a broker URL, events are kept in memory.
fn create_event_stream(config: &Config) -> anyhow::Result<Arc<dyn EventStreamPort>> {
    match config
        .publisher
        .broker_url
        .as_ref()
        .filter(|url| !url.trim().is_empty())
    {
        Some(url) => {
            let client = HttpEventStreamClient::new(url.clone(), config.publisher.send_timeout())
                .context("failed to create event stream client")?;
            tracing::info!(broker_url = %url, "HttpEventStreamClient initialized");
            Ok(Arc::new(client))
        }
        None => {
            tracing::warn!("No publisher.broker_url configured, publishing to in-memory stream");
            Ok(Arc::new(InMemoryEventStream::new()))
        }
    }
}

/// Create the store, pool, publisher, and the rest of the pipeline.
fn create_container(config: Config) -> anyhow::Result<IngestContainer> {
    let pool = Arc::new(ConnectionPool::new(config.persistence.to_pool_config()));
    let store = Arc::new(InMemoryExecutionStore::new(Arc::clone(&pool)));
    let stream = create_event_stream(&config)?;

    tracing::info!(
        pool_min_size = config.persistence.pool_min_size,
        pool_max_size = config.persistence.pool_max_size,
        "InMemoryExecutionStore initialized"
    );

    Ok(Container::new(
        config,
        store,
        pool,
        Arc::clone(&stream),
        stream,
    ))
}

/// Start the HTTP server with graceful shutdown support.
async fn start_http_server(
    container: &IngestContainer,
    metrics: Option<PrometheusHandle>,
    shutdown: CancellationToken,
) -> anyhow::Result<JoinHandle<()>> {
    let server = &container.config().server;
    let app = create_router(container.app_state(metrics, env!("CARGO_PKG_VERSION")));

    let http_addr: SocketAddr = format!("{}:{}", server.bind_address, server.http_port)
        .parse()
        .context("invalid server bind address")?;

    tracing::info!(%http_addr, "HTTP server starting");
    tracing::info!("Endpoints:");
    tracing::info!("  GET  /health");
    tracing::info!("  GET  /metrics");
    tracing::info!("  POST /api/v1/executions/batch");
    tracing::info!("  GET  /api/v1/executions/batch/stats");
    tracing::info!("  GET  /api/v1/executions/publisher/stats");

    let listener = TcpListener::bind(http_addr)
        .await
        .with_context(|| format!("failed to bind {http_addr}"))?;
    let http_server = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal(shutdown));

    let handle = tokio::spawn(async move {
        if let Err(e) = http_server.await {
            tracing::error!("HTTP server error: {e}");
        }
    });

    Ok(handle)
}

/// Wait for the server to stop, then stop background work and drain
/// in-flight publications.
async fn await_shutdown(
    http_handle: JoinHandle<()>,
    monitor_handle: JoinHandle<()>,
    container: &IngestContainer,
    shutdown_token: CancellationToken,
    timeout: Duration,
) {
    if http_handle.await.is_err() {
        tracing::error!("HTTP server task panicked");
    }
    tracing::info!("HTTP server stopped");

    shutdown_token.cancel();
    if monitor_handle.await.is_err() {
        tracing::error!("Resource monitor task panicked");
    }

    if !container.shutdown(timeout).await {
        tracing::warn!("Some publications were still in flight at shutdown");
    }
}

/// Load .env file from current directory or any ancestor directory.
fn load_dotenv_from_ancestors() {
    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
///
/// # Panics
///
/// Panics if signal handlers cannot be installed. Startup fails fast rather
/// than running a process that ignores termination signals.
#[allow(clippy::expect_used)]
async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
        () = shutdown.cancelled() => {}
    }

    tracing::info!("Graceful shutdown started");
}
