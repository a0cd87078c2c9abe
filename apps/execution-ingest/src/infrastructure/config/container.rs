//! Dependency Injection Container
//!
//! Builds every pipeline component from configuration and wires them to
//! the supplied adapters.

use std::sync::Arc;
use std::time::Duration;

use metrics_exporter_prometheus::PrometheusHandle;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::application::ports::{EventStreamPort, PoolStatsPort};
use crate::application::services::{
    AdaptiveBatchSizer, BulkPersistenceService, ExecutionPublisher, ResourceMonitor,
};
use crate::application::use_cases::IngestBatchUseCase;
use crate::config::Config;
use crate::domain::execution::ExecutionRepository;
use crate::infrastructure::http::AppState;
use crate::resilience::CircuitBreaker;

/// Name of the breaker guarding the event stream.
pub const EVENT_STREAM_BREAKER: &str = "event-stream";

/// Dependency injection container.
///
/// Holds the shared components. The use case and HTTP state are created
/// from them on demand.
pub struct Container<R>
where
    R: ExecutionRepository + 'static,
{
    config: Config,
    repository: Arc<R>,
    monitor: Arc<ResourceMonitor>,
    sizer: Arc<AdaptiveBatchSizer>,
    breaker: Arc<CircuitBreaker>,
    publisher: Arc<ExecutionPublisher>,
}

impl<R> Container<R>
where
    R: ExecutionRepository + 'static,
{
    /// Create a new container with all dependencies.
    ///
    /// `dead_letter` may be the same client as `stream`.
    pub fn new(
        config: Config,
        repository: Arc<R>,
        pool_stats: Arc<dyn PoolStatsPort>,
        stream: Arc<dyn EventStreamPort>,
        dead_letter: Arc<dyn EventStreamPort>,
    ) -> Self {
        let monitor = Arc::new(ResourceMonitor::new(
            pool_stats,
            config.persistence.monitor_interval(),
        ));
        let sizer = Arc::new(AdaptiveBatchSizer::new(
            config.batch.to_sizing_config(),
            Some(Arc::clone(&monitor)),
        ));
        let breaker = Arc::new(CircuitBreaker::new(
            EVENT_STREAM_BREAKER,
            config.circuit_breaker.to_resilience_config(),
        ));
        let publisher = Arc::new(ExecutionPublisher::new(
            stream,
            dead_letter,
            Arc::clone(&breaker),
            config.publisher.to_settings(),
        ));

        Self {
            config,
            repository,
            monitor,
            sizer,
            breaker,
            publisher,
        }
    }

    /// Configuration the container was built from.
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Get the execution repository.
    pub fn repository(&self) -> Arc<R> {
        Arc::clone(&self.repository)
    }

    /// Get the resource monitor.
    pub fn monitor(&self) -> Arc<ResourceMonitor> {
        Arc::clone(&self.monitor)
    }

    /// Get the adaptive batch sizer.
    pub fn sizer(&self) -> Arc<AdaptiveBatchSizer> {
        Arc::clone(&self.sizer)
    }

    /// Get the circuit breaker.
    pub fn circuit_breaker(&self) -> Arc<CircuitBreaker> {
        Arc::clone(&self.breaker)
    }

    /// Get the publisher.
    pub fn publisher(&self) -> Arc<ExecutionPublisher> {
        Arc::clone(&self.publisher)
    }

    /// Create an `IngestBatchUseCase`.
    pub fn ingest_use_case(&self) -> IngestBatchUseCase<R> {
        IngestBatchUseCase::new(
            Arc::clone(&self.sizer),
            BulkPersistenceService::new(
                Arc::clone(&self.repository),
                self.config.persistence.to_settings(),
            ),
            Arc::clone(&self.publisher),
            self.config.batch.max_items_per_request,
        )
    }

    /// Create the HTTP application state.
    pub fn app_state(&self, metrics: Option<PrometheusHandle>, version: &str) -> AppState<R> {
        AppState {
            ingest: Arc::new(self.ingest_use_case()),
            publisher: Arc::clone(&self.publisher),
            sizer: Arc::clone(&self.sizer),
            metrics,
            version: version.to_string(),
        }
    }

    /// Start background tasks. They stop when `shutdown` is cancelled.
    pub fn start_background(&self, shutdown: CancellationToken) -> JoinHandle<()> {
        self.monitor.start(shutdown)
    }

    /// Drain in-flight publications.
    pub async fn shutdown(&self, timeout: Duration) -> bool {
        self.publisher.shutdown(timeout).await
    }
}
