//! Observability module for metrics.
//!
//! This module provides Prometheus instrumentation for the ingestion
//! pipeline. Logging and trace export are set up in `telemetry`.

mod metrics;

pub use self::metrics::{
    MetricsConfig, MetricsError, init_metrics, record_batch, record_bulk_fallback,
    record_circuit_breaker_rejected, record_circuit_breaker_state, record_dead_lettered,
    record_items, record_persist_retry, record_publish_attempt, record_publish_failure,
    record_publish_retry, record_publish_success, set_adaptive_batch_size, set_pool_pressure,
};
