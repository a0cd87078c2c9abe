//! Prometheus metrics for the ingestion pipeline.
//!
//! Covers batch outcomes, persistence fallbacks and retries, publication,
//! the circuit breaker, adaptive sizing, and connection-pool pressure.
//! The recorder is installed once per process; `/metrics` renders it.
//!
//! # Example
//!
//! ```ignore
//! use execution_ingest::observability::{init_metrics, MetricsConfig};
//!
//! let handle = init_metrics(&MetricsConfig::default())?;
//! record_batch("success", 0.015);
//! println!("{}", handle.render());
//! ```

use std::sync::OnceLock;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Configuration for the metrics recorder.
#[derive(Debug, Clone)]
pub struct MetricsConfig {
    /// Histogram buckets for latency measurements (in seconds).
    pub latency_buckets: Vec<f64>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            // 1ms to 30s
            latency_buckets: vec![
                0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0,
            ],
        }
    }
}

/// Install the Prometheus recorder and return its render handle.
///
/// Idempotent: later calls return the handle installed by the first.
///
/// # Errors
///
/// Returns an error if the recorder cannot be built or installed.
pub fn init_metrics(config: &MetricsConfig) -> Result<PrometheusHandle, MetricsError> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new()
        .set_buckets(&config.latency_buckets)
        .map_err(|e| MetricsError::Configuration(e.to_string()))?
        .install_recorder()
        .map_err(|e| MetricsError::Installation(e.to_string()))?;

    describe_metrics();
    let handle = PROMETHEUS_HANDLE.get_or_init(|| handle).clone();
    tracing::info!("Prometheus metrics recorder installed");
    Ok(handle)
}

/// Error type for metrics operations.
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    /// Failed to configure metrics recorder.
    #[error("metrics configuration error: {0}")]
    Configuration(String),
    /// Failed to install metrics recorder.
    #[error("metrics installation error: {0}")]
    Installation(String),
}

fn describe_metrics() {
    describe_counter!("ingest_batches_total", "Batches processed, by status");
    describe_counter!("ingest_items_total", "Batch items processed, by outcome");
    describe_histogram!(
        "ingest_batch_duration_seconds",
        "End-to-end batch processing time"
    );
    describe_counter!(
        "ingest_bulk_fallback_total",
        "Chunks that fell back to per-item inserts"
    );
    describe_counter!("ingest_persist_retries_total", "Per-item insert retries");
    describe_counter!("publish_attempts_total", "Event-stream send attempts");
    describe_counter!("publish_success_total", "Records accepted by the event stream");
    describe_counter!(
        "publish_failures_total",
        "Records that failed every publish attempt"
    );
    describe_counter!("publish_retries_total", "Publish retries scheduled");
    describe_counter!(
        "publish_dead_lettered_total",
        "Dead-letter envelopes accepted"
    );
    describe_gauge!(
        "circuit_breaker_state",
        "Circuit breaker state (0=closed, 1=open, 2=half_open)"
    );
    describe_counter!(
        "circuit_breaker_rejected_total",
        "Calls rejected by an open circuit"
    );
    describe_gauge!("adaptive_batch_size", "Current adaptive chunk size");
    describe_gauge!(
        "db_pool_utilization",
        "Active connections divided by pool maximum"
    );
    describe_gauge!(
        "db_pool_threads_waiting",
        "Callers waiting for a pooled connection"
    );
}

// ============================================================================
// Batch Metrics
// ============================================================================

/// Record a processed batch.
///
/// # Arguments
///
/// * `status` - Batch status label (e.g., "success", "partial_success")
/// * `duration_seconds` - End-to-end processing time
pub fn record_batch(status: &str, duration_seconds: f64) {
    counter!("ingest_batches_total", "status" => status.to_string()).increment(1);
    histogram!("ingest_batch_duration_seconds").record(duration_seconds);
}

/// Record item outcomes of one batch.
pub fn record_items(outcome: &str, count: usize) {
    if count == 0 {
        return;
    }
    counter!("ingest_items_total", "outcome" => outcome.to_string()).increment(count as u64);
}

/// Record a chunk that fell back to per-item inserts.
pub fn record_bulk_fallback() {
    counter!("ingest_bulk_fallback_total").increment(1);
}

/// Record a per-item insert retry.
pub fn record_persist_retry() {
    counter!("ingest_persist_retries_total").increment(1);
}

// ============================================================================
// Publish Metrics
// ============================================================================

/// Record a send attempt.
pub fn record_publish_attempt(topic: &str) {
    counter!("publish_attempts_total", "topic" => topic.to_string()).increment(1);
}

/// Record a record accepted by the event stream.
pub fn record_publish_success(topic: &str) {
    counter!("publish_success_total", "topic" => topic.to_string()).increment(1);
}

/// Record a record that failed every attempt.
pub fn record_publish_failure(topic: &str) {
    counter!("publish_failures_total", "topic" => topic.to_string()).increment(1);
}

/// Record a scheduled publish retry.
pub fn record_publish_retry(topic: &str) {
    counter!("publish_retries_total", "topic" => topic.to_string()).increment(1);
}

/// Record an accepted dead-letter envelope.
pub fn record_dead_lettered(topic: &str) {
    counter!("publish_dead_lettered_total", "topic" => topic.to_string()).increment(1);
}

// ============================================================================
// Circuit Breaker Metrics
// ============================================================================

/// Update circuit breaker state gauge.
///
/// # Arguments
///
/// * `name` - Breaker name
/// * `state` - Numeric state (0=closed, 1=open, 2=`half_open`)
pub fn record_circuit_breaker_state(name: &str, state: f64) {
    gauge!("circuit_breaker_state", "name" => name.to_string()).set(state);
}

/// Record a call rejected by the circuit breaker.
pub fn record_circuit_breaker_rejected(name: &str) {
    counter!("circuit_breaker_rejected_total", "name" => name.to_string()).increment(1);
}

// ============================================================================
// Resource Metrics
// ============================================================================

/// Update the adaptive chunk size gauge.
pub fn set_adaptive_batch_size(size: usize) {
    gauge!("adaptive_batch_size").set(size as f64);
}

/// Update connection-pool gauges.
pub fn set_pool_pressure(utilization: f64, threads_waiting: usize) {
    gauge!("db_pool_utilization").set(utilization);
    gauge!("db_pool_threads_waiting").set(threads_waiting as f64);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_buckets_are_sorted() {
        let config = MetricsConfig::default();
        assert!(config.latency_buckets.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_recording_without_recorder_is_noop() {
        record_batch("success", 0.015);
        record_items("persisted", 3);
        record_publish_attempt("executions");
        record_circuit_breaker_state("event-stream", 1.0);
        set_pool_pressure(0.5, 0);
    }
}
