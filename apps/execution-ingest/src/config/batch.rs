//! Batch intake and adaptive sizing configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::server::default_true;
use crate::application::services::AdaptiveSizingConfig;

/// Batch configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Maximum items accepted in one request.
    #[serde(default = "default_max_items_per_request")]
    pub max_items_per_request: usize,
    /// Chunk size used when adaptive sizing is disabled.
    #[serde(default = "default_bulk_chunk_size")]
    pub bulk_chunk_size: usize,
    /// Adaptive sizing settings.
    #[serde(default)]
    pub adaptive: AdaptiveBatchConfig,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_items_per_request: default_max_items_per_request(),
            bulk_chunk_size: default_bulk_chunk_size(),
            adaptive: AdaptiveBatchConfig::default(),
        }
    }
}

/// Adaptive chunk sizing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdaptiveBatchConfig {
    /// Enable adaptive sizing.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Smallest chunk size.
    #[serde(default = "default_min_size")]
    pub min_size: usize,
    /// Largest chunk size.
    #[serde(default = "default_max_size")]
    pub max_size: usize,
    /// Seconds between size re-evaluations.
    #[serde(default = "default_optimization_interval")]
    pub optimization_interval_secs: u64,
    /// Pool utilization that triggers an aggressive shrink.
    #[serde(default = "default_critical_utilization")]
    pub critical_utilization: f64,
    /// Pool utilization that triggers a moderate shrink.
    #[serde(default = "default_high_utilization")]
    pub high_utilization: f64,
    /// Pool utilization below which the size may grow.
    #[serde(default = "default_low_utilization")]
    pub low_utilization: f64,
    /// Waiting callers above which the size shrinks.
    #[serde(default = "default_max_threads_waiting")]
    pub max_threads_waiting: usize,
    /// Chunk duration above which the size shrinks.
    #[serde(default = "default_slow_batch_threshold")]
    pub slow_batch_threshold_ms: u64,
}

impl Default for AdaptiveBatchConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_size: default_min_size(),
            max_size: default_max_size(),
            optimization_interval_secs: default_optimization_interval(),
            critical_utilization: default_critical_utilization(),
            high_utilization: default_high_utilization(),
            low_utilization: default_low_utilization(),
            max_threads_waiting: default_max_threads_waiting(),
            slow_batch_threshold_ms: default_slow_batch_threshold(),
        }
    }
}

impl BatchConfig {
    /// Convert to the sizer's runtime settings.
    #[must_use]
    pub const fn to_sizing_config(&self) -> AdaptiveSizingConfig {
        AdaptiveSizingConfig {
            enabled: self.adaptive.enabled,
            fixed_chunk_size: self.bulk_chunk_size,
            min_size: self.adaptive.min_size,
            max_size: self.adaptive.max_size,
            optimization_interval: Duration::from_secs(self.adaptive.optimization_interval_secs),
            critical_utilization: self.adaptive.critical_utilization,
            high_utilization: self.adaptive.high_utilization,
            low_utilization: self.adaptive.low_utilization,
            max_threads_waiting: self.adaptive.max_threads_waiting,
            slow_batch_threshold: Duration::from_millis(self.adaptive.slow_batch_threshold_ms),
        }
    }
}

const fn default_max_items_per_request() -> usize {
    100
}

const fn default_bulk_chunk_size() -> usize {
    500
}

const fn default_min_size() -> usize {
    50
}

const fn default_max_size() -> usize {
    1000
}

const fn default_optimization_interval() -> u64 {
    30
}

const fn default_critical_utilization() -> f64 {
    0.95
}

const fn default_high_utilization() -> f64 {
    0.80
}

const fn default_low_utilization() -> f64 {
    0.5
}

const fn default_max_threads_waiting() -> usize {
    2
}

const fn default_slow_batch_threshold() -> u64 {
    5000
}
