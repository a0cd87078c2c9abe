//! Persistence configuration: connection pool and insert retries.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::application::services::PersistenceSettings;
use crate::infrastructure::persistence::ConnectionPoolConfig;
use crate::resilience::RetryPolicy;

/// Persistence configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Connections kept open when idle.
    #[serde(default = "default_pool_min_size")]
    pub pool_min_size: usize,
    /// Maximum concurrent connections.
    #[serde(default = "default_pool_max_size")]
    pub pool_max_size: usize,
    /// Seconds between pool statistics snapshots.
    #[serde(default = "default_monitor_interval")]
    pub monitor_interval_secs: u64,
    /// Attempts per record in the per-item fallback.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Delay before the first per-item retry.
    #[serde(default = "default_initial_retry_delay")]
    pub initial_retry_delay_ms: u64,
    /// Upper bound for a per-item retry delay.
    #[serde(default = "default_max_retry_delay")]
    pub max_retry_delay_ms: u64,
    /// Exponential growth factor between retries.
    #[serde(default = "default_retry_multiplier")]
    pub retry_multiplier: f64,
    /// Symmetric jitter applied to retry delays.
    #[serde(default = "default_jitter_factor")]
    pub jitter_factor: f64,
    /// Deadline for any single store call, including connection acquisition.
    #[serde(default = "default_call_timeout")]
    pub call_timeout_ms: u64,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            pool_min_size: default_pool_min_size(),
            pool_max_size: default_pool_max_size(),
            monitor_interval_secs: default_monitor_interval(),
            max_retries: default_max_retries(),
            initial_retry_delay_ms: default_initial_retry_delay(),
            max_retry_delay_ms: default_max_retry_delay(),
            retry_multiplier: default_retry_multiplier(),
            jitter_factor: default_jitter_factor(),
            call_timeout_ms: default_call_timeout(),
        }
    }
}

impl PersistenceConfig {
    /// Convert to the persistence service's runtime settings.
    #[must_use]
    pub const fn to_settings(&self) -> PersistenceSettings {
        PersistenceSettings {
            retry: RetryPolicy::new(
                self.max_retries,
                Duration::from_millis(self.initial_retry_delay_ms),
                Duration::from_millis(self.max_retry_delay_ms),
                self.retry_multiplier,
                self.jitter_factor,
            ),
            call_timeout: Duration::from_millis(self.call_timeout_ms),
        }
    }

    /// Convert to connection-pool settings.
    #[must_use]
    pub const fn to_pool_config(&self) -> ConnectionPoolConfig {
        ConnectionPoolConfig {
            min_size: self.pool_min_size,
            max_size: self.pool_max_size,
            acquire_timeout: Duration::from_millis(self.call_timeout_ms),
        }
    }

    /// Interval between pool statistics snapshots.
    #[must_use]
    pub const fn monitor_interval(&self) -> Duration {
        Duration::from_secs(self.monitor_interval_secs)
    }
}

const fn default_pool_min_size() -> usize {
    5
}

const fn default_pool_max_size() -> usize {
    20
}

const fn default_monitor_interval() -> u64 {
    5
}

const fn default_max_retries() -> u32 {
    3
}

const fn default_initial_retry_delay() -> u64 {
    100
}

const fn default_max_retry_delay() -> u64 {
    2000
}

const fn default_retry_multiplier() -> f64 {
    2.0
}

const fn default_jitter_factor() -> f64 {
    0.25
}

const fn default_call_timeout() -> u64 {
    5000
}
