//! Event publication configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::server::default_true;
use crate::application::services::PublisherConfig as PublisherSettings;
use crate::resilience::RetryPolicy;

/// Event publication configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublisherConfig {
    /// Destination for execution events.
    #[serde(default = "default_topic")]
    pub topic: String,
    /// Destination for dead-letter envelopes.
    #[serde(default = "default_dead_letter_topic")]
    pub dead_letter_topic: String,
    /// Emit a dead-letter envelope when publication fails.
    #[serde(default = "default_true")]
    pub dead_letter_enabled: bool,
    /// Send attempts per record, including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Delay before the first retry.
    #[serde(default = "default_initial_delay")]
    pub initial_delay_ms: u64,
    /// Upper bound for a retry delay.
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,
    /// Exponential growth factor between retries.
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    /// Concurrent sends.
    #[serde(default = "default_worker_pool_size")]
    pub worker_pool_size: usize,
    /// Deadline for a single send.
    #[serde(default = "default_send_timeout")]
    pub send_timeout_ms: u64,
    /// Event-stream REST proxy base URL. Unset keeps events in memory.
    #[serde(default)]
    pub broker_url: Option<String>,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            topic: default_topic(),
            dead_letter_topic: default_dead_letter_topic(),
            dead_letter_enabled: true,
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay(),
            max_delay_ms: default_max_delay(),
            multiplier: default_multiplier(),
            worker_pool_size: default_worker_pool_size(),
            send_timeout_ms: default_send_timeout(),
            broker_url: None,
        }
    }
}

impl PublisherConfig {
    /// Convert to the publisher's runtime settings.
    #[must_use]
    pub fn to_settings(&self) -> PublisherSettings {
        PublisherSettings {
            topic: self.topic.clone(),
            dead_letter_topic: self.dead_letter_topic.clone(),
            dead_letter_enabled: self.dead_letter_enabled,
            retry: RetryPolicy::new(
                self.max_attempts,
                Duration::from_millis(self.initial_delay_ms),
                Duration::from_millis(self.max_delay_ms),
                self.multiplier,
                0.0,
            ),
            worker_pool_size: self.worker_pool_size,
            send_timeout: Duration::from_millis(self.send_timeout_ms),
        }
    }

    /// Deadline for a single send.
    #[must_use]
    pub const fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }
}

fn default_topic() -> String {
    "executions".to_string()
}

fn default_dead_letter_topic() -> String {
    "executions.dlq".to_string()
}

const fn default_max_attempts() -> u32 {
    3
}

const fn default_initial_delay() -> u64 {
    1000
}

const fn default_max_delay() -> u64 {
    10_000
}

const fn default_multiplier() -> f64 {
    2.0
}

const fn default_worker_pool_size() -> usize {
    8
}

const fn default_send_timeout() -> u64 {
    5000
}
