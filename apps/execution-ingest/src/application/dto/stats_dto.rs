//! Operational statistics DTOs

use serde::{Deserialize, Serialize};

use crate::resilience::CircuitBreakerMetrics;

/// Running publisher counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublisherCounters {
    /// Records handed to the publisher.
    pub submitted: u64,
    /// Send attempts.
    pub attempts: u64,
    /// Records accepted by the stream.
    pub published: u64,
    /// Records that failed every attempt.
    pub failed: u64,
    /// Retries scheduled.
    pub retries: u64,
    /// Records rejected by an open circuit.
    pub circuit_rejections: u64,
    /// Dead-letter envelopes accepted.
    pub dead_lettered: u64,
    /// Dead-letter envelopes that could not be sent.
    pub dead_letter_failures: u64,
}

/// Publisher statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublisherStatsDto {
    /// Running counters.
    #[serde(flatten)]
    pub counters: PublisherCounters,
    /// Publications currently running or queued.
    pub in_flight: u64,
    /// Circuit breaker view.
    pub circuit_breaker: CircuitBreakerMetrics,
}

/// Adaptive sizing and pool statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchStatsDto {
    /// Whether adaptive sizing is enabled.
    pub adaptive_enabled: bool,
    /// Chunk size the next batch will use.
    pub current_chunk_size: usize,
    /// Lower bound.
    pub min_size: usize,
    /// Upper bound.
    pub max_size: usize,
    /// Pool utilization at the last snapshot.
    pub pool_utilization: f64,
    /// Waiting callers at the last snapshot.
    pub threads_waiting: usize,
    /// Active connections at the last snapshot.
    pub active_connections: usize,
    /// Size of the most recent chunk.
    pub last_chunk_size: Option<usize>,
    /// Duration of the most recent chunk.
    pub last_chunk_duration_ms: Option<u64>,
}
