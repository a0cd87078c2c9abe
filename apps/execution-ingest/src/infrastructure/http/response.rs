//! HTTP response DTOs.

use serde::{Deserialize, Serialize};

use crate::resilience::CircuitBreakerState;

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// Service status.
    pub status: String,
    /// Service version.
    pub version: String,
    /// Event-stream circuit breaker state.
    pub circuit_breaker: CircuitBreakerState,
}
