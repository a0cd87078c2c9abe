//! Resilience patterns for calls to the store and the event stream.
//!
//! This module provides the circuit breaker and the retry policies
//! shared by persistence and publication.

mod circuit_breaker;
mod retry;

pub use circuit_breaker::{
    CallPermit, CircuitBreaker, CircuitBreakerConfig, CircuitBreakerMetrics, CircuitBreakerState,
};
pub use retry::{ExponentialBackoffCalculator, RetryPolicy, RetryTerminal, run_with_retry};
