//! Circuit breaker guarding calls to the event stream.
//!
//! Lock-free: state and counters live in atomics, and every transition is
//! a compare-and-swap so concurrent callers agree on exactly one winner.
//!
//! # State Machine
//!
//! ```text
//! CLOSED → OPEN (consecutive failures >= threshold)
//! OPEN → HALF_OPEN (recovery timeout elapsed since last failure)
//! HALF_OPEN → CLOSED (trial call succeeds)
//! HALF_OPEN → OPEN (trial call fails)
//! ```
//!
//! While HALF_OPEN exactly one trial call is admitted; all others are
//! rejected until the trial reports its result. Every admitted call holds a
//! `CallPermit` stamped with the breaker generation it was admitted under,
//! and only the trial's permit can move the breaker out of HALF_OPEN. Late
//! results of calls admitted earlier are counted but never decide it.
//!
//! # Example
//!
//! ```rust,ignore
//! use execution_ingest::resilience::{CircuitBreaker, CircuitBreakerConfig};
//!
//! let breaker = CircuitBreaker::new("event-stream", CircuitBreakerConfig::default());
//!
//! if let Some(permit) = breaker.try_acquire() {
//!     match stream.send(topic, key, payload).await {
//!         Ok(()) => breaker.record_success(permit),
//!         Err(_) => breaker.record_failure(permit),
//!     }
//! } else {
//!     // Circuit is open, fail fast
//! }
//! ```

use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::observability;

const CLOSED: u8 = 0;
const OPEN: u8 = 1;
const HALF_OPEN: u8 = 2;

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitBreakerState {
    /// Circuit is closed, calls flow normally.
    Closed,
    /// Circuit is open, calls are rejected.
    Open,
    /// Circuit admits a single trial call.
    HalfOpen,
}

impl CircuitBreakerState {
    const fn from_u8(value: u8) -> Self {
        match value {
            OPEN => Self::Open,
            HALF_OPEN => Self::HalfOpen,
            _ => Self::Closed,
        }
    }

    /// Numeric value exported on the state gauge.
    #[must_use]
    pub const fn gauge_value(&self) -> f64 {
        match self {
            Self::Closed => 0.0,
            Self::Open => 1.0,
            Self::HalfOpen => 2.0,
        }
    }
}

impl std::fmt::Display for CircuitBreakerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "CLOSED"),
            Self::Open => write!(f, "OPEN"),
            Self::HalfOpen => write!(f, "HALF_OPEN"),
        }
    }
}

/// Admission ticket for one call. Report it back exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use = "an admitted call must be reported with record_success or record_failure"]
pub struct CallPermit {
    generation: u64,
    trial: bool,
}

impl CallPermit {
    /// True for the single call admitted while HALF_OPEN.
    #[must_use]
    pub const fn is_trial(&self) -> bool {
        self.trial
    }
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the circuit.
    pub failure_threshold: u32,
    /// Time since the last failure before a trial call is admitted.
    pub recovery_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(30),
        }
    }
}

/// Process-wide circuit breaker.
#[derive(Debug)]
pub struct CircuitBreaker {
    /// Name for logs and metrics.
    name: String,
    config: CircuitBreakerConfig,
    state: AtomicU8,
    consecutive_failures: AtomicU32,
    /// Milliseconds since `origin` of the most recent failure.
    last_failure_ms: AtomicU64,
    trial_in_flight: AtomicBool,
    /// Bumped on every state transition.
    generation: AtomicU64,
    origin: Instant,
    total_calls: AtomicU64,
    total_failures: AtomicU64,
    rejected_calls: AtomicU64,
    state_transitions: AtomicU64,
}

impl CircuitBreaker {
    /// Create a new circuit breaker in the CLOSED state.
    #[must_use]
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        let breaker = Self {
            name: name.into(),
            config,
            state: AtomicU8::new(CLOSED),
            consecutive_failures: AtomicU32::new(0),
            last_failure_ms: AtomicU64::new(0),
            trial_in_flight: AtomicBool::new(false),
            generation: AtomicU64::new(0),
            origin: Instant::now(),
            total_calls: AtomicU64::new(0),
            total_failures: AtomicU64::new(0),
            rejected_calls: AtomicU64::new(0),
            state_transitions: AtomicU64::new(0),
        };
        observability::record_circuit_breaker_state(
            &breaker.name,
            CircuitBreakerState::Closed.gauge_value(),
        );
        breaker
    }

    /// Get the breaker name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the current state.
    #[must_use]
    pub fn state(&self) -> CircuitBreakerState {
        CircuitBreakerState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Admit a call, claiming the trial slot when the recovery timeout has
    /// elapsed. `None` means the call must fail fast.
    pub fn try_acquire(&self) -> Option<CallPermit> {
        let permit = match self.state.load(Ordering::Acquire) {
            CLOSED => Some(CallPermit {
                generation: self.generation.load(Ordering::Acquire),
                trial: false,
            }),
            OPEN if self.recovery_elapsed() => self.try_begin_trial(),
            _ => None,
        };
        if permit.is_none() {
            self.rejected_calls.fetch_add(1, Ordering::Relaxed);
            observability::record_circuit_breaker_rejected(&self.name);
        }
        permit
    }

    /// Record a successful call.
    pub fn record_success(&self, permit: CallPermit) {
        self.total_calls.fetch_add(1, Ordering::Relaxed);
        match self.state.load(Ordering::Acquire) {
            CLOSED => self.consecutive_failures.store(0, Ordering::Release),
            HALF_OPEN if self.is_current_trial(permit) => {
                if self.transition(HALF_OPEN, CLOSED).is_some() {
                    self.consecutive_failures.store(0, Ordering::Release);
                    self.trial_in_flight.store(false, Ordering::Release);
                }
            }
            // Late result of a call admitted under an earlier generation.
            _ => {}
        }
    }

    /// Record a failed call.
    pub fn record_failure(&self, permit: CallPermit) {
        self.total_calls.fetch_add(1, Ordering::Relaxed);
        self.total_failures.fetch_add(1, Ordering::Relaxed);

        let state = self.state.load(Ordering::Acquire);
        if state == HALF_OPEN && !self.is_current_trial(permit) {
            return;
        }
        self.last_failure_ms
            .store(self.elapsed_ms(), Ordering::Release);

        match state {
            CLOSED => {
                let failures = self.consecutive_failures.fetch_add(1, Ordering::AcqRel) + 1;
                if failures >= self.config.failure_threshold
                    && self.transition(CLOSED, OPEN).is_some()
                {
                    tracing::warn!(
                        name = %self.name,
                        consecutive_failures = failures,
                        recovery_timeout_ms = self.config.recovery_timeout.as_millis() as u64,
                        "Circuit breaker opened"
                    );
                }
            }
            HALF_OPEN => {
                if self.transition(HALF_OPEN, OPEN).is_some() {
                    self.trial_in_flight.store(false, Ordering::Release);
                    tracing::warn!(name = %self.name, "Circuit breaker trial call failed, reopening");
                }
            }
            _ => {}
        }
    }

    /// Get metrics for this circuit breaker.
    #[must_use]
    pub fn metrics(&self) -> CircuitBreakerMetrics {
        CircuitBreakerMetrics {
            name: self.name.clone(),
            state: self.state(),
            consecutive_failures: self.consecutive_failures.load(Ordering::Relaxed),
            total_calls: self.total_calls.load(Ordering::Relaxed),
            total_failures: self.total_failures.load(Ordering::Relaxed),
            rejected_calls: self.rejected_calls.load(Ordering::Relaxed),
            state_transitions: self.state_transitions.load(Ordering::Relaxed),
        }
    }

    /// Force the circuit breaker to open (for testing or emergency).
    pub fn force_open(&self) {
        self.last_failure_ms
            .store(self.elapsed_ms(), Ordering::Release);
        let current = self.state.load(Ordering::Acquire);
        if current != OPEN && self.transition(current, OPEN).is_some() {
            self.trial_in_flight.store(false, Ordering::Release);
        }
    }

    /// Force the circuit breaker to close (for testing or recovery).
    pub fn force_close(&self) {
        let current = self.state.load(Ordering::Acquire);
        if current != CLOSED && self.transition(current, CLOSED).is_some() {
            self.consecutive_failures.store(0, Ordering::Release);
            self.trial_in_flight.store(false, Ordering::Release);
        }
    }

    /// Claim the single trial slot and move OPEN → HALF_OPEN.
    fn try_begin_trial(&self) -> Option<CallPermit> {
        if self
            .trial_in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return None;
        }
        if let Some(generation) = self.transition(OPEN, HALF_OPEN) {
            return Some(CallPermit {
                generation,
                trial: true,
            });
        }
        self.trial_in_flight.store(false, Ordering::Release);
        None
    }

    fn is_current_trial(&self, permit: CallPermit) -> bool {
        permit.trial && permit.generation == self.generation.load(Ordering::Acquire)
    }

    /// CAS the state and return the new generation on success.
    fn transition(&self, from: u8, to: u8) -> Option<u64> {
        if self
            .state
            .compare_exchange(from, to, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return None;
        }
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        self.state_transitions.fetch_add(1, Ordering::Relaxed);
        let from = CircuitBreakerState::from_u8(from);
        let to = CircuitBreakerState::from_u8(to);
        observability::record_circuit_breaker_state(&self.name, to.gauge_value());
        tracing::info!(
            name = %self.name,
            from = %from,
            to = %to,
            "Circuit breaker state transition"
        );
        Some(generation)
    }

    fn recovery_elapsed(&self) -> bool {
        let since_failure = self
            .elapsed_ms()
            .saturating_sub(self.last_failure_ms.load(Ordering::Acquire));
        since_failure >= self.config.recovery_timeout.as_millis() as u64
    }

    fn elapsed_ms(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }
}

/// Metrics for a circuit breaker.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CircuitBreakerMetrics {
    /// Breaker name.
    pub name: String,
    /// Current state.
    pub state: CircuitBreakerState,
    /// Failures since the last success.
    pub consecutive_failures: u32,
    /// Calls reported.
    pub total_calls: u64,
    /// Failed calls reported.
    pub total_failures: u64,
    /// Calls rejected without being attempted.
    pub rejected_calls: u64,
    /// Number of state transitions.
    pub state_transitions: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn breaker(threshold: u32, recovery_secs: u64) -> CircuitBreaker {
        CircuitBreaker::new(
            "test",
            CircuitBreakerConfig {
                failure_threshold: threshold,
                recovery_timeout: Duration::from_secs(recovery_secs),
            },
        )
    }

    fn fail_times(breaker: &CircuitBreaker, times: u32) {
        for _ in 0..times {
            let permit = breaker.try_acquire().unwrap();
            breaker.record_failure(permit);
        }
    }

    #[test]
    fn test_initial_state_is_closed() {
        let breaker = breaker(5, 30);
        assert_eq!(breaker.state(), CircuitBreakerState::Closed);
        assert!(breaker.try_acquire().is_some());
    }

    #[test]
    fn test_opens_after_consecutive_failures() {
        let breaker = breaker(5, 30);
        fail_times(&breaker, 4);
        assert_eq!(breaker.state(), CircuitBreakerState::Closed);

        fail_times(&breaker, 1);
        assert_eq!(breaker.state(), CircuitBreakerState::Open);
        assert!(breaker.try_acquire().is_none());
        assert_eq!(breaker.metrics().rejected_calls, 1);
    }

    #[test]
    fn test_success_resets_consecutive_failures() {
        let breaker = breaker(3, 30);
        fail_times(&breaker, 2);
        breaker.record_success(breaker.try_acquire().unwrap());
        fail_times(&breaker, 2);
        assert_eq!(breaker.state(), CircuitBreakerState::Closed);
        assert_eq!(breaker.metrics().consecutive_failures, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_admits_exactly_one_trial() {
        let breaker = breaker(5, 30);
        fail_times(&breaker, 5);
        assert!(breaker.try_acquire().is_none());

        tokio::time::advance(Duration::from_secs(31)).await;

        let trial = breaker.try_acquire().unwrap();
        assert!(trial.is_trial());
        assert_eq!(breaker.state(), CircuitBreakerState::HalfOpen);
        assert!(breaker.try_acquire().is_none());

        breaker.record_success(trial);
        assert_eq!(breaker.state(), CircuitBreakerState::Closed);
        assert!(breaker.try_acquire().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_trial_reopens() {
        let breaker = breaker(1, 10);
        fail_times(&breaker, 1);
        tokio::time::advance(Duration::from_secs(10)).await;

        let trial = breaker.try_acquire().unwrap();
        breaker.record_failure(trial);

        assert_eq!(breaker.state(), CircuitBreakerState::Open);
        assert!(breaker.try_acquire().is_none());

        tokio::time::advance(Duration::from_secs(10)).await;
        assert!(breaker.try_acquire().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovery_measured_from_last_failure() {
        let breaker = breaker(1, 10);
        let early = breaker.try_acquire().unwrap();
        fail_times(&breaker, 1);
        tokio::time::advance(Duration::from_secs(6)).await;
        // Late failure from a call admitted before opening.
        breaker.record_failure(early);
        tokio::time::advance(Duration::from_secs(6)).await;

        assert!(breaker.try_acquire().is_none());
        tokio::time::advance(Duration::from_secs(4)).await;
        assert!(breaker.try_acquire().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_callers_get_single_trial() {
        let breaker = Arc::new(breaker(1, 1));
        fail_times(&breaker, 1);
        tokio::time::advance(Duration::from_secs(2)).await;

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let breaker = Arc::clone(&breaker);
                tokio::spawn(async move { breaker.try_acquire().is_some() })
            })
            .collect();

        let mut admitted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_result_cannot_decide_half_open() {
        let breaker = breaker(5, 60);
        let early = breaker.try_acquire().unwrap();
        let early_failing = breaker.try_acquire().unwrap();
        fail_times(&breaker, 5);
        tokio::time::advance(Duration::from_secs(61)).await;

        let trial = breaker.try_acquire().unwrap();
        assert_eq!(breaker.state(), CircuitBreakerState::HalfOpen);

        breaker.record_success(early);
        assert_eq!(breaker.state(), CircuitBreakerState::HalfOpen);
        assert!(breaker.try_acquire().is_none());

        breaker.record_failure(early_failing);
        assert_eq!(breaker.state(), CircuitBreakerState::HalfOpen);
        assert!(breaker.try_acquire().is_none());

        breaker.record_success(trial);
        assert_eq!(breaker.state(), CircuitBreakerState::Closed);
        assert_eq!(breaker.metrics().total_calls, 8);
    }

    #[tokio::test(start_paused = true)]
    async fn test_trial_from_earlier_generation_is_ignored() {
        let breaker = breaker(1, 10);
        fail_times(&breaker, 1);
        tokio::time::advance(Duration::from_secs(10)).await;
        let stale_trial = breaker.try_acquire().unwrap();

        breaker.force_open();
        tokio::time::advance(Duration::from_secs(10)).await;
        let trial = breaker.try_acquire().unwrap();

        breaker.record_failure(stale_trial);
        assert_eq!(breaker.state(), CircuitBreakerState::HalfOpen);

        breaker.record_success(trial);
        assert_eq!(breaker.state(), CircuitBreakerState::Closed);
    }

    #[test]
    fn test_force_open_and_close() {
        let breaker = breaker(5, 30);
        breaker.force_open();
        assert_eq!(breaker.state(), CircuitBreakerState::Open);
        breaker.force_close();
        assert_eq!(breaker.state(), CircuitBreakerState::Closed);
        assert_eq!(breaker.metrics().state_transitions, 2);
    }

    #[test]
    fn test_state_display_and_serde() {
        assert_eq!(CircuitBreakerState::HalfOpen.to_string(), "HALF_OPEN");
        let json = serde_json::to_string(&CircuitBreakerState::HalfOpen).unwrap();
        assert_eq!(json, "\"HALF_OPEN\"");
    }
}
