//! Retry policies with exponential backoff.
//!
//! Two consumers share this module: per-record persistence retries (with
//! jitter, transient errors only) and per-record publish retries
//! (deterministic delays).
//!
//! # Example
//!
//! ```rust,ignore
//! use execution_ingest::resilience::{RetryPolicy, ExponentialBackoffCalculator};
//! use std::time::Duration;
//!
//! let policy = RetryPolicy::new(3, Duration::from_millis(1000), Duration::from_secs(10), 2.0, 0.0);
//! let mut backoff = ExponentialBackoffCalculator::new(&policy);
//!
//! assert_eq!(backoff.next_backoff(), Some(Duration::from_millis(1000)));
//! assert_eq!(backoff.next_backoff(), Some(Duration::from_millis(2000)));
//! assert_eq!(backoff.next_backoff(), None);
//! ```

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Retry policy configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first (default: 3).
    pub max_attempts: u32,
    /// Delay before the first retry (default: 100ms).
    pub initial_backoff: Duration,
    /// Upper bound for any single delay (default: 5s).
    pub max_backoff: Duration,
    /// Backoff multiplier for exponential growth (default: 2.0).
    pub backoff_multiplier: f64,
    /// Jitter factor for randomization (default: 0.25 = ±25%).
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(5),
            backoff_multiplier: 2.0,
            jitter_factor: 0.25,
        }
    }
}

impl RetryPolicy {
    /// Create a new retry policy with custom settings.
    #[must_use]
    pub const fn new(
        max_attempts: u32,
        initial_backoff: Duration,
        max_backoff: Duration,
        backoff_multiplier: f64,
        jitter_factor: f64,
    ) -> Self {
        Self {
            max_attempts,
            initial_backoff,
            max_backoff,
            backoff_multiplier,
            jitter_factor,
        }
    }

    /// Delay before retry number `retry` (1-based), without jitter:
    /// `min(initial × multiplier^(retry-1), max)`.
    #[must_use]
    pub fn base_delay(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(i32::MAX as u32) as i32;
        let multiplier = self.backoff_multiplier.powi(exponent);
        let max_ms = self.max_backoff.as_millis() as f64;
        let delay_ms = (self.initial_backoff.as_millis() as f64 * multiplier).min(max_ms);
        Duration::from_millis(delay_ms.max(0.0) as u64)
    }

    /// Delay before retry number `retry` with ±`jitter_factor` applied.
    #[must_use]
    pub fn jittered_delay(&self, retry: u32) -> Duration {
        apply_jitter(self.base_delay(retry), self.jitter_factor)
    }
}

/// Hands out the delays for one operation's retries, then `None`.
#[derive(Debug)]
pub struct ExponentialBackoffCalculator {
    policy: RetryPolicy,
    retries: u32,
}

impl ExponentialBackoffCalculator {
    /// Create a new backoff calculator from a retry policy.
    #[must_use]
    pub fn new(policy: &RetryPolicy) -> Self {
        Self {
            policy: policy.clone(),
            retries: 0,
        }
    }

    /// Get the next backoff duration with jitter.
    ///
    /// Returns `None` once `max_attempts - 1` retries have been handed out.
    pub fn next_backoff(&mut self) -> Option<Duration> {
        if !self.has_remaining_attempts() {
            return None;
        }
        self.retries += 1;
        Some(self.policy.jittered_delay(self.retries))
    }

    /// Check if more retries are available.
    #[must_use]
    pub const fn has_remaining_attempts(&self) -> bool {
        self.retries + 1 < self.policy.max_attempts
    }
}

/// Apply symmetric jitter: random value in `[d × (1 - j), d × (1 + j)]`.
fn apply_jitter(delay: Duration, jitter_factor: f64) -> Duration {
    if jitter_factor <= 0.0 || delay.is_zero() {
        return delay;
    }
    let base_ms = delay.as_millis() as f64;
    let range = base_ms * jitter_factor.min(1.0);
    let min = (base_ms - range).max(0.0);
    let max = base_ms + range;

    let mut rng = rand::rng();
    let jittered = rng.random_range(min..=max);
    Duration::from_millis(jittered as u64)
}

/// Terminal state returned by `run_with_retry`.
#[derive(Debug)]
pub struct RetryTerminal<E> {
    /// The last error observed.
    pub error: E,
    /// Attempts made, including the first.
    pub attempts: u32,
    /// True when the error was retryable but attempts ran out.
    pub exhausted_retryable: bool,
}

/// Run an async operation under `policy`, retrying only errors the caller
/// classifies as retryable. Delays are jittered.
///
/// `on_retry` is invoked with the failed attempt number and its error
/// before each sleep.
pub async fn run_with_retry<T, E, F, Fut, R, N>(
    policy: &RetryPolicy,
    mut op: F,
    mut is_retryable: R,
    mut on_retry: N,
) -> Result<(T, u32), RetryTerminal<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    R: FnMut(&E) -> bool,
    N: FnMut(u32, &E, Duration),
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match op(attempt).await {
            Ok(value) => return Ok((value, attempt)),
            Err(error) => {
                let retryable = is_retryable(&error);
                if !retryable || attempt >= max_attempts {
                    return Err(RetryTerminal {
                        error,
                        attempts: attempt,
                        exhausted_retryable: retryable,
                    });
                }
                let delay = policy.jittered_delay(attempt);
                on_retry(attempt, &error, delay);
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                attempt += 1;
            }
        }
    }
}
