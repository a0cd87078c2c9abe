//! Execution Publisher
//!
//! Hands persisted records to the event stream without blocking the
//! caller. Each record runs in its own task on a bounded worker pool:
//! send, retry on failure with deterministic exponential delays, and
//! route to the dead-letter destination once attempts are exhausted.
//!
//! A single circuit breaker guards every send. While it is open, records
//! are skipped without contacting the stream and go straight to the
//! dead-letter destination, which bypasses the breaker.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;

use crate::application::dto::{
    DeadLetterRecord, ExecutionEvent, PublisherCounters, PublisherStatsDto,
};
use crate::application::ports::{EventStreamPort, StreamSendError};
use crate::domain::batch::{PublishOutcome, PublishStatus};
use crate::domain::execution::PersistedExecution;
use crate::domain::shared::{ExecutionId, Timestamp};
use crate::observability;
use crate::resilience::{CircuitBreaker, ExponentialBackoffCalculator, RetryPolicy};

/// Publisher runtime settings.
#[derive(Debug, Clone)]
pub struct PublisherConfig {
    /// Destination for execution events.
    pub topic: String,
    /// Destination for dead-letter envelopes.
    pub dead_letter_topic: String,
    /// Whether exhausted records are dead-lettered.
    pub dead_letter_enabled: bool,
    /// Attempt ceiling and delays. Keep `jitter_factor` at zero for
    /// deterministic delays.
    pub retry: RetryPolicy,
    /// Maximum concurrent sends.
    pub worker_pool_size: usize,
    /// Deadline for a single send.
    pub send_timeout: Duration,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            topic: "executions".to_string(),
            dead_letter_topic: "executions.dlq".to_string(),
            dead_letter_enabled: true,
            retry: RetryPolicy::new(
                3,
                Duration::from_millis(1000),
                Duration::from_secs(10),
                2.0,
                0.0,
            ),
            worker_pool_size: 8,
            send_timeout: Duration::from_secs(5),
        }
    }
}

/// Why a single publish attempt failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PublishError {
    /// Rejected by the open circuit without contacting the stream.
    #[error("circuit breaker open")]
    CircuitOpen,

    /// The stream send failed.
    #[error(transparent)]
    Send(#[from] StreamSendError),

    /// The event could not be encoded.
    #[error("failed to serialize event: {0}")]
    Serialization(String),

    /// The worker pool was closed.
    #[error("publisher is shut down")]
    ShutDown,
}

impl PublishError {
    /// Whether another attempt may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Send(_))
    }
}

/// Handle to a background publication.
#[derive(Debug)]
pub struct PublishHandle {
    execution_id: ExecutionId,
    task: JoinHandle<PublishOutcome>,
}

impl PublishHandle {
    /// Record being published.
    #[must_use]
    pub const fn execution_id(&self) -> ExecutionId {
        self.execution_id
    }

    /// Wait for the publication to finish.
    pub async fn outcome(self) -> PublishOutcome {
        match self.task.await {
            Ok(outcome) => outcome,
            Err(e) => PublishOutcome {
                execution_id: self.execution_id,
                status: PublishStatus::Failed,
                attempts: 0,
                sent_at: None,
                error: Some(format!("publish task aborted: {e}")),
                dead_lettered: false,
            },
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    submitted: AtomicU64,
    attempts: AtomicU64,
    published: AtomicU64,
    failed: AtomicU64,
    retries: AtomicU64,
    circuit_rejections: AtomicU64,
    dead_lettered: AtomicU64,
    dead_letter_failures: AtomicU64,
    in_flight: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> PublisherCounters {
        PublisherCounters {
            submitted: self.submitted.load(Ordering::Relaxed),
            attempts: self.attempts.load(Ordering::Relaxed),
            published: self.published.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            circuit_rejections: self.circuit_rejections.load(Ordering::Relaxed),
            dead_lettered: self.dead_lettered.load(Ordering::Relaxed),
            dead_letter_failures: self.dead_letter_failures.load(Ordering::Relaxed),
        }
    }
}

struct PublisherInner {
    stream: Arc<dyn EventStreamPort>,
    dead_letter: Arc<dyn EventStreamPort>,
    breaker: Arc<CircuitBreaker>,
    config: PublisherConfig,
    permits: Semaphore,
    counters: Counters,
}

/// Asynchronous publisher for persisted executions.
pub struct ExecutionPublisher {
    inner: Arc<PublisherInner>,
    tracker: TaskTracker,
}

impl ExecutionPublisher {
    /// Create a publisher.
    ///
    /// `dead_letter` may be the same client as `stream`.
    #[must_use]
    pub fn new(
        stream: Arc<dyn EventStreamPort>,
        dead_letter: Arc<dyn EventStreamPort>,
        breaker: Arc<CircuitBreaker>,
        config: PublisherConfig,
    ) -> Self {
        let permits = Semaphore::new(config.worker_pool_size.max(1));
        Self {
            inner: Arc::new(PublisherInner {
                stream,
                dead_letter,
                breaker,
                config,
                permits,
                counters: Counters::default(),
            }),
            tracker: TaskTracker::new(),
        }
    }

    /// Start publishing a record and return immediately.
    pub fn publish(&self, record: PersistedExecution) -> PublishHandle {
        let inner = Arc::clone(&self.inner);
        let execution_id = record.id;
        inner.counters.submitted.fetch_add(1, Ordering::Relaxed);
        inner.counters.in_flight.fetch_add(1, Ordering::Relaxed);

        let task = self.tracker.spawn(async move {
            let outcome = inner.run(record).await;
            inner.counters.in_flight.fetch_sub(1, Ordering::Relaxed);
            outcome
        });

        PublishHandle { execution_id, task }
    }

    /// Running counters and breaker view.
    #[must_use]
    pub fn stats(&self) -> PublisherStatsDto {
        PublisherStatsDto {
            counters: self.inner.counters.snapshot(),
            in_flight: self.inner.counters.in_flight.load(Ordering::Relaxed),
            circuit_breaker: self.inner.breaker.metrics(),
        }
    }

    /// The breaker guarding sends.
    #[must_use]
    pub fn circuit_breaker(&self) -> &Arc<CircuitBreaker> {
        &self.inner.breaker
    }

    /// Stop accepting work and wait up to `timeout` for in-flight
    /// publications.
    ///
    /// Returns `true` if every publication finished in time.
    pub async fn shutdown(&self, timeout: Duration) -> bool {
        self.tracker.close();
        let in_flight = self.inner.counters.in_flight.load(Ordering::Relaxed);
        tracing::info!(in_flight, "Waiting for in-flight publications");

        if tokio::time::timeout(timeout, self.tracker.wait()).await.is_ok() {
            tracing::info!("Publisher drained");
            true
        } else {
            tracing::warn!(
                in_flight = self.inner.counters.in_flight.load(Ordering::Relaxed),
                timeout_ms = timeout.as_millis() as u64,
                "Publisher shutdown timed out"
            );
            false
        }
    }
}

impl PublisherInner {
    async fn run(&self, record: PersistedExecution) -> PublishOutcome {
        let topic = self.config.topic.as_str();
        let mut backoff = ExponentialBackoffCalculator::new(&self.config.retry);
        let mut attempts = 0;

        let last_error = loop {
            let error = match self.attempt(&record).await {
                Ok(sent_at) => {
                    self.counters.published.fetch_add(1, Ordering::Relaxed);
                    observability::record_publish_success(topic);
                    tracing::debug!(
                        execution_id = %record.id,
                        attempts = attempts + 1,
                        "Execution published"
                    );
                    return PublishOutcome {
                        execution_id: record.id,
                        status: PublishStatus::Published,
                        attempts: attempts + 1,
                        sent_at: Some(sent_at),
                        error: None,
                        dead_lettered: false,
                    };
                }
                Err(error) => error,
            };

            if matches!(error, PublishError::CircuitOpen) {
                self.counters.circuit_rejections.fetch_add(1, Ordering::Relaxed);
                break error;
            }
            attempts += 1;

            if !error.is_retryable() {
                break error;
            }
            let Some(delay) = backoff.next_backoff() else {
                break error;
            };

            self.counters.retries.fetch_add(1, Ordering::Relaxed);
            observability::record_publish_retry(topic);
            tracing::warn!(
                execution_id = %record.id,
                attempt = attempts,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Publish failed, retrying"
            );
            tokio::time::sleep(delay).await;
        };

        let status = if matches!(last_error, PublishError::CircuitOpen) {
            tracing::warn!(
                execution_id = %record.id,
                attempts,
                "Publish skipped, circuit breaker open"
            );
            PublishStatus::Skipped
        } else {
            self.counters.failed.fetch_add(1, Ordering::Relaxed);
            observability::record_publish_failure(topic);
            tracing::error!(
                execution_id = %record.id,
                attempts,
                error = %last_error,
                "Publish failed permanently"
            );
            PublishStatus::Failed
        };

        let reason = last_error.to_string();
        let dead_lettered = if self.config.dead_letter_enabled {
            self.dead_letter(&record, &reason, attempts).await
        } else {
            false
        };

        PublishOutcome {
            execution_id: record.id,
            status,
            attempts,
            sent_at: None,
            error: Some(reason),
            dead_lettered,
        }
    }

    /// One send. The worker permit is held only for the duration of the
    /// send, never across a retry delay.
    async fn attempt(&self, record: &PersistedExecution) -> Result<Timestamp, PublishError> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| PublishError::ShutDown)?;

        let Some(call) = self.breaker.try_acquire() else {
            return Err(PublishError::CircuitOpen);
        };

        let sent_at = Timestamp::now();
        let event = ExecutionEvent::from_record(record, sent_at);
        let payload = match serde_json::to_string(&event) {
            Ok(payload) => payload,
            Err(e) => {
                // Not the stream's fault; release the admitted call as a success.
                self.breaker.record_success(call);
                return Err(PublishError::Serialization(e.to_string()));
            }
        };

        self.counters.attempts.fetch_add(1, Ordering::Relaxed);
        observability::record_publish_attempt(&self.config.topic);

        match self
            .send_bounded(self.stream.as_ref(), &self.config.topic, &event.key(), &payload)
            .await
        {
            Ok(()) => {
                self.breaker.record_success(call);
                Ok(sent_at)
            }
            Err(e) => {
                self.breaker.record_failure(call);
                Err(PublishError::Send(e))
            }
        }
    }

    async fn send_bounded(
        &self,
        stream: &dyn EventStreamPort,
        destination: &str,
        key: &str,
        payload: &str,
    ) -> Result<(), StreamSendError> {
        let timeout = self.config.send_timeout;
        tokio::time::timeout(timeout, stream.send(destination, key, payload))
            .await
            .unwrap_or(Err(StreamSendError::Timeout {
                timeout_ms: timeout.as_millis() as u64,
            }))
    }

    /// Emit the dead-letter envelope. Failures are logged only.
    async fn dead_letter(&self, record: &PersistedExecution, reason: &str, attempts: u32) -> bool {
        let original_payload = match serde_json::to_string(&ExecutionEvent::unsent(record)) {
            Ok(payload) => payload,
            Err(e) => {
                self.counters.dead_letter_failures.fetch_add(1, Ordering::Relaxed);
                tracing::error!(execution_id = %record.id, error = %e, "Failed to encode dead-letter payload");
                return false;
            }
        };
        let failed_at = Timestamp::now();
        let envelope = DeadLetterRecord {
            execution_id: record.id,
            original_payload,
            failure_reason: reason.to_string(),
            failed_at,
            origin_destination: self.config.topic.clone(),
            attempts,
        };
        let payload = match serde_json::to_string(&envelope) {
            Ok(payload) => payload,
            Err(e) => {
                self.counters.dead_letter_failures.fetch_add(1, Ordering::Relaxed);
                tracing::error!(execution_id = %record.id, error = %e, "Failed to encode dead-letter record");
                return false;
            }
        };

        let key = record.id.to_string();
        match self
            .send_bounded(
                self.dead_letter.as_ref(),
                &self.config.dead_letter_topic,
                &key,
                &payload,
            )
            .await
        {
            Ok(()) => {
                self.counters.dead_lettered.fetch_add(1, Ordering::Relaxed);
                observability::record_dead_lettered(&self.config.dead_letter_topic);
                tracing::info!(
                    execution_id = %record.id,
                    destination = %self.config.dead_letter_topic,
                    "Execution dead-lettered"
                );
                true
            }
            Err(e) => {
                self.counters.dead_letter_failures.fetch_add(1, Ordering::Relaxed);
                tracing::error!(
                    execution_id = %record.id,
                    error = %e,
                    "Dead-letter emission failed"
                );
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::execution::{ExecutionStatus, NewExecution, TradeType};
    use crate::resilience::{CircuitBreakerConfig, CircuitBreakerState};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use rust_decimal_macros::dec;
    use std::collections::VecDeque;
    use tokio::time::Instant;

    /// Stream that replays scripted results, then succeeds.
    #[derive(Default)]
    struct ScriptedStream {
        script: Mutex<VecDeque<Result<(), StreamSendError>>>,
        sent: Mutex<Vec<(String, String, String, Instant)>>,
    }

    impl ScriptedStream {
        fn failing(times: usize) -> Self {
            let stream = Self::default();
            for _ in 0..times {
                stream.script.lock().push_back(Err(StreamSendError::Connection {
                    message: "broker down".to_string(),
                }));
            }
            stream
        }

        fn sent(&self) -> Vec<(String, String, String, Instant)> {
            self.sent.lock().clone()
        }
    }

    #[async_trait]
    impl EventStreamPort for ScriptedStream {
        async fn send(
            &self,
            destination: &str,
            key: &str,
            payload: &str,
        ) -> Result<(), StreamSendError> {
            self.sent.lock().push((
                destination.to_string(),
                key.to_string(),
                payload.to_string(),
                Instant::now(),
            ));
            self.script.lock().pop_front().unwrap_or(Ok(()))
        }
    }

    fn record(id: u64) -> PersistedExecution {
        PersistedExecution::from_new(
            ExecutionId::new(id),
            NewExecution {
                status: ExecutionStatus::New,
                trade_type: TradeType::Buy,
                destination: "NYSE".to_string(),
                security_id: "AAPL".to_string(),
                quantity: dec!(100),
                limit_price: Some(dec!(150.25)),
                external_reference_id: None,
                version: 0,
                received_at: Timestamp::now(),
            },
        )
    }

    fn publisher(
        stream: Arc<ScriptedStream>,
        dlq: Arc<ScriptedStream>,
        threshold: u32,
    ) -> ExecutionPublisher {
        let breaker = Arc::new(CircuitBreaker::new(
            "event-stream",
            CircuitBreakerConfig {
                failure_threshold: threshold,
                recovery_timeout: Duration::from_secs(60),
            },
        ));
        let config = PublisherConfig {
            retry: RetryPolicy::new(
                3,
                Duration::from_millis(1000),
                Duration::from_secs(30),
                2.0,
                0.0,
            ),
            ..PublisherConfig::default()
        };
        ExecutionPublisher::new(stream, dlq, breaker, config)
    }

    #[tokio::test(start_paused = true)]
    async fn publishes_event_keyed_by_id() {
        let stream = Arc::new(ScriptedStream::default());
        let publisher = publisher(Arc::clone(&stream), Arc::new(ScriptedStream::default()), 5);

        let outcome = publisher.publish(record(7)).outcome().await;

        assert!(outcome.is_published());
        assert_eq!(outcome.attempts, 1);
        assert!(outcome.sent_at.is_some());
        let sent = stream.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "executions");
        assert_eq!(sent[0].1, "7");
        let event: serde_json::Value = serde_json::from_str(&sent[0].2).unwrap();
        assert_eq!(event["securityId"], "AAPL");
        assert_eq!(publisher.stats().counters.published, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn retries_with_exponential_delays() {
        let stream = Arc::new(ScriptedStream::failing(2));
        let publisher = publisher(Arc::clone(&stream), Arc::new(ScriptedStream::default()), 5);

        let outcome = publisher.publish(record(1)).outcome().await;

        assert!(outcome.is_published());
        assert_eq!(outcome.attempts, 3);
        let sent = stream.sent();
        assert_eq!(sent[1].3 - sent[0].3, Duration::from_millis(1000));
        assert_eq!(sent[2].3 - sent[1].3, Duration::from_millis(2000));
        assert_eq!(publisher.stats().counters.retries, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_record_is_dead_lettered() {
        let stream = Arc::new(ScriptedStream::failing(3));
        let dlq = Arc::new(ScriptedStream::default());
        let publisher = publisher(stream, Arc::clone(&dlq), 5);

        let outcome = publisher.publish(record(9)).outcome().await;

        assert_eq!(outcome.status, PublishStatus::Failed);
        assert_eq!(outcome.attempts, 3);
        assert!(outcome.dead_lettered);
        let sent = dlq.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "executions.dlq");
        let envelope: serde_json::Value = serde_json::from_str(&sent[0].2).unwrap();
        assert_eq!(envelope["originDestination"], "executions");
        assert_eq!(envelope["attempts"], 3);
        assert!(envelope["failureReason"].as_str().unwrap().contains("broker down"));
        let original: serde_json::Value =
            serde_json::from_str(envelope["originalPayload"].as_str().unwrap()).unwrap();
        assert_eq!(original["securityId"], "AAPL");
        assert!(original["sentAt"].is_null());
        assert!(envelope["failedAt"].is_string());
    }

    #[tokio::test(start_paused = true)]
    async fn dead_letter_failure_is_not_escalated() {
        let stream = Arc::new(ScriptedStream::failing(3));
        let dlq = Arc::new(ScriptedStream::failing(1));
        let publisher = publisher(stream, dlq, 5);

        let outcome = publisher.publish(record(2)).outcome().await;

        assert_eq!(outcome.status, PublishStatus::Failed);
        assert!(!outcome.dead_lettered);
        assert_eq!(publisher.stats().counters.dead_letter_failures, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn open_circuit_skips_without_contacting_stream() {
        let stream = Arc::new(ScriptedStream::default());
        let dlq = Arc::new(ScriptedStream::default());
        let publisher = publisher(Arc::clone(&stream), Arc::clone(&dlq), 5);
        publisher.circuit_breaker().force_open();

        let outcome = publisher.publish(record(3)).outcome().await;

        assert_eq!(outcome.status, PublishStatus::Skipped);
        assert!(!outcome.is_published());
        assert_eq!(outcome.attempts, 0);
        assert!(stream.sent().is_empty());
        assert!(outcome.dead_lettered);
        let counters = publisher.stats().counters;
        assert_eq!(counters.circuit_rejections, 1);
        assert_eq!(counters.failed, 0);
        let envelope: serde_json::Value = serde_json::from_str(&dlq.sent()[0].2).unwrap();
        assert_eq!(envelope["failureReason"], "circuit breaker open");
        assert_eq!(envelope["attempts"], 0);
    }

    #[tokio::test(start_paused = true)]
    async fn consecutive_failures_open_the_circuit() {
        let stream = Arc::new(ScriptedStream::failing(5));
        let publisher = publisher(Arc::clone(&stream), Arc::new(ScriptedStream::default()), 5);

        // Two records exhaust three attempts each; the fifth failure opens
        // the circuit and the sixth attempt is rejected.
        let first = publisher.publish(record(1)).outcome().await;
        let second = publisher.publish(record(2)).outcome().await;

        assert_eq!(first.status, PublishStatus::Failed);
        assert_eq!(first.attempts, 3);
        assert_eq!(second.status, PublishStatus::Skipped);
        assert_eq!(second.attempts, 2);
        assert_eq!(stream.sent().len(), 5);
        assert_eq!(
            publisher.circuit_breaker().state(),
            CircuitBreakerState::Open
        );

        tokio::time::advance(Duration::from_secs(61)).await;
        let trial = publisher.publish(record(3)).outcome().await;
        assert!(trial.is_published());
        assert_eq!(
            publisher.circuit_breaker().state(),
            CircuitBreakerState::Closed
        );
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_waits_for_in_flight_publications() {
        let stream = Arc::new(ScriptedStream::failing(1));
        let publisher = publisher(Arc::clone(&stream), Arc::new(ScriptedStream::default()), 5);

        let handle = publisher.publish(record(4));
        assert!(publisher.shutdown(Duration::from_secs(10)).await);
        assert!(handle.outcome().await.is_published());
        assert_eq!(publisher.stats().in_flight, 0);
    }
}
