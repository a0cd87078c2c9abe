//! Bulk Persistence Service
//!
//! Stores one chunk of validated records. The fast path is a single bulk
//! insert. If that fails, each record is inserted on its own, in the
//! original order, so one bad record cannot sink the rest. Per-record
//! inserts retry only on transient errors, with jittered exponential
//! backoff. Every store call is bounded by a timeout.

use std::sync::Arc;
use std::time::Duration;

use crate::domain::batch::IndexedRecord;
use crate::domain::execution::{
    ExecutionRepository, NewExecution, PersistedExecution, RepositoryError,
};
use crate::domain::shared::BatchId;
use crate::observability;
use crate::resilience::{RetryPolicy, run_with_retry};

/// Runtime settings for persistence.
#[derive(Debug, Clone)]
pub struct PersistenceSettings {
    /// Per-record retry policy for the fallback path.
    pub retry: RetryPolicy,
    /// Deadline for any single store call.
    pub call_timeout: Duration,
}

impl Default for PersistenceSettings {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            call_timeout: Duration::from_secs(5),
        }
    }
}

/// A record that could not be stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistenceFailure {
    /// Index in the submitted batch.
    pub index: usize,
    /// Final error of the per-record insert.
    pub error: RepositoryError,
    /// Insert attempts made in the fallback.
    pub attempts: u32,
    /// Error of the bulk insert that triggered the fallback.
    pub bulk_error: Option<RepositoryError>,
}

impl PersistenceFailure {
    /// Message reported for the item.
    #[must_use]
    pub fn message(&self) -> String {
        match &self.bulk_error {
            Some(bulk) => format!(
                "{} (after {} attempt(s); bulk insert failed: {bulk})",
                self.error, self.attempts
            ),
            None => format!("{} (after {} attempt(s))", self.error, self.attempts),
        }
    }
}

/// Result of persisting one chunk.
#[derive(Debug, Clone, Default)]
pub struct ChunkPersistOutcome {
    /// Stored records with their batch index, in input order.
    pub persisted: Vec<(usize, PersistedExecution)>,
    /// Records that could not be stored.
    pub failures: Vec<PersistenceFailure>,
    /// Set when the bulk insert failed and the fallback ran.
    pub bulk_error: Option<RepositoryError>,
}

impl ChunkPersistOutcome {
    /// True when the per-record fallback ran.
    #[must_use]
    pub const fn fell_back(&self) -> bool {
        self.bulk_error.is_some()
    }
}

/// Bulk-then-per-item persistence.
pub struct BulkPersistenceService<R>
where
    R: ExecutionRepository + 'static,
{
    repository: Arc<R>,
    settings: PersistenceSettings,
}

impl<R> BulkPersistenceService<R>
where
    R: ExecutionRepository + 'static,
{
    /// Create a new service.
    pub const fn new(repository: Arc<R>, settings: PersistenceSettings) -> Self {
        Self {
            repository,
            settings,
        }
    }

    /// Persist a chunk.
    ///
    /// Never fails as a whole: every record ends up in either `persisted`
    /// or `failures`.
    pub async fn persist(&self, batch_id: &BatchId, chunk: &[IndexedRecord]) -> ChunkPersistOutcome {
        if chunk.is_empty() {
            return ChunkPersistOutcome::default();
        }

        let records: Vec<NewExecution> = chunk.iter().map(|r| r.record.clone()).collect();
        let bulk_error = match self.bulk_insert(&records).await {
            Ok(rows) if rows.len() == chunk.len() => {
                tracing::debug!(
                    batch_id = %batch_id,
                    count = rows.len(),
                    "Bulk insert succeeded"
                );
                return ChunkPersistOutcome {
                    persisted: chunk.iter().map(|r| r.index).zip(rows).collect(),
                    failures: Vec::new(),
                    bulk_error: None,
                };
            }
            Ok(rows) => {
                tracing::error!(
                    batch_id = %batch_id,
                    expected = chunk.len(),
                    returned = rows.len(),
                    "Bulk insert returned an unexpected row count"
                );
                return self.reconcile_short_bulk(chunk, rows);
            }
            Err(error) => error,
        };

        observability::record_bulk_fallback();
        tracing::warn!(
            batch_id = %batch_id,
            chunk_size = chunk.len(),
            error = %bulk_error,
            "Bulk insert failed, falling back to per-item inserts"
        );

        let mut outcome = ChunkPersistOutcome {
            bulk_error: Some(bulk_error.clone()),
            ..ChunkPersistOutcome::default()
        };

        for item in chunk {
            match self.insert_with_retry(batch_id, item).await {
                Ok(row) => outcome.persisted.push((item.index, row)),
                Err((error, attempts)) => {
                    tracing::warn!(
                        batch_id = %batch_id,
                        index = item.index,
                        attempts,
                        error = %error,
                        "Record could not be stored"
                    );
                    outcome.failures.push(PersistenceFailure {
                        index: item.index,
                        error,
                        attempts,
                        bulk_error: Some(bulk_error.clone()),
                    });
                }
            }
        }

        outcome
    }

    async fn bulk_insert(
        &self,
        records: &[NewExecution],
    ) -> Result<Vec<PersistedExecution>, RepositoryError> {
        let timeout = self.settings.call_timeout;
        tokio::time::timeout(timeout, self.repository.insert_all(records))
            .await
            .unwrap_or_else(|_| {
                Err(RepositoryError::timeout(format!(
                    "bulk insert exceeded {}ms",
                    timeout.as_millis()
                )))
            })
    }

    async fn insert_with_retry(
        &self,
        batch_id: &BatchId,
        item: &IndexedRecord,
    ) -> Result<PersistedExecution, (RepositoryError, u32)> {
        let timeout = self.settings.call_timeout;
        let repository = &self.repository;

        run_with_retry(
            &self.settings.retry,
            |_| async move {
                tokio::time::timeout(timeout, repository.insert(&item.record))
                    .await
                    .unwrap_or_else(|_| {
                        Err(RepositoryError::timeout(format!(
                            "insert exceeded {}ms",
                            timeout.as_millis()
                        )))
                    })
            },
            RepositoryError::is_transient,
            |attempt, error, delay| {
                observability::record_persist_retry();
                tracing::debug!(
                    batch_id = %batch_id,
                    index = item.index,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "Retrying transient insert failure"
                );
            },
        )
        .await
        .map(|(row, _)| row)
        .map_err(|terminal| (terminal.error, terminal.attempts))
    }

    fn reconcile_short_bulk(
        &self,
        chunk: &[IndexedRecord],
        rows: Vec<PersistedExecution>,
    ) -> ChunkPersistOutcome {
        let mut rows = rows.into_iter();
        let mut outcome = ChunkPersistOutcome::default();
        for item in chunk {
            match rows.next() {
                Some(row) => outcome.persisted.push((item.index, row)),
                None => outcome.failures.push(PersistenceFailure {
                    index: item.index,
                    error: RepositoryError::other("bulk insert returned no row for record"),
                    attempts: 1,
                    bulk_error: None,
                }),
            }
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::execution::{ExecutionStatus, TradeType};
    use crate::domain::shared::{ExecutionId, Timestamp};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use rust_decimal_macros::dec;
    use std::collections::{HashMap, VecDeque};
    use std::sync::atomic::{AtomicU64, Ordering};

    /// Repository whose bulk path and per-record path are scripted.
    struct ScriptedRepository {
        bulk_error: Option<RepositoryError>,
        /// Per security id: errors returned before an insert succeeds.
        item_errors: Mutex<HashMap<String, VecDeque<RepositoryError>>>,
        insert_calls: Mutex<Vec<String>>,
        next_id: AtomicU64,
    }

    impl ScriptedRepository {
        fn new(bulk_error: Option<RepositoryError>) -> Self {
            Self {
                bulk_error,
                item_errors: Mutex::new(HashMap::new()),
                insert_calls: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(1),
            }
        }

        fn fail_item(self, security_id: &str, errors: Vec<RepositoryError>) -> Self {
            self.item_errors
                .lock()
                .insert(security_id.to_string(), errors.into());
            self
        }

        fn store(&self, record: &NewExecution) -> PersistedExecution {
            let id = ExecutionId::new(self.next_id.fetch_add(1, Ordering::SeqCst));
            PersistedExecution::from_new(id, record.clone())
        }
    }

    #[async_trait]
    impl ExecutionRepository for ScriptedRepository {
        async fn insert_all(
            &self,
            records: &[NewExecution],
        ) -> Result<Vec<PersistedExecution>, RepositoryError> {
            if let Some(error) = &self.bulk_error {
                return Err(error.clone());
            }
            Ok(records.iter().map(|r| self.store(r)).collect())
        }

        async fn insert(&self, record: &NewExecution) -> Result<PersistedExecution, RepositoryError> {
            self.insert_calls.lock().push(record.security_id.clone());
            let scripted = self
                .item_errors
                .lock()
                .get_mut(&record.security_id)
                .and_then(VecDeque::pop_front);
            match scripted {
                Some(error) => Err(error),
                None => Ok(self.store(record)),
            }
        }
    }

    fn chunk(ids: &[&str]) -> Vec<IndexedRecord> {
        ids.iter()
            .enumerate()
            .map(|(index, id)| IndexedRecord {
                index: index * 2,
                record: NewExecution {
                    status: ExecutionStatus::New,
                    trade_type: TradeType::Buy,
                    destination: "NYSE".to_string(),
                    security_id: (*id).to_string(),
                    quantity: dec!(10),
                    limit_price: None,
                    external_reference_id: None,
                    version: 0,
                    received_at: Timestamp::now(),
                },
            })
            .collect()
    }

    fn settings(max_attempts: u32) -> PersistenceSettings {
        PersistenceSettings {
            retry: RetryPolicy::new(
                max_attempts,
                Duration::from_millis(100),
                Duration::from_secs(1),
                2.0,
                0.25,
            ),
            call_timeout: Duration::from_secs(5),
        }
    }

    #[tokio::test]
    async fn bulk_success_maps_indices_in_order() {
        let service = BulkPersistenceService::new(
            Arc::new(ScriptedRepository::new(None)),
            settings(3),
        );
        let outcome = service
            .persist(&BatchId::new("b"), &chunk(&["A", "B", "C"]))
            .await;

        assert!(!outcome.fell_back());
        let indices: Vec<usize> = outcome.persisted.iter().map(|(i, _)| *i).collect();
        assert_eq!(indices, vec![0, 2, 4]);
        assert_eq!(outcome.persisted[1].1.security_id, "B");
    }

    #[tokio::test(start_paused = true)]
    async fn bulk_failure_isolates_permanent_error() {
        let repo = Arc::new(
            ScriptedRepository::new(Some(RepositoryError::constraint_violation(
                "duplicate key",
            )))
            .fail_item(
                "BAD",
                vec![RepositoryError::constraint_violation("duplicate key")],
            ),
        );
        let service = BulkPersistenceService::new(Arc::clone(&repo), settings(3));

        let outcome = service
            .persist(&BatchId::new("b"), &chunk(&["A", "BAD", "C"]))
            .await;

        assert!(outcome.fell_back());
        assert_eq!(outcome.persisted.len(), 2);
        assert_eq!(outcome.failures.len(), 1);
        let failure = &outcome.failures[0];
        assert_eq!(failure.index, 2);
        assert_eq!(failure.attempts, 1);
        assert!(failure.message().contains("bulk insert failed"));
        assert_eq!(*repo.insert_calls.lock(), vec!["A", "BAD", "C"]);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_errors_are_retried_until_success() {
        let repo = Arc::new(ScriptedRepository::new(Some(RepositoryError::deadlock("victim"))).fail_item(
            "A",
            vec![
                RepositoryError::deadlock("victim"),
                RepositoryError::timeout("lock wait"),
            ],
        ));
        let service = BulkPersistenceService::new(Arc::clone(&repo), settings(3));

        let outcome = service.persist(&BatchId::new("b"), &chunk(&["A"])).await;

        assert!(outcome.failures.is_empty());
        assert_eq!(outcome.persisted.len(), 1);
        assert_eq!(repo.insert_calls.lock().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_errors_exhaust_attempts() {
        let repo = Arc::new(
            ScriptedRepository::new(Some(RepositoryError::connection("reset"))).fail_item(
                "A",
                vec![
                    RepositoryError::connection("reset"),
                    RepositoryError::connection("reset"),
                    RepositoryError::connection("reset"),
                ],
            ),
        );
        let service = BulkPersistenceService::new(Arc::clone(&repo), settings(2));

        let outcome = service.persist(&BatchId::new("b"), &chunk(&["A"])).await;

        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].attempts, 2);
        assert_eq!(repo.insert_calls.lock().len(), 2);
    }

    #[tokio::test]
    async fn empty_chunk_is_noop() {
        let service = BulkPersistenceService::new(
            Arc::new(ScriptedRepository::new(None)),
            settings(3),
        );
        let outcome = service.persist(&BatchId::new("b"), &[]).await;
        assert!(outcome.persisted.is_empty());
        assert!(outcome.failures.is_empty());
    }
}
