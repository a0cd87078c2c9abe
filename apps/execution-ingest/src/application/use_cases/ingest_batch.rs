//! Ingest Batch Use Case
//!
//! Validate → chunk → persist (bulk, with per-item fallback) → hand stored
//! records to the publisher → aggregate.
//!
//! The response is built as soon as every chunk is persisted. Publication
//! continues in the background; its outcomes are folded into the
//! processing context by a `PublishTracker` and never change an item's
//! status.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::time::Instant;

use crate::application::services::{
    AdaptiveBatchSizer, BulkPersistenceService, ExecutionPublisher, PublishHandle,
};
use crate::domain::batch::{
    BatchProcessingContext, BatchResult, IndexedRecord, ProcessingPhase, PublishStatus,
    split_into_chunks,
};
use crate::domain::execution::{ExecutionRepository, ExecutionRequest, ExecutionValidator};
use crate::domain::shared::{BatchId, Timestamp};
use crate::observability;

/// Batch rejected before any item was processed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IngestError {
    /// No items were submitted.
    #[error("Batch must contain at least one execution")]
    EmptyBatch,

    /// More items than a single request may carry.
    #[error("Batch contains {actual} executions; the maximum is {max}")]
    BatchTooLarge {
        /// Configured cap.
        max: usize,
        /// Submitted count.
        actual: usize,
    },
}

/// Timing state for one request, passed explicitly through the pipeline.
#[derive(Debug)]
struct RequestTimings {
    started: Instant,
    chunks: Vec<Duration>,
}

impl RequestTimings {
    fn start() -> Self {
        Self {
            started: Instant::now(),
            chunks: Vec::new(),
        }
    }

    fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

/// Publications started for one batch.
///
/// Owns the processing context until every publication has finished.
#[derive(Debug)]
pub struct PublishTracker {
    context: BatchProcessingContext,
    handles: Vec<(usize, PublishHandle)>,
}

impl PublishTracker {
    /// Publications started.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// True when nothing was published.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Wait for every publication and record its outcome.
    pub async fn settle(self) -> BatchProcessingContext {
        let Self {
            mut context,
            handles,
        } = self;
        let outcomes = join_all(
            handles
                .into_iter()
                .map(|(index, handle)| async move { (index, handle.outcome().await) }),
        )
        .await;
        for (index, outcome) in outcomes {
            context.record_publish_outcome(index, outcome);
        }
        context
    }

    /// Settle in the background and log a summary.
    pub fn detach(self) {
        if self.handles.is_empty() {
            return;
        }
        tokio::spawn(async move {
            let context = self.settle().await;
            let failures = context.errors(ProcessingPhase::Publish).len();
            if failures == 0 {
                tracing::debug!(
                    batch_id = %context.batch_id(),
                    published = context.publish_outcomes().len(),
                    "Batch publication complete"
                );
            } else {
                let skipped = context
                    .publish_outcomes()
                    .values()
                    .filter(|outcome| outcome.status == PublishStatus::Skipped)
                    .count();
                tracing::warn!(
                    batch_id = %context.batch_id(),
                    published = context.publish_outcomes().len() - failures,
                    failed = failures - skipped,
                    skipped,
                    "Batch publication finished with failures"
                );
            }
        });
    }
}

/// Use case for ingesting a batch of executions.
pub struct IngestBatchUseCase<R>
where
    R: ExecutionRepository + 'static,
{
    validator: ExecutionValidator,
    sizer: Arc<AdaptiveBatchSizer>,
    persistence: BulkPersistenceService<R>,
    publisher: Arc<ExecutionPublisher>,
    max_items: usize,
}

impl<R> IngestBatchUseCase<R>
where
    R: ExecutionRepository + 'static,
{
    /// Create a new IngestBatchUseCase.
    pub const fn new(
        sizer: Arc<AdaptiveBatchSizer>,
        persistence: BulkPersistenceService<R>,
        publisher: Arc<ExecutionPublisher>,
        max_items: usize,
    ) -> Self {
        Self {
            validator: ExecutionValidator::new(),
            sizer,
            persistence,
            publisher,
            max_items,
        }
    }

    /// Cap on items per request.
    #[must_use]
    pub const fn max_items(&self) -> usize {
        self.max_items
    }

    /// Execute the use case. Publication continues after this returns.
    pub async fn execute(&self, items: Vec<ExecutionRequest>) -> Result<BatchResult, IngestError> {
        let (result, tracker) = self.execute_tracked(items).await?;
        tracker.detach();
        Ok(result)
    }

    /// Execute the use case and return the publications alongside the
    /// response.
    pub async fn execute_tracked(
        &self,
        items: Vec<ExecutionRequest>,
    ) -> Result<(BatchResult, PublishTracker), IngestError> {
        self.check_size(items.len())?;

        let batch_id = BatchId::generate();
        let mut timings = RequestTimings::start();
        let mut context = BatchProcessingContext::new(batch_id.clone(), items);
        tracing::info!(batch_id = %batch_id, items = context.len(), "Processing batch");

        // 1. Validate
        let valid = self.validate(&mut context);

        // 2. Chunk
        let chunk_size = self.sizer.optimal_size(valid.len());
        let chunks = split_into_chunks(valid, chunk_size);
        tracing::debug!(
            batch_id = %batch_id,
            chunk_size,
            chunks = chunks.len(),
            "Split batch into chunks"
        );

        // 3. Persist, then hand stored records to the publisher
        let mut handles = Vec::new();
        for (chunk_number, chunk) in chunks.iter().enumerate() {
            self.persist_chunk(&mut context, &mut timings, chunk_number, chunk, &mut handles)
                .await;
        }

        // 4. Aggregate
        let result = context.build_result();
        let elapsed = timings.elapsed();
        observability::record_batch(result.status.as_label(), elapsed.as_secs_f64());
        observability::record_items("success", result.successful);
        observability::record_items("failed", result.failed);
        tracing::info!(
            batch_id = %batch_id,
            status = result.status.as_label(),
            total = result.total_requested,
            successful = result.successful,
            failed = result.failed,
            validation_failures = context.errors(ProcessingPhase::Validation).len(),
            persistence_failures = context.errors(ProcessingPhase::Persistence).len(),
            chunks = timings.chunks.len(),
            duration_ms = elapsed.as_millis() as u64,
            "Batch processed"
        );

        Ok((result, PublishTracker { context, handles }))
    }

    fn check_size(&self, count: usize) -> Result<(), IngestError> {
        if count == 0 {
            return Err(IngestError::EmptyBatch);
        }
        if count > self.max_items {
            return Err(IngestError::BatchTooLarge {
                max: self.max_items,
                actual: count,
            });
        }
        Ok(())
    }

    fn validate(&self, context: &mut BatchProcessingContext) -> Vec<IndexedRecord> {
        let received_at = Timestamp::now();
        let mut valid = Vec::with_capacity(context.len());
        let mut rejected = Vec::new();

        for (index, item) in context.items().iter().enumerate() {
            match self.validator.validate(item, received_at) {
                Ok(record) => valid.push(IndexedRecord { index, record }),
                Err(e) => rejected.push((index, e.to_string())),
            }
        }

        for (index, message) in rejected {
            tracing::debug!(batch_id = %context.batch_id(), index, reason = %message, "Item failed validation");
            context.record_validation_failure(index, message);
        }
        valid
    }

    async fn persist_chunk(
        &self,
        context: &mut BatchProcessingContext,
        timings: &mut RequestTimings,
        chunk_number: usize,
        chunk: &[IndexedRecord],
        handles: &mut Vec<(usize, PublishHandle)>,
    ) {
        let started = Instant::now();
        let outcome = self.persistence.persist(context.batch_id(), chunk).await;
        let duration = started.elapsed();
        timings.chunks.push(duration);
        self.sizer
            .record_outcome(chunk.len(), duration, !outcome.fell_back());

        tracing::debug!(
            batch_id = %context.batch_id(),
            chunk = chunk_number,
            size = chunk.len(),
            persisted = outcome.persisted.len(),
            failed = outcome.failures.len(),
            fell_back = outcome.fell_back(),
            duration_ms = duration.as_millis() as u64,
            "Chunk persisted"
        );

        for failure in &outcome.failures {
            context.record_persistence_failure(failure.index, failure.message());
        }
        for (index, row) in outcome.persisted {
            context.record_persisted(index, row.id);
            handles.push((index, self.publisher.publish(row)));
        }
    }
}
