//! Request-scoped processing context.
//!
//! Holds the submitted items and everything learned about them while the
//! batch moves through validation, persistence, and publication. An item
//! gets exactly one terminal outcome, and it is recorded in exactly one of
//! the validation or persistence error maps when it fails. Publication
//! failures are kept in their own map and never change an item's status.

use std::collections::BTreeMap;
use std::fmt;

use super::outcome::{ItemOutcome, PublishOutcome};
use super::result::{BatchResult, BatchStatus, ItemResult, ItemStatus};
use crate::domain::execution::ExecutionRequest;
use crate::domain::shared::{BatchId, ExecutionId};

/// Message attached to items that never reached a terminal outcome.
const UNPROCESSED_MESSAGE: &str = "item was not processed";

/// Pipeline phase an error was recorded in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProcessingPhase {
    /// Field validation.
    Validation,
    /// Bulk or per-item insert.
    Persistence,
    /// Event-stream publication.
    Publish,
}

impl fmt::Display for ProcessingPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validation => write!(f, "validation"),
            Self::Persistence => write!(f, "persistence"),
            Self::Publish => write!(f, "publish"),
        }
    }
}

/// State of one batch while it is processed.
#[derive(Debug, Clone)]
pub struct BatchProcessingContext {
    batch_id: BatchId,
    items: Vec<ExecutionRequest>,
    outcomes: Vec<Option<ItemOutcome>>,
    validation_errors: BTreeMap<usize, String>,
    persistence_errors: BTreeMap<usize, String>,
    publish_errors: BTreeMap<usize, String>,
    publish_outcomes: BTreeMap<usize, PublishOutcome>,
}

impl BatchProcessingContext {
    /// Create a context for the submitted items.
    #[must_use]
    pub fn new(batch_id: BatchId, items: Vec<ExecutionRequest>) -> Self {
        let outcomes = vec![None; items.len()];
        Self {
            batch_id,
            items,
            outcomes,
            validation_errors: BTreeMap::new(),
            persistence_errors: BTreeMap::new(),
            publish_errors: BTreeMap::new(),
            publish_outcomes: BTreeMap::new(),
        }
    }

    /// Request-scoped id.
    #[must_use]
    pub const fn batch_id(&self) -> &BatchId {
        &self.batch_id
    }

    /// Submitted items, in submission order.
    #[must_use]
    pub fn items(&self) -> &[ExecutionRequest] {
        &self.items
    }

    /// Number of submitted items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// True when the batch has no items.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Terminal outcome of an item, if one was recorded.
    #[must_use]
    pub fn outcome(&self, index: usize) -> Option<&ItemOutcome> {
        self.outcomes.get(index).and_then(Option::as_ref)
    }

    /// Number of items that have no terminal outcome yet.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_none()).count()
    }

    /// Errors recorded in a phase, keyed by item index.
    #[must_use]
    pub const fn errors(&self, phase: ProcessingPhase) -> &BTreeMap<usize, String> {
        match phase {
            ProcessingPhase::Validation => &self.validation_errors,
            ProcessingPhase::Persistence => &self.persistence_errors,
            ProcessingPhase::Publish => &self.publish_errors,
        }
    }

    /// Publication outcomes recorded so far, keyed by item index.
    #[must_use]
    pub const fn publish_outcomes(&self) -> &BTreeMap<usize, PublishOutcome> {
        &self.publish_outcomes
    }

    /// Mark an item as rejected by validation.
    ///
    /// Returns `false` if the index is out of range or already has an outcome.
    pub fn record_validation_failure(&mut self, index: usize, message: impl Into<String>) -> bool {
        let message = message.into();
        if !self.set_outcome(
            index,
            ItemOutcome::Invalid {
                message: message.clone(),
            },
        ) {
            return false;
        }
        self.validation_errors.insert(index, message);
        true
    }

    /// Mark an item as stored.
    ///
    /// Returns `false` if the index is out of range or already has an outcome.
    pub fn record_persisted(&mut self, index: usize, execution_id: ExecutionId) -> bool {
        self.set_outcome(index, ItemOutcome::Persisted { execution_id })
    }

    /// Mark an item as valid but not stored.
    ///
    /// Returns `false` if the index is out of range or already has an outcome.
    pub fn record_persistence_failure(&mut self, index: usize, message: impl Into<String>) -> bool {
        let message = message.into();
        if !self.set_outcome(
            index,
            ItemOutcome::PersistFailed {
                message: message.clone(),
            },
        ) {
            return false;
        }
        self.persistence_errors.insert(index, message);
        true
    }

    /// Record how publication of a stored item ended.
    ///
    /// Only stored items accept publish outcomes. The item's status is
    /// unchanged either way. Failed and skipped publications also land in
    /// the publish-phase error map.
    pub fn record_publish_outcome(&mut self, index: usize, outcome: PublishOutcome) -> bool {
        if !matches!(self.outcome(index), Some(ItemOutcome::Persisted { .. })) {
            return false;
        }
        if let Some(error) = outcome.error.as_ref().filter(|_| !outcome.is_published()) {
            self.publish_errors.insert(index, error.clone());
        }
        self.publish_outcomes.insert(index, outcome);
        true
    }

    /// Aggregate the recorded outcomes into a response summary.
    ///
    /// Pure and idempotent. Items without an outcome count as failed.
    #[must_use]
    pub fn build_result(&self) -> BatchResult {
        let results: Vec<ItemResult> = self
            .outcomes
            .iter()
            .enumerate()
            .map(|(request_index, outcome)| match outcome {
                Some(ItemOutcome::Persisted { execution_id }) => ItemResult {
                    request_index,
                    status: ItemStatus::Success,
                    execution_id: Some(*execution_id),
                    message: None,
                },
                Some(ItemOutcome::Invalid { message } | ItemOutcome::PersistFailed { message }) => {
                    ItemResult {
                        request_index,
                        status: ItemStatus::Failed,
                        execution_id: None,
                        message: Some(message.clone()),
                    }
                }
                None => ItemResult {
                    request_index,
                    status: ItemStatus::Failed,
                    execution_id: None,
                    message: Some(UNPROCESSED_MESSAGE.to_string()),
                },
            })
            .collect();

        let successful = results
            .iter()
            .filter(|r| r.status == ItemStatus::Success)
            .count();
        let failed = results.len() - successful;

        BatchResult {
            batch_id: self.batch_id.clone(),
            status: BatchStatus::from_counts(successful, failed),
            total_requested: self.items.len(),
            successful,
            failed,
            results,
        }
    }

    fn set_outcome(&mut self, index: usize, outcome: ItemOutcome) -> bool {
        match self.outcomes.get_mut(index) {
            Some(slot @ None) => {
                *slot = Some(outcome);
                true
            }
            _ => false,
        }
    }
}
