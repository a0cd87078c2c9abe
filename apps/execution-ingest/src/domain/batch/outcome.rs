//! Per-item outcomes recorded while a batch is processed.

use serde::{Deserialize, Serialize};

use crate::domain::shared::{ExecutionId, Timestamp};

/// Terminal status of an item after validation and persistence.
///
/// Publication never changes this; see `PublishOutcome`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    /// Stored with the given identity.
    Persisted {
        /// Server-assigned id.
        execution_id: ExecutionId,
    },
    /// Rejected by validation.
    Invalid {
        /// Violated constraint.
        message: String,
    },
    /// Valid but could not be stored.
    PersistFailed {
        /// Final error, including the bulk error when a fallback ran.
        message: String,
    },
}

impl ItemOutcome {
    /// True when the item was stored.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Persisted { .. })
    }
}

/// How publication of a persisted record ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PublishStatus {
    /// Accepted by the event stream.
    Published,
    /// Every permitted attempt failed.
    Failed,
    /// Stopped by the open circuit breaker before the stream saw the
    /// final attempt.
    Skipped,
}

/// Result of publishing one persisted record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishOutcome {
    /// Record that was published.
    pub execution_id: ExecutionId,
    /// Final status.
    pub status: PublishStatus,
    /// Send attempts made, including the first.
    pub attempts: u32,
    /// Set when the stream accepted the record.
    pub sent_at: Option<Timestamp>,
    /// Last error for failed publications.
    pub error: Option<String>,
    /// True when a dead-letter envelope was accepted.
    pub dead_lettered: bool,
}

impl PublishOutcome {
    /// True when the stream accepted the record.
    #[must_use]
    pub fn is_published(&self) -> bool {
        self.status == PublishStatus::Published
    }
}
