//! Batch response summary.

use serde::{Deserialize, Serialize};

use crate::domain::shared::{BatchId, ExecutionId};

/// Overall batch status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BatchStatus {
    /// No item failed.
    Success,
    /// Some items failed, some succeeded.
    PartialSuccess,
    /// No item succeeded.
    Failed,
}

impl BatchStatus {
    /// Derive the status from counts. Zero failures wins over zero
    /// successes, so an empty batch is a success.
    #[must_use]
    pub const fn from_counts(successful: usize, failed: usize) -> Self {
        if failed == 0 {
            Self::Success
        } else if successful == 0 {
            Self::Failed
        } else {
            Self::PartialSuccess
        }
    }

    /// Lowercase label for metrics.
    #[must_use]
    pub const fn as_label(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::PartialSuccess => "partial_success",
            Self::Failed => "failed",
        }
    }
}

/// Status of one item in the response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ItemStatus {
    /// Stored.
    Success,
    /// Rejected or not stored.
    Failed,
}

/// Per-item response entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemResult {
    /// Zero-based index in the submitted batch.
    pub request_index: usize,
    /// Item status.
    pub status: ItemStatus,
    /// Assigned id when stored.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_id: Option<ExecutionId>,
    /// Failure reason.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Summary of a processed batch.
///
/// Invariants: `successful + failed == total_requested`, and `results`
/// holds one entry per submitted item in submission order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchResult {
    /// Request-scoped id.
    pub batch_id: BatchId,
    /// Overall status.
    pub status: BatchStatus,
    /// Items submitted.
    pub total_requested: usize,
    /// Items stored.
    pub successful: usize,
    /// Items rejected or not stored.
    pub failed: usize,
    /// Per-item entries.
    pub results: Vec<ItemResult>,
}
