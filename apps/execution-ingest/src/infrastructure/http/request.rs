//! HTTP request DTOs.

use serde::{Deserialize, Serialize};

use crate::domain::execution::ExecutionRequest;

/// Body of a batch-create request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchIngestRequest {
    /// Items in submission order.
    #[serde(default)]
    pub executions: Vec<ExecutionRequest>,
}
