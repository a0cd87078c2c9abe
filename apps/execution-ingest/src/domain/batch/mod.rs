//! Batch Bounded Context
//!
//! Per-request state for one batch ingestion: the original items, their
//! per-phase outcomes, chunking of validated records, and the pure
//! aggregation of outcomes into the response summary.

pub mod chunking;
pub mod context;
pub mod outcome;
pub mod result;

pub use chunking::{IndexedRecord, split_into_chunks};
pub use context::{BatchProcessingContext, ProcessingPhase};
pub use outcome::{ItemOutcome, PublishOutcome, PublishStatus};
pub use result::{BatchResult, BatchStatus, ItemResult, ItemStatus};
