//! Use Cases
//!
//! Application use cases orchestrating domain logic and ports.

mod ingest_batch;

pub use ingest_batch::{IngestBatchUseCase, IngestError, PublishTracker};
