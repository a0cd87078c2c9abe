//! Application Services
//!
//! Stateful collaborators used by the ingest use case: resource
//! monitoring, adaptive chunk sizing, bulk persistence with per-item
//! recovery, and asynchronous publication.

mod batch_sizer;
mod bulk_persistence;
mod publisher;
mod resource_monitor;

pub use batch_sizer::{AdaptiveBatchSizer, AdaptiveSizingConfig, ChunkOutcome};
pub use bulk_persistence::{
    BulkPersistenceService, ChunkPersistOutcome, PersistenceFailure, PersistenceSettings,
};
pub use publisher::{ExecutionPublisher, PublishError, PublishHandle, PublisherConfig};
pub use resource_monitor::{ResourceMonitor, ResourceSnapshot};
