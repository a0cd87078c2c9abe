// Allow unwrap/expect in tests - tests should panic on unexpected errors
// Allow test-specific patterns and pedantic lints in test code
#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::match_same_arms,
        clippy::needless_pass_by_value,
        clippy::needless_collect,
        clippy::option_if_let_else,
        clippy::default_trait_access,
        clippy::items_after_statements,
        clippy::or_fun_call
    )
)]

//! Execution Ingest - Rust Core Library
//!
//! Batch ingestion and resilient propagation of trade executions.
//!
//! # Architecture (Clean Architecture + DDD + Hexagonal)
//!
//! ## Layers (inside → outside)
//!
//! - **Domain**: Core types and rules, no I/O
//!   - `execution`: Requests, records, validation, repository trait
//!   - `batch`: Processing context, chunking, result aggregation
//!   - `shared`: Identifiers and timestamps
//!
//! - **Application**: Use cases and orchestration
//!   - `ports`: Interfaces for external systems (`EventStreamPort`, `PoolStatsPort`)
//!   - `services`: Resource monitor, adaptive sizer, bulk persistence, publisher
//!   - `use_cases`: `IngestBatch`
//!   - `dto`: Event payloads and statistics
//!
//! - **Infrastructure**: Adapters (implementations)
//!   - `persistence`: Execution store and connection pool
//!   - `messaging`: Event-stream clients
//!   - `http`: REST API
//!   - `config`: Dependency injection container
//!
//! ## Cross-cutting
//!
//! - `resilience`: Circuit breaker and retry policies
//! - `observability`: Prometheus metrics
//! - `config`: YAML configuration
//! - `telemetry`: Tracing subscriber setup

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Clean Architecture Layers
// =============================================================================

/// Domain layer - Core business logic with no external dependencies.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Cross-cutting Concerns
// =============================================================================

/// Configuration loading and validation.
pub mod config;

/// API error types.
pub mod error;

/// Metrics sink.
pub mod observability;

/// Circuit breaker and retry policies.
pub mod resilience;

/// Tracing initialization.
pub mod telemetry;

// =============================================================================
// Re-exports
// =============================================================================

// Domain re-exports
pub use domain::batch::{BatchProcessingContext, BatchResult, BatchStatus, ItemResult, ItemStatus};
pub use domain::execution::{
    ErrorClass, ExecutionRepository, ExecutionRequest, ExecutionStatus, NewExecution,
    PersistedExecution, RepositoryError, TradeType,
};
pub use domain::shared::{BatchId, ExecutionId, Timestamp};

// Application re-exports
pub use application::ports::{EventStreamPort, PoolStatsPort, StreamSendError};
pub use application::services::{AdaptiveBatchSizer, ExecutionPublisher, ResourceMonitor};
pub use application::use_cases::{IngestBatchUseCase, IngestError};

// Infrastructure re-exports
pub use infrastructure::config::Container;
pub use infrastructure::http::{AppState, create_router};
pub use infrastructure::messaging::{HttpEventStreamClient, InMemoryEventStream};
pub use infrastructure::persistence::{ConnectionPool, InMemoryExecutionStore};
