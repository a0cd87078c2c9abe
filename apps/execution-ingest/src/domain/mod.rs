//! Domain Layer
//!
//! Pure business logic with no infrastructure dependencies.
//!
//! # Bounded Contexts
//!
//! - **Execution**: inbound requests, validation, stored records, and the
//!   persistence port
//! - **Batch**: per-request processing state, chunking, and result
//!   aggregation
//! - **Shared**: identifiers and timestamps used across contexts

pub mod batch;
pub mod execution;
pub mod shared;
