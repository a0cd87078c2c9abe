//! Shared Domain Types
//!
//! Identifiers and value objects used across the execution and batch contexts.

mod identifiers;
mod timestamp;

pub use identifiers::{BatchId, ExecutionId};
pub use timestamp::Timestamp;
