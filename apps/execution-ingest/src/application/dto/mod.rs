//! Data Transfer Objects
//!
//! DTOs for event payloads and operational statistics.

mod event_dto;
mod stats_dto;

pub use event_dto::{DeadLetterRecord, ExecutionEvent};
pub use stats_dto::{BatchStatsDto, PublisherCounters, PublisherStatsDto};
