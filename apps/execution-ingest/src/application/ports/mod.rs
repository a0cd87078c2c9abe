//! Application Ports (Driven)
//!
//! Ports define interfaces for interacting with external systems.
//! The execution repository port lives in the domain.

mod event_stream_port;
mod pool_stats_port;

pub use event_stream_port::{EventStreamPort, StreamSendError};
pub use pool_stats_port::{PoolStats, PoolStatsPort};
