//! Pool Statistics Port (Driven Port)
//!
//! Read-only view of the database connection pool, sampled by the
//! resource monitor.

use serde::{Deserialize, Serialize};

/// Point-in-time connection-pool statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolStats {
    /// Connections currently checked out.
    pub active: usize,
    /// Open connections not checked out.
    pub idle: usize,
    /// Open connections.
    pub total: usize,
    /// Configured maximum.
    pub max_size: usize,
    /// Callers waiting for a connection.
    pub threads_waiting: usize,
}

/// Port for reading connection-pool statistics.
pub trait PoolStatsPort: Send + Sync {
    /// Current statistics.
    fn pool_stats(&self) -> PoolStats;
}
