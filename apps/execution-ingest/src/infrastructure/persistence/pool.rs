//! Connection pool gauge.
//!
//! Bounds concurrent store calls the way a database connection pool does
//! and reports active, idle, and waiting counts to the resource monitor.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::{Semaphore, SemaphorePermit};

use crate::application::ports::{PoolStats, PoolStatsPort};
use crate::domain::execution::RepositoryError;

/// Pool bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionPoolConfig {
    /// Connections kept open when idle.
    pub min_size: usize,
    /// Maximum connections.
    pub max_size: usize,
    /// How long a caller waits for a free connection.
    pub acquire_timeout: Duration,
}

impl Default for ConnectionPoolConfig {
    fn default() -> Self {
        Self {
            min_size: 5,
            max_size: 20,
            acquire_timeout: Duration::from_secs(5),
        }
    }
}

/// A checked-out connection. Returned to the pool on drop.
#[derive(Debug)]
pub struct PooledConnection<'a> {
    _permit: SemaphorePermit<'a>,
}

/// Semaphore-backed connection pool.
#[derive(Debug)]
pub struct ConnectionPool {
    config: ConnectionPoolConfig,
    permits: Semaphore,
    waiting: AtomicUsize,
}

/// Decrements the waiting count even if the acquire future is dropped.
struct WaitGuard<'a>(&'a AtomicUsize);

impl<'a> WaitGuard<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::AcqRel);
        Self(counter)
    }
}

impl Drop for WaitGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

impl ConnectionPool {
    /// Create a pool.
    #[must_use]
    pub fn new(config: ConnectionPoolConfig) -> Self {
        let max_size = config.max_size.max(1);
        Self {
            config: ConnectionPoolConfig { max_size, ..config },
            permits: Semaphore::new(max_size),
            waiting: AtomicUsize::new(0),
        }
    }

    /// Pool bounds.
    #[must_use]
    pub const fn config(&self) -> &ConnectionPoolConfig {
        &self.config
    }

    /// Check out a connection, waiting up to the acquire timeout.
    ///
    /// A timeout is a transient connection error.
    pub async fn acquire(&self) -> Result<PooledConnection<'_>, RepositoryError> {
        if let Ok(permit) = self.permits.try_acquire() {
            return Ok(PooledConnection { _permit: permit });
        }

        let _waiting = WaitGuard::enter(&self.waiting);
        match tokio::time::timeout(self.config.acquire_timeout, self.permits.acquire()).await {
            Ok(Ok(permit)) => Ok(PooledConnection { _permit: permit }),
            Ok(Err(_)) => Err(RepositoryError::connection("connection pool is closed")),
            Err(_) => Err(RepositoryError::connection(format!(
                "timed out after {}ms waiting for a connection",
                self.config.acquire_timeout.as_millis()
            ))),
        }
    }
}

impl PoolStatsPort for ConnectionPool {
    fn pool_stats(&self) -> PoolStats {
        let max_size = self.config.max_size;
        let active = max_size.saturating_sub(self.permits.available_permits());
        let total = active.max(self.config.min_size.min(max_size));
        PoolStats {
            active,
            idle: total - active,
            total,
            max_size,
            threads_waiting: self.waiting.load(Ordering::Acquire),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::execution::ErrorClass;
    use std::sync::Arc;

    fn pool(max_size: usize) -> ConnectionPool {
        ConnectionPool::new(ConnectionPoolConfig {
            min_size: 2,
            max_size,
            acquire_timeout: Duration::from_millis(100),
        })
    }

    #[tokio::test]
    async fn stats_track_checked_out_connections() {
        let pool = pool(4);
        assert_eq!(
            pool.pool_stats(),
            PoolStats {
                active: 0,
                idle: 2,
                total: 2,
                max_size: 4,
                threads_waiting: 0
            }
        );

        let a = pool.acquire().await.unwrap();
        let b = pool.acquire().await.unwrap();
        let c = pool.acquire().await.unwrap();
        let stats = pool.pool_stats();
        assert_eq!(stats.active, 3);
        assert_eq!(stats.total, 3);
        assert_eq!(stats.idle, 0);

        drop((a, b, c));
        assert_eq!(pool.pool_stats().active, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_pool_times_out_with_transient_error() {
        let pool = pool(1);
        let _held = pool.acquire().await.unwrap();

        let error = pool.acquire().await.unwrap_err();
        assert_eq!(error.class, ErrorClass::Transient);
        assert_eq!(pool.pool_stats().threads_waiting, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn waiters_are_counted() {
        let pool = Arc::new(pool(1));
        let held = pool.acquire().await.unwrap();

        let waiter = {
            let pool = Arc::clone(&pool);
            tokio::spawn(async move { pool.acquire().await.map(|_| ()) })
        };
        tokio::task::yield_now().await;
        assert_eq!(pool.pool_stats().threads_waiting, 1);

        drop(held);
        waiter.await.unwrap().unwrap();
        assert_eq!(pool.pool_stats().threads_waiting, 0);
    }
}
