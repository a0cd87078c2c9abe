//! Resource Monitor
//!
//! Periodically samples connection-pool statistics and publishes the
//! latest snapshot through a `watch` channel, so readers never block on
//! the writer and always see a complete snapshot.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::application::ports::{PoolStats, PoolStatsPort};
use crate::domain::shared::Timestamp;
use crate::observability;

/// Immutable view of connection-pool pressure.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceSnapshot {
    /// Raw pool statistics.
    pub stats: PoolStats,
    /// `active / max_size`, 0.0 when the maximum is unknown.
    pub utilization: f64,
    /// When the sample was taken.
    pub captured_at: Timestamp,
}

impl ResourceSnapshot {
    /// Derive a snapshot from pool statistics.
    #[must_use]
    pub fn from_stats(stats: PoolStats, captured_at: Timestamp) -> Self {
        let utilization = if stats.max_size == 0 {
            0.0
        } else {
            (stats.active as f64 / stats.max_size as f64).clamp(0.0, 1.0)
        };
        Self {
            stats,
            utilization,
            captured_at,
        }
    }

    /// Snapshot of an idle pool.
    #[must_use]
    pub fn idle() -> Self {
        Self::from_stats(PoolStats::default(), Timestamp::now())
    }
}

/// Samples the pool and holds the latest snapshot.
pub struct ResourceMonitor {
    pool: Arc<dyn PoolStatsPort>,
    interval: Duration,
    tx: watch::Sender<ResourceSnapshot>,
}

impl ResourceMonitor {
    /// Create a monitor and take an initial sample.
    #[must_use]
    pub fn new(pool: Arc<dyn PoolStatsPort>, interval: Duration) -> Self {
        let initial = ResourceSnapshot::from_stats(pool.pool_stats(), Timestamp::now());
        let (tx, _rx) = watch::channel(initial);
        Self { pool, interval, tx }
    }

    /// Latest snapshot.
    #[must_use]
    pub fn snapshot(&self) -> ResourceSnapshot {
        *self.tx.borrow()
    }

    /// Receiver that observes every refresh.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ResourceSnapshot> {
        self.tx.subscribe()
    }

    /// Take a sample now and publish it.
    pub fn refresh(&self) -> ResourceSnapshot {
        let snapshot = ResourceSnapshot::from_stats(self.pool.pool_stats(), Timestamp::now());
        self.tx.send_replace(snapshot);
        observability::set_pool_pressure(snapshot.utilization, snapshot.stats.threads_waiting);
        tracing::trace!(
            utilization = snapshot.utilization,
            active = snapshot.stats.active,
            waiting = snapshot.stats.threads_waiting,
            "Pool snapshot refreshed"
        );
        snapshot
    }

    /// Start the refresh loop. Stops when `shutdown` is cancelled.
    pub fn start(self: &Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
        let monitor = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(monitor.interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        monitor.refresh();
                    }
                    () = shutdown.cancelled() => {
                        tracing::info!("Resource monitor shutting down");
                        break;
                    }
                }
            }
        })
    }
}

impl std::fmt::Debug for ResourceMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceMonitor")
            .field("interval", &self.interval)
            .field("snapshot", &self.snapshot())
            .finish_non_exhaustive()
    }
}
