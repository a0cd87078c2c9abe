//! Adaptive Batch Sizer
//!
//! Chooses the persistence chunk size from connection-pool pressure and
//! the outcome of the previous chunk. Re-evaluation happens at most once
//! per optimization interval; between evaluations every caller reads the
//! same size. State lives in atomics so concurrent batches never block.
//!
//! # Decision Rules
//!
//! | Condition | Factor |
//! |-----------|--------|
//! | last chunk failed, or utilization >= critical | 0.6 |
//! | utilization >= high, or waiters > limit | 0.8 |
//! | last chunk slower than threshold | 0.8 |
//! | utilization < low, no waiters, last chunk fast | 1.2 |
//! | otherwise | 1.0 |
//!
//! The result is clamped to `[min_size, max_size]`.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use tokio::time::Instant;

use super::resource_monitor::{ResourceMonitor, ResourceSnapshot};
use crate::application::dto::BatchStatsDto;
use crate::observability;

const SHRINK_AGGRESSIVE: f64 = 0.6;
const SHRINK_MODERATE: f64 = 0.8;
const GROW: f64 = 1.2;

/// Runtime settings for adaptive sizing.
#[derive(Debug, Clone)]
pub struct AdaptiveSizingConfig {
    /// When false, `fixed_chunk_size` is always used.
    pub enabled: bool,
    /// Chunk size when disabled, and the starting size when enabled.
    pub fixed_chunk_size: usize,
    /// Lower bound.
    pub min_size: usize,
    /// Upper bound.
    pub max_size: usize,
    /// Minimum time between re-evaluations.
    pub optimization_interval: Duration,
    /// Utilization that triggers an aggressive shrink.
    pub critical_utilization: f64,
    /// Utilization that triggers a moderate shrink.
    pub high_utilization: f64,
    /// Utilization below which the size may grow.
    pub low_utilization: f64,
    /// Waiting callers above which the size shrinks.
    pub max_threads_waiting: usize,
    /// Chunk duration above which the size shrinks.
    pub slow_batch_threshold: Duration,
}

impl Default for AdaptiveSizingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            fixed_chunk_size: 500,
            min_size: 50,
            max_size: 1000,
            optimization_interval: Duration::from_secs(30),
            critical_utilization: 0.95,
            high_utilization: 0.80,
            low_utilization: 0.5,
            max_threads_waiting: 2,
            slow_batch_threshold: Duration::from_secs(5),
        }
    }
}

/// Outcome of the most recent chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkOutcome {
    /// Records in the chunk.
    pub size: usize,
    /// Time spent persisting it.
    pub duration: Duration,
    /// False when the bulk insert failed.
    pub success: bool,
}

/// Adaptive chunk sizer.
#[derive(Debug)]
pub struct AdaptiveBatchSizer {
    config: AdaptiveSizingConfig,
    monitor: Option<Arc<ResourceMonitor>>,
    current: AtomicUsize,
    origin: Instant,
    /// Milliseconds since `origin` of the last evaluation.
    last_evaluated_ms: AtomicU64,
    has_outcome: AtomicBool,
    last_size: AtomicUsize,
    last_duration_ms: AtomicU64,
    last_success: AtomicBool,
}

impl AdaptiveBatchSizer {
    /// Create a sizer. Without a monitor, the pool is treated as idle.
    #[must_use]
    pub fn new(config: AdaptiveSizingConfig, monitor: Option<Arc<ResourceMonitor>>) -> Self {
        let initial = config
            .fixed_chunk_size
            .clamp(config.min_size.max(1), config.max_size.max(1));
        observability::set_adaptive_batch_size(initial);
        Self {
            config,
            monitor,
            current: AtomicUsize::new(initial),
            origin: Instant::now(),
            last_evaluated_ms: AtomicU64::new(0),
            has_outcome: AtomicBool::new(false),
            last_size: AtomicUsize::new(0),
            last_duration_ms: AtomicU64::new(0),
            last_success: AtomicBool::new(true),
        }
    }

    /// Chunk size to use for `requested` records about to be persisted.
    ///
    /// When adaptive sizing is disabled this is the fixed chunk size.
    /// Otherwise the size is re-evaluated if the optimization interval has
    /// elapsed and the current value is returned.
    pub fn optimal_size(&self, requested: usize) -> usize {
        if !self.config.enabled {
            return self.config.fixed_chunk_size.max(1);
        }
        self.maybe_optimize();
        let size = self.current.load(Ordering::Acquire);
        tracing::trace!(requested, size, "Chunk size selected");
        size
    }

    /// Record how the last chunk went.
    pub fn record_outcome(&self, size: usize, duration: Duration, success: bool) {
        self.last_size.store(size, Ordering::Relaxed);
        self.last_duration_ms
            .store(duration.as_millis() as u64, Ordering::Relaxed);
        self.last_success.store(success, Ordering::Relaxed);
        self.has_outcome.store(true, Ordering::Release);
    }

    /// Current size without re-evaluating.
    #[must_use]
    pub fn current_size(&self) -> usize {
        if self.config.enabled {
            self.current.load(Ordering::Acquire)
        } else {
            self.config.fixed_chunk_size.max(1)
        }
    }

    /// Most recent chunk outcome, if any.
    #[must_use]
    pub fn last_outcome(&self) -> Option<ChunkOutcome> {
        if !self.has_outcome.load(Ordering::Acquire) {
            return None;
        }
        Some(ChunkOutcome {
            size: self.last_size.load(Ordering::Relaxed),
            duration: Duration::from_millis(self.last_duration_ms.load(Ordering::Relaxed)),
            success: self.last_success.load(Ordering::Relaxed),
        })
    }

    /// Settings in use.
    #[must_use]
    pub const fn config(&self) -> &AdaptiveSizingConfig {
        &self.config
    }

    /// Latest pool snapshot seen by the sizer.
    #[must_use]
    pub fn resource_snapshot(&self) -> ResourceSnapshot {
        self.monitor
            .as_ref()
            .map_or_else(ResourceSnapshot::idle, |m| m.snapshot())
    }

    /// Sizing and pool view for the stats endpoint.
    #[must_use]
    pub fn stats(&self) -> BatchStatsDto {
        let snapshot = self.resource_snapshot();
        let last = self.last_outcome();
        BatchStatsDto {
            adaptive_enabled: self.config.enabled,
            current_chunk_size: self.current_size(),
            min_size: self.config.min_size,
            max_size: self.config.max_size,
            pool_utilization: snapshot.utilization,
            threads_waiting: snapshot.stats.threads_waiting,
            active_connections: snapshot.stats.active,
            last_chunk_size: last.map(|o| o.size),
            last_chunk_duration_ms: last.map(|o| o.duration.as_millis() as u64),
        }
    }

    /// Re-evaluate if the interval has elapsed. Exactly one caller wins
    /// each window.
    fn maybe_optimize(&self) {
        let now_ms = self.origin.elapsed().as_millis() as u64;
        let last = self.last_evaluated_ms.load(Ordering::Acquire);
        let interval_ms = self.config.optimization_interval.as_millis() as u64;
        if now_ms.saturating_sub(last) < interval_ms {
            return;
        }
        if self
            .last_evaluated_ms
            .compare_exchange(last, now_ms, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }

        let snapshot = self.resource_snapshot();
        let factor = self.adjustment_factor(&snapshot, self.last_outcome());
        let current = self.current.load(Ordering::Acquire);
        let next = self.apply(current, factor);
        if next != current {
            self.current.store(next, Ordering::Release);
            observability::set_adaptive_batch_size(next);
            tracing::info!(
                from = current,
                to = next,
                factor,
                utilization = snapshot.utilization,
                threads_waiting = snapshot.stats.threads_waiting,
                "Adaptive chunk size adjusted"
            );
        }
    }

    fn adjustment_factor(&self, snapshot: &ResourceSnapshot, last: Option<ChunkOutcome>) -> f64 {
        let config = &self.config;
        let failed = last.is_some_and(|o| !o.success);
        let slow = last.is_some_and(|o| o.duration > config.slow_batch_threshold);
        let fast = last.is_some_and(|o| o.success && o.duration <= config.slow_batch_threshold);
        let waiting = snapshot.stats.threads_waiting;

        if failed || snapshot.utilization >= config.critical_utilization {
            SHRINK_AGGRESSIVE
        } else if snapshot.utilization >= config.high_utilization
            || waiting > config.max_threads_waiting
            || slow
        {
            SHRINK_MODERATE
        } else if snapshot.utilization < config.low_utilization && waiting == 0 && fast {
            GROW
        } else {
            1.0
        }
    }

    fn apply(&self, current: usize, factor: f64) -> usize {
        let scaled = current as f64 * factor;
        // Absorb float error so 500 × 0.6 lands on 300, not 299.
        let next = if factor > 1.0 {
            (scaled - 1e-9).ceil()
        } else {
            (scaled + 1e-9).floor()
        } as usize;
        next.clamp(self.config.min_size.max(1), self.config.max_size.max(1))
    }
}
