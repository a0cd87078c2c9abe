//! In-memory execution store.
//!
//! Every call checks out a pooled connection, so the resource monitor sees
//! real pressure. Bulk inserts are all-or-nothing. External reference ids
//! are unique across stored rows; a duplicate is a permanent constraint
//! violation.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;

use super::pool::ConnectionPool;
use crate::domain::execution::{
    ExecutionRepository, NewExecution, PersistedExecution, RepositoryError,
};
use crate::domain::shared::ExecutionId;

#[derive(Debug, Default)]
struct StoreState {
    rows: BTreeMap<ExecutionId, PersistedExecution>,
    references: HashMap<String, ExecutionId>,
    last_id: u64,
}

impl StoreState {
    fn check_references<'a>(
        &self,
        records: impl IntoIterator<Item = &'a NewExecution>,
    ) -> Result<(), RepositoryError> {
        let mut seen = HashSet::new();
        for reference in records
            .into_iter()
            .filter_map(|r| r.external_reference_id.as_deref())
        {
            if self.references.contains_key(reference) || !seen.insert(reference) {
                return Err(RepositoryError::constraint_violation(format!(
                    "duplicate externalReferenceId '{reference}'"
                )));
            }
        }
        Ok(())
    }

    fn store(&mut self, record: &NewExecution) -> PersistedExecution {
        self.last_id += 1;
        let id = ExecutionId::new(self.last_id);
        let row = PersistedExecution::from_new(id, record.clone());
        if let Some(reference) = &row.external_reference_id {
            self.references.insert(reference.clone(), id);
        }
        self.rows.insert(id, row.clone());
        row
    }
}

/// In-memory implementation of `ExecutionRepository`.
#[derive(Debug)]
pub struct InMemoryExecutionStore {
    pool: Arc<ConnectionPool>,
    state: RwLock<StoreState>,
    latency: Duration,
}

impl InMemoryExecutionStore {
    /// Create an empty store behind `pool`.
    #[must_use]
    pub fn new(pool: Arc<ConnectionPool>) -> Self {
        Self {
            pool,
            state: RwLock::new(StoreState::default()),
            latency: Duration::ZERO,
        }
    }

    /// Hold each connection for `latency` before answering.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// The pool this store draws connections from.
    #[must_use]
    pub const fn pool(&self) -> &Arc<ConnectionPool> {
        &self.pool
    }

    /// Number of stored executions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.read().rows.len()
    }

    /// Check if the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.read().rows.is_empty()
    }

    /// Look up a stored execution.
    #[must_use]
    pub fn get(&self, id: ExecutionId) -> Option<PersistedExecution> {
        self.state.read().rows.get(&id).cloned()
    }

    /// All stored executions in id order.
    #[must_use]
    pub fn all(&self) -> Vec<PersistedExecution> {
        self.state.read().rows.values().cloned().collect()
    }

    async fn simulate_latency(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }
}

#[async_trait]
impl ExecutionRepository for InMemoryExecutionStore {
    async fn insert_all(
        &self,
        records: &[NewExecution],
    ) -> Result<Vec<PersistedExecution>, RepositoryError> {
        let _conn = self.pool.acquire().await?;
        self.simulate_latency().await;

        let mut state = self.state.write();
        state.check_references(records)?;
        Ok(records.iter().map(|r| state.store(r)).collect())
    }

    async fn insert(&self, record: &NewExecution) -> Result<PersistedExecution, RepositoryError> {
        let _conn = self.pool.acquire().await?;
        self.simulate_latency().await;

        let mut state = self.state.write();
        state.check_references(std::iter::once(record))?;
        Ok(state.store(record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::PoolStatsPort;
    use crate::domain::execution::{ErrorClass, ExecutionStatus, RepositoryErrorKind, TradeType};
    use crate::domain::shared::Timestamp;
    use crate::infrastructure::persistence::ConnectionPoolConfig;
    use rust_decimal_macros::dec;

    fn store() -> InMemoryExecutionStore {
        InMemoryExecutionStore::new(Arc::new(ConnectionPool::new(
            ConnectionPoolConfig::default(),
        )))
    }

    fn record(reference: Option<&str>) -> NewExecution {
        NewExecution {
            status: ExecutionStatus::New,
            trade_type: TradeType::Buy,
            destination: "NYSE".to_string(),
            security_id: "IBM".to_string(),
            quantity: dec!(5),
            limit_price: None,
            external_reference_id: reference.map(str::to_string),
            version: 0,
            received_at: Timestamp::now(),
        }
    }

    #[tokio::test]
    async fn bulk_insert_assigns_sequential_ids() {
        let store = store();
        let rows = store
            .insert_all(&[record(Some("a")), record(None), record(Some("b"))])
            .await
            .unwrap();

        let ids: Vec<u64> = rows.iter().map(|r| r.id.value()).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(store.len(), 3);
        assert_eq!(store.get(ExecutionId::new(2)).unwrap().quantity_filled, dec!(0));
    }

    #[tokio::test]
    async fn bulk_insert_is_all_or_nothing() {
        let store = store();
        store.insert(&record(Some("dup"))).await.unwrap();

        let error = store
            .insert_all(&[record(Some("new")), record(Some("dup"))])
            .await
            .unwrap_err();

        assert_eq!(error.class, ErrorClass::Permanent);
        assert_eq!(error.kind, RepositoryErrorKind::ConstraintViolation);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn duplicate_within_one_bulk_is_rejected() {
        let store = store();
        let result = store
            .insert_all(&[record(Some("x")), record(Some("x"))])
            .await;
        assert!(result.is_err());
        assert!(store.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn latency_holds_the_connection() {
        let store = Arc::new(store().with_latency(Duration::from_millis(50)));
        let pending = {
            let store = Arc::clone(&store);
            tokio::spawn(async move { store.insert(&record(None)).await })
        };
        tokio::task::yield_now().await;

        assert_eq!(store.pool().pool_stats().active, 1);
        pending.await.unwrap().unwrap();
        assert_eq!(store.pool().pool_stats().active, 0);
    }
}
