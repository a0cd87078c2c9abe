//! Persistence Adapters
//!
//! Execution store and the connection pool it draws from.

mod in_memory;
mod pool;

pub use in_memory::InMemoryExecutionStore;
pub use pool::{ConnectionPool, ConnectionPoolConfig, PooledConnection};
