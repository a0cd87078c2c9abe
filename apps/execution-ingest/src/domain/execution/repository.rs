//! Execution Repository Trait
//!
//! Persistence port for executions. Implemented by adapters in the
//! infrastructure layer. Every error carries an explicit classification
//! so callers decide retry eligibility without inspecting messages.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::record::{NewExecution, PersistedExecution};

/// Whether retrying the failed operation may succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorClass {
    /// Contention, lock timeouts, lost connections.
    Transient,
    /// Constraint violations and other data errors.
    Permanent,
}

/// What went wrong in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RepositoryErrorKind {
    /// Unique or check constraint violated.
    ConstraintViolation,
    /// Deadlock or serialization failure.
    Deadlock,
    /// Call or lock wait exceeded its deadline.
    Timeout,
    /// Connection lost or could not be acquired.
    Connection,
    /// Anything else.
    Other,
}

impl fmt::Display for RepositoryErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::ConstraintViolation => "constraint violation",
            Self::Deadlock => "deadlock",
            Self::Timeout => "timeout",
            Self::Connection => "connection error",
            Self::Other => "storage error",
        };
        f.write_str(label)
    }
}

/// A classified persistence failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct RepositoryError {
    /// Retry eligibility.
    pub class: ErrorClass,
    /// Failure kind.
    pub kind: RepositoryErrorKind,
    /// Store-provided detail.
    pub message: String,
}

impl RepositoryError {
    /// Build an error with an explicit classification.
    pub fn new(class: ErrorClass, kind: RepositoryErrorKind, message: impl Into<String>) -> Self {
        Self {
            class,
            kind,
            message: message.into(),
        }
    }

    /// Permanent constraint violation.
    pub fn constraint_violation(message: impl Into<String>) -> Self {
        Self::new(
            ErrorClass::Permanent,
            RepositoryErrorKind::ConstraintViolation,
            message,
        )
    }

    /// Transient deadlock.
    pub fn deadlock(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Transient, RepositoryErrorKind::Deadlock, message)
    }

    /// Transient timeout.
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Transient, RepositoryErrorKind::Timeout, message)
    }

    /// Transient connection failure.
    pub fn connection(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Transient, RepositoryErrorKind::Connection, message)
    }

    /// Permanent, unclassified failure.
    pub fn other(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Permanent, RepositoryErrorKind::Other, message)
    }

    /// True when a retry may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        self.class == ErrorClass::Transient
    }
}

/// Repository trait for execution persistence.
#[async_trait]
pub trait ExecutionRepository: Send + Sync {
    /// Insert all records in one statement.
    ///
    /// All-or-nothing: either every record is stored and returned in input
    /// order, or nothing is stored.
    ///
    /// # Errors
    ///
    /// Returns a classified error if any record cannot be stored.
    async fn insert_all(
        &self,
        records: &[NewExecution],
    ) -> Result<Vec<PersistedExecution>, RepositoryError>;

    /// Insert a single record.
    ///
    /// # Errors
    ///
    /// Returns a classified error if the record cannot be stored.
    async fn insert(&self, record: &NewExecution) -> Result<PersistedExecution, RepositoryError>;
}
