//! Execution Bounded Context
//!
//! Trade-execution records as they move from an inbound request to a
//! durably stored row.
//!
//! # Key Concepts
//!
//! - **ExecutionRequest**: raw, client-supplied item; immutable once submitted
//! - **NewExecution**: a request that passed validation, ready for insert
//! - **PersistedExecution**: a stored row with server-assigned identity
//! - **ExecutionRepository**: persistence port with classified errors

pub mod record;
pub mod repository;
pub mod request;
pub mod validation;
pub mod value_objects;

pub use record::{NewExecution, PersistedExecution};
pub use repository::{ErrorClass, ExecutionRepository, RepositoryError, RepositoryErrorKind};
pub use request::ExecutionRequest;
pub use validation::{ExecutionValidator, ValidationError, ValidationRule};
pub use value_objects::{ExecutionStatus, TradeType};
