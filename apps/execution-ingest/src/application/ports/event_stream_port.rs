//! Event Stream Port (Driven Port)
//!
//! Interface for sending keyed payloads to a named destination on a
//! distributed log. The dead-letter route uses the same interface.

use async_trait::async_trait;

/// Event stream send error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StreamSendError {
    /// The send did not complete in time.
    #[error("Event stream send timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// The stream could not be reached.
    #[error("Event stream connection error: {message}")]
    Connection { message: String },

    /// The stream refused the record.
    #[error("Event stream rejected record (status {status}): {message}")]
    Rejected { status: u16, message: String },
}

/// Port for sending records to the event stream.
#[async_trait]
pub trait EventStreamPort: Send + Sync {
    /// Send one keyed payload to `destination`.
    async fn send(&self, destination: &str, key: &str, payload: &str)
    -> Result<(), StreamSendError>;
}
