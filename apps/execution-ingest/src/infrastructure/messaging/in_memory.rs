//! In-memory event stream.
//!
//! Records every accepted send per destination. Destinations can be taken
//! down and brought back to simulate broker outages.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::application::ports::{EventStreamPort, StreamSendError};

/// A record accepted by the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamRecord {
    /// Destination.
    pub destination: String,
    /// Record key.
    pub key: String,
    /// Payload.
    pub payload: String,
}

/// In-memory implementation of `EventStreamPort`.
#[derive(Debug, Default)]
pub struct InMemoryEventStream {
    records: RwLock<Vec<StreamRecord>>,
    unavailable: RwLock<HashSet<String>>,
    refused: RwLock<HashMap<String, u64>>,
}

impl InMemoryEventStream {
    /// Create an empty stream.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse sends to `destination` until `restore` is called.
    pub fn take_down(&self, destination: &str) {
        self.unavailable.write().insert(destination.to_string());
    }

    /// Accept sends to `destination` again.
    pub fn restore(&self, destination: &str) {
        self.unavailable.write().remove(destination);
    }

    /// Accepted records for `destination`, in send order.
    #[must_use]
    pub fn records(&self, destination: &str) -> Vec<StreamRecord> {
        self.records
            .read()
            .iter()
            .filter(|r| r.destination == destination)
            .cloned()
            .collect()
    }

    /// Sends refused for `destination`.
    #[must_use]
    pub fn refused(&self, destination: &str) -> u64 {
        self.refused.read().get(destination).copied().unwrap_or(0)
    }
}

#[async_trait]
impl EventStreamPort for InMemoryEventStream {
    async fn send(
        &self,
        destination: &str,
        key: &str,
        payload: &str,
    ) -> Result<(), StreamSendError> {
        if self.unavailable.read().contains(destination) {
            *self
                .refused
                .write()
                .entry(destination.to_string())
                .or_default() += 1;
            return Err(StreamSendError::Connection {
                message: format!("destination '{destination}' unavailable"),
            });
        }

        self.records.write().push(StreamRecord {
            destination: destination.to_string(),
            key: key.to_string(),
            payload: payload.to_string(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn records_sends_per_destination() {
        let stream = InMemoryEventStream::new();
        stream.send("a", "1", "x").await.unwrap();
        stream.send("b", "2", "y").await.unwrap();

        assert_eq!(stream.records("a").len(), 1);
        assert_eq!(stream.records("b")[0].key, "2");
    }

    #[tokio::test]
    async fn unavailable_destination_refuses_sends() {
        let stream = InMemoryEventStream::new();
        stream.take_down("a");
        assert!(stream.send("a", "1", "x").await.is_err());
        assert!(stream.send("b", "1", "x").await.is_ok());
        assert_eq!(stream.refused("a"), 1);

        stream.restore("a");
        assert!(stream.send("a", "1", "x").await.is_ok());
    }
}
