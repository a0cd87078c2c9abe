//! Messaging Adapters
//!
//! Event-stream clients implementing `EventStreamPort`.

mod http_stream;
mod in_memory;

pub use http_stream::HttpEventStreamClient;
pub use in_memory::{InMemoryEventStream, StreamRecord};
