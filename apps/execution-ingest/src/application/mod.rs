//! Application Layer
//!
//! Use cases and the services and ports they depend on. Nothing here
//! knows about HTTP, the concrete store, or the concrete event stream.

pub mod dto;
pub mod ports;
pub mod services;
pub mod use_cases;
