//! Infrastructure Layer
//!
//! This module contains all adapters (implementations) for the ports defined
//! in the domain and application layers. Following hexagonal architecture:
//!
//! - **Driven Adapters (Outbound)**: Implement ports for external systems
//!   - `persistence/`: Execution store and connection pool
//!   - `messaging/`: Event-stream clients
//!
//! - **Driver Adapters (Inbound)**: Expose application to external world
//!   - `http/`: REST API controllers
//!
//! - **Wiring**
//!   - `config/`: Dependency injection container

pub mod config;
pub mod http;
pub mod messaging;
pub mod persistence;
