//! Database abstraction layer
//!
//! This module provides the trait-based abstraction over database engines, so
//! the provisioner, the row copier and the anonymization walker run unchanged
//! against PostgreSQL, MySQL or the in-memory engine.

pub mod factory;
pub mod traits;

pub use factory::create_server;
pub use traits::{AdminConnection, DatabaseConnection, DatabaseServer, SuppressedChannel};
