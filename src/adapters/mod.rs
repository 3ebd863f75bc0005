//! External system integrations for Shroud.
//!
//! This module provides adapters for the systems a pipeline run touches:
//!
//! - [`database`] - Database abstraction layer (trait-based)
//! - [`postgresql`] - PostgreSQL implementation
//! - [`mysql`] - MySQL implementation (`mysql` feature)
//! - [`memory`] - In-memory implementation used by tests and dry runs
//! - [`tools`] - External dump/load tools (`pg_dump`, `psql`, `mysqldump`, `mysql`)
//!
//! # Design Pattern
//!
//! Adapters follow the **Adapter Pattern** to isolate external dependencies and
//! enable testing with the in-memory engine. The core only ever sees
//! [`database::DatabaseServer`] trait objects.
//!
//! ```rust,no_run
//! use shroud::adapters::database::DatabaseServer;
//! use shroud::adapters::memory::MemoryServer;
//! use shroud::domain::ConnectionDescriptor;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let server = MemoryServer::new();
//! server.create_database("shop");
//!
//! let source = ConnectionDescriptor::from_url("postgresql://app@localhost/shop")?;
//! let mut connection = server.connect(&source).await?;
//! let tables = connection.list_tables().await?;
//! # Ok(())
//! # }
//! ```

pub mod database;
pub mod memory;
#[cfg(feature = "mysql")]
pub mod mysql;
pub mod postgresql;
pub mod tools;
