//! PostgreSQL database integration
//!
//! This module provides the PostgreSQL engine: administrative connections for
//! creating and dropping the shadow database, and catalog-driven table access
//! for row copy and anonymization.

pub mod adapter;
pub mod client;

pub use adapter::PostgresServer;
pub use client::PostgresClient;
