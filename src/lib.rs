// Shroud - Anonymized shadow copies of production databases
// Copyright (c) 2025 Shroud Contributors
// Licensed under the MIT License

//! # Shroud - Anonymized Database Dumps
//!
//! Shroud produces a shareable dump of a production database in which
//! personally identifying fields have been rewritten. The source database is
//! only ever read: every write lands in a disposable shadow database.
//!
//! ## Overview
//!
//! A run goes through five stages:
//! - **Validate** the configuration and check the mapping against the transform registry
//! - **Provision** the shadow database (drop it if stale, then create it)
//! - **Copy** the source into the shadow with the engine's dump/load tools or row by row
//! - **Anonymize** the mapped fields in place, one committed batch per page
//! - **Export** the shadow database to a dump file
//!
//! ## Architecture
//!
//! - [`cli`] - Command-line interface and argument parsing
//! - [`core`] - Provisioning, bulk copy, the anonymization walker and the pipeline
//! - [`transform`] - Transform registry and the built-in transforms
//! - [`adapters`] - Database engines (PostgreSQL, MySQL, in-memory) and client tools
//! - [`domain`] - Core domain types and models
//! - [`config`] - Configuration management
//! - [`logging`] - Structured logging and observability
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use shroud::config::load_config;
//! use shroud::core::pipeline::PipelineRun;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = load_config("shroud.toml")?;
//!
//!     let outcome = PipelineRun::new(config)?.execute().await;
//!
//!     if let Some(walk) = &outcome.summary().walk {
//!         println!("Rewrote {} fields", walk.fields_rewritten());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Transforms
//!
//! A mapping assigns a transform identifier to each field of an entity:
//!
//! ```toml
//! [mapping.User]
//! email = "unique_email"
//! nickname = "constant_croar"
//! ```
//!
//! Identifiers resolve through [`transform::TransformRegistry`]. Stateful
//! transforms such as `unique_email` keep their state for a whole run, so
//! values stay distinct across pages.
//!
//! ## Error Handling
//!
//! Every fallible operation returns [`domain::Result`], whose error is
//! [`domain::ShroudError`]. A failed run reports the stage it stopped at and
//! leaves the shadow database in place for inspection.

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod logging;
pub mod transform;
