//! Core business logic for Shroud.
//!
//! # Modules
//!
//! - [`provision`] - Shadow database creation and lifecycle events
//! - [`copy`] - Bulk copy of the source into the shadow database
//! - [`anonymize`] - The page-by-page anonymization walker
//! - [`pipeline`] - Sequential orchestration of one run
//!
//! # Run Workflow
//!
//! 1. **Validate**: Parse the mapping, build a fresh transform registry
//! 2. **Provision**: Drop any stale shadow database and create a new one
//! 3. **Copy**: Dump/load (or row copy) the source into the shadow database
//! 4. **Anonymize**: Rewrite the mapped fields, one committed page at a time
//! 5. **Export**: Dump the anonymized shadow database to a file
//!
//! # Example
//!
//! ```rust,no_run
//! use shroud::config::load_config;
//! use shroud::core::pipeline::PipelineRun;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = load_config("shroud.toml")?;
//! let outcome = PipelineRun::new(config)?.execute().await;
//!
//! if let Some(walk) = &outcome.summary().walk {
//!     println!("Rows anonymized: {}", walk.rows_visited());
//! }
//! # Ok(())
//! # }
//! ```

pub mod anonymize;
pub mod copy;
pub mod pipeline;
pub mod provision;
