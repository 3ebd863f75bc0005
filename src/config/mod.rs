//! Configuration management for Shroud.
//!
//! # Overview
//!
//! Shroud uses TOML configuration files with support for:
//! - Environment variable substitution (`${VAR_NAME}`)
//! - `SHROUD_<SECTION>_<KEY>` environment overrides
//! - Default values for optional settings
//! - Credentials held as zeroizing secrets
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use shroud::config::load_config;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = load_config("shroud.toml")?;
//!
//! println!("Dump file: {}", config.export.dump_file);
//! for (entity, fields) in &config.mapping {
//!     println!("{entity}: {} field(s)", fields.len());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration Structure
//!
//! - [`ApplicationConfig`] - Application settings (log level)
//! - [`SourceConfig`] - Source database connection
//! - [`ShadowConfig`] - Shadow database overrides
//! - [`ProvisionConfig`] - Shadow database creation
//! - [`CopyConfig`] - Bulk copy strategy and tool settings
//! - [`AnonymizationConfig`] - Pagination, seed and constant transforms
//! - [`ExportConfig`] - Final dump
//! - [`LoggingConfig`] - Logging configuration
//!
//! # Example Configuration
//!
//! ```toml
//! [source]
//! engine = "postgresql"
//! host = "localhost"
//! user = "app"
//! password = "${SHROUD_SOURCE_PASSWORD}"
//! database = "shop"
//!
//! [anonymization]
//! pagination = true
//! page_size = 100
//!
//! [mapping.User]
//! email = "unique_email"
//! nickname = "constant_croar"
//! ```

pub mod loader;
pub mod schema;
pub mod secret;

// Re-export commonly used types
pub use loader::{load_config, parse_config};
pub use schema::{
    AnonymizationConfig, ApplicationConfig, CopyConfig, CopyStrategy, ExportConfig,
    LoggingConfig, PoolSettings, ProvisionConfig, ShadowConfig, ShroudConfig, SourceConfig,
};
pub use secret::{secret_string, secret_string_opt, SecretString, SecretValue};
