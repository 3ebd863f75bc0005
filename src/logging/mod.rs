//! Logging and observability
//!
//! Structured logging through `tracing`, plus a handful of macros that keep the
//! field names of stage and page events consistent across the pipeline.
//!
//! # Example
//!
//! ```no_run
//! use shroud::logging::init_logging;
//! use shroud::config::LoggingConfig;
//!
//! let config = LoggingConfig::default();
//! let _guard = init_logging("info", &config).expect("Failed to initialize logging");
//!
//! tracing::info!("Application started");
//! ```

pub mod structured;

pub use structured::{init_logging, LoggingGuard};

/// Log the start of a pipeline stage
///
/// # Example
///
/// ```no_run
/// use shroud::log_stage_start;
///
/// log_stage_start!("provision", "shop_anonymous");
/// ```
#[macro_export]
macro_rules! log_stage_start {
    ($stage:expr, $database:expr) => {
        tracing::info!(stage = %$stage, database = %$database, "Stage started");
    };
}

/// Log the completion of a pipeline stage
///
/// # Example
///
/// ```no_run
/// use shroud::log_stage_complete;
/// use std::time::Duration;
///
/// log_stage_complete!("copy", Duration::from_secs(12));
/// ```
#[macro_export]
macro_rules! log_stage_complete {
    ($stage:expr, $duration:expr) => {
        tracing::info!(
            stage = %$stage,
            duration_ms = $duration.as_millis() as u64,
            "Stage completed"
        );
    };
}

/// Log a committed page of the anonymization walker
///
/// # Example
///
/// ```no_run
/// use shroud::log_page_committed;
///
/// log_page_committed!("User", 2, 100);
/// ```
#[macro_export]
macro_rules! log_page_committed {
    ($entity:expr, $page:expr, $rows:expr) => {
        tracing::debug!(entity = %$entity, page = $page, rows = $rows, "Page committed");
    };
}

/// Log an error with context
///
/// # Example
///
/// ```no_run
/// use shroud::log_error_with_context;
/// use shroud::domain::ShroudError;
///
/// let error = ShroudError::Configuration("Invalid config".to_string());
/// log_error_with_context!(&error, "Failed to load configuration");
/// ```
#[macro_export]
macro_rules! log_error_with_context {
    ($error:expr, $context:expr) => {
        tracing::error!(
            error = %$error,
            context = $context,
            "Error occurred"
        );
    };
}
