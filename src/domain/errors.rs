//! Domain error types
//!
//! This module defines the error hierarchy for Shroud. Every fatal error unwinds
//! to the top of a pipeline run; per-field skips are a policy of the walker and
//! never surface here.

use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Main Shroud error type
///
/// This is the primary error type used throughout the library.
#[derive(Debug, Error)]
pub enum ShroudError {
    /// The shadow database could not be created, or a stale one could not be dropped
    #[error("Provisioning error: {0}")]
    Provisioning(String),

    /// Export, import or row copy failed
    #[error("Copy error: {0}")]
    Copy(#[from] CopyError),

    /// Configuration-related errors, including unregistered transforms at setup time
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// An external dump/load process exceeded its timeout
    #[error("Timeout: {0}")]
    Timeout(#[from] ProcessTimeout),

    /// Database-related errors (generic)
    #[error("Database error: {0}")]
    Database(String),

    /// Network/connection errors
    #[error("Connection error: {0}")]
    Connection(String),

    /// Failures while rewriting rows in the shadow database
    #[error("Anonymization error: {0}")]
    Anonymization(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors with context
    #[error("{0}")]
    Other(String),
}

/// Bulk copy errors
///
/// Raised by the dump/load tools and by the row copier. A copy error leaves the
/// shadow database in place so an operator can inspect it.
#[derive(Debug, Error)]
pub enum CopyError {
    /// The dump file does not exist
    #[error("Dump file not found: {0}")]
    DumpFileMissing(String),

    /// The dump file exists but has zero length
    #[error("Dump file is empty: {0}")]
    DumpFileEmpty(String),

    /// A dump/load tool exited unsuccessfully
    #[error("{tool} did not end successfully{}", ProcessOutput::new(.exit_code, .stdout, .stderr))]
    ProcessFailed {
        tool: String,
        exit_code: Option<i32>,
        stdout: String,
        stderr: String,
    },

    /// A row could not be inserted into the shadow database
    #[error("Failed to insert row into {table}: {message} (row: {row})")]
    RowInsertFailed {
        table: String,
        row: String,
        message: String,
    },

    /// The shadow database has no tables to copy rows into
    #[error("Shadow database has no tables; install the schema before a row copy")]
    ShadowSchemaMissing,

    /// A source table has no counterpart in the shadow database
    #[error("Table {0} does not exist in the shadow database")]
    TableMissing(String),

    /// A tool was started without a required connection parameter
    #[error("Parameter `{0}` cannot be empty")]
    MissingParameter(String),
}

/// Child process timeout with everything captured before it was killed
#[derive(Debug, Error)]
#[error("{tool} exceeded its timeout of {}s{}", .timeout.as_secs(), ProcessOutput::new(.exit_code, .stdout, .stderr))]
pub struct ProcessTimeout {
    pub tool: String,
    pub timeout: Duration,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

/// Renders the exit code and captured streams of a child process
struct ProcessOutput<'a> {
    exit_code: Option<i32>,
    stdout: &'a str,
    stderr: &'a str,
}

impl<'a> ProcessOutput<'a> {
    fn new(exit_code: &Option<i32>, stdout: &'a str, stderr: &'a str) -> Self {
        Self {
            exit_code: *exit_code,
            stdout,
            stderr,
        }
    }
}

impl fmt::Display for ProcessOutput<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let or_placeholder = |s: &str| {
            if s.trim().is_empty() {
                "<no output>".to_string()
            } else {
                s.trim_end().to_string()
            }
        };
        let code = self
            .exit_code
            .map(|c| c.to_string())
            .unwrap_or_else(|| "<none>".to_string());
        write!(
            f,
            "\n\nExit code\n=========\n{}\n\nOutput\n======\n{}\n\nError Output\n============\n{}",
            code,
            or_placeholder(self.stdout),
            or_placeholder(self.stderr)
        )
    }
}

// Conversion from std::io::Error
impl From<std::io::Error> for ShroudError {
    fn from(err: std::io::Error) -> Self {
        ShroudError::Io(err.to_string())
    }
}

// Conversion from serde_json::Error
impl From<serde_json::Error> for ShroudError {
    fn from(err: serde_json::Error) -> Self {
        ShroudError::Serialization(err.to_string())
    }
}

// Conversion from toml parse errors
impl From<toml::de::Error> for ShroudError {
    fn from(err: toml::de::Error) -> Self {
        ShroudError::Configuration(format!("TOML parse error: {err}"))
    }
}
