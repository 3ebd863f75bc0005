//! Error context extension trait
//!
//! Adds `.context()` and `.with_context()` to any `Result` whose error converts
//! into [`ShroudError`]. Unlike `anyhow::Context`, the error keeps its variant so
//! the CLI can still map it to the right exit code.
//!
//! # Examples
//!
//! ```rust
//! use shroud::domain::Result;
//! use shroud::domain::context::ResultExt;
//!
//! fn read_mapping(path: &str) -> Result<String> {
//!     std::fs::read_to_string(path).context(format!("Failed to read file: {}", path))
//! }
//! ```

use crate::domain::errors::ShroudError;
use crate::domain::result::Result;

/// Extension trait for adding context to `Result` types
pub trait ResultExt<T> {
    /// Add context to an error
    fn context<C>(self, context: C) -> Result<T>
    where
        C: std::fmt::Display + Send + Sync + 'static;

    /// Add context to an error, computing it only when an error occurs
    fn with_context<C, F>(self, f: F) -> Result<T>
    where
        C: std::fmt::Display + Send + Sync + 'static,
        F: FnOnce() -> C;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: Into<ShroudError>,
{
    fn context<C>(self, context: C) -> Result<T>
    where
        C: std::fmt::Display + Send + Sync + 'static,
    {
        self.map_err(|e| prefix(e.into(), &context))
    }

    fn with_context<C, F>(self, f: F) -> Result<T>
    where
        C: std::fmt::Display + Send + Sync + 'static,
        F: FnOnce() -> C,
    {
        self.map_err(|e| prefix(e.into(), &f()))
    }
}

// Structured variants (copy and timeout) carry their own diagnostics and are
// returned untouched.
fn prefix(error: ShroudError, context: &dyn std::fmt::Display) -> ShroudError {
    let wrap = |msg: String| format!("{context}: {msg}");
    match error {
        ShroudError::Provisioning(m) => ShroudError::Provisioning(wrap(m)),
        ShroudError::Configuration(m) => ShroudError::Configuration(wrap(m)),
        ShroudError::Database(m) => ShroudError::Database(wrap(m)),
        ShroudError::Connection(m) => ShroudError::Connection(wrap(m)),
        ShroudError::Anonymization(m) => ShroudError::Anonymization(wrap(m)),
        ShroudError::Io(m) => ShroudError::Io(wrap(m)),
        ShroudError::Serialization(m) => ShroudError::Serialization(wrap(m)),
        ShroudError::Other(m) => ShroudError::Other(wrap(m)),
        other @ (ShroudError::Copy(_) | ShroudError::Timeout(_)) => other,
    }
}
