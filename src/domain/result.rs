//! Result type alias for Shroud
//!
//! This module provides a convenient Result type alias that uses ShroudError
//! as the error type.

use super::errors::ShroudError;

/// Result type alias for Shroud operations
///
/// # Examples
///
/// ```
/// use shroud::domain::result::Result;
/// use shroud::domain::errors::ShroudError;
///
/// fn example_function() -> Result<String> {
///     Ok("success".to_string())
/// }
///
/// fn failing_function() -> Result<()> {
///     Err(ShroudError::Configuration("Invalid input".to_string()))
/// }
/// ```
pub type Result<T> = std::result::Result<T, ShroudError>;
