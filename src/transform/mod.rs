//! Field-level transforms
//!
//! A transform rewrites one column value at a time. Instances live for a whole
//! pipeline run and are shared by every entity that references them, so any
//! state they keep (issued values, counters) is global to the run.
//!
//! # Example
//!
//! ```
//! use shroud::domain::FieldValue;
//! use shroud::transform::{Transform, TransformRegistry};
//!
//! let mut registry = TransformRegistry::with_builtins(Some(7));
//! let constant = registry.resolve("constant_croar").unwrap();
//! assert_eq!(constant.transform(FieldValue::Null), FieldValue::from("CROAR"));
//! ```

pub mod basic;
pub mod constant;
pub mod registry;
pub mod unique;

use crate::domain::FieldValue;

pub use basic::{NullTransform, RedactTransform, TokenTransform};
pub use constant::ConstantTransform;
pub use registry::TransformRegistry;
pub use unique::{CandidateGenerator, EmailGenerator, UniqueValueTransform};

/// A value rewriting function with optional run-scoped state
///
/// Implementations must be total: once registered, `transform` returns a value
/// for every input, including `Null`. They see only the value, never the row.
pub trait Transform: Send {
    /// Stable identifier used in the mapping
    fn id(&self) -> &str;

    /// Rewrites one value
    fn transform(&mut self, value: FieldValue) -> FieldValue;

    /// Forgets any state accumulated during a run
    fn reset(&mut self) {}
}
