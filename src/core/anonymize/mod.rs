//! Anonymization of the shadow database
//!
//! - [`accessor`] - entity → table and field → column resolution, built once per run
//! - [`walker`] - the page-by-page rewrite loop
//! - [`progress`] - count-based progress signal

pub mod accessor;
pub mod progress;
pub mod walker;

pub use accessor::{EntityAccessor, FieldSkip, FieldSlot, SkipReason};
pub use progress::{LogProgress, NoProgress, ProgressSink};
pub use walker::{AnonymizationWalker, EntityReport, WalkReport};
