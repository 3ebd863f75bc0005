//! Pipeline orchestration
//!
//! - [`run`] - [`PipelineRun`], the sequential stage driver
//! - [`summary`] - stage bookkeeping and the terminal [`RunOutcome`]
//! - [`export`] - final dump of the shadow database

pub mod export;
pub mod run;
pub mod summary;

pub use export::export_shadow;
pub use run::PipelineRun;
pub use summary::{PipelineStage, RunOutcome, RunSummary, StageFailure};
