//! Run summary and terminal outcome

use crate::core::anonymize::WalkReport;
use crate::core::copy::CopyReport;
use crate::domain::ShroudError;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Stages of a run, executed strictly in this order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Validate,
    Provision,
    Copy,
    Anonymize,
    Export,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineStage::Validate => write!(f, "validate"),
            PipelineStage::Provision => write!(f, "provision"),
            PipelineStage::Copy => write!(f, "copy"),
            PipelineStage::Anonymize => write!(f, "anonymize"),
            PipelineStage::Export => write!(f, "export"),
        }
    }
}

/// An error tagged with the stage it stopped the run in
#[derive(Debug)]
pub struct StageFailure {
    pub stage: PipelineStage,
    pub error: ShroudError,
}

impl fmt::Display for StageFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} stage failed: {}", self.stage, self.error)
    }
}

/// Tags the error of a stage result with its stage
pub(crate) trait AtStage<T> {
    fn at(self, stage: PipelineStage) -> Result<T, StageFailure>;
}

impl<T> AtStage<T> for crate::domain::Result<T> {
    fn at(self, stage: PipelineStage) -> Result<T, StageFailure> {
        self.map_err(|error| StageFailure { stage, error })
    }
}

/// What a run did, filled in stage by stage
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    /// Source connection without password
    pub source: String,
    /// Shadow connection without password, once provisioned
    pub shadow: Option<String>,
    /// Completed stages and how long each took
    pub stages: Vec<(PipelineStage, Duration)>,
    pub copy: Option<CopyReport>,
    pub walk: Option<WalkReport>,
    pub export_path: Option<PathBuf>,
    pub export_bytes: Option<u64>,
    pub duration: Duration,
}

impl RunSummary {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            ..Self::default()
        }
    }

    pub fn record_stage(&mut self, stage: PipelineStage, duration: Duration) {
        self.stages.push((stage, duration));
    }

    pub fn completed(&self, stage: PipelineStage) -> bool {
        self.stages.iter().any(|(s, _)| *s == stage)
    }

    /// Log the summary
    pub fn log_summary(&self) {
        tracing::info!(
            source = %self.source,
            shadow = self.shadow.as_deref().unwrap_or("-"),
            duration_secs = self.duration.as_secs(),
            "Run summary"
        );
        for (stage, duration) in &self.stages {
            tracing::info!(stage = %stage, duration_ms = duration.as_millis() as u64, "Stage");
        }
        if let Some(copy) = &self.copy {
            tracing::info!(
                strategy = %copy.strategy,
                dump_bytes = copy.dump_bytes.unwrap_or_default(),
                rows_copied = copy.rows_copied(),
                failed_rows = copy.failures.len(),
                "Copy"
            );
        }
        if let Some(walk) = &self.walk {
            for entity in &walk.entities {
                match &entity.skip_reason {
                    Some(reason) => tracing::info!(
                        entity = %entity.entity,
                        reason = %reason,
                        "Entity skipped"
                    ),
                    None => tracing::info!(
                        entity = %entity.entity,
                        rows = entity.rows_visited,
                        batches = entity.batches_committed,
                        fields_rewritten = entity.fields_rewritten,
                        fields_skipped = entity.fields_skipped,
                        "Entity"
                    ),
                }
            }
        }
        if let Some(path) = &self.export_path {
            tracing::info!(
                path = %path.display(),
                bytes = self.export_bytes.unwrap_or_default(),
                "Export"
            );
        }
    }
}

/// Terminal outcome of a run; there is no partial success
#[derive(Debug)]
pub enum RunOutcome {
    Success(RunSummary),
    Failure {
        stage: PipelineStage,
        reason: ShroudError,
        summary: RunSummary,
    },
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, RunOutcome::Success(_))
    }

    pub fn summary(&self) -> &RunSummary {
        match self {
            RunOutcome::Success(summary) | RunOutcome::Failure { summary, .. } => summary,
        }
    }

    /// Stage that stopped the run
    pub fn failed_stage(&self) -> Option<PipelineStage> {
        match self {
            RunOutcome::Success(_) => None,
            RunOutcome::Failure { stage, .. } => Some(*stage),
        }
    }
}
