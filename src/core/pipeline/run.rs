//! One pipeline run: validate → provision → copy → anonymize → export

use super::export::export_shadow;
use super::summary::{AtStage, PipelineStage, RunOutcome, RunSummary, StageFailure};
use crate::adapters::database::{create_server, DatabaseServer};
use crate::adapters::tools::{ToolKit, ToolSettings};
use crate::config::ShroudConfig;
use crate::core::anonymize::{AnonymizationWalker, ProgressSink};
use crate::core::copy::BulkCopier;
use crate::core::provision::{DatabaseProvisioner, EventDispatcher};
use crate::domain::context::ResultExt;
use crate::domain::{ConnectionDescriptor, Mapping, Result, ShroudError};
use crate::transform::TransformRegistry;
use crate::{log_error_with_context, log_stage_complete, log_stage_start};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

/// A single, non-resumable run of the pipeline
///
/// Stages run strictly one after the other; the first failure ends the run.
/// Every run builds a fresh [`TransformRegistry`], so transform state never
/// leaks from one run into the next.
///
/// # Example
///
/// ```rust,no_run
/// use shroud::config::load_config;
/// use shroud::core::pipeline::{PipelineRun, RunOutcome};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = load_config("shroud.toml")?;
/// match PipelineRun::new(config)?.execute().await {
///     RunOutcome::Success(summary) => println!("Dump written to {:?}", summary.export_path),
///     RunOutcome::Failure { stage, reason, .. } => eprintln!("{stage} failed: {reason}"),
/// }
/// # Ok(())
/// # }
/// ```
pub struct PipelineRun {
    config: ShroudConfig,
    server: Arc<dyn DatabaseServer + Send + Sync>,
    tools: Arc<ToolKit>,
    events: EventDispatcher,
    progress: Option<Box<dyn ProgressSink>>,
}

impl PipelineRun {
    /// Run against the adapter of the configured source engine
    pub fn new(config: ShroudConfig) -> Result<Self> {
        let engine = config
            .source_descriptor()
            .map_err(ShroudError::Configuration)?
            .engine;
        let server = create_server(engine, &config)?;
        Ok(Self::with_server(config, server))
    }

    /// Run against an explicit adapter
    pub fn with_server(
        config: ShroudConfig,
        server: Arc<dyn DatabaseServer + Send + Sync>,
    ) -> Self {
        let tools = ToolKit::for_engine(server.engine(), &ToolSettings::from_config(&config.copy));
        Self {
            config,
            server,
            tools: Arc::new(tools),
            events: EventDispatcher::new(),
            progress: None,
        }
    }

    /// Replaces the dump/load tools used for copy and export
    pub fn with_tools(mut self, tools: ToolKit) -> Self {
        self.tools = Arc::new(tools);
        self
    }

    /// Listeners told about the shadow database lifecycle
    pub fn with_events(mut self, events: EventDispatcher) -> Self {
        self.events = events;
        self
    }

    pub fn with_progress(mut self, progress: Box<dyn ProgressSink>) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn config(&self) -> &ShroudConfig {
        &self.config
    }

    /// Executes every stage and reports exactly one terminal outcome
    pub async fn execute(mut self) -> RunOutcome {
        let start = Instant::now();
        let source = self
            .config
            .source_descriptor()
            .map(|d| d.safe_display())
            .unwrap_or_else(|_| "<invalid source>".to_string());
        let mut summary = RunSummary::new(source);

        tracing::info!(source = %summary.source, "Starting anonymization run");
        let result = self.run_stages(&mut summary).await;
        summary.duration = start.elapsed();
        summary.log_summary();

        match result {
            Ok(()) => {
                tracing::info!(
                    duration_secs = summary.duration.as_secs(),
                    "Anonymization run succeeded"
                );
                RunOutcome::Success(summary)
            }
            Err(StageFailure { stage, error }) => {
                let context = format!("{stage} stage failed");
                log_error_with_context!(&error, context.as_str());
                if summary.shadow.is_some() {
                    tracing::warn!(
                        "The shadow database was left in place; drop it before re-running"
                    );
                }
                RunOutcome::Failure {
                    stage,
                    reason: error,
                    summary,
                }
            }
        }
    }

    async fn run_stages(
        &mut self,
        summary: &mut RunSummary,
    ) -> std::result::Result<(), StageFailure> {
        let started = Instant::now();
        let (source, mapping, registry) = self.validate().at(PipelineStage::Validate)?;
        summary.record_stage(PipelineStage::Validate, started.elapsed());

        let started = Instant::now();
        let shadow = self.provision(&source).await.at(PipelineStage::Provision)?;
        summary.shadow = Some(shadow.safe_display());
        summary.record_stage(PipelineStage::Provision, started.elapsed());

        let started = Instant::now();
        let copier = BulkCopier::new(self.server.clone(), self.tools.clone())
            .with_config(&self.config.copy);
        let copy = copier.copy(&source, &shadow).await.at(PipelineStage::Copy)?;
        summary.copy = Some(copy);
        summary.record_stage(PipelineStage::Copy, started.elapsed());

        let started = Instant::now();
        let walk = self
            .anonymize(&mapping, registry, &shadow)
            .await
            .at(PipelineStage::Anonymize)?;
        summary.walk = Some(walk);
        summary.record_stage(PipelineStage::Anonymize, started.elapsed());

        if self.config.export.enabled {
            let started = Instant::now();
            let path = PathBuf::from(&self.config.export.dump_file);
            log_stage_start!("export", path.display());
            let bytes = export_shadow(&*self.tools.dump, &shadow, &path)
                .await
                .at(PipelineStage::Export)?;
            summary.export_path = Some(path);
            summary.export_bytes = Some(bytes);
            summary.record_stage(PipelineStage::Export, started.elapsed());
            log_stage_complete!("export", started.elapsed());
        } else {
            tracing::info!("Export disabled; the anonymized shadow database is kept as is");
        }
        Ok(())
    }

    /// Checks configuration and mapping before any database is touched
    fn validate(&self) -> Result<(ConnectionDescriptor, Mapping, TransformRegistry)> {
        self.config
            .validate()
            .map_err(ShroudError::Configuration)?;
        let source = self
            .config
            .source_descriptor()
            .map_err(ShroudError::Configuration)?;
        let mapping = Mapping::from_config(&self.config.mapping)?;
        let registry = TransformRegistry::from_config(&self.config.anonymization);

        if self.config.anonymization.validate_transforms {
            registry.validate_mapping(&mapping)?;
        }
        if mapping.is_empty() {
            tracing::warn!("Mapping is empty; the shadow database will be an unmodified copy");
        }
        tracing::info!(
            entities = mapping.entities().len(),
            rules = mapping.rule_count(),
            transforms = registry.len(),
            "Configuration validated"
        );
        Ok((source, mapping, registry))
    }

    async fn provision(&self, source: &ConnectionDescriptor) -> Result<ConnectionDescriptor> {
        DatabaseProvisioner::new(self.server.clone())
            .with_shadow_config(self.config.shadow.clone())
            .with_events(self.events.clone())
            .continue_on_drop_failure(self.config.provision.continue_on_drop_failure)
            .ensure_shadow_database(source)
            .await
    }

    async fn anonymize(
        &mut self,
        mapping: &Mapping,
        registry: TransformRegistry,
        shadow: &ConnectionDescriptor,
    ) -> Result<crate::core::anonymize::WalkReport> {
        let start = Instant::now();
        let database = shadow.database_name()?;
        log_stage_start!("anonymize", database);

        let options = &self.config.anonymization;
        let mut walker = AnonymizationWalker::new(registry);
        if options.pagination {
            walker = walker.with_pagination(options.page_size);
        }
        if let Some(progress) = self.progress.take() {
            walker = walker.with_progress(progress);
        }

        let mut connection = self
            .server
            .connect(shadow)
            .await
            .context("Failed to connect to the shadow database")?;
        let report = walker.run(mapping, connection.as_mut()).await;
        if let Err(e) = connection.close().await {
            tracing::warn!(error = %e, "Failed to close shadow connection");
        }
        let report = report?;

        log_stage_complete!("anonymize", start.elapsed());
        Ok(report)
    }
}

impl std::fmt::Debug for PipelineRun {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineRun")
            .field("engine", &self.server.engine())
            .field("tools", &self.tools)
            .field("events", &self.events)
            .finish()
    }
}
