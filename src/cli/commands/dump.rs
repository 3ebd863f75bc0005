//! Dump command implementation
//!
//! This module implements the `dump` command: provision the shadow database,
//! copy the source into it, anonymize it and export the result.

use crate::config::{load_config, CopyStrategy, ShroudConfig};
use crate::core::pipeline::{PipelineRun, PipelineStage, RunOutcome};
use crate::domain::ShroudError;
use clap::Args;

/// Arguments for the dump command
#[derive(Args, Debug)]
pub struct DumpArgs {
    /// Path of the anonymized dump (overrides export.dump_file)
    #[arg(short = 'd', long, value_name = "PATH")]
    pub dump_file: Option<String>,

    /// Fetch rows in pages instead of one pass per entity
    #[arg(long)]
    pub pagination: bool,

    /// Rows per page; implies --pagination
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    pub page_size: Option<u64>,

    /// Copy strategy (dump_load or row_copy)
    #[arg(long, value_name = "STRATEGY")]
    pub strategy: Option<CopyStrategy>,

    /// Report rows that cannot be copied instead of aborting
    #[arg(long)]
    pub best_effort: bool,

    /// Skip confirmation prompt
    #[arg(short, long)]
    pub yes: bool,
}

impl DumpArgs {
    /// Applies the command line overrides to the loaded configuration
    pub fn apply_overrides(&self, config: &mut ShroudConfig) {
        if let Some(path) = &self.dump_file {
            tracing::info!(dump_file = %path, "Overriding dump file from CLI");
            config.export.dump_file = path.clone();
            config.export.enabled = true;
        }
        if self.pagination {
            config.anonymization.pagination = true;
        }
        if let Some(page_size) = self.page_size {
            tracing::info!(page_size, "Overriding page size from CLI");
            config.anonymization.pagination = true;
            config.anonymization.page_size = page_size;
        }
        if let Some(strategy) = self.strategy {
            tracing::info!(strategy = %strategy, "Overriding copy strategy from CLI");
            config.copy.strategy = strategy;
        }
        if self.best_effort {
            config.copy.best_effort = true;
        }
    }

    /// Execute the dump command
    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        tracing::info!("Starting dump command");

        let mut config = match load_config(config_path) {
            Ok(c) => c,
            Err(e) => {
                tracing::error!(error = %e, "Failed to load configuration");
                eprintln!("{e}");
                return Ok(2);
            }
        };
        self.apply_overrides(&mut config);

        if let Err(e) = config.validate() {
            tracing::error!(error = %e, "Configuration validation failed");
            eprintln!("Configuration validation failed: {e}");
            return Ok(2);
        }

        let (source, shadow) = match (config.source_descriptor(), config.shadow_descriptor()) {
            (Ok(source), Ok(shadow)) => (source, shadow),
            (Err(e), _) | (_, Err(e)) => {
                eprintln!("Configuration validation failed: {e}");
                return Ok(2);
            }
        };

        if !self.yes {
            println!("Dump Configuration:");
            println!("  Source: {}", source.safe_display());
            println!("  Shadow: {} (dropped and recreated)", shadow.safe_display());
            println!("  Copy strategy: {}", config.copy.strategy);
            println!(
                "  Pagination: {}",
                if config.anonymization.pagination {
                    format!("{} rows per page", config.anonymization.page_size)
                } else {
                    "disabled".to_string()
                }
            );
            println!("  Entities: {}", config.mapping.len());
            if config.export.enabled {
                println!("  Dump file: {}", config.export.dump_file);
            }
            println!();
            print!("Proceed? [y/N]: ");
            use std::io::{self, Write};
            io::stdout().flush()?;

            let mut input = String::new();
            io::stdin().read_line(&mut input)?;

            if !input.trim().eq_ignore_ascii_case("y") {
                println!("Dump cancelled.");
                return Ok(0);
            }
        }

        let run = match PipelineRun::new(config) {
            Ok(run) => run,
            Err(e) => {
                tracing::error!(error = %e, "Failed to initialize pipeline");
                eprintln!("Failed to initialize pipeline: {e}");
                return Ok(exit_code_for_error(&e, None));
            }
        };

        println!("🚀 Starting anonymization run...");
        println!();
        let outcome = run.execute().await;
        print_outcome(&outcome);
        Ok(exit_code(&outcome))
    }
}

/// Process exit code of a run outcome
pub fn exit_code(outcome: &RunOutcome) -> i32 {
    match outcome {
        RunOutcome::Success(_) => 0,
        RunOutcome::Failure { stage, reason, .. } => exit_code_for_error(reason, Some(*stage)),
    }
}

fn exit_code_for_error(error: &ShroudError, stage: Option<PipelineStage>) -> i32 {
    match (error, stage) {
        (ShroudError::Configuration(_), _) | (_, Some(PipelineStage::Validate)) => 2,
        (ShroudError::Connection(_), _)
        | (ShroudError::Provisioning(_), _)
        | (_, Some(PipelineStage::Provision)) => 4,
        _ => 5,
    }
}

fn print_outcome(outcome: &RunOutcome) {
    let summary = outcome.summary();

    println!();
    println!("📊 Run Summary:");
    println!("  Source: {}", summary.source);
    if let Some(shadow) = &summary.shadow {
        println!("  Shadow: {shadow}");
    }
    for (stage, duration) in &summary.stages {
        println!("  {stage}: {:.2}s", duration.as_secs_f64());
    }
    if let Some(copy) = &summary.copy {
        match copy.dump_bytes {
            Some(bytes) => println!("  Copied: {bytes} bytes via {}", copy.strategy),
            None => println!("  Copied: {} rows via {}", copy.rows_copied(), copy.strategy),
        }
        if !copy.failures.is_empty() {
            println!("  ⚠️  Rows not copied: {}", copy.failures.len());
        }
    }
    if let Some(walk) = &summary.walk {
        for entity in &walk.entities {
            match &entity.skip_reason {
                Some(reason) => println!("  {}: skipped ({reason})", entity.entity),
                None => println!(
                    "  {}: {} rows, {} batches, {} fields rewritten",
                    entity.entity,
                    entity.rows_visited,
                    entity.batches_committed,
                    entity.fields_rewritten
                ),
            }
        }
    }
    if let Some(path) = &summary.export_path {
        println!("  Dump: {}", path.display());
    }
    println!("  Duration: {:.2}s", summary.duration.as_secs_f64());
    println!();

    match outcome {
        RunOutcome::Success(_) => println!("✅ Anonymized dump completed successfully!"),
        RunOutcome::Failure { stage, reason, .. } => {
            println!("❌ Run failed during {stage}");
            println!("   Error: {reason}");
            if summary.shadow.is_some() {
                println!("   Fix the cause, run `shroud drop`, then re-run from the start.");
            }
        }
    }
}
