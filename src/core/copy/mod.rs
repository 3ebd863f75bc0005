//! Bulk copy of the source database into the shadow database
//!
//! Two strategies:
//!
//! - [`dump_load`] - the engine's own dump tool writes a temporary file that
//!   its client replays into the shadow database (preferred)
//! - [`row_copy`] - rows are streamed table by table through the drivers,
//!   for schemas that already exist on both sides

pub mod dump_load;
pub mod row_copy;

use crate::adapters::database::traits::DatabaseServer;
use crate::adapters::tools::{ToolKit, ToolSettings};
use crate::config::{CopyConfig, CopyStrategy};
use crate::domain::{ConnectionDescriptor, Result};
use crate::{log_stage_complete, log_stage_start};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// What to do when a single row cannot be inserted during row copy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CopyMode {
    /// Abort the run
    #[default]
    Strict,
    /// Report the row and keep copying
    BestEffort,
}

/// Rows copied into one shadow table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableCopyReport {
    pub table: String,
    pub rows_copied: u64,
    pub rows_failed: u64,
}

/// A row that could not be inserted in best-effort mode
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowFailure {
    pub table: String,
    pub row: String,
    pub message: String,
}

/// Result of one copy
#[derive(Debug, Clone)]
pub struct CopyReport {
    pub strategy: CopyStrategy,
    /// Size of the intermediate dump (dump/load only)
    pub dump_bytes: Option<u64>,
    /// Per-table counts (row copy only)
    pub tables: Vec<TableCopyReport>,
    pub failures: Vec<RowFailure>,
    pub duration: Duration,
}

impl CopyReport {
    pub fn rows_copied(&self) -> u64 {
        self.tables.iter().map(|t| t.rows_copied).sum()
    }

    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Copies every row of the source database into the shadow database
pub struct BulkCopier {
    server: Arc<dyn DatabaseServer + Send + Sync>,
    tools: Arc<ToolKit>,
    strategy: CopyStrategy,
    mode: CopyMode,
    page_size: u64,
}

impl BulkCopier {
    pub fn new(server: Arc<dyn DatabaseServer + Send + Sync>, tools: Arc<ToolKit>) -> Self {
        Self {
            server,
            tools,
            strategy: CopyStrategy::default(),
            mode: CopyMode::default(),
            page_size: 1000,
        }
    }

    /// Copier configured from the `[copy]` section, tools picked by engine
    pub fn from_config(
        server: Arc<dyn DatabaseServer + Send + Sync>,
        config: &CopyConfig,
    ) -> Self {
        let tools = ToolKit::for_engine(server.engine(), &ToolSettings::from_config(config));
        Self::new(server, Arc::new(tools)).with_config(config)
    }

    /// Strategy, mode and page size from the `[copy]` section
    pub fn with_config(self, config: &CopyConfig) -> Self {
        self.with_strategy(config.strategy)
            .with_mode(if config.best_effort {
                CopyMode::BestEffort
            } else {
                CopyMode::Strict
            })
            .with_page_size(config.page_size)
    }

    pub fn with_strategy(mut self, strategy: CopyStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_mode(mut self, mode: CopyMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_page_size(mut self, page_size: u64) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn strategy(&self) -> CopyStrategy {
        self.strategy
    }

    /// Copies `source` into `shadow` with the configured strategy
    ///
    /// # Errors
    ///
    /// A [`crate::domain::CopyError`] or [`crate::domain::ShroudError::Timeout`];
    /// the shadow database is left as is for inspection.
    pub async fn copy(
        &self,
        source: &ConnectionDescriptor,
        shadow: &ConnectionDescriptor,
    ) -> Result<CopyReport> {
        let start = Instant::now();
        let database = shadow.database_name()?;
        log_stage_start!("copy", database);
        tracing::info!(strategy = %self.strategy, mode = ?self.mode, "Copying source database");

        let report = match self.strategy {
            CopyStrategy::DumpLoad => {
                let bytes = dump_load::dump_and_load(&self.tools, source, shadow).await?;
                CopyReport {
                    strategy: self.strategy,
                    dump_bytes: Some(bytes),
                    tables: Vec::new(),
                    failures: Vec::new(),
                    duration: start.elapsed(),
                }
            }
            CopyStrategy::RowCopy => {
                let outcome = row_copy::copy_rows(
                    self.server.as_ref(),
                    source,
                    shadow,
                    self.page_size,
                    self.mode,
                )
                .await?;
                CopyReport {
                    strategy: self.strategy,
                    dump_bytes: None,
                    tables: outcome.tables,
                    failures: outcome.failures,
                    duration: start.elapsed(),
                }
            }
        };

        if !report.is_complete() {
            tracing::warn!(
                failed_rows = report.failures.len(),
                "Copy finished with failed rows"
            );
        }
        log_stage_complete!("copy", report.duration);
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::MemoryServer;
    use crate::domain::{ColumnSchema, FieldValue, Row, TableSchema};

    #[tokio::test]
    async fn test_row_copy_through_copier() {
        let server = MemoryServer::new();
        let table = TableSchema::new("public", "order")
            .with_column(ColumnSchema::new("id", "bigint", false))
            .with_primary_key(["id"]);
        server.create_table("shop", table.clone());
        server.create_table("shop_anonymous", table);
        server.insert_rows(
            "shop",
            "order",
            (1..=5).map(|i| Row::new(vec![FieldValue::Integer(i)])).collect(),
        );

        let config = CopyConfig {
            strategy: CopyStrategy::RowCopy,
            page_size: 2,
            ..CopyConfig::default()
        };
        let copier = BulkCopier::from_config(Arc::new(server.clone()), &config);
        let source = ConnectionDescriptor::from_url("postgresql://app@localhost/shop").unwrap();
        let shadow = source.shadow(None).unwrap();

        let report = copier.copy(&source, &shadow).await.unwrap();
        assert_eq!(report.strategy, CopyStrategy::RowCopy);
        assert_eq!(report.rows_copied(), 5);
        assert!(report.is_complete());
        assert_eq!(server.rows("shop_anonymous", "order").len(), 5);
    }
}
