//! Anonymization walker
//!
//! Processes the mapped entities one after the other on the shadow
//! connection. Each page of rows is rewritten in memory, committed in one
//! transaction and released before the next page is fetched.

use super::accessor::{EntityAccessor, FieldSkip, SkipReason};
use super::progress::{LogProgress, ProgressSink};
use crate::adapters::database::traits::{DatabaseConnection, SuppressedChannel};
use crate::domain::{
    EntityName, FieldName, Mapping, PageRequest, Result, Row, RowUpdate, ShroudError,
};
use crate::log_page_committed;
use crate::transform::TransformRegistry;
use std::time::{Duration, Instant};

/// Walk counters of one entity
#[derive(Debug, Clone, PartialEq)]
pub struct EntityReport {
    pub entity: EntityName,
    /// Qualified table name, when the entity resolved to one
    pub table: Option<String>,
    pub rows_visited: u64,
    pub batches_committed: u64,
    pub fields_rewritten: u64,
    pub fields_skipped: u64,
    /// Set when the entity was not walked at all
    pub skip_reason: Option<SkipReason>,
    /// Mapped fields left unchanged, with the reason
    pub skipped_fields: Vec<(FieldName, FieldSkip)>,
}

impl EntityReport {
    fn new(entity: EntityName) -> Self {
        Self {
            entity,
            table: None,
            rows_visited: 0,
            batches_committed: 0,
            fields_rewritten: 0,
            fields_skipped: 0,
            skip_reason: None,
            skipped_fields: Vec::new(),
        }
    }

    pub fn is_skipped(&self) -> bool {
        self.skip_reason.is_some()
    }
}

/// Result of one walk over the mapping
#[derive(Debug, Clone, Default)]
pub struct WalkReport {
    /// Entities in mapping order
    pub entities: Vec<EntityReport>,
    pub duration: Duration,
}

impl WalkReport {
    pub fn entity(&self, name: &str) -> Option<&EntityReport> {
        self.entities.iter().find(|e| e.entity.as_str() == name)
    }

    pub fn rows_visited(&self) -> u64 {
        self.entities.iter().map(|e| e.rows_visited).sum()
    }

    pub fn batches_committed(&self) -> u64 {
        self.entities.iter().map(|e| e.batches_committed).sum()
    }

    pub fn fields_rewritten(&self) -> u64 {
        self.entities.iter().map(|e| e.fields_rewritten).sum()
    }

    pub fn skipped_entities(&self) -> usize {
        self.entities.iter().filter(|e| e.is_skipped()).count()
    }
}

/// Rewrites mapped fields of the shadow database through the transform registry
pub struct AnonymizationWalker {
    registry: TransformRegistry,
    pagination: bool,
    page_size: u64,
    progress: Box<dyn ProgressSink>,
}

impl AnonymizationWalker {
    /// Walker over `registry`, one pass per entity
    pub fn new(registry: TransformRegistry) -> Self {
        Self {
            registry,
            pagination: false,
            page_size: 100,
            progress: Box::new(LogProgress::new()),
        }
    }

    /// Fetches rows in pages of `page_size` (at least 1)
    pub fn with_pagination(mut self, page_size: u64) -> Self {
        self.pagination = true;
        self.page_size = page_size.max(1);
        self
    }

    pub fn with_progress(mut self, progress: Box<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    pub fn registry(&self) -> &TransformRegistry {
        &self.registry
    }

    pub fn into_registry(self) -> TransformRegistry {
        self.registry
    }

    /// Walks every entity of `mapping` in order
    ///
    /// Change listeners are suppressed once, before the first row is read.
    /// Entities that do not resolve to an updatable table are reported as
    /// skipped; fields that are not writable or name an unregistered transform
    /// are left unchanged.
    ///
    /// # Errors
    ///
    /// Any failure to read or commit aborts the walk. Pages committed before
    /// the failure stay committed.
    pub async fn run(
        &mut self,
        mapping: &Mapping,
        connection: &mut dyn DatabaseConnection,
    ) -> Result<WalkReport> {
        let start = Instant::now();
        let tables = connection.list_tables().await?;

        let resolved: Vec<_> = mapping
            .entities()
            .iter()
            .map(|entity| (entity.entity(), EntityAccessor::build(entity, &tables)))
            .collect();

        let targets: Vec<_> = resolved
            .iter()
            .filter_map(|(_, r)| r.as_ref().ok().map(|a| a.table().clone()))
            .collect();
        let channel = connection.suppress_listeners(&targets).await?;
        tracing::debug!(
            database = %channel.database(),
            tables = channel.tables().len(),
            global = channel.is_global(),
            "Change listeners suppressed"
        );

        let mut report = WalkReport::default();
        for (entity, resolution) in resolved {
            let entity_report = match resolution {
                Ok(accessor) => self.walk_entity(&accessor, connection, &channel).await?,
                Err(reason) => {
                    tracing::info!(entity = %entity, reason = %reason, "Entity skipped");
                    let mut skipped = EntityReport::new(entity.clone());
                    skipped.skip_reason = Some(reason);
                    skipped
                }
            };
            report.entities.push(entity_report);
        }

        report.duration = start.elapsed();
        Ok(report)
    }

    async fn walk_entity(
        &mut self,
        accessor: &EntityAccessor,
        connection: &mut dyn DatabaseConnection,
        channel: &SuppressedChannel,
    ) -> Result<EntityReport> {
        let table = accessor.table();
        let mut report = EntityReport::new(accessor.entity().clone());
        report.table = Some(table.qualified_name());

        if !channel.covers(table) {
            tracing::debug!(
                table = %table.qualified_name(),
                "Table-level listeners could not be disabled"
            );
        }

        // Writability and registration cannot change during a run
        let mut active = Vec::new();
        for slot in accessor.slots() {
            let skip = match (&slot.writable, slot.column) {
                (Err(reason), _) => Some(*reason),
                (Ok(()), None) => Some(FieldSkip::MissingColumn),
                (Ok(()), Some(column)) => {
                    if self.registry.has(slot.transform.as_str()) {
                        active.push((column, slot.transform.clone()));
                        None
                    } else {
                        Some(FieldSkip::UnregisteredTransform)
                    }
                }
            };
            if let Some(reason) = skip {
                tracing::warn!(
                    entity = %accessor.entity(),
                    field = %slot.field,
                    transform = %slot.transform,
                    reason = %reason,
                    "Field left unchanged"
                );
                report.skipped_fields.push((slot.field.clone(), reason));
            }
        }
        let skipped_per_row = report.skipped_fields.len() as u64;

        let total = connection.count_rows(table).await?;
        self.progress.start(accessor.entity(), total);

        let mut offset = 0;
        loop {
            let page = if self.pagination {
                Some(PageRequest {
                    offset,
                    limit: self.page_size,
                })
            } else {
                None
            };
            let rows = connection.fetch_rows(table, page).await?;
            let fetched = rows.len() as u64;
            if fetched == 0 {
                break;
            }

            let mut updates = Vec::with_capacity(rows.len());
            for row in rows {
                let update = self.rewrite_row(row, accessor, &active);
                report.fields_rewritten += update.changes.len() as u64;
                report.fields_skipped += skipped_per_row;
                if !update.is_empty() {
                    updates.push(update);
                }
                self.progress.advance(1);
            }

            connection
                .apply_updates(channel, table, &updates)
                .await
                .map_err(|e| {
                    ShroudError::Anonymization(format!(
                        "Could not commit page {} of {}: {e}",
                        report.batches_committed + 1,
                        accessor.entity()
                    ))
                })?;
            report.batches_committed += 1;
            report.rows_visited += fetched;
            log_page_committed!(accessor.entity(), report.batches_committed, fetched);

            if !self.pagination || fetched < self.page_size {
                break;
            }
            offset += fetched;
        }

        self.progress.finish();
        tracing::info!(
            entity = %accessor.entity(),
            table = %table.qualified_name(),
            rows = report.rows_visited,
            batches = report.batches_committed,
            fields_rewritten = report.fields_rewritten,
            fields_skipped = report.fields_skipped,
            "Entity walk finished"
        );
        Ok(report)
    }

    fn rewrite_row(
        &mut self,
        mut row: Row,
        accessor: &EntityAccessor,
        active: &[(usize, crate::domain::TransformId)],
    ) -> RowUpdate {
        let key = row.key(accessor.table());
        let mut changes = Vec::with_capacity(active.len());
        for (column, transform_id) in active {
            let Some(transform) = self.registry.get_mut(transform_id.as_str()) else {
                continue;
            };
            let Some(slot) = row.values.get_mut(*column) else {
                continue;
            };
            let current = std::mem::take(slot);
            changes.push((*column, transform.transform(current)));
        }
        RowUpdate { key, changes }
    }
}

impl std::fmt::Debug for AnonymizationWalker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnonymizationWalker")
            .field("registry", &self.registry)
            .field("pagination", &self.pagination)
            .field("page_size", &self.page_size)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::database::traits::DatabaseServer;
    use crate::adapters::memory::MemoryServer;
    use crate::domain::{ColumnSchema, ConnectionDescriptor, FieldValue, TableSchema};
    use std::sync::{Arc, Mutex};

    const SHADOW: &str = "shop_anonymous";

    fn users() -> TableSchema {
        TableSchema::new("public", "user")
            .with_column(ColumnSchema::new("id", "integer", false))
            .with_column(ColumnSchema::new("email", "text", false))
            .with_column(ColumnSchema::new("nickname", "text", true))
            .with_primary_key(["id"])
    }

    fn seeded(rows: i64) -> MemoryServer {
        let server = MemoryServer::new();
        server.create_table(SHADOW, users());
        server.insert_rows(
            SHADOW,
            "user",
            (1..=rows)
                .map(|i| {
                    Row::new(vec![
                        FieldValue::Integer(i),
                        format!("user{i}@corp.com").into(),
                        format!("nick{i}").into(),
                    ])
                })
                .collect(),
        );
        server
    }

    async fn connection(server: &MemoryServer) -> Box<dyn DatabaseConnection> {
        let descriptor =
            ConnectionDescriptor::from_url(&format!("postgresql://app@localhost/{SHADOW}"))
                .unwrap();
        server.connect(&descriptor).await.unwrap()
    }

    fn user_mapping() -> Mapping {
        Mapping::builder()
            .field("User", "email", "unique_email")
            .unwrap()
            .field("User", "nickname", "constant_croar")
            .unwrap()
            .build()
    }

    #[derive(Clone, Default)]
    struct Recorder(Arc<Mutex<Vec<String>>>);

    impl ProgressSink for Recorder {
        fn start(&mut self, entity: &EntityName, total_rows: u64) {
            self.0.lock().unwrap().push(format!("start {entity} {total_rows}"));
        }

        fn advance(&mut self, rows: u64) {
            self.0.lock().unwrap().push(format!("advance {rows}"));
        }

        fn finish(&mut self) {
            self.0.lock().unwrap().push("finish".to_string());
        }
    }

    #[tokio::test]
    async fn test_paginated_walk_commits_per_page() {
        let server = seeded(25);
        let mut conn = connection(&server).await;
        let mut walker =
            AnonymizationWalker::new(TransformRegistry::with_builtins(Some(3))).with_pagination(10);

        let report = walker.run(&user_mapping(), conn.as_mut()).await.unwrap();

        let commits: Vec<_> = server.commits(SHADOW).iter().map(|c| c.rows).collect();
        assert_eq!(commits, vec![10, 10, 5]);
        let user = report.entity("User").unwrap();
        assert_eq!(user.rows_visited, 25);
        assert_eq!(user.batches_committed, 3);
        assert_eq!(user.fields_rewritten, 50);
        assert_eq!(user.table.as_deref(), Some("public.user"));
    }

    #[tokio::test]
    async fn test_exact_multiple_of_page_size() {
        let server = seeded(20);
        let mut conn = connection(&server).await;
        let mut walker =
            AnonymizationWalker::new(TransformRegistry::with_builtins(None)).with_pagination(10);

        let report = walker.run(&user_mapping(), conn.as_mut()).await.unwrap();
        assert_eq!(report.batches_committed(), 2);
        assert_eq!(report.rows_visited(), 20);
    }

    #[tokio::test]
    async fn test_single_pass_without_pagination() {
        let server = seeded(25);
        let mut conn = connection(&server).await;
        let mut walker = AnonymizationWalker::new(TransformRegistry::with_builtins(None));

        let report = walker.run(&user_mapping(), conn.as_mut()).await.unwrap();
        assert_eq!(report.batches_committed(), 1);
        assert_eq!(server.commits(SHADOW)[0].rows, 25);
        assert!(server
            .column(SHADOW, "user", "nickname")
            .iter()
            .all(|v| *v == FieldValue::from("CROAR")));
    }

    #[tokio::test]
    async fn test_empty_table_commits_nothing() {
        let server = seeded(0);
        let mut conn = connection(&server).await;
        let mut walker =
            AnonymizationWalker::new(TransformRegistry::with_builtins(None)).with_pagination(10);

        let report = walker.run(&user_mapping(), conn.as_mut()).await.unwrap();
        assert_eq!(report.batches_committed(), 0);
        assert!(server.commits(SHADOW).is_empty());
    }

    #[tokio::test]
    async fn test_unregistered_transform_leaves_field_unchanged() {
        let server = seeded(3);
        let before = server.column(SHADOW, "user", "email");
        let mut conn = connection(&server).await;
        let mapping = Mapping::builder()
            .field("User", "email", "faker_iban")
            .unwrap()
            .field("User", "nickname", "constant_croar")
            .unwrap()
            .build();
        let mut walker = AnonymizationWalker::new(TransformRegistry::with_builtins(None));

        let report = walker.run(&mapping, conn.as_mut()).await.unwrap();
        assert_eq!(server.column(SHADOW, "user", "email"), before);
        let user = report.entity("User").unwrap();
        assert_eq!(user.fields_rewritten, 3);
        assert_eq!(user.fields_skipped, 3);
        assert_eq!(
            user.skipped_fields,
            vec![(
                FieldName::new("email").unwrap(),
                FieldSkip::UnregisteredTransform
            )]
        );
    }

    #[tokio::test]
    async fn test_unknown_entity_is_skipped() {
        let server = seeded(2);
        let mut conn = connection(&server).await;
        let mapping = Mapping::builder()
            .field("Invoice", "total", "null")
            .unwrap()
            .field("User", "nickname", "constant_croar")
            .unwrap()
            .build();
        let mut walker = AnonymizationWalker::new(TransformRegistry::with_builtins(None));

        let report = walker.run(&mapping, conn.as_mut()).await.unwrap();
        assert_eq!(report.skipped_entities(), 1);
        assert_eq!(
            report.entity("Invoice").unwrap().skip_reason,
            Some(SkipReason::NotPersistable)
        );
        assert_eq!(report.entity("User").unwrap().rows_visited, 2);
    }

    #[tokio::test]
    async fn test_listeners_suppressed_before_writing() {
        let server = seeded(1);
        let mut conn = connection(&server).await;
        let mut walker = AnonymizationWalker::new(TransformRegistry::with_builtins(None));

        walker.run(&user_mapping(), conn.as_mut()).await.unwrap();
        let (tables, global) = server.suppressed_listeners(SHADOW);
        assert_eq!(tables, vec!["public.user".to_string()]);
        assert!(global);
    }

    #[tokio::test]
    async fn test_progress_reported_per_row() {
        let server = seeded(3);
        let mut conn = connection(&server).await;
        let recorder = Recorder::default();
        let mut walker = AnonymizationWalker::new(TransformRegistry::with_builtins(None))
            .with_progress(Box::new(recorder.clone()));

        walker.run(&user_mapping(), conn.as_mut()).await.unwrap();
        assert_eq!(
            *recorder.0.lock().unwrap(),
            vec!["start User 3", "advance 1", "advance 1", "advance 1", "finish"]
        );
    }
}
