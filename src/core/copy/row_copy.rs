//! Row-by-row copy strategy
//!
//! Used when no dump tool applies and the schema already exists in the shadow
//! database. Every source table is paged through and inserted into its shadow
//! counterpart with foreign key checks disabled. A source table without a
//! counterpart aborts the copy unless it runs in best-effort mode.

use super::{CopyMode, RowFailure, TableCopyReport};
use crate::adapters::database::traits::{DatabaseConnection, DatabaseServer};
use crate::domain::{
    ConnectionDescriptor, CopyError, FieldValue, PageRequest, Result, Row, TableSchema,
};

/// Outcome of copying every shared table
#[derive(Debug, Default)]
pub struct RowCopyOutcome {
    pub tables: Vec<TableCopyReport>,
    pub failures: Vec<RowFailure>,
}

pub async fn copy_rows(
    server: &dyn DatabaseServer,
    source: &ConnectionDescriptor,
    shadow: &ConnectionDescriptor,
    page_size: u64,
    mode: CopyMode,
) -> Result<RowCopyOutcome> {
    let mut source_conn = server.connect(source).await?;
    let mut shadow_conn = server.connect(shadow).await?;

    shadow_conn.set_foreign_key_checks(false).await?;
    let outcome = copy_shared_tables(
        source_conn.as_mut(),
        shadow_conn.as_mut(),
        page_size.max(1),
        mode,
    )
    .await;
    if let Err(e) = shadow_conn.set_foreign_key_checks(true).await {
        tracing::error!(error = %e, "Failed to re-enable foreign key checks");
    }

    for conn in [source_conn, shadow_conn] {
        if let Err(e) = conn.close().await {
            tracing::warn!(error = %e, "Failed to close connection after row copy");
        }
    }
    outcome
}

async fn copy_shared_tables(
    source: &mut dyn DatabaseConnection,
    shadow: &mut dyn DatabaseConnection,
    page_size: u64,
    mode: CopyMode,
) -> Result<RowCopyOutcome> {
    let source_tables = source.list_tables().await?;
    let shadow_tables = shadow.list_tables().await?;
    let mut outcome = RowCopyOutcome::default();

    if shadow_tables.is_empty() && !source_tables.is_empty() {
        return Err(CopyError::ShadowSchemaMissing.into());
    }

    for source_table in &source_tables {
        let Some(target) = shadow_tables
            .iter()
            .find(|t| t.schema == source_table.schema && t.name == source_table.name)
        else {
            let table = source_table.qualified_name();
            if mode == CopyMode::Strict {
                return Err(CopyError::TableMissing(table).into());
            }
            tracing::warn!(table = %table, "Table missing in shadow database; skipped");
            outcome.failures.push(RowFailure {
                table,
                row: String::new(),
                message: "table missing in shadow database".to_string(),
            });
            continue;
        };

        let report = copy_table(
            source,
            shadow,
            source_table,
            target,
            page_size,
            mode,
            &mut outcome.failures,
        )
        .await?;
        tracing::info!(
            table = %report.table,
            rows = report.rows_copied,
            failed = report.rows_failed,
            "Table copied"
        );
        outcome.tables.push(report);
    }
    Ok(outcome)
}

async fn copy_table(
    source: &mut dyn DatabaseConnection,
    shadow: &mut dyn DatabaseConnection,
    source_table: &TableSchema,
    target: &TableSchema,
    page_size: u64,
    mode: CopyMode,
    failures: &mut Vec<RowFailure>,
) -> Result<TableCopyReport> {
    // shadow column i takes source column layout[i]
    let layout: Vec<Option<usize>> = target
        .columns
        .iter()
        .map(|c| source_table.column_index(&c.name))
        .collect();

    let mut report = TableCopyReport {
        table: target.qualified_name(),
        rows_copied: 0,
        rows_failed: 0,
    };
    let mut offset = 0;

    loop {
        let page = source
            .fetch_rows(source_table, Some(PageRequest { offset, limit: page_size }))
            .await?;
        let fetched = page.len() as u64;

        for row in page {
            let aligned = Row::new(
                layout
                    .iter()
                    .map(|i| {
                        i.and_then(|i| row.values.get(i).cloned())
                            .unwrap_or(FieldValue::Null)
                    })
                    .collect(),
            );

            match shadow.insert_row(target, &aligned).await {
                Ok(()) => report.rows_copied += 1,
                Err(e) => {
                    let failure = RowFailure {
                        table: target.qualified_name(),
                        row: aligned.to_string(),
                        message: e.to_string(),
                    };
                    if mode == CopyMode::Strict {
                        return Err(CopyError::RowInsertFailed {
                            table: failure.table,
                            row: failure.row,
                            message: failure.message,
                        }
                        .into());
                    }
                    tracing::warn!(
                        table = %failure.table,
                        row = %failure.row,
                        error = %failure.message,
                        "Row insert failed; continuing in best-effort mode"
                    );
                    report.rows_failed += 1;
                    failures.push(failure);
                }
            }
        }

        if fetched < page_size {
            break;
        }
        offset += fetched;
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::MemoryServer;
    use crate::domain::{ColumnSchema, ShroudError};

    fn users() -> TableSchema {
        TableSchema::new("public", "user")
            .with_column(ColumnSchema::new("id", "integer", false))
            .with_column(ColumnSchema::new("email", "text", false))
            .with_primary_key(["id"])
    }

    fn setup(rows: i64) -> (MemoryServer, ConnectionDescriptor, ConnectionDescriptor) {
        let server = MemoryServer::new();
        server.create_table("shop", users());
        server.create_table("shop_anonymous", users());
        server.insert_rows(
            "shop",
            "user",
            (1..=rows)
                .map(|i| {
                    Row::new(vec![
                        FieldValue::Integer(i),
                        format!("u{i}@corp.com").into(),
                    ])
                })
                .collect(),
        );
        let source = ConnectionDescriptor::from_url("postgresql://app@localhost/shop").unwrap();
        let shadow = source.shadow(None).unwrap();
        (server, source, shadow)
    }

    #[tokio::test]
    async fn test_copies_across_pages() {
        let (server, source, shadow) = setup(25);
        let outcome = copy_rows(&server, &source, &shadow, 10, CopyMode::Strict)
            .await
            .unwrap();

        assert_eq!(outcome.tables[0].rows_copied, 25);
        assert_eq!(server.rows("shop_anonymous", "user").len(), 25);
        assert_eq!(server.foreign_key_toggles("shop_anonymous"), vec![false, true]);
    }

    #[tokio::test]
    async fn test_strict_mode_aborts_on_failed_insert() {
        let (server, source, shadow) = setup(3);
        server.insert_rows(
            "shop_anonymous",
            "user",
            vec![Row::new(vec![FieldValue::Integer(2), "taken".into()])],
        );

        let err = copy_rows(&server, &source, &shadow, 10, CopyMode::Strict)
            .await
            .unwrap_err();
        match err {
            ShroudError::Copy(CopyError::RowInsertFailed { table, row, .. }) => {
                assert_eq!(table, "public.user");
                assert_eq!(row, "(2, 'u2@corp.com')");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(server.foreign_key_toggles("shop_anonymous"), vec![false, true]);
    }

    #[tokio::test]
    async fn test_best_effort_mode_reports_and_continues() {
        let (server, source, shadow) = setup(3);
        server.insert_rows(
            "shop_anonymous",
            "user",
            vec![Row::new(vec![FieldValue::Integer(2), "taken".into()])],
        );

        let outcome = copy_rows(&server, &source, &shadow, 10, CopyMode::BestEffort)
            .await
            .unwrap();
        assert_eq!(outcome.tables[0].rows_copied, 2);
        assert_eq!(outcome.tables[0].rows_failed, 1);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(server.rows("shop_anonymous", "user").len(), 3);
    }

    #[tokio::test]
    async fn test_missing_table_aborts_strict_copy() {
        let (server, source, shadow) = setup(1);
        server.create_table(
            "shop",
            TableSchema::new("public", "audit").with_column(ColumnSchema::new("msg", "text", true)),
        );

        let err = copy_rows(&server, &source, &shadow, 10, CopyMode::Strict)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ShroudError::Copy(CopyError::TableMissing(ref table)) if table == "public.audit"
        ));
    }

    #[tokio::test]
    async fn test_missing_table_reported_in_best_effort_mode() {
        let (server, source, shadow) = setup(1);
        server.create_table(
            "shop",
            TableSchema::new("public", "audit").with_column(ColumnSchema::new("msg", "text", true)),
        );

        let outcome = copy_rows(&server, &source, &shadow, 10, CopyMode::BestEffort)
            .await
            .unwrap();
        assert_eq!(outcome.tables.len(), 1);
        assert_eq!(outcome.tables[0].table, "public.user");
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].table, "public.audit");
    }

    #[tokio::test]
    async fn test_empty_shadow_schema_fails_in_any_mode() {
        let server = MemoryServer::new();
        server.create_table("shop", users());
        server.insert_rows(
            "shop",
            "user",
            vec![Row::new(vec![FieldValue::Integer(1), "a@corp.com".into()])],
        );
        server.create_database("shop_anonymous");
        let source = ConnectionDescriptor::from_url("postgresql://app@localhost/shop").unwrap();
        let shadow = source.shadow(None).unwrap();

        for mode in [CopyMode::Strict, CopyMode::BestEffort] {
            let err = copy_rows(&server, &source, &shadow, 10, mode).await.unwrap_err();
            assert!(matches!(err, ShroudError::Copy(CopyError::ShadowSchemaMissing)));
        }
    }

    #[tokio::test]
    async fn test_foreign_key_toggle_failure_stops_copy() {
        let (server, source, shadow) = setup(3);
        server.fail_foreign_key_checks(true);

        let err = copy_rows(&server, &source, &shadow, 10, CopyMode::BestEffort)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("session_replication_role"));
        assert!(server.rows("shop_anonymous", "user").is_empty());
    }
}
