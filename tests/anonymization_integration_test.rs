//! End-to-end anonymization runs on the in-memory engine

use async_trait::async_trait;
use shroud::adapters::database::DatabaseServer;
use shroud::adapters::memory::MemoryServer;
use shroud::config::{parse_config, ShroudConfig};
use shroud::core::anonymize::AnonymizationWalker;
use shroud::core::pipeline::{PipelineRun, PipelineStage, RunOutcome};
use shroud::core::provision::{
    DatabaseEvent, DatabaseEventKind, DatabaseEventListener, EventDispatcher,
};
use shroud::domain::{
    ColumnSchema, ConnectionDescriptor, FieldValue, Mapping, Result, Row, TableSchema,
};
use shroud::transform::TransformRegistry;
use std::collections::HashSet;
use std::sync::Arc;
use test_case::test_case;

const SOURCE: &str = "shop";
const SHADOW: &str = "shop_anonymous";

fn users() -> TableSchema {
    TableSchema::new("public", "user")
        .with_column(ColumnSchema::new("id", "integer", false))
        .with_column(ColumnSchema::new("email", "text", false))
        .with_column(ColumnSchema::new("nickname", "text", true))
        .with_column(ColumnSchema::new("city", "text", true))
        .with_primary_key(["id"])
}

fn user_rows(count: i64) -> Vec<Row> {
    (1..=count)
        .map(|i| {
            Row::new(vec![
                FieldValue::Integer(i),
                format!("customer{i}@corp.com").into(),
                format!("nick{i}").into(),
                "Lyon".into(),
            ])
        })
        .collect()
}

fn source_server(rows: i64) -> MemoryServer {
    let server = MemoryServer::new();
    server.create_table(SOURCE, users());
    server.insert_rows(SOURCE, "user", user_rows(rows));
    server
}

/// Creates the source schema in the shadow database once it exists
struct SchemaInstaller(MemoryServer);

#[async_trait]
impl DatabaseEventListener for SchemaInstaller {
    async fn on_event(&self, event: &DatabaseEvent) -> Result<()> {
        if event.kind == DatabaseEventKind::AfterCreated {
            self.0.create_table(event.connection.database_name()?, users());
        }
        Ok(())
    }
}

fn config(anonymization: &str, mapping: &str) -> ShroudConfig {
    parse_config(&format!(
        r#"
[source]
url = "postgresql://app@localhost/{SOURCE}"

[copy]
strategy = "row_copy"

[export]
enabled = false

[anonymization]
{anonymization}

{mapping}
"#
    ))
    .unwrap()
}

const USER_MAPPING: &str = r#"
[mapping.User]
email = "unique_email"
nickname = "constant_croar"
"#;

async fn run(config: ShroudConfig, server: &MemoryServer) -> RunOutcome {
    let mut events = EventDispatcher::new();
    events.subscribe(Arc::new(SchemaInstaller(server.clone())));
    PipelineRun::with_server(config, Arc::new(server.clone()))
        .with_events(events)
        .execute()
        .await
}

#[tokio::test]
async fn test_paginated_run_rewrites_every_row() {
    let server = source_server(250);
    let outcome = run(
        config("pagination = true\npage_size = 100", USER_MAPPING),
        &server,
    )
    .await;

    assert!(outcome.is_success(), "{:?}", outcome.failed_stage());

    let commits: Vec<usize> = server.commits(SHADOW).iter().map(|c| c.rows).collect();
    assert_eq!(commits, vec![100, 100, 50]);

    let emails = server.column(SHADOW, "user", "email");
    let distinct: HashSet<_> = emails.iter().map(|v| v.as_text().unwrap().to_string()).collect();
    assert_eq!(distinct.len(), 250);
    assert!(emails
        .iter()
        .all(|v| !v.as_text().unwrap().starts_with("customer")));

    assert!(server
        .column(SHADOW, "user", "nickname")
        .iter()
        .all(|v| *v == FieldValue::from("CROAR")));

    // Unmapped columns and the source are untouched
    assert!(server
        .column(SHADOW, "user", "city")
        .iter()
        .all(|v| *v == FieldValue::from("Lyon")));
    assert_eq!(server.rows(SOURCE, "user"), user_rows(250));

    let walk = outcome.summary().walk.as_ref().unwrap();
    assert_eq!(walk.rows_visited(), 250);
    assert_eq!(walk.batches_committed(), 3);
    assert_eq!(walk.fields_rewritten(), 500);
}

#[tokio::test]
async fn test_single_pass_when_pagination_disabled() {
    let server = source_server(250);
    let outcome = run(config("pagination = false", USER_MAPPING), &server).await;

    assert!(outcome.is_success());
    let commits: Vec<usize> = server.commits(SHADOW).iter().map(|c| c.rows).collect();
    assert_eq!(commits, vec![250]);
    assert!(server
        .column(SHADOW, "user", "nickname")
        .iter()
        .all(|v| *v == FieldValue::from("CROAR")));
}

#[test_case(0, 10, 0 ; "empty table")]
#[test_case(1, 10, 1 ; "single row")]
#[test_case(10, 10, 1 ; "exactly one page")]
#[test_case(11, 10, 2 ; "one row over")]
#[test_case(99, 7, 15 ; "uneven pages")]
#[test_case(5, 1, 5 ; "one row per page")]
#[tokio::test]
async fn test_batches_per_page(rows: i64, page_size: u64, batches: u64) {
    let server = MemoryServer::new();
    server.create_table(SHADOW, users());
    server.insert_rows(SHADOW, "user", user_rows(rows));

    let descriptor =
        ConnectionDescriptor::from_url(&format!("postgresql://app@localhost/{SHADOW}")).unwrap();
    let mut connection = server.connect(&descriptor).await.unwrap();
    let mapping = Mapping::builder()
        .field("User", "nickname", "constant_croar")
        .unwrap()
        .build();

    let mut walker = AnonymizationWalker::new(TransformRegistry::with_builtins(Some(7)))
        .with_pagination(page_size);
    let report = walker.run(&mapping, connection.as_mut()).await.unwrap();
    connection.close().await.unwrap();

    assert_eq!(report.rows_visited(), rows as u64);
    assert!(server
        .column(SHADOW, "user", "nickname")
        .iter()
        .all(|v| *v == FieldValue::from("CROAR")));
    assert_eq!(report.batches_committed(), batches);
    assert_eq!(server.commits(SHADOW).len() as u64, batches);
}

#[tokio::test]
async fn test_unknown_transform_leaves_field_unchanged() {
    let server = source_server(12);
    let mapping = r#"
[mapping.User]
nickname = "constant_croar"
email = "faker_email"
"#;
    let outcome = run(
        config("validate_transforms = false\npage_size = 5", mapping),
        &server,
    )
    .await;

    assert!(outcome.is_success());
    assert_eq!(
        server.column(SHADOW, "user", "email"),
        server.column(SOURCE, "user", "email")
    );
    assert!(server
        .column(SHADOW, "user", "nickname")
        .iter()
        .all(|v| *v == FieldValue::from("CROAR")));
}

#[tokio::test]
async fn test_unknown_transform_rejected_when_validated() {
    let server = source_server(3);
    let mapping = r#"
[mapping.User]
email = "faker_email"
"#;
    let outcome = run(config("validate_transforms = true", mapping), &server).await;

    assert_eq!(outcome.failed_stage(), Some(PipelineStage::Validate));
    assert!(!server.has_database(SHADOW));
}

#[tokio::test]
async fn test_rerun_replaces_previous_shadow() {
    let server = source_server(20);
    let first = run(config("page_size = 10", USER_MAPPING), &server).await;
    assert!(first.is_success());

    let second = run(config("page_size = 10", USER_MAPPING), &server).await;
    assert!(second.is_success());

    assert_eq!(server.databases(), vec![SOURCE, SHADOW]);
    assert_eq!(server.rows(SHADOW, "user").len(), 20);
}

#[tokio::test]
async fn test_seeded_runs_are_reproducible() {
    let emails = |server: &MemoryServer| server.column(SHADOW, "user", "email");

    let first = source_server(30);
    assert!(run(config("seed = 42", USER_MAPPING), &first).await.is_success());
    let second = source_server(30);
    assert!(run(config("seed = 42", USER_MAPPING), &second).await.is_success());

    assert_eq!(emails(&first), emails(&second));
}

#[tokio::test]
async fn test_pagination_does_not_change_transform_results() {
    let columns = |server: &MemoryServer| {
        (
            server.column(SHADOW, "user", "email"),
            server.column(SHADOW, "user", "nickname"),
        )
    };

    let paged = source_server(50);
    let outcome = run(
        config("seed = 42\npagination = true\npage_size = 7", USER_MAPPING),
        &paged,
    )
    .await;
    assert!(outcome.is_success());
    assert_eq!(paged.commits(SHADOW).len(), 8);

    let single = source_server(50);
    let outcome = run(config("seed = 42\npagination = false", USER_MAPPING), &single).await;
    assert!(outcome.is_success());
    assert_eq!(single.commits(SHADOW).len(), 1);

    assert_eq!(columns(&paged), columns(&single));
}
