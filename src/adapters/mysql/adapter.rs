//! MySQL adapter implementing database traits
//!
//! Values are read as `CAST(col AS CHAR)` and bound as positional string
//! parameters; the server converts them to the column type on write.

use crate::adapters::database::traits::{
    AdminConnection, DatabaseConnection, DatabaseServer, SuppressedChannel,
};
use crate::config::PoolSettings;
use crate::domain::{
    ColumnSchema, ConnectionDescriptor, EngineKind, FieldValue, PageRequest, Result, Row,
    RowUpdate, ShroudError, TableSchema,
};
use async_trait::async_trait;
use mysql_async::prelude::Queryable;
use mysql_async::{Conn, OptsBuilder, SslOpts, TxOpts, Value};
use std::collections::BTreeMap;

const LIST_COLUMNS: &str = r#"
    SELECT c.TABLE_SCHEMA,
           c.TABLE_NAME,
           c.COLUMN_NAME,
           c.COLUMN_TYPE,
           CAST(c.IS_NULLABLE = 'YES' AS SIGNED),
           CAST(c.EXTRA LIKE '%GENERATED%' AS SIGNED),
           k.ORDINAL_POSITION
    FROM information_schema.COLUMNS c
    JOIN information_schema.TABLES t
      ON t.TABLE_SCHEMA = c.TABLE_SCHEMA
     AND t.TABLE_NAME = c.TABLE_NAME
     AND t.TABLE_TYPE = 'BASE TABLE'
    LEFT JOIN information_schema.KEY_COLUMN_USAGE k
      ON k.TABLE_SCHEMA = c.TABLE_SCHEMA
     AND k.TABLE_NAME = c.TABLE_NAME
     AND k.COLUMN_NAME = c.COLUMN_NAME
     AND k.CONSTRAINT_NAME = 'PRIMARY'
    WHERE c.TABLE_SCHEMA = DATABASE()
    ORDER BY c.TABLE_NAME, c.ORDINAL_POSITION
"#;

const LIST_TRIGGER_TABLES: &str = "SELECT DISTINCT EVENT_OBJECT_TABLE \
     FROM information_schema.TRIGGERS WHERE TRIGGER_SCHEMA = DATABASE()";

type CatalogRow = (String, String, String, String, i64, i64, Option<i64>);

/// MySQL implementation of [`DatabaseServer`]
pub struct MySqlServer {
    settings: PoolSettings,
}

impl MySqlServer {
    pub fn new(settings: PoolSettings) -> Self {
        Self { settings }
    }

    async fn open(&self, descriptor: &ConnectionDescriptor) -> Result<Conn> {
        tracing::debug!(target_db = %descriptor.safe_display(), "Connecting to MySQL server");
        let opts = build_opts(descriptor);
        let mut conn = tokio::time::timeout(self.settings.connection_timeout, Conn::new(opts))
            .await
            .map_err(|_| {
                ShroudError::Connection(format!(
                    "Timed out connecting to {}",
                    descriptor.safe_display()
                ))
            })?
            .map_err(|e| {
                ShroudError::Connection(format!(
                    "Failed to connect to {}: {}",
                    descriptor.safe_display(),
                    e
                ))
            })?;

        if let Some(timeout) = self.settings.statement_timeout {
            conn.query_drop(format!(
                "SET SESSION MAX_EXECUTION_TIME = {}",
                timeout.as_millis()
            ))
            .await
            .map_err(db_err("Failed to set statement timeout"))?;
        }
        Ok(conn)
    }
}

#[async_trait]
impl DatabaseServer for MySqlServer {
    fn engine(&self) -> EngineKind {
        EngineKind::MySql
    }

    async fn connect_admin(
        &self,
        descriptor: &ConnectionDescriptor,
    ) -> Result<Box<dyn AdminConnection>> {
        let conn = self.open(&descriptor.without_database()).await?;
        Ok(Box::new(MySqlAdmin { conn }))
    }

    async fn connect(
        &self,
        descriptor: &ConnectionDescriptor,
    ) -> Result<Box<dyn DatabaseConnection>> {
        let database = descriptor.database_name()?.to_string();
        let conn = self.open(descriptor).await?;
        Ok(Box::new(MySqlConnection {
            conn,
            descriptor: descriptor.clone(),
            database,
        }))
    }
}

struct MySqlAdmin {
    conn: Conn,
}

#[async_trait]
impl AdminConnection for MySqlAdmin {
    async fn list_databases(&mut self) -> Result<Vec<String>> {
        self.conn
            .query::<String, _>("SHOW DATABASES")
            .await
            .map_err(db_err("Failed to list databases"))
    }

    async fn create_database(&mut self, name: &str) -> Result<()> {
        self.conn
            .query_drop(format!("CREATE DATABASE {}", quote_ident(name)))
            .await
            .map_err(db_err(&format!("Failed to create database {name}")))
    }

    async fn drop_database(&mut self, name: &str) -> Result<()> {
        self.conn
            .query_drop(format!("DROP DATABASE IF EXISTS {}", quote_ident(name)))
            .await
            .map_err(db_err(&format!("Failed to drop database {name}")))
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.conn
            .disconnect()
            .await
            .map_err(db_err("Failed to close connection"))
    }
}

struct MySqlConnection {
    conn: Conn,
    descriptor: ConnectionDescriptor,
    database: String,
}

#[async_trait]
impl DatabaseConnection for MySqlConnection {
    fn descriptor(&self) -> &ConnectionDescriptor {
        &self.descriptor
    }

    async fn list_tables(&mut self) -> Result<Vec<TableSchema>> {
        let rows: Vec<CatalogRow> = self
            .conn
            .query(LIST_COLUMNS)
            .await
            .map_err(db_err("Failed to read catalog"))?;

        let mut tables: Vec<(TableSchema, BTreeMap<i64, String>)> = Vec::new();
        for (schema, table, name, data_type, nullable, generated, key_position) in rows {
            let start_new = match tables.last() {
                Some((t, _)) => t.schema != schema || t.name != table,
                None => true,
            };
            if start_new {
                tables.push((TableSchema::new(schema, table), BTreeMap::new()));
            }
            if let Some((current, keys)) = tables.last_mut() {
                if let Some(position) = key_position {
                    keys.insert(position, name.clone());
                }
                let mut column = ColumnSchema::new(name, data_type, nullable != 0);
                if generated != 0 {
                    column = column.generated();
                }
                current.columns.push(column);
            }
        }

        Ok(tables
            .into_iter()
            .map(|(table, keys)| table.with_primary_key(keys.into_values()))
            .collect())
    }

    async fn count_rows(&mut self, table: &TableSchema) -> Result<u64> {
        let count: Option<u64> = self
            .conn
            .query_first(format!("SELECT COUNT(*) FROM {}", qualified(table)))
            .await
            .map_err(db_err(&format!("Failed to count {}", table.name)))?;
        Ok(count.unwrap_or(0))
    }

    async fn fetch_rows(
        &mut self,
        table: &TableSchema,
        page: Option<PageRequest>,
    ) -> Result<Vec<Row>> {
        let rows: Vec<mysql_async::Row> = self
            .conn
            .query(select_sql(table, page))
            .await
            .map_err(db_err(&format!("Failed to read {}", table.name)))?;

        rows.into_iter()
            .map(|mut row| {
                let values = table
                    .columns
                    .iter()
                    .enumerate()
                    .map(|(i, column)| match row.take_opt::<Option<String>, usize>(i) {
                        Some(Ok(text)) => Ok(FieldValue::from_sql_text(text, column.kind)),
                        Some(Err(e)) => Err(ShroudError::Database(format!(
                            "Failed to decode {}.{}: {}",
                            table.name, column.name, e
                        ))),
                        None => Ok(FieldValue::Null),
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok(Row::new(values))
            })
            .collect()
    }

    async fn insert_row(&mut self, table: &TableSchema, row: &Row) -> Result<()> {
        let values: Vec<Value> = table
            .columns
            .iter()
            .enumerate()
            .filter(|(_, c)| !c.generated)
            .map(|(i, _)| bind_value(row.get(i).unwrap_or(&FieldValue::Null)))
            .collect();

        self.conn
            .exec_drop(insert_sql(table), values)
            .await
            .map_err(|e| ShroudError::Database(e.to_string()))
    }

    async fn set_foreign_key_checks(&mut self, enabled: bool) -> Result<()> {
        let flag = if enabled { 1 } else { 0 };
        self.conn
            .query_drop(format!("SET FOREIGN_KEY_CHECKS={flag}"))
            .await
            .map_err(db_err("Failed to toggle foreign key checks"))
    }

    async fn suppress_listeners(&mut self, tables: &[TableSchema]) -> Result<SuppressedChannel> {
        let with_triggers: Vec<String> = self
            .conn
            .query(LIST_TRIGGER_TABLES)
            .await
            .map_err(db_err("Failed to list triggers"))?;

        let mut covered = Vec::with_capacity(tables.len());
        for table in tables {
            if with_triggers.iter().any(|t| *t == table.name) {
                tracing::warn!(
                    database = %self.database,
                    table = %table.name,
                    "MySQL cannot disable triggers; they will fire during anonymization"
                );
            } else {
                covered.push(table.qualified_name());
            }
        }
        Ok(SuppressedChannel::new(self.database.clone(), covered, false))
    }

    async fn apply_updates(
        &mut self,
        channel: &SuppressedChannel,
        table: &TableSchema,
        updates: &[RowUpdate],
    ) -> Result<()> {
        channel.check(&self.database)?;
        let context = format!("Failed to update {}", table.name);

        let mut tx = self
            .conn
            .start_transaction(TxOpts::default())
            .await
            .map_err(db_err(&context))?;
        for update in updates.iter().filter(|u| !u.is_empty()) {
            let (sql, values) = update_statement(table, update)?;
            tx.exec_drop(sql, values).await.map_err(db_err(&context))?;
        }
        tx.commit().await.map_err(db_err(&context))
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.conn
            .disconnect()
            .await
            .map_err(db_err("Failed to close connection"))
    }
}

fn db_err(context: &str) -> impl FnOnce(mysql_async::Error) -> ShroudError + '_ {
    move |e| ShroudError::Database(format!("{context}: {e}"))
}

pub(crate) fn build_opts(descriptor: &ConnectionDescriptor) -> OptsBuilder {
    let mut opts = OptsBuilder::default()
        .ip_or_hostname(descriptor.host.clone())
        .tcp_port(descriptor.port)
        .user(Some(descriptor.user.clone()))
        .prefer_socket(Some(false));

    if descriptor.password.is_some() {
        opts = opts.pass(Some(descriptor.password_str().to_string()));
    }
    if let Some(database) = &descriptor.database {
        opts = opts.db_name(Some(database.clone()));
    }

    let mode = descriptor
        .options
        .get("ssl-mode")
        .or_else(|| descriptor.options.get("sslmode"))
        .map(|m| m.to_ascii_lowercase());
    match mode.as_deref() {
        None | Some("disable") | Some("disabled") => opts,
        Some("prefer") | Some("preferred") | Some("require") | Some("required") => opts
            .ssl_opts(Some(
                SslOpts::default().with_danger_accept_invalid_certs(true),
            )),
        Some(_) => opts.ssl_opts(Some(SslOpts::default())),
    }
}

fn quote_ident(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

fn qualified(table: &TableSchema) -> String {
    format!("{}.{}", quote_ident(&table.schema), quote_ident(&table.name))
}

/// Booleans are bound as 1/0 so they land in `tinyint(1)` columns
fn bind_value(value: &FieldValue) -> Value {
    match value {
        FieldValue::Bool(b) => Value::from(if *b { "1" } else { "0" }),
        other => match other.as_sql_text() {
            Some(text) => Value::from(text),
            None => Value::NULL,
        },
    }
}

fn select_sql(table: &TableSchema, page: Option<PageRequest>) -> String {
    let columns = table
        .columns
        .iter()
        .map(|c| format!("CAST({} AS CHAR)", quote_ident(&c.name)))
        .collect::<Vec<_>>()
        .join(", ");

    let order = if table.has_primary_key() {
        table
            .primary_key
            .iter()
            .map(|k| quote_ident(k))
            .collect::<Vec<_>>()
            .join(", ")
    } else {
        (1..=table.columns.len())
            .map(|i| i.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    };

    let mut sql = format!("SELECT {columns} FROM {}", qualified(table));
    if !order.is_empty() {
        sql.push_str(&format!(" ORDER BY {order}"));
    }
    if let Some(page) = page {
        sql.push_str(&format!(" LIMIT {} OFFSET {}", page.limit, page.offset));
    }
    sql
}

fn insert_sql(table: &TableSchema) -> String {
    let writable: Vec<&ColumnSchema> = table.columns.iter().filter(|c| !c.generated).collect();
    let names = writable
        .iter()
        .map(|c| quote_ident(&c.name))
        .collect::<Vec<_>>()
        .join(", ");
    let placeholders = vec!["?"; writable.len()].join(", ");
    format!("INSERT INTO {} ({names}) VALUES ({placeholders})", qualified(table))
}

fn update_statement(table: &TableSchema, update: &RowUpdate) -> Result<(String, Vec<Value>)> {
    let mut values = Vec::with_capacity(update.changes.len() + update.key.len());
    let mut assignments = Vec::with_capacity(update.changes.len());

    for (index, value) in &update.changes {
        let column = table.columns.get(*index).ok_or_else(|| {
            ShroudError::Database(format!(
                "Column index {index} out of range for {}",
                table.name
            ))
        })?;
        assignments.push(format!("{} = ?", quote_ident(&column.name)));
        values.push(bind_value(value));
    }

    let predicates: Vec<String> = table
        .primary_key
        .iter()
        .map(|k| format!("{} = ?", quote_ident(k)))
        .collect();
    if predicates.is_empty() {
        return Err(ShroudError::Anonymization(format!(
            "Table {} has no primary key; rows cannot be updated",
            table.qualified_name()
        )));
    }
    values.extend(update.key.iter().map(bind_value));

    Ok((
        format!(
            "UPDATE {} SET {} WHERE {}",
            qualified(table),
            assignments.join(", "),
            predicates.join(" AND ")
        ),
        values,
    ))
}
