//! PostgreSQL adapter implementing database traits
//!
//! Values travel as text in both directions: columns are read as `::text` and
//! written with `CAST($n::text AS <column type>)`, so every column type the
//! server can cast from text is supported without a per-type binding.

use crate::adapters::database::traits::{
    AdminConnection, DatabaseConnection, DatabaseServer, SuppressedChannel,
};
use crate::adapters::postgresql::client::PostgresClient;
use crate::config::PoolSettings;
use crate::domain::{
    ColumnSchema, ConnectionDescriptor, EngineKind, FieldValue, PageRequest, Result, Row,
    RowUpdate, ShroudError, TableSchema,
};
use async_trait::async_trait;
use deadpool_postgres::Object;
use std::collections::BTreeMap;
use tokio_postgres::types::ToSql;

const LIST_DATABASES: &str =
    "SELECT datname FROM pg_database WHERE datistemplate = false ORDER BY datname";

const CAN_CREATE_DATABASE: &str =
    "SELECT rolcreatedb OR rolsuper FROM pg_roles WHERE rolname = current_user";

const LIST_COLUMNS: &str = r#"
    SELECT n.nspname,
           c.relname,
           a.attname,
           format_type(a.atttypid, a.atttypmod),
           NOT a.attnotnull,
           a.attgenerated <> '',
           array_position(i.indkey::int2[], a.attnum)
    FROM pg_class c
    JOIN pg_namespace n ON n.oid = c.relnamespace
    JOIN pg_attribute a ON a.attrelid = c.oid AND a.attnum > 0 AND NOT a.attisdropped
    LEFT JOIN pg_index i ON i.indrelid = c.oid AND i.indisprimary
    WHERE c.relkind IN ('r', 'p')
      AND NOT c.relispartition
      AND n.nspname NOT IN ('pg_catalog', 'information_schema')
      AND n.nspname NOT LIKE 'pg_toast%'
    ORDER BY n.nspname, c.relname, a.attnum
"#;

/// PostgreSQL implementation of [`DatabaseServer`]
pub struct PostgresServer {
    settings: PoolSettings,
    /// Maintenance database the administrative connection targets
    admin_database: String,
}

impl PostgresServer {
    pub fn new(settings: PoolSettings, admin_database: impl Into<String>) -> Self {
        Self {
            settings,
            admin_database: admin_database.into(),
        }
    }
}

#[async_trait]
impl DatabaseServer for PostgresServer {
    fn engine(&self) -> EngineKind {
        EngineKind::PostgreSQL
    }

    async fn connect_admin(
        &self,
        descriptor: &ConnectionDescriptor,
    ) -> Result<Box<dyn AdminConnection>> {
        let descriptor = descriptor.with_database(self.admin_database.clone());
        let client = PostgresClient::new(&descriptor, &self.settings)?;
        let session = client.session().await?;
        tracing::debug!(target_db = %descriptor.safe_display(), "Opened administrative connection");
        Ok(Box::new(PostgresAdmin { client, session }))
    }

    async fn connect(
        &self,
        descriptor: &ConnectionDescriptor,
    ) -> Result<Box<dyn DatabaseConnection>> {
        let database = descriptor.database_name()?.to_string();
        let client = PostgresClient::new(descriptor, &self.settings)?;
        let session = client.session().await?;
        Ok(Box::new(PostgresConnection {
            client,
            session,
            database,
            fk_disabled_tables: Vec::new(),
        }))
    }
}

struct PostgresAdmin {
    client: PostgresClient,
    session: Object,
}

#[async_trait]
impl AdminConnection for PostgresAdmin {
    async fn list_databases(&mut self) -> Result<Vec<String>> {
        let rows = self
            .session
            .query(LIST_DATABASES, &[])
            .await
            .map_err(|e| ShroudError::Database(format!("Failed to list databases: {}", e)))?;
        rows.iter()
            .map(|row| {
                row.try_get::<_, String>(0)
                    .map_err(|e| ShroudError::Database(format!("Invalid database name: {}", e)))
            })
            .collect()
    }

    async fn create_database(&mut self, name: &str) -> Result<()> {
        self.session
            .batch_execute(&format!("CREATE DATABASE {}", quote_ident(name)))
            .await
            .map_err(|e| {
                ShroudError::Database(format!("Failed to create database {}: {}", name, e))
            })
    }

    async fn drop_database(&mut self, name: &str) -> Result<()> {
        self.session
            .batch_execute(&format!("DROP DATABASE IF EXISTS {}", quote_ident(name)))
            .await
            .map_err(|e| ShroudError::Database(format!("Failed to drop database {}: {}", name, e)))
    }

    async fn can_create_database(&mut self) -> Result<bool> {
        let row = self
            .session
            .query_opt(CAN_CREATE_DATABASE, &[])
            .await
            .map_err(|e| ShroudError::Database(format!("Privilege probe failed: {}", e)))?;
        match row {
            Some(row) => row
                .try_get::<_, Option<bool>>(0)
                .map(|allowed| allowed.unwrap_or(false))
                .map_err(|e| ShroudError::Database(format!("Privilege probe failed: {}", e))),
            None => Ok(false),
        }
    }

    async fn close(self: Box<Self>) -> Result<()> {
        let PostgresAdmin { client, session } = *self;
        drop(session);
        client.close();
        Ok(())
    }
}

struct PostgresConnection {
    client: PostgresClient,
    /// Dedicated session: replication role and trigger state live here
    session: Object,
    database: String,
    /// Tables whose constraint triggers were disabled when the replication role was denied
    fk_disabled_tables: Vec<String>,
}

impl PostgresConnection {
    async fn set_replication_role(&self, role: &str) -> Result<()> {
        self.session
            .batch_execute(&format!("SET session_replication_role = {role}"))
            .await
            .map_err(|e| {
                ShroudError::Database(format!(
                    "Failed to set session_replication_role to {role}: {}",
                    e
                ))
            })
    }
}

#[async_trait]
impl DatabaseConnection for PostgresConnection {
    fn descriptor(&self) -> &ConnectionDescriptor {
        self.client.descriptor()
    }

    async fn list_tables(&mut self) -> Result<Vec<TableSchema>> {
        let rows = self
            .session
            .query(LIST_COLUMNS, &[])
            .await
            .map_err(|e| ShroudError::Database(format!("Failed to read catalog: {}", e)))?;

        let mut tables: Vec<(TableSchema, BTreeMap<i32, String>)> = Vec::new();
        for row in &rows {
            let column = CatalogColumn::from_row(row)?;
            let start_new = match tables.last() {
                Some((t, _)) => t.schema != column.schema || t.name != column.table,
                None => true,
            };
            if start_new {
                tables.push((
                    TableSchema::new(column.schema.clone(), column.table.clone()),
                    BTreeMap::new(),
                ));
            }
            if let Some((table, keys)) = tables.last_mut() {
                if let Some(position) = column.key_position {
                    keys.insert(position, column.name.clone());
                }
                let mut schema = ColumnSchema::new(column.name, column.data_type, column.nullable);
                if column.generated {
                    schema = schema.generated();
                }
                table.columns.push(schema);
            }
        }

        Ok(tables
            .into_iter()
            .map(|(table, keys)| table.with_primary_key(keys.into_values()))
            .collect())
    }

    async fn count_rows(&mut self, table: &TableSchema) -> Result<u64> {
        let sql = format!("SELECT count(*) FROM {}", qualified(table));
        let row = self
            .session
            .query_one(&sql, &[])
            .await
            .map_err(|e| ShroudError::Database(format!("Failed to count {}: {}", table.name, e)))?;
        let count: i64 = row
            .try_get(0)
            .map_err(|e| ShroudError::Database(format!("Failed to count {}: {}", table.name, e)))?;
        Ok(count.max(0) as u64)
    }

    async fn fetch_rows(
        &mut self,
        table: &TableSchema,
        page: Option<PageRequest>,
    ) -> Result<Vec<Row>> {
        let sql = select_sql(table, page);
        let rows = self
            .session
            .query(&sql, &[])
            .await
            .map_err(|e| ShroudError::Database(format!("Failed to read {}: {}", table.name, e)))?;

        rows.iter()
            .map(|row| {
                let values = table
                    .columns
                    .iter()
                    .enumerate()
                    .map(|(i, column)| {
                        row.try_get::<_, Option<String>>(i)
                            .map(|text| FieldValue::from_sql_text(text, column.kind))
                            .map_err(|e| {
                                ShroudError::Database(format!(
                                    "Failed to decode {}.{}: {}",
                                    table.name, column.name, e
                                ))
                            })
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok(Row::new(values))
            })
            .collect()
    }

    async fn insert_row(&mut self, table: &TableSchema, row: &Row) -> Result<()> {
        let mut values = Vec::new();
        for (i, column) in table.columns.iter().enumerate() {
            if column.generated {
                continue;
            }
            values.push(bind_value(column, row.get(i).unwrap_or(&FieldValue::Null))?);
        }
        let params: Vec<&(dyn ToSql + Sync)> =
            values.iter().map(|v| v as &(dyn ToSql + Sync)).collect();

        self.session
            .execute(&insert_sql(table), &params)
            .await
            .map(|_| ())
            .map_err(|e| ShroudError::Database(e.to_string()))
    }

    async fn set_foreign_key_checks(&mut self, enabled: bool) -> Result<()> {
        if enabled {
            if self.fk_disabled_tables.is_empty() {
                return self.set_replication_role("DEFAULT").await;
            }
            for table in std::mem::take(&mut self.fk_disabled_tables) {
                self.session
                    .batch_execute(&trigger_sql(&table, true))
                    .await
                    .map_err(|e| {
                        ShroudError::Database(format!(
                            "Failed to re-enable triggers on {table}: {e}"
                        ))
                    })?;
            }
            return Ok(());
        }

        let denied = match self.set_replication_role("replica").await {
            Ok(()) => return Ok(()),
            Err(e) => e,
        };
        tracing::warn!(
            database = %self.database,
            error = %denied,
            "Replication role unavailable; disabling triggers per table"
        );

        for table in self.list_tables().await? {
            let name = qualified(&table);
            if let Err(e) = self.session.batch_execute(&trigger_sql(&name, false)).await {
                // trigger state outlives the session
                for done in std::mem::take(&mut self.fk_disabled_tables) {
                    if let Err(e) = self.session.batch_execute(&trigger_sql(&done, true)).await {
                        tracing::error!(table = %done, error = %e, "Failed to re-enable triggers");
                    }
                }
                return Err(ShroudError::Database(format!(
                    "Cannot disable foreign key checks on {}: {} ({})",
                    table.qualified_name(),
                    e,
                    denied
                )));
            }
            self.fk_disabled_tables.push(name);
        }
        Ok(())
    }

    async fn suppress_listeners(&mut self, tables: &[TableSchema]) -> Result<SuppressedChannel> {
        let global = match self.set_replication_role("replica").await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(
                    database = %self.database,
                    error = %e,
                    "Session-wide trigger suppression unavailable; disabling triggers per table"
                );
                false
            }
        };

        let mut suppressed = Vec::with_capacity(tables.len());
        for table in tables {
            let sql = format!("ALTER TABLE {} DISABLE TRIGGER USER", qualified(table));
            self.session.batch_execute(&sql).await.map_err(|e| {
                ShroudError::Anonymization(format!(
                    "Failed to disable triggers on {}: {}",
                    table.qualified_name(),
                    e
                ))
            })?;
            suppressed.push(table.qualified_name());
        }

        tracing::debug!(
            database = %self.database,
            tables = suppressed.len(),
            global,
            "Listeners suppressed"
        );
        Ok(SuppressedChannel::new(self.database.clone(), suppressed, global))
    }

    async fn apply_updates(
        &mut self,
        channel: &SuppressedChannel,
        table: &TableSchema,
        updates: &[RowUpdate],
    ) -> Result<()> {
        channel.check(&self.database)?;
        let name = table.name.clone();
        let tx_err = move |e: tokio_postgres::Error| {
            ShroudError::Database(format!("Failed to update {}: {}", name, e))
        };

        let tx = self.session.transaction().await.map_err(tx_err.clone())?;
        for update in updates.iter().filter(|u| !u.is_empty()) {
            let (sql, values) = update_statement(table, update)?;
            let params: Vec<&(dyn ToSql + Sync)> =
                values.iter().map(|v| v as &(dyn ToSql + Sync)).collect();
            let affected = tx.execute(&sql, &params).await.map_err(tx_err.clone())?;
            if affected != 1 {
                return Err(ShroudError::Database(format!(
                    "Update of {} matched {} rows for key {:?}",
                    table.name, affected, update.key
                )));
            }
        }
        tx.commit().await.map_err(tx_err)
    }

    async fn close(self: Box<Self>) -> Result<()> {
        let PostgresConnection {
            client, session, ..
        } = *self;
        drop(session);
        client.close();
        Ok(())
    }
}

struct CatalogColumn {
    schema: String,
    table: String,
    name: String,
    data_type: String,
    nullable: bool,
    generated: bool,
    key_position: Option<i32>,
}

impl CatalogColumn {
    fn from_row(row: &tokio_postgres::Row) -> Result<Self> {
        let decode = |e: tokio_postgres::Error| {
            ShroudError::Database(format!("Unexpected catalog row: {}", e))
        };
        Ok(Self {
            schema: row.try_get(0).map_err(decode)?,
            table: row.try_get(1).map_err(decode)?,
            name: row.try_get(2).map_err(decode)?,
            data_type: row.try_get(3).map_err(decode)?,
            nullable: row.try_get(4).map_err(decode)?,
            generated: row.try_get(5).map_err(decode)?,
            key_position: row.try_get(6).map_err(decode)?,
        })
    }
}

/// Double-quotes an identifier
fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn qualified(table: &TableSchema) -> String {
    format!("{}.{}", quote_ident(&table.schema), quote_ident(&table.name))
}

fn trigger_sql(qualified_table: &str, enabled: bool) -> String {
    let action = if enabled { "ENABLE" } else { "DISABLE" };
    format!("ALTER TABLE {qualified_table} {action} TRIGGER ALL")
}

fn cast_param(index: usize, column: &ColumnSchema) -> String {
    format!("CAST(${index}::text AS {})", column.data_type)
}

fn bind_value(column: &ColumnSchema, value: &FieldValue) -> Result<Option<String>> {
    let bind = column.bind_type();
    match value.as_sql_text() {
        None if !bind.nullable => Err(ShroudError::Database(format!(
            "NULL value for NOT NULL column \"{}\"",
            column.name
        ))),
        text => Ok(text),
    }
}

fn select_sql(table: &TableSchema, page: Option<PageRequest>) -> String {
    let columns = table
        .columns
        .iter()
        .map(|c| format!("{}::text", quote_ident(&c.name)))
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
    let values = writable
        .iter()
        .enumerate()
        .map(|(i, c)| cast_param(i + 1, c))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "INSERT INTO {} ({names}) OVERRIDING SYSTEM VALUE VALUES ({values})",
        qualified(table)
    )
}

fn update_statement(
    table: &TableSchema,
    update: &RowUpdate,
) -> Result<(String, Vec<Option<String>>)> {
    let mut values = Vec::with_capacity(update.changes.len() + update.key.len());
    let mut assignments = Vec::with_capacity(update.changes.len());

    for (index, value) in &update.changes {
        let column = table.columns.get(*index).ok_or_else(|| {
            ShroudError::Database(format!(
                "Column index {index} out of range for {}",
                table.name
            ))
        })?;
        values.push(bind_value(column, value)?);
        assignments.push(format!(
            "{} = {}",
            quote_ident(&column.name),
            cast_param(values.len(), column)
        ));
    }

    let mut predicates = Vec::with_capacity(update.key.len());
    for (column_index, value) in table.key_indexes().into_iter().zip(&update.key) {
        let column = &table.columns[column_index];
        values.push(value.as_sql_text());
        predicates.push(format!(
            "{} = {}",
            quote_ident(&column.name),
            cast_param(values.len(), column)
        ));
    }

    if predicates.is_empty() {
        return Err(ShroudError::Anonymization(format!(
            "Table {} has no primary key; rows cannot be updated",
            table.qualified_name()
        )));
    }

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

#[cfg(test)]
mod tests {
    use super::*;

    fn users() -> TableSchema {
        TableSchema::new("public", "user")
            .with_column(ColumnSchema::new("id", "integer", false))
            .with_column(ColumnSchema::new("email", "character varying(255)", false))
            .with_column(ColumnSchema::new("nickname", "text", true))
            .with_column(ColumnSchema::new("search", "tsvector", true).generated())
            .with_primary_key(["id"])
    }

    #[test]
    fn test_quote_ident_escapes_quotes() {
        assert_eq!(quote_ident("user"), "\"user\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn test_trigger_sql_covers_constraint_triggers() {
        let name = qualified(&users());
        assert_eq!(
            trigger_sql(&name, false),
            "ALTER TABLE \"public\".\"user\" DISABLE TRIGGER ALL"
        );
        assert_eq!(
            trigger_sql(&name, true),
            "ALTER TABLE \"public\".\"user\" ENABLE TRIGGER ALL"
        );
    }

    #[test]
    fn test_select_orders_by_primary_key() {
        let sql = select_sql(&users(), Some(PageRequest { offset: 200, limit: 100 }));
        assert_eq!(
            sql,
            "SELECT \"id\"::text, \"email\"::text, \"nickname\"::text, \"search\"::text \
             FROM \"public\".\"user\" ORDER BY \"id\" LIMIT 100 OFFSET 200"
        );
    }

    #[test]
    fn test_select_without_key_orders_by_every_column() {
        let table = TableSchema::new("public", "log")
            .with_column(ColumnSchema::new("at", "timestamp without time zone", true))
            .with_column(ColumnSchema::new("message", "text", true));
        let sql = select_sql(&table, None);
        assert!(sql.ends_with("ORDER BY 1, 2"));
    }

    #[test]
    fn test_insert_skips_generated_columns() {
        let sql = insert_sql(&users());
        assert_eq!(
            sql,
            "INSERT INTO \"public\".\"user\" (\"id\", \"email\", \"nickname\") \
             OVERRIDING SYSTEM VALUE VALUES (CAST($1::text AS integer), \
             CAST($2::text AS character varying(255)), CAST($3::text AS text))"
        );
    }

    #[test]
    fn test_update_statement_binds_changes_then_key() {
        let update = RowUpdate {
            key: vec![FieldValue::Integer(7)],
            changes: vec![(1, "a@example.com".into()), (2, FieldValue::Null)],
        };
        let (sql, values) = update_statement(&users(), &update).unwrap();
        assert_eq!(
            sql,
            "UPDATE \"public\".\"user\" SET \"email\" = CAST($1::text AS character varying(255)), \
             \"nickname\" = CAST($2::text AS text) WHERE \"id\" = CAST($3::text AS integer)"
        );
        assert_eq!(
            values,
            vec![Some("a@example.com".to_string()), None, Some("7".to_string())]
        );
    }

    #[test]
    fn test_null_into_not_null_column_rejected() {
        let update = RowUpdate {
            key: vec![FieldValue::Integer(7)],
            changes: vec![(1, FieldValue::Null)],
        };
        assert!(update_statement(&users(), &update).is_err());
    }

    #[test]
    fn test_update_requires_primary_key() {
        let table = TableSchema::new("public", "log")
            .with_column(ColumnSchema::new("message", "text", true));
        let update = RowUpdate {
            key: vec![],
            changes: vec![(0, "x".into())],
        };
        assert!(update_statement(&table, &update).is_err());
    }
}
