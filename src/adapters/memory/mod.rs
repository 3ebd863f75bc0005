//! In-memory database engine
//!
//! Implements every database trait on plain Rust collections so provisioning,
//! row copy, the walker and whole pipeline runs can be exercised without a
//! live server. It also records what happened (commits, FK toggles, listener
//! suppression, admin sessions) so tests can assert on it.

use crate::adapters::database::traits::{
    AdminConnection, DatabaseConnection, DatabaseServer, SuppressedChannel,
};
use crate::domain::{
    ConnectionDescriptor, EngineKind, FieldValue, PageRequest, Result, Row, RowUpdate,
    ShroudError, TableSchema,
};
use async_trait::async_trait;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// One committed batch of updates
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitRecord {
    pub table: String,
    pub rows: usize,
}

#[derive(Debug, Clone)]
struct MemoryTable {
    schema: TableSchema,
    rows: Vec<Row>,
}

#[derive(Debug, Clone, Default)]
struct MemoryDatabase {
    tables: Vec<MemoryTable>,
    commits: Vec<CommitRecord>,
    fk_toggles: Vec<bool>,
    suppressed_tables: Vec<String>,
    global_suppression: bool,
}

impl MemoryDatabase {
    fn table(&self, table: &TableSchema) -> Result<&MemoryTable> {
        self.tables
            .iter()
            .find(|t| t.schema.name == table.name && t.schema.schema == table.schema)
            .ok_or_else(|| missing_table(table))
    }

    fn table_mut(&mut self, table: &TableSchema) -> Result<&mut MemoryTable> {
        self.tables
            .iter_mut()
            .find(|t| t.schema.name == table.name && t.schema.schema == table.schema)
            .ok_or_else(|| missing_table(table))
    }
}

fn missing_table(table: &TableSchema) -> ShroudError {
    ShroudError::Database(format!(
        "relation \"{}\" does not exist",
        table.qualified_name()
    ))
}

#[derive(Debug)]
struct ServerState {
    databases: BTreeMap<String, MemoryDatabase>,
    can_create: bool,
    fail_drops: bool,
    fail_creates: bool,
    fail_foreign_key_checks: bool,
    open_admin_sessions: usize,
    admin_sessions: usize,
}

impl Default for ServerState {
    fn default() -> Self {
        Self {
            databases: BTreeMap::new(),
            can_create: true,
            fail_drops: false,
            fail_creates: false,
            fail_foreign_key_checks: false,
            open_admin_sessions: 0,
            admin_sessions: 0,
        }
    }
}

/// Shared handle on an in-memory server
///
/// Clones share state, so a test keeps one handle for inspection while the
/// pipeline uses another.
#[derive(Debug, Clone)]
pub struct MemoryServer {
    engine: EngineKind,
    state: Arc<Mutex<ServerState>>,
}

impl Default for MemoryServer {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryServer {
    pub fn new() -> Self {
        Self::with_engine(EngineKind::PostgreSQL)
    }

    pub fn with_engine(engine: EngineKind) -> Self {
        Self {
            engine,
            state: Arc::new(Mutex::new(ServerState::default())),
        }
    }

    fn state(&self) -> MutexGuard<'_, ServerState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Creates a database directly, bypassing any failure injection
    pub fn create_database(&self, name: &str) {
        self.state()
            .databases
            .entry(name.to_string())
            .or_default();
    }

    /// Creates (or replaces) a table in an existing or new database
    pub fn create_table(&self, database: &str, schema: TableSchema) {
        let mut state = self.state();
        let db = state.databases.entry(database.to_string()).or_default();
        db.tables
            .retain(|t| !(t.schema.name == schema.name && t.schema.schema == schema.schema));
        db.tables.push(MemoryTable {
            schema,
            rows: Vec::new(),
        });
    }

    /// Appends rows to a table without any constraint check
    pub fn insert_rows(&self, database: &str, table: &str, rows: Vec<Row>) {
        let mut state = self.state();
        if let Some(t) = state
            .databases
            .get_mut(database)
            .and_then(|db| db.tables.iter_mut().find(|t| t.schema.name == table))
        {
            t.rows.extend(rows);
        }
    }

    /// Current rows of a table, in insertion order
    pub fn rows(&self, database: &str, table: &str) -> Vec<Row> {
        self.state()
            .databases
            .get(database)
            .and_then(|db| db.tables.iter().find(|t| t.schema.name == table))
            .map(|t| t.rows.clone())
            .unwrap_or_default()
    }

    /// Values of one column, in insertion order
    pub fn column(&self, database: &str, table: &str, column: &str) -> Vec<FieldValue> {
        let state = self.state();
        let Some(t) = state
            .databases
            .get(database)
            .and_then(|db| db.tables.iter().find(|t| t.schema.name == table))
        else {
            return Vec::new();
        };
        let Some(index) = t.schema.column_index(column) else {
            return Vec::new();
        };
        t.rows
            .iter()
            .map(|r| r.values.get(index).cloned().unwrap_or_default())
            .collect()
    }

    /// Names of all databases
    pub fn databases(&self) -> Vec<String> {
        self.state().databases.keys().cloned().collect()
    }

    pub fn has_database(&self, name: &str) -> bool {
        self.state().databases.contains_key(name)
    }

    /// Table names of a database
    pub fn tables(&self, database: &str) -> Vec<String> {
        self.state()
            .databases
            .get(database)
            .map(|db| db.tables.iter().map(|t| t.schema.name.clone()).collect())
            .unwrap_or_default()
    }

    /// Committed update batches, in commit order
    pub fn commits(&self, database: &str) -> Vec<CommitRecord> {
        self.state()
            .databases
            .get(database)
            .map(|db| db.commits.clone())
            .unwrap_or_default()
    }

    /// Every `set_foreign_key_checks` call, in order
    pub fn foreign_key_toggles(&self, database: &str) -> Vec<bool> {
        self.state()
            .databases
            .get(database)
            .map(|db| db.fk_toggles.clone())
            .unwrap_or_default()
    }

    /// Tables whose listeners were suppressed, and whether suppression was global
    pub fn suppressed_listeners(&self, database: &str) -> (Vec<String>, bool) {
        self.state()
            .databases
            .get(database)
            .map(|db| (db.suppressed_tables.clone(), db.global_suppression))
            .unwrap_or_default()
    }

    /// Makes every `drop_database` call fail
    pub fn fail_drops(&self, fail: bool) {
        self.state().fail_drops = fail;
    }

    /// Makes every `create_database` call fail
    pub fn fail_creates(&self, fail: bool) {
        self.state().fail_creates = fail;
    }

    /// Makes every `set_foreign_key_checks` call fail
    pub fn fail_foreign_key_checks(&self, fail: bool) {
        self.state().fail_foreign_key_checks = fail;
    }

    /// Answer of the privilege probe
    pub fn set_can_create(&self, can_create: bool) {
        self.state().can_create = can_create;
    }

    /// Administrative sessions still open
    pub fn open_admin_sessions(&self) -> usize {
        self.state().open_admin_sessions
    }

    /// Administrative sessions opened so far
    pub fn admin_sessions(&self) -> usize {
        self.state().admin_sessions
    }
}

#[async_trait]
impl DatabaseServer for MemoryServer {
    fn engine(&self) -> EngineKind {
        self.engine
    }

    async fn connect_admin(
        &self,
        _descriptor: &ConnectionDescriptor,
    ) -> Result<Box<dyn AdminConnection>> {
        let mut state = self.state();
        state.open_admin_sessions += 1;
        state.admin_sessions += 1;
        Ok(Box::new(MemoryAdmin {
            server: self.clone(),
        }))
    }

    async fn connect(
        &self,
        descriptor: &ConnectionDescriptor,
    ) -> Result<Box<dyn DatabaseConnection>> {
        let database = descriptor.database_name()?.to_string();
        if !self.has_database(&database) {
            return Err(ShroudError::Connection(format!(
                "database \"{database}\" does not exist"
            )));
        }
        Ok(Box::new(MemoryConnection {
            server: self.clone(),
            descriptor: descriptor.clone(),
            database,
        }))
    }
}

struct MemoryAdmin {
    server: MemoryServer,
}

#[async_trait]
impl AdminConnection for MemoryAdmin {
    async fn list_databases(&mut self) -> Result<Vec<String>> {
        Ok(self.server.databases())
    }

    async fn create_database(&mut self, name: &str) -> Result<()> {
        let mut state = self.server.state();
        if state.fail_creates {
            return Err(ShroudError::Database(format!(
                "permission denied to create database \"{name}\""
            )));
        }
        if state.databases.contains_key(name) {
            return Err(ShroudError::Database(format!(
                "database \"{name}\" already exists"
            )));
        }
        state.databases.insert(name.to_string(), MemoryDatabase::default());
        Ok(())
    }

    async fn drop_database(&mut self, name: &str) -> Result<()> {
        let mut state = self.server.state();
        if state.fail_drops {
            return Err(ShroudError::Database(format!(
                "database \"{name}\" is being accessed by other users"
            )));
        }
        state.databases.remove(name);
        Ok(())
    }

    async fn can_create_database(&mut self) -> Result<bool> {
        Ok(self.server.state().can_create)
    }

    async fn close(self: Box<Self>) -> Result<()> {
        let mut state = self.server.state();
        state.open_admin_sessions = state.open_admin_sessions.saturating_sub(1);
        Ok(())
    }
}

struct MemoryConnection {
    server: MemoryServer,
    descriptor: ConnectionDescriptor,
    database: String,
}

impl MemoryConnection {
    fn with_db<T>(&self, f: impl FnOnce(&mut MemoryDatabase) -> Result<T>) -> Result<T> {
        let mut state = self.server.state();
        let db = state.databases.get_mut(&self.database).ok_or_else(|| {
            ShroudError::Connection(format!("database \"{}\" was dropped", self.database))
        })?;
        f(db)
    }
}

fn compare_values(a: &FieldValue, b: &FieldValue) -> Ordering {
    match (a, b) {
        (FieldValue::Integer(x), FieldValue::Integer(y)) => x.cmp(y),
        (FieldValue::Null, FieldValue::Null) => Ordering::Equal,
        (FieldValue::Null, _) => Ordering::Greater,
        (_, FieldValue::Null) => Ordering::Less,
        _ => a.as_sql_text().cmp(&b.as_sql_text()),
    }
}

fn compare_rows(a: &Row, b: &Row, indexes: &[usize]) -> Ordering {
    for &i in indexes {
        let ordering = compare_values(
            a.values.get(i).unwrap_or(&FieldValue::Null),
            b.values.get(i).unwrap_or(&FieldValue::Null),
        );
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

fn order_indexes(schema: &TableSchema) -> Vec<usize> {
    if schema.has_primary_key() {
        schema.key_indexes()
    } else {
        (0..schema.columns.len()).collect()
    }
}

#[async_trait]
impl DatabaseConnection for MemoryConnection {
    fn descriptor(&self) -> &ConnectionDescriptor {
        &self.descriptor
    }

    async fn list_tables(&mut self) -> Result<Vec<TableSchema>> {
        self.with_db(|db| Ok(db.tables.iter().map(|t| t.schema.clone()).collect()))
    }

    async fn count_rows(&mut self, table: &TableSchema) -> Result<u64> {
        self.with_db(|db| Ok(db.table(table)?.rows.len() as u64))
    }

    async fn fetch_rows(
        &mut self,
        table: &TableSchema,
        page: Option<PageRequest>,
    ) -> Result<Vec<Row>> {
        self.with_db(|db| {
            let stored = db.table(table)?;
            let indexes = order_indexes(&stored.schema);
            let mut rows = stored.rows.clone();
            rows.sort_by(|a, b| compare_rows(a, b, &indexes));
            Ok(match page {
                Some(page) => rows
                    .into_iter()
                    .skip(page.offset as usize)
                    .take(page.limit as usize)
                    .collect(),
                None => rows,
            })
        })
    }

    async fn insert_row(&mut self, table: &TableSchema, row: &Row) -> Result<()> {
        self.with_db(|db| {
            let stored = db.table_mut(table)?;
            if row.values.len() != stored.schema.columns.len() {
                return Err(ShroudError::Database(format!(
                    "INSERT has {} values but {} has {} columns",
                    row.values.len(),
                    table.name,
                    stored.schema.columns.len()
                )));
            }
            for (column, value) in stored.schema.columns.iter().zip(&row.values) {
                if !column.nullable && value.is_null() {
                    return Err(ShroudError::Database(format!(
                        "null value in column \"{}\" violates not-null constraint",
                        column.name
                    )));
                }
            }
            if stored.schema.has_primary_key() {
                let key = row.key(&stored.schema);
                if stored.rows.iter().any(|r| r.key(&stored.schema) == key) {
                    return Err(ShroudError::Database(
                        "duplicate key value violates unique constraint".to_string(),
                    ));
                }
            }
            stored.rows.push(row.clone());
            Ok(())
        })
    }

    async fn set_foreign_key_checks(&mut self, enabled: bool) -> Result<()> {
        if self.server.state().fail_foreign_key_checks {
            return Err(ShroudError::Database(
                "permission denied to set parameter \"session_replication_role\"".to_string(),
            ));
        }
        self.with_db(|db| {
            db.fk_toggles.push(enabled);
            Ok(())
        })
    }

    async fn suppress_listeners(&mut self, tables: &[TableSchema]) -> Result<SuppressedChannel> {
        let names: Vec<String> = tables.iter().map(TableSchema::qualified_name).collect();
        self.with_db(|db| {
            db.global_suppression = true;
            for name in &names {
                if !db.suppressed_tables.contains(name) {
                    db.suppressed_tables.push(name.clone());
                }
            }
            Ok(())
        })?;
        Ok(SuppressedChannel::new(self.database.clone(), names, true))
    }

    async fn apply_updates(
        &mut self,
        channel: &SuppressedChannel,
        table: &TableSchema,
        updates: &[RowUpdate],
    ) -> Result<()> {
        channel.check(&self.database)?;
        self.with_db(|db| {
            let stored = db.table_mut(table)?;
            let mut rows = stored.rows.clone();
            for update in updates {
                let row = rows
                    .iter_mut()
                    .find(|r| r.key(&stored.schema) == update.key)
                    .ok_or_else(|| {
                        ShroudError::Database(format!(
                            "no row of {} matches key {:?}",
                            table.name, update.key
                        ))
                    })?;
                for (index, value) in &update.changes {
                    match row.values.get_mut(*index) {
                        Some(slot) => *slot = value.clone(),
                        None => {
                            return Err(ShroudError::Database(format!(
                                "column index {index} out of range for {}",
                                table.name
                            )))
                        }
                    }
                }
            }
            stored.rows = rows;
            db.commits.push(CommitRecord {
                table: table.name.clone(),
                rows: updates.len(),
            });
            Ok(())
        })
    }

    async fn close(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}
