//! Database abstraction traits
//!
//! This module defines the traits that database adapters must implement to be
//! provisioned, copied into and anonymized by Shroud. Every method is async and
//! connections are used by one task at a time, hence `&mut self`.

use crate::domain::{
    ConnectionDescriptor, EngineKind, PageRequest, Result, Row, RowUpdate, TableSchema,
};
use async_trait::async_trait;

/// Entry point of an adapter: opens administrative and regular connections
#[async_trait]
pub trait DatabaseServer: Send + Sync {
    /// Engine served by this adapter
    fn engine(&self) -> EngineKind;

    /// Opens a connection that targets no particular database
    ///
    /// The descriptor's database component is ignored.
    async fn connect_admin(
        &self,
        descriptor: &ConnectionDescriptor,
    ) -> Result<Box<dyn AdminConnection>>;

    /// Opens a connection to the database named by the descriptor
    async fn connect(&self, descriptor: &ConnectionDescriptor)
        -> Result<Box<dyn DatabaseConnection>>;
}

/// Server-level operations: listing, creating and dropping databases
#[async_trait]
pub trait AdminConnection: Send {
    /// Names of the non-template databases on the server
    async fn list_databases(&mut self) -> Result<Vec<String>>;

    async fn create_database(&mut self, name: &str) -> Result<()>;

    async fn drop_database(&mut self, name: &str) -> Result<()>;

    /// Whether the connected role may create databases
    async fn can_create_database(&mut self) -> Result<bool> {
        Ok(true)
    }

    /// Closes the connection
    async fn close(self: Box<Self>) -> Result<()>;
}

/// Operations on one database
#[async_trait]
pub trait DatabaseConnection: Send {
    /// Descriptor this connection was opened with
    fn descriptor(&self) -> &ConnectionDescriptor;

    /// User tables with their columns and primary keys
    async fn list_tables(&mut self) -> Result<Vec<TableSchema>>;

    async fn count_rows(&mut self, table: &TableSchema) -> Result<u64>;

    /// Rows ordered by primary key (all columns when there is none)
    ///
    /// `None` fetches the whole table in one pass.
    async fn fetch_rows(
        &mut self,
        table: &TableSchema,
        page: Option<PageRequest>,
    ) -> Result<Vec<Row>>;

    /// Inserts one row, generated columns excluded
    async fn insert_row(&mut self, table: &TableSchema, row: &Row) -> Result<()>;

    /// Toggles foreign key enforcement for this session
    async fn set_foreign_key_checks(&mut self, enabled: bool) -> Result<()>;

    /// Disables change listeners (triggers, replication hooks) for this session
    /// and for the given tables
    ///
    /// Listeners are not restored: the connection is discarded after the run.
    async fn suppress_listeners(&mut self, tables: &[TableSchema]) -> Result<SuppressedChannel>;

    /// Writes a batch of row updates in one transaction
    async fn apply_updates(
        &mut self,
        channel: &SuppressedChannel,
        table: &TableSchema,
        updates: &[RowUpdate],
    ) -> Result<()>;

    async fn close(self: Box<Self>) -> Result<()>;
}

/// Proof that change listeners are disabled on a connection
///
/// Only adapters can create one, so every write of the walker goes through a
/// connection on which `suppress_listeners` has been called.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuppressedChannel {
    database: String,
    tables: Vec<String>,
    global: bool,
}

impl SuppressedChannel {
    pub(crate) fn new(database: impl Into<String>, tables: Vec<String>, global: bool) -> Self {
        Self {
            database: database.into(),
            tables,
            global,
        }
    }

    /// Database the listeners were disabled on
    pub fn database(&self) -> &str {
        &self.database
    }

    /// Tables whose own listeners were disabled
    pub fn tables(&self) -> &[String] {
        &self.tables
    }

    /// Whether session-wide listeners were disabled as well
    pub fn is_global(&self) -> bool {
        self.global
    }

    /// Whether writes to `table` happen with its listeners disabled
    pub fn covers(&self, table: &TableSchema) -> bool {
        self.tables.iter().any(|t| *t == table.qualified_name())
    }

    /// Fails unless this channel was minted for `database`
    pub(crate) fn check(&self, database: &str) -> Result<()> {
        if self.database != database {
            return Err(crate::domain::ShroudError::Anonymization(format!(
                "Listener suppression was established on '{}', not on '{}'",
                self.database, database
            )));
        }
        Ok(())
    }
}
