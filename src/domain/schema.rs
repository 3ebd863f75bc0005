//! Table metadata and row containers shared by the adapters, the copier and the walker

use crate::domain::value::{FieldValue, ValueKind};
use std::fmt;

/// A column as reported by the database catalog
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnSchema {
    pub name: String,
    /// Declared SQL type, used as the cast target when writing
    pub data_type: String,
    pub nullable: bool,
    /// Generated / computed column; never written
    pub generated: bool,
    pub kind: ValueKind,
}

impl ColumnSchema {
    /// Builds a column, inferring its value kind from the declared type
    pub fn new(name: impl Into<String>, data_type: impl Into<String>, nullable: bool) -> Self {
        let data_type = data_type.into();
        Self {
            name: name.into(),
            kind: ValueKind::from_sql_type(&data_type),
            data_type,
            nullable,
            generated: false,
        }
    }

    /// Marks the column as generated
    pub fn generated(mut self) -> Self {
        self.generated = true;
        self
    }

    /// Bind type for writing values into this column
    pub fn bind_type(&self) -> BindType {
        BindType {
            kind: self.kind,
            nullable: self.nullable,
        }
    }
}

/// How a value is bound when written back; nullable columns get a nullable bind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BindType {
    pub kind: ValueKind,
    pub nullable: bool,
}

/// Table metadata
#[derive(Debug, Clone, PartialEq)]
pub struct TableSchema {
    /// Namespace (PostgreSQL schema or MySQL database)
    pub schema: String,
    pub name: String,
    pub columns: Vec<ColumnSchema>,
    /// Primary key column names, in key order
    pub primary_key: Vec<String>,
}

impl TableSchema {
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
            columns: Vec::new(),
            primary_key: Vec::new(),
        }
    }

    pub fn with_column(mut self, column: ColumnSchema) -> Self {
        self.columns.push(column);
        self
    }

    pub fn with_primary_key<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.primary_key = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Index of a column by exact name
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn is_primary_key(&self, column: &str) -> bool {
        self.primary_key.iter().any(|k| k == column)
    }

    /// Column indexes of the primary key, in key order
    pub fn key_indexes(&self) -> Vec<usize> {
        self.primary_key
            .iter()
            .filter_map(|k| self.column_index(k))
            .collect()
    }

    /// Rows of a table without primary key cannot be addressed for update
    pub fn has_primary_key(&self) -> bool {
        !self.primary_key.is_empty() && self.key_indexes().len() == self.primary_key.len()
    }

    /// `schema.name`
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.schema, self.name)
    }
}

/// A row aligned with [`TableSchema::columns`]
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Row {
    pub values: Vec<FieldValue>,
}

impl Row {
    pub fn new(values: Vec<FieldValue>) -> Self {
        Self { values }
    }

    pub fn get(&self, index: usize) -> Option<&FieldValue> {
        self.values.get(index)
    }

    /// Primary key values of this row
    pub fn key(&self, table: &TableSchema) -> Vec<FieldValue> {
        table
            .key_indexes()
            .into_iter()
            .map(|i| self.values.get(i).cloned().unwrap_or_default())
            .collect()
    }
}

impl fmt::Display for Row {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, value) in self.values.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{value}")?;
        }
        write!(f, ")")
    }
}

/// Pending changes to one row, addressed by primary key
#[derive(Debug, Clone, PartialEq)]
pub struct RowUpdate {
    /// Primary key values, aligned with [`TableSchema::primary_key`]
    pub key: Vec<FieldValue>,
    /// (column index, new value)
    pub changes: Vec<(usize, FieldValue)>,
}

impl RowUpdate {
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}

/// Offset/limit window over a table ordered by primary key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub offset: u64,
    pub limit: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn users() -> TableSchema {
        TableSchema::new("public", "user")
            .with_column(ColumnSchema::new("id", "integer", false))
            .with_column(ColumnSchema::new("email", "character varying(255)", false))
            .with_column(ColumnSchema::new("nickname", "text", true))
            .with_primary_key(["id"])
    }

    #[test]
    fn test_column_kind_inference() {
        let table = users();
        assert_eq!(table.columns[0].kind, ValueKind::Integer);
        assert_eq!(table.columns[1].kind, ValueKind::Text);
    }

    #[test]
    fn test_bind_type_follows_nullability() {
        let table = users();
        assert!(!table.columns[1].bind_type().nullable);
        assert!(table.columns[2].bind_type().nullable);
    }

    #[test]
    fn test_primary_key_lookup() {
        let table = users();
        assert!(table.has_primary_key());
        assert!(table.is_primary_key("id"));
        assert_eq!(table.key_indexes(), vec![0]);

        let row = Row::new(vec![
            FieldValue::Integer(7),
            "a@b.c".into(),
            FieldValue::Null,
        ]);
        assert_eq!(row.key(&table), vec![FieldValue::Integer(7)]);
    }

    #[test]
    fn test_table_without_key() {
        let table = TableSchema::new("public", "log")
            .with_column(ColumnSchema::new("message", "text", true));
        assert!(!table.has_primary_key());

        let table = table.with_primary_key(["missing"]);
        assert!(!table.has_primary_key());
    }

    #[test]
    fn test_row_display() {
        let row = Row::new(vec![FieldValue::Integer(1), "x".into(), FieldValue::Null]);
        assert_eq!(row.to_string(), "(1, 'x', NULL)");
    }
}
