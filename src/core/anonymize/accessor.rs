//! Per-entity field accessor tables
//!
//! Built once per run from the shadow schema: each mapped entity is resolved to
//! a table and each mapped field to a column index plus a writability flag, so
//! the row loop never has to inspect metadata again.

use crate::domain::{
    EntityMapping, EntityName, FieldName, TableSchema, TransformId,
};
use std::fmt;

/// Why an entity is not walked
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// No table in the shadow schema matches the entity
    NotPersistable,
    /// The table has no primary key, so rows cannot be addressed for update
    NoPrimaryKey,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::NotPersistable => write!(f, "no matching table in the shadow database"),
            SkipReason::NoPrimaryKey => write!(f, "table has no primary key"),
        }
    }
}

/// Why a field is left unchanged
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldSkip {
    MissingColumn,
    GeneratedColumn,
    PrimaryKey,
    UnregisteredTransform,
}

impl fmt::Display for FieldSkip {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldSkip::MissingColumn => write!(f, "no such column"),
            FieldSkip::GeneratedColumn => write!(f, "generated column"),
            FieldSkip::PrimaryKey => write!(f, "primary key column"),
            FieldSkip::UnregisteredTransform => write!(f, "transform not registered"),
        }
    }
}

/// One mapped field of an entity
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSlot {
    pub field: FieldName,
    pub transform: TransformId,
    /// Index into [`TableSchema::columns`]
    pub column: Option<usize>,
    pub writable: Result<(), FieldSkip>,
}

impl FieldSlot {
    pub fn is_writable(&self) -> bool {
        self.writable.is_ok()
    }
}

/// Resolved entity: its table and field slots in mapping order
#[derive(Debug, Clone)]
pub struct EntityAccessor {
    entity: EntityName,
    table: TableSchema,
    slots: Vec<FieldSlot>,
}

impl EntityAccessor {
    /// Resolves `mapping` against the shadow tables
    pub fn build(
        mapping: &EntityMapping,
        tables: &[TableSchema],
    ) -> std::result::Result<Self, SkipReason> {
        let table = resolve_table(mapping.entity(), tables).ok_or(SkipReason::NotPersistable)?;
        if !table.has_primary_key() {
            return Err(SkipReason::NoPrimaryKey);
        }

        let slots = mapping
            .fields()
            .iter()
            .map(|(field, transform)| {
                let column = resolve_column(field, table);
                let writable = match column.map(|i| &table.columns[i]) {
                    None => Err(FieldSkip::MissingColumn),
                    Some(c) if c.generated => Err(FieldSkip::GeneratedColumn),
                    Some(c) if table.is_primary_key(&c.name) => Err(FieldSkip::PrimaryKey),
                    Some(_) => Ok(()),
                };
                FieldSlot {
                    field: field.clone(),
                    transform: transform.clone(),
                    column,
                    writable,
                }
            })
            .collect();

        Ok(Self {
            entity: mapping.entity().clone(),
            table: table.clone(),
            slots,
        })
    }

    pub fn entity(&self) -> &EntityName {
        &self.entity
    }

    pub fn table(&self) -> &TableSchema {
        &self.table
    }

    pub fn slots(&self) -> &[FieldSlot] {
        &self.slots
    }

    /// Column indexes that can be written, with the transform to apply
    pub fn writable_columns(&self) -> impl Iterator<Item = (usize, &TransformId)> {
        self.slots
            .iter()
            .filter(|s| s.is_writable())
            .filter_map(|s| s.column.map(|c| (c, &s.transform)))
    }
}

/// Exact table name first, then case-insensitive, then the snake_case form
pub fn resolve_table<'t>(entity: &EntityName, tables: &'t [TableSchema]) -> Option<&'t TableSchema> {
    let candidates = entity.table_candidates();
    candidates
        .iter()
        .find_map(|name| tables.iter().find(|t| t.name == *name))
        .or_else(|| {
            candidates.iter().find_map(|name| {
                tables
                    .iter()
                    .find(|t| t.name.eq_ignore_ascii_case(name))
            })
        })
}

fn resolve_column(field: &FieldName, table: &TableSchema) -> Option<usize> {
    let candidates = field.column_candidates();
    candidates
        .iter()
        .find_map(|name| table.column_index(name))
        .or_else(|| {
            candidates.iter().find_map(|name| {
                table
                    .columns
                    .iter()
                    .position(|c| c.name.eq_ignore_ascii_case(name))
            })
        })
}
