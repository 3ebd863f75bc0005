//! Field values exchanged between the database adapters and the transforms
//!
//! Adapters read every column through its text representation and classify it
//! with the [`ValueKind`] inferred from schema metadata. Writes go the other way:
//! a value is rendered back to text and cast to the column type by the database.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A single column value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum FieldValue {
    /// SQL NULL
    #[default]
    Null,
    /// Boolean column
    Bool(bool),
    /// Any integer column
    Integer(i64),
    /// Floating point column
    Float(f64),
    /// Everything else, in the database's own text representation
    Text(String),
}

impl FieldValue {
    /// Returns true for SQL NULL
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    /// Returns the inner string for text values
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Text form used to bind the value into a statement; NULL binds as `None`
    pub fn as_sql_text(&self) -> Option<String> {
        match self {
            FieldValue::Null => None,
            FieldValue::Bool(b) => Some(b.to_string()),
            FieldValue::Integer(i) => Some(i.to_string()),
            FieldValue::Float(f) => Some(f.to_string()),
            FieldValue::Text(s) => Some(s.clone()),
        }
    }

    /// Builds a value from the text representation of a column
    ///
    /// Text that does not parse as the expected kind is kept as text rather
    /// than rejected, so an unusual column type never aborts a copy.
    pub fn from_sql_text(text: Option<String>, kind: ValueKind) -> Self {
        let Some(text) = text else {
            return FieldValue::Null;
        };
        match kind {
            ValueKind::Bool => match text.as_str() {
                "t" | "true" | "1" => FieldValue::Bool(true),
                "f" | "false" | "0" => FieldValue::Bool(false),
                _ => FieldValue::Text(text),
            },
            ValueKind::Integer => text
                .parse()
                .map(FieldValue::Integer)
                .unwrap_or(FieldValue::Text(text)),
            ValueKind::Float => text
                .parse()
                .map(FieldValue::Float)
                .unwrap_or(FieldValue::Text(text)),
            ValueKind::Text => FieldValue::Text(text),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Null => write!(f, "NULL"),
            FieldValue::Bool(b) => write!(f, "{b}"),
            FieldValue::Integer(i) => write!(f, "{i}"),
            FieldValue::Float(v) => write!(f, "{v}"),
            FieldValue::Text(s) => write!(f, "'{}'", s.replace('\'', "''")),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Integer(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Bool(value)
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(FieldValue::Null)
    }
}

/// Value classification inferred from a column's declared type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    Bool,
    Integer,
    Float,
    #[default]
    Text,
}

impl ValueKind {
    /// Classifies a SQL type name as reported by the database
    pub fn from_sql_type(data_type: &str) -> Self {
        let lowered = data_type.to_ascii_lowercase();
        let base = lowered
            .split(|c: char| c == '(' || c == ' ')
            .next()
            .unwrap_or("");
        match base {
            "bool" | "boolean" => ValueKind::Bool,
            "tinyint" if lowered.starts_with("tinyint(1)") => ValueKind::Bool,
            "smallint" | "integer" | "int" | "int2" | "int4" | "int8" | "bigint" | "tinyint"
            | "mediumint" | "serial" | "bigserial" | "smallserial" => ValueKind::Integer,
            "real" | "float" | "float4" | "float8" | "double" => ValueKind::Float,
            _ => ValueKind::Text,
        }
    }
}
