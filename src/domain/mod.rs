//! Domain models and types for Shroud.
//!
//! # Overview
//!
//! The domain layer provides:
//! - **Strongly-typed identifiers** ([`EntityName`], [`FieldName`], [`TransformId`])
//! - **Connection descriptors** ([`ConnectionDescriptor`], [`EngineKind`])
//! - **Table metadata and values** ([`TableSchema`], [`Row`], [`FieldValue`])
//! - **The mapping** ([`Mapping`]) driving the anonymization walker
//! - **Error types** ([`ShroudError`], [`CopyError`], [`ProcessTimeout`])
//! - **Result type alias** ([`Result`])
//!
//! # Error Handling
//!
//! All fallible operations return [`Result<T, ShroudError>`]:
//!
//! ```rust
//! use shroud::domain::{ConnectionDescriptor, Result};
//!
//! fn shadow_name(url: &str) -> Result<String> {
//!     let source = ConnectionDescriptor::from_url(url)?;
//!     let shadow = source.shadow(None)?;
//!     Ok(shadow.database_name()?.to_string())
//! }
//!
//! assert_eq!(shadow_name("postgresql://app@localhost/shop").unwrap(), "shop_anonymous");
//! ```

pub mod context;
pub mod descriptor;
pub mod errors;
pub mod ids;
pub mod mapping;
pub mod result;
pub mod schema;
pub mod value;

// Re-export commonly used types for convenience
pub use descriptor::{shadow_database_name, ConnectionDescriptor, EngineKind, SHADOW_SUFFIX};
pub use errors::{CopyError, ProcessTimeout, ShroudError};
pub use ids::{EntityName, FieldName, TransformId};
pub use mapping::{EntityMapping, Mapping, MappingBuilder};
pub use result::Result;
pub use schema::{BindType, ColumnSchema, PageRequest, Row, RowUpdate, TableSchema};
pub use value::{FieldValue, ValueKind};
