//! The declarative entity → field → transform mapping
//!
//! A [`Mapping`] is built once from configuration and is immutable for the
//! lifetime of a run. Entities and fields keep the order in which they were
//! declared, which is the order the walker processes them in.

use crate::domain::errors::ShroudError;
use crate::domain::ids::{EntityName, FieldName, TransformId};
use crate::domain::result::Result;
use indexmap::IndexMap;

/// Field rules of one entity
#[derive(Debug, Clone, PartialEq)]
pub struct EntityMapping {
    entity: EntityName,
    fields: Vec<(FieldName, TransformId)>,
}

impl EntityMapping {
    pub fn entity(&self) -> &EntityName {
        &self.entity
    }

    /// (field, transform) pairs in declaration order
    pub fn fields(&self) -> &[(FieldName, TransformId)] {
        &self.fields
    }
}

/// Ordered, immutable mapping
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Mapping {
    entities: Vec<EntityMapping>,
}

impl Mapping {
    /// Builds a mapping from the ordered configuration tables
    pub fn from_config(raw: &IndexMap<String, IndexMap<String, String>>) -> Result<Self> {
        let mut builder = MappingBuilder::new();
        for (entity, fields) in raw {
            for (field, transform) in fields {
                builder = builder.field(entity, field, transform)?;
            }
            if fields.is_empty() {
                builder = builder.entity(entity)?;
            }
        }
        Ok(builder.build())
    }

    pub fn builder() -> MappingBuilder {
        MappingBuilder::new()
    }

    /// Entities in declaration order
    pub fn entities(&self) -> &[EntityMapping] {
        &self.entities
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Distinct transform identifiers referenced anywhere in the mapping
    pub fn transform_ids(&self) -> Vec<&TransformId> {
        let mut seen = Vec::new();
        for entity in &self.entities {
            for (_, transform) in &entity.fields {
                if !seen.contains(&transform) {
                    seen.push(transform);
                }
            }
        }
        seen
    }

    /// Number of configured (entity, field) rules
    pub fn rule_count(&self) -> usize {
        self.entities.iter().map(|e| e.fields.len()).sum()
    }
}

/// Builder for [`Mapping`]
///
/// # Examples
///
/// ```
/// use shroud::domain::mapping::Mapping;
///
/// let mapping = Mapping::builder()
///     .field("User", "email", "unique_email").unwrap()
///     .field("User", "nickname", "constant_croar").unwrap()
///     .build();
///
/// assert_eq!(mapping.entities().len(), 1);
/// assert_eq!(mapping.rule_count(), 2);
/// ```
#[derive(Debug, Default)]
pub struct MappingBuilder {
    entities: IndexMap<EntityName, IndexMap<FieldName, TransformId>>,
}

impl MappingBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares an entity without any field rule
    pub fn entity(mut self, entity: &str) -> Result<Self> {
        let entity = EntityName::new(entity).map_err(ShroudError::Configuration)?;
        self.entities.entry(entity).or_default();
        Ok(self)
    }

    /// Adds a field rule; redeclaring a field replaces its transform in place
    pub fn field(mut self, entity: &str, field: &str, transform: &str) -> Result<Self> {
        let entity = EntityName::new(entity).map_err(ShroudError::Configuration)?;
        let field = FieldName::new(field)
            .map_err(|e| ShroudError::Configuration(format!("{e} (entity {entity})")))?;
        let transform = TransformId::new(transform).map_err(|e| {
            ShroudError::Configuration(format!("{e} (field {entity}.{field})"))
        })?;
        self.entities
            .entry(entity)
            .or_default()
            .insert(field, transform);
        Ok(self)
    }

    pub fn build(self) -> Mapping {
        Mapping {
            entities: self
                .entities
                .into_iter()
                .map(|(entity, fields)| EntityMapping {
                    entity,
                    fields: fields.into_iter().collect(),
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_config_preserves_order() {
        let mut raw = IndexMap::new();
        let mut users = IndexMap::new();
        users.insert("email".to_string(), "unique_email".to_string());
        users.insert("nickname".to_string(), "constant_croar".to_string());
        raw.insert("User".to_string(), users);
        let mut orders = IndexMap::new();
        orders.insert("address".to_string(), "redact".to_string());
        raw.insert("Address".to_string(), orders);

        let mapping = Mapping::from_config(&raw).unwrap();
        let names: Vec<_> = mapping.entities().iter().map(|e| e.entity().as_str()).collect();
        assert_eq!(names, vec!["User", "Address"]);

        let fields: Vec<_> = mapping.entities()[0]
            .fields()
            .iter()
            .map(|(f, t)| (f.as_str(), t.as_str()))
            .collect();
        assert_eq!(
            fields,
            vec![("email", "unique_email"), ("nickname", "constant_croar")]
        );
    }

    #[test]
    fn test_empty_transform_rejected() {
        let err = Mapping::builder().field("User", "email", "").unwrap_err();
        assert!(matches!(err, ShroudError::Configuration(_)));
        assert!(err.to_string().contains("User.email"));
    }

    #[test]
    fn test_transform_ids_distinct() {
        let mapping = Mapping::builder()
            .field("User", "email", "unique_email")
            .unwrap()
            .field("Admin", "email", "unique_email")
            .unwrap()
            .field("Admin", "nickname", "constant_croar")
            .unwrap()
            .build();
        let ids: Vec<_> = mapping.transform_ids().iter().map(|t| t.as_str()).collect();
        assert_eq!(ids, vec!["unique_email", "constant_croar"]);
    }

    #[test]
    fn test_entity_without_fields() {
        let mapping = Mapping::builder().entity("Audit").unwrap().build();
        assert_eq!(mapping.entities().len(), 1);
        assert_eq!(mapping.rule_count(), 0);
    }
}
