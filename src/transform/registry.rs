//! Transform registry: identifier → long-lived transform instance

use super::basic::{NullTransform, RedactTransform, TokenTransform};
use super::constant::ConstantTransform;
use super::unique::UniqueValueTransform;
use super::Transform;
use crate::config::AnonymizationConfig;
use crate::domain::{Mapping, Result, ShroudError};
use std::collections::HashMap;

/// One instance per identifier, shared by every entity of a run
///
/// The registry is owned by a single pipeline run and accessed sequentially,
/// so lookups hand out `&mut` references without any locking.
#[derive(Default)]
pub struct TransformRegistry {
    transforms: HashMap<String, Box<dyn Transform>>,
}

impl TransformRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the built-in transforms
    ///
    /// `unique_email`, `constant_croar`, `null`, `redact` and `token`.
    pub fn with_builtins(seed: Option<u64>) -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(UniqueValueTransform::email(seed)));
        registry.register(Box::new(ConstantTransform::croar()));
        registry.register(Box::new(NullTransform));
        registry.register(Box::new(RedactTransform));
        registry.register(Box::new(TokenTransform::new(
            seed.map(|s| s.wrapping_add(1)),
        )));
        registry
    }

    /// Fresh registry for one run: built-ins plus configured constants
    pub fn from_config(config: &AnonymizationConfig) -> Self {
        let mut registry = Self::with_builtins(config.seed);
        for (id, value) in &config.constants {
            registry.register(Box::new(ConstantTransform::new(id.clone(), value.clone())));
        }
        registry
    }

    /// Registers a transform under its own identifier, replacing any previous one
    pub fn register(&mut self, transform: Box<dyn Transform>) -> Option<Box<dyn Transform>> {
        let id = transform.id().to_string();
        let previous = self.transforms.insert(id.clone(), transform);
        if previous.is_some() {
            tracing::debug!(transform = %id, "Replaced registered transform");
        }
        previous
    }

    /// Non-failing probe used while walking rows
    pub fn has(&self, id: &str) -> bool {
        self.transforms.contains_key(id)
    }

    /// Looks up a transform, failing with a configuration error when unknown
    pub fn resolve(&mut self, id: &str) -> Result<&mut (dyn Transform + 'static)> {
        match self.transforms.get_mut(id) {
            Some(transform) => Ok(transform.as_mut()),
            None => Err(ShroudError::Configuration(format!(
                "Could not load transform `{id}`: no transform is registered under this identifier"
            ))),
        }
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut (dyn Transform + 'static)> {
        match self.transforms.get_mut(id) {
            Some(transform) => Some(transform.as_mut()),
            None => None,
        }
    }

    /// Registered identifiers, sorted
    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.transforms.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.transforms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transforms.is_empty()
    }

    /// Clears the run-scoped state of every transform
    pub fn reset(&mut self) {
        for transform in self.transforms.values_mut() {
            transform.reset();
        }
    }

    /// Checks every transform referenced by the mapping, reporting all unknown ones
    pub fn validate_mapping(&self, mapping: &Mapping) -> Result<()> {
        let mut unknown = Vec::new();
        for entity in mapping.entities() {
            for (field, transform) in entity.fields() {
                if !self.has(transform.as_str()) {
                    unknown.push(format!("{}.{} → {}", entity.entity(), field, transform));
                }
            }
        }

        if unknown.is_empty() {
            return Ok(());
        }
        Err(ShroudError::Configuration(format!(
            "Could not load transform(s) referenced by the mapping: {}",
            unknown.join(", ")
        )))
    }
}

impl std::fmt::Debug for TransformRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransformRegistry")
            .field("transforms", &self.ids())
            .finish()
    }
}
