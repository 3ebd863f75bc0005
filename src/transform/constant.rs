//! Constant-value transform

use super::Transform;
use crate::domain::FieldValue;

/// Identifier of the built-in constant transform
pub const CONSTANT_CROAR_ID: &str = "constant_croar";

/// Sentinel written by [`CONSTANT_CROAR_ID`]
pub const CROAR: &str = "CROAR";

/// Ignores its input and always returns the same sentinel
#[derive(Debug, Clone)]
pub struct ConstantTransform {
    id: String,
    value: FieldValue,
}

impl ConstantTransform {
    pub fn new(id: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        Self {
            id: id.into(),
            value: value.into(),
        }
    }

    /// The built-in `constant_croar` transform
    pub fn croar() -> Self {
        Self::new(CONSTANT_CROAR_ID, CROAR)
    }

    pub fn value(&self) -> &FieldValue {
        &self.value
    }
}

impl Transform for ConstantTransform {
    fn id(&self) -> &str {
        &self.id
    }

    fn transform(&mut self, _value: FieldValue) -> FieldValue {
        self.value.clone()
    }
}
