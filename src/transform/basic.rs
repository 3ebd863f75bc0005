//! Simple built-in transforms: null, redaction and random tokens

use super::Transform;
use crate::domain::FieldValue;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub const NULL_ID: &str = "null";
pub const REDACT_ID: &str = "redact";
pub const TOKEN_ID: &str = "token";

/// Placeholder written by the redaction transform
pub const REDACTED: &str = "[REDACTED]";

/// Always returns NULL
#[derive(Debug, Default)]
pub struct NullTransform;

impl Transform for NullTransform {
    fn id(&self) -> &str {
        NULL_ID
    }

    fn transform(&mut self, _value: FieldValue) -> FieldValue {
        FieldValue::Null
    }
}

/// Replaces every non-NULL value with `[REDACTED]`; NULL stays NULL
#[derive(Debug, Default)]
pub struct RedactTransform;

impl Transform for RedactTransform {
    fn id(&self) -> &str {
        REDACT_ID
    }

    fn transform(&mut self, value: FieldValue) -> FieldValue {
        if value.is_null() {
            return FieldValue::Null;
        }
        FieldValue::from(REDACTED)
    }
}

/// Replaces values with unique `TOKEN_NNN_RRRR` tokens
///
/// The counter makes tokens unique within a run, the random component keeps
/// them from being guessable across runs.
pub struct TokenTransform {
    counter: usize,
    rng: StdRng,
}

impl TokenTransform {
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self { counter: 0, rng }
    }
}

impl Transform for TokenTransform {
    fn id(&self) -> &str {
        TOKEN_ID
    }

    fn transform(&mut self, _value: FieldValue) -> FieldValue {
        self.counter += 1;
        let random_suffix: u32 = self.rng.gen_range(1000..9999);
        FieldValue::Text(format!("TOKEN_{:03}_{}", self.counter, random_suffix))
    }

    fn reset(&mut self) {
        self.counter = 0;
    }
}
