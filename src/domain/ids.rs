//! Domain identifier types with validation
//!
//! Newtype wrappers for the names that flow through a mapping: entity names,
//! field names and transform identifiers. Each type rejects empty input so the
//! walker never has to handle a blank key.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

macro_rules! identifier {
    ($(#[$meta:meta])* $name:ident, $label:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Creates a new identifier, rejecting empty or whitespace-only input
            pub fn new(value: impl Into<String>) -> Result<Self, String> {
                let value = value.into();
                if value.trim().is_empty() {
                    return Err(concat!($label, " cannot be empty").to_string());
                }
                Ok(Self(value))
            }

            /// Returns the identifier as a string slice
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consumes self and returns the inner String
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::new(s)
            }
        }

        impl TryFrom<String> for $name {
            type Error = String;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> Self {
                value.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

identifier!(
    /// Name of a mapped entity, resolved against the tables of the shadow database
    ///
    /// # Examples
    ///
    /// ```
    /// use shroud::domain::ids::EntityName;
    ///
    /// let entity = EntityName::new("User").unwrap();
    /// assert_eq!(entity.as_str(), "User");
    /// assert_eq!(entity.table_candidates(), vec!["User", "user"]);
    /// ```
    EntityName,
    "Entity name"
);

identifier!(
    /// Name of a field (column) of a mapped entity
    FieldName,
    "Field name"
);

identifier!(
    /// Stable identifier of a transform in the registry
    ///
    /// This is not a display label; it is the key configured in the mapping.
    TransformId,
    "Transform identifier"
);

impl EntityName {
    /// Table names this entity may resolve to, most specific first
    ///
    /// The literal name comes first, followed by its snake_case form when that
    /// differs (`OrderLine` → `order_line`).
    pub fn table_candidates(&self) -> Vec<String> {
        let mut candidates = vec![self.0.clone()];
        let snake = to_snake_case(&self.0);
        if snake != self.0 {
            candidates.push(snake);
        }
        candidates
    }
}

impl FieldName {
    /// Column names this field may resolve to, most specific first
    pub fn column_candidates(&self) -> Vec<String> {
        let mut candidates = vec![self.0.clone()];
        let snake = to_snake_case(&self.0);
        if snake != self.0 {
            candidates.push(snake);
        }
        candidates
    }
}

fn to_snake_case(input: &str) -> String {
    let mut out = String::with_capacity(input.len() + 4);
    let mut prev_lower = false;
    for ch in input.chars() {
        if ch.is_uppercase() {
            if prev_lower {
                out.push('_');
            }
            out.extend(ch.to_lowercase());
            prev_lower = false;
        } else {
            prev_lower = ch.is_lowercase() || ch.is_ascii_digit();
            out.push(ch);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_name_valid() {
        let entity = EntityName::new("User").unwrap();
        assert_eq!(entity.as_str(), "User");
        assert_eq!(entity.to_string(), "User");
    }

    #[test]
    fn test_identifiers_reject_empty() {
        assert!(EntityName::new("").is_err());
        assert!(FieldName::new("   ").is_err());
        assert!(TransformId::from_str("").is_err());
    }

    #[test]
    fn test_column_candidates() {
        let field = FieldName::new("firstName").unwrap();
        assert_eq!(field.column_candidates(), vec!["firstName", "first_name"]);
        let plain = FieldName::new("email").unwrap();
        assert_eq!(plain.column_candidates(), vec!["email"]);
    }

    #[test]
    fn test_table_candidates() {
        let entity = EntityName::new("OrderLine").unwrap();
        assert_eq!(entity.table_candidates(), vec!["OrderLine", "order_line"]);

        let entity = EntityName::new("user").unwrap();
        assert_eq!(entity.table_candidates(), vec!["user"]);
    }

    #[test]
    fn test_snake_case() {
        assert_eq!(to_snake_case("User"), "user");
        assert_eq!(to_snake_case("UserAccount"), "user_account");
        assert_eq!(to_snake_case("already_snake"), "already_snake");
    }

    #[test]
    fn test_serde_roundtrip_rejects_empty() {
        let id: TransformId = serde_json::from_str("\"unique_email\"").unwrap();
        assert_eq!(id.as_str(), "unique_email");
        assert!(serde_json::from_str::<TransformId>("\"\"").is_err());
    }
}
