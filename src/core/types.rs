use super::{DbError, Result, Value};
use serde::{Serialize, Serializer};
use std::fmt;

pub type Row = Vec<Value>;

/// Declared type of a collection field.
///
/// Inference only ever produces `Text`, `Integer` and `Real`. `Other` carries
/// the declared type of columns in tables this crate did not create.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FieldType {
    Text,
    Integer,
    Real,
    Other(String),
}

impl FieldType {
    /// Map a declared column type onto a field type using SQLite's
    /// affinity rules.
    pub fn from_declared(declared: &str) -> Self {
        let upper = declared.trim().to_ascii_uppercase();
        if upper.contains("INT") {
            Self::Integer
        } else if upper.contains("CHAR") || upper.contains("CLOB") || upper.contains("TEXT") {
            Self::Text
        } else if upper.contains("REAL") || upper.contains("FLOA") || upper.contains("DOUB") {
            Self::Real
        } else {
            Self::Other(declared.trim().to_string())
        }
    }

    pub fn as_sql(&self) -> &str {
        match self {
            Self::Text => "TEXT",
            Self::Integer => "INTEGER",
            Self::Real => "REAL",
            Self::Other(declared) => declared,
        }
    }

    /// Whether a value may be stored in a field of this type without
    /// changing its meaning. `NULL` fits everywhere.
    pub fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (_, Value::Null) => true,
            (Self::Other(_), _) => true,
            (Self::Text, Value::Text(_)) => true,
            (Self::Integer, Value::Integer(_)) => true,
            (Self::Real, Value::Integer(_) | Value::Float(_)) => true,
            _ => false,
        }
    }

    /// Most general type able to hold values of both types.
    /// Integer < Real; text never mixes with numbers.
    pub fn widen(&self, other: &FieldType) -> Option<FieldType> {
        match (self, other) {
            (a, b) if a == b => Some(a.clone()),
            (Self::Integer, Self::Real) | (Self::Real, Self::Integer) => Some(Self::Real),
            _ => None,
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_sql())
    }
}

impl Serialize for FieldType {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_sql())
    }
}

/// One column of a collection as seen through the document API.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldDescriptor {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    pub is_optional: bool,
    pub is_unique: bool,
    pub is_index: bool,
    pub is_primary: bool,
    pub default: Option<Value>,
}

impl FieldDescriptor {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        FieldOptions::new().field_type(field_type).resolve(name)
    }

    /// The implicit `_id` key every collection table is created with.
    pub fn primary_id() -> Self {
        FieldOptions::new().primary().resolve(crate::ID_FIELD)
    }
}

/// Requested constraints for a new field. Unset options take their defaults
/// in [`FieldOptions::resolve`].
#[derive(Debug, Clone, Default)]
pub struct FieldOptions {
    pub field_type: Option<FieldType>,
    pub is_optional: Option<bool>,
    pub is_unique: Option<bool>,
    pub is_index: Option<bool>,
    pub is_primary: Option<bool>,
    pub default: Option<Value>,
}

impl FieldOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field_type(mut self, field_type: FieldType) -> Self {
        self.field_type = Some(field_type);
        self
    }

    pub fn required(mut self) -> Self {
        self.is_optional = Some(false);
        self
    }

    pub fn unique(mut self) -> Self {
        self.is_unique = Some(true);
        self
    }

    pub fn index(mut self) -> Self {
        self.is_index = Some(true);
        self
    }

    pub fn primary(mut self) -> Self {
        self.is_primary = Some(true);
        self
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Apply defaults (`TEXT`, optional, no constraints) and the
    /// `primary => unique => index` implications.
    pub fn resolve(self, name: impl Into<String>) -> FieldDescriptor {
        let is_primary = self.is_primary.unwrap_or(false);
        let is_unique = self.is_unique.unwrap_or(false) || is_primary;
        let is_index = self.is_index.unwrap_or(false) || is_unique;

        FieldDescriptor {
            name: name.into(),
            field_type: self.field_type.unwrap_or(FieldType::Text),
            is_optional: self.is_optional.unwrap_or(true),
            is_unique,
            is_index,
            is_primary,
            default: self.default.filter(|v| !v.is_null()),
        }
    }
}

/// Check that a field can be added to an existing table with `ADD COLUMN`.
pub fn validate_new_field(field: &FieldDescriptor) -> Result<()> {
    if field.is_primary {
        return Err(DbError::SchemaConflict(format!(
            "Field '{}' cannot be a primary key: the table already has '{}'",
            field.name,
            crate::ID_FIELD
        )));
    }

    if let FieldType::Other(declared) = &field.field_type {
        return Err(DbError::SchemaConflict(format!(
            "Field '{}' has unsupported type '{}'",
            field.name, declared
        )));
    }

    if !field.is_optional && field.default.is_none() {
        return Err(DbError::SchemaConflict(format!(
            "Required field '{}' needs a default value to be added to an existing table",
            field.name
        )));
    }

    if let Some(default) = &field.default {
        if !field.field_type.accepts(default) {
            return Err(DbError::SchemaConflict(format!(
                "Default for field '{}' is {}, expected {}",
                field.name,
                default.type_name(),
                field.field_type
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_defaults() {
        let field = FieldOptions::new().resolve("name");

        assert_eq!(field.field_type, FieldType::Text);
        assert!(field.is_optional);
        assert!(!field.is_unique);
        assert!(!field.is_index);
        assert!(!field.is_primary);
        assert_eq!(field.default, None);
    }

    #[test]
    fn test_resolve_implications() {
        let primary = FieldOptions::new().primary().resolve("_id");
        assert!(primary.is_unique && primary.is_index);

        let unique = FieldOptions::new().unique().resolve("email");
        assert!(unique.is_index);
        assert!(!unique.is_primary);
    }

    #[test]
    fn test_from_declared_affinity() {
        assert_eq!(FieldType::from_declared("INTEGER"), FieldType::Integer);
        assert_eq!(FieldType::from_declared("bigint"), FieldType::Integer);
        assert_eq!(FieldType::from_declared("VARCHAR(20)"), FieldType::Text);
        assert_eq!(FieldType::from_declared("double"), FieldType::Real);
        assert_eq!(FieldType::from_declared("BLOB"), FieldType::Other("BLOB".into()));
    }

    #[test]
    fn test_accepts_and_widen() {
        assert!(FieldType::Real.accepts(&Value::Integer(1)));
        assert!(!FieldType::Integer.accepts(&Value::Float(1.5)));
        assert!(!FieldType::Text.accepts(&Value::Integer(1)));
        assert!(FieldType::Text.accepts(&Value::Null));

        assert_eq!(FieldType::Integer.widen(&FieldType::Real), Some(FieldType::Real));
        assert_eq!(FieldType::Text.widen(&FieldType::Integer), None);
    }

    #[test]
    fn test_validate_new_field() {
        assert!(validate_new_field(&FieldOptions::new().resolve("a")).is_ok());

        let primary = FieldOptions::new().primary().resolve("a");
        assert!(matches!(validate_new_field(&primary), Err(DbError::SchemaConflict(_))));

        let required = FieldOptions::new().required().resolve("a");
        assert!(matches!(validate_new_field(&required), Err(DbError::SchemaConflict(_))));

        let required_with_default = FieldOptions::new()
            .field_type(FieldType::Integer)
            .required()
            .default_value(0)
            .resolve("a");
        assert!(validate_new_field(&required_with_default).is_ok());

        let bad_default = FieldOptions::new()
            .field_type(FieldType::Integer)
            .default_value("zero")
            .resolve("a");
        assert!(matches!(validate_new_field(&bad_default), Err(DbError::SchemaConflict(_))));
    }
}
