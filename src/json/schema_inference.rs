//! Schema Inference Module
//!
//! Decides the column type of a field from the first values written to it and
//! computes the additive schema change a write needs. Types are fixed once a
//! column exists; later values are checked against them, never migrated.

use super::Document;
use super::converter::{JsonToValueConverter, integral_value};
use super::validator::validate_field_name;
use crate::core::{DbError, FieldDescriptor, FieldType, Result};
use serde_json::Value as JsonValue;

/// Infer the field type of a JSON value.
///
/// `null` carries no type information and yields `None`.
pub fn infer_field_type(value: &JsonValue) -> Option<FieldType> {
    match value {
        JsonValue::Null => None,
        JsonValue::Bool(_) => Some(FieldType::Integer),
        JsonValue::Number(n) => {
            if integral_value(n).is_some() {
                Some(FieldType::Integer)
            } else {
                Some(FieldType::Real)
            }
        }
        JsonValue::String(_) => Some(FieldType::Text),
        // Complex types are stored as JSON text
        JsonValue::Array(_) | JsonValue::Object(_) => Some(FieldType::Text),
    }
}

/// Fields a batch of documents needs that the table does not have yet, in
/// first-seen order.
///
/// Every value for an existing field is checked against that field's type.
/// A new key seen in several documents gets the most general type of its
/// values; keys that only ever hold `null` become `TEXT`.
pub fn plan_new_fields<'a, I>(existing: &[FieldDescriptor], documents: I) -> Result<Vec<FieldDescriptor>>
where
    I: IntoIterator<Item = &'a Document>,
{
    let mut pending: Vec<(String, Option<FieldType>)> = Vec::new();

    for document in documents {
        for (key, value) in document {
            validate_field_name(key)?;

            // Column names are case-insensitive in the engine.
            if let Some(field) = existing.iter().find(|f| f.name.eq_ignore_ascii_case(key)) {
                check_same_spelling(key, &field.name)?;
                JsonToValueConverter::convert_for_field(value, field)?;
                continue;
            }

            let inferred = infer_field_type(value);
            match pending.iter_mut().find(|(name, _)| name.eq_ignore_ascii_case(key)) {
                Some((name, current)) => {
                    check_same_spelling(key, name)?;
                    *current = merge_types(key, current.take(), inferred)?;
                }
                None => pending.push((key.clone(), inferred)),
            }
        }
    }

    Ok(pending
        .into_iter()
        .map(|(name, field_type)| FieldDescriptor::new(name, field_type.unwrap_or(FieldType::Text)))
        .collect())
}

fn check_same_spelling(key: &str, field: &str) -> Result<()> {
    if key == field {
        Ok(())
    } else {
        Err(DbError::SchemaConflict(format!(
            "Field '{}' collides with field '{}'",
            key, field
        )))
    }
}

fn merge_types(
    field: &str,
    current: Option<FieldType>,
    next: Option<FieldType>,
) -> Result<Option<FieldType>> {
    match (current, next) {
        (None, other) | (other, None) => Ok(other),
        (Some(a), Some(b)) => a.widen(&b).map(Some).ok_or_else(|| {
            DbError::SchemaConflict(format!(
                "Field '{}' receives both {} and {} values",
                field, a, b
            ))
        }),
    }
}
