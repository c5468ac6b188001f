//! Update documents
//!
//! An update is either an operator document (`$set`, `$unset`, `$inc`) or a
//! plain document, which is treated as `$set`. The two forms cannot be mixed.

use super::Document;
use super::validator::validate_field_name;
use crate::ID_FIELD;
use crate::core::{DbError, Result};
use serde_json::Value as JsonValue;

/// A parsed update, split by operator.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateDocument {
    pub set: Document,
    pub unset: Vec<String>,
    pub inc: Document,
}

impl UpdateDocument {
    pub fn parse(update: &Document) -> Result<Self> {
        let operators = update.keys().filter(|k| k.starts_with('$')).count();
        if operators != 0 && operators != update.len() {
            return Err(DbError::InvalidDocument(
                "Update mixes operators with plain fields".into(),
            ));
        }

        let mut parsed = Self::default();

        if operators == 0 {
            parsed.set = update.clone();
        } else {
            for (operator, spec) in update {
                if !matches!(operator.as_str(), "$set" | "$unset" | "$inc") {
                    return Err(DbError::UnsupportedOperator(operator.clone()));
                }

                let fields = spec.as_object().ok_or_else(|| {
                    DbError::InvalidDocument(format!("{} needs an object, got {}", operator, spec))
                })?;

                match operator.as_str() {
                    "$set" => parsed.set.extend(fields.clone()),
                    "$unset" => parsed.unset.extend(fields.keys().cloned()),
                    "$inc" => {
                        for (field, amount) in fields {
                            if !amount.is_number() {
                                return Err(DbError::InvalidDocument(format!(
                                    "$inc on '{}' needs a number, got {}",
                                    field, amount
                                )));
                            }
                        }
                        parsed.inc.extend(fields.clone());
                    }
                    other => return Err(DbError::UnsupportedOperator(other.to_string())),
                }
            }
        }

        parsed.validate()?;
        Ok(parsed)
    }

    /// Fields written with a value; these may add columns.
    pub fn written_fields(&self) -> Document {
        let mut written = self.set.clone();
        for (field, amount) in &self.inc {
            written.entry(field.clone()).or_insert_with(|| amount.clone());
        }
        written
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty() && self.unset.is_empty() && self.inc.is_empty()
    }

    fn validate(&self) -> Result<()> {
        if self.is_empty() {
            return Err(DbError::InvalidDocument("Update has no fields".into()));
        }

        let touched = self
            .set
            .keys()
            .chain(self.inc.keys())
            .chain(self.unset.iter());

        for field in touched {
            validate_field_name(field)?;
            if field == ID_FIELD {
                return Err(DbError::InvalidDocument(format!("'{}' cannot be modified", ID_FIELD)));
            }
        }

        for field in self.inc.keys() {
            if self.set.contains_key(field) || self.unset.contains(field) {
                return Err(DbError::InvalidDocument(format!(
                    "Field '{}' appears in more than one update operator",
                    field
                )));
            }
        }

        for field in &self.unset {
            if self.set.contains_key(field) {
                return Err(DbError::InvalidDocument(format!(
                    "Field '{}' appears in more than one update operator",
                    field
                )));
            }
        }

        Ok(())
    }
}

impl TryFrom<&JsonValue> for UpdateDocument {
    type Error = DbError;

    fn try_from(value: &JsonValue) -> Result<Self> {
        let object = value
            .as_object()
            .ok_or_else(|| DbError::InvalidDocument(format!("Update must be an object, got {}", value)))?;
        Self::parse(object)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: JsonValue) -> Result<UpdateDocument> {
        UpdateDocument::try_from(&value)
    }

    #[test]
    fn test_plain_document_is_set() {
        let update = parse(json!({"name": "Ann", "age": 31})).unwrap();
        assert_eq!(update.set.len(), 2);
        assert!(update.unset.is_empty());
        assert!(update.inc.is_empty());
    }

    #[test]
    fn test_operators() {
        let update = parse(json!({
            "$set": {"name": "Ann"},
            "$unset": {"nickname": ""},
            "$inc": {"visits": 1}
        }))
        .unwrap();

        assert_eq!(update.set.get("name"), Some(&json!("Ann")));
        assert_eq!(update.unset, vec!["nickname".to_string()]);
        assert_eq!(update.inc.get("visits"), Some(&json!(1)));

        let written = update.written_fields();
        assert_eq!(written.keys().collect::<Vec<_>>(), vec!["name", "visits"]);
    }

    #[test]
    fn test_rejections() {
        assert!(matches!(parse(json!({"_id": "x"})), Err(DbError::InvalidDocument(_))));
        assert!(matches!(
            parse(json!({"$set": {"_id": "x"}})),
            Err(DbError::InvalidDocument(_))
        ));
        assert!(matches!(
            parse(json!({"$set": {"a": 1}, "b": 2})),
            Err(DbError::InvalidDocument(_))
        ));
        assert!(matches!(
            parse(json!({"$push": {"tags": "x"}})),
            Err(DbError::UnsupportedOperator(_))
        ));
        assert!(matches!(
            parse(json!({"$inc": {"visits": "one"}})),
            Err(DbError::InvalidDocument(_))
        ));
        assert!(matches!(
            parse(json!({"$set": {"a": 1}, "$inc": {"a": 1}})),
            Err(DbError::InvalidDocument(_))
        ));
        assert!(matches!(parse(json!({})), Err(DbError::InvalidDocument(_))));
        assert!(matches!(
            parse(json!({"bad name": 1})),
            Err(DbError::InvalidIdentifier(_))
        ));
    }
}
