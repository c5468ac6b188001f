//! Filter translation
//!
//! Turns a Mongo-style filter document into a parameterized SQL boolean
//! expression. Supported: literal equality, `$gt`, `$lt`. Every clause is
//! joined with `AND`. Other operators, `$or` and `$and` included, are
//! rejected rather than dropped.

use super::converter::JsonToValueConverter;
use super::validator::{quote_ident, validate_field_name};
use crate::core::{DbError, Result, Value};
use serde_json::{Map, Value as JsonValue};

/// A SQL boolean expression plus the values bound to its placeholders.
#[derive(Debug, Clone, PartialEq)]
pub struct WhereClause {
    pub sql: String,
    pub params: Vec<Value>,
}

/// Operator keys a filter may use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterOperator {
    Gt,
    Lt,
    /// Recognized as an operator but without defined semantics.
    Unsupported(String),
}

impl FilterOperator {
    pub fn parse(key: &str) -> Self {
        match key {
            "$gt" => Self::Gt,
            "$lt" => Self::Lt,
            other => Self::Unsupported(other.to_string()),
        }
    }

    pub fn is_operator_key(key: &str) -> bool {
        key.starts_with('$')
    }

    fn sql_symbol(&self) -> Result<&'static str> {
        match self {
            Self::Gt => Ok(">"),
            Self::Lt => Ok("<"),
            Self::Unsupported(name) => Err(DbError::UnsupportedOperator(name.clone())),
        }
    }
}

/// Translate a filter document. An empty filter yields `None` (no WHERE).
pub fn translate_filter(filter: &Map<String, JsonValue>) -> Result<Option<WhereClause>> {
    if filter.is_empty() {
        return Ok(None);
    }

    let mut clauses = Vec::new();
    let mut params = Vec::new();

    for (field, condition) in filter {
        if FilterOperator::is_operator_key(field) {
            return Err(match FilterOperator::parse(field) {
                FilterOperator::Unsupported(name) => DbError::UnsupportedOperator(name),
                _ => DbError::InvalidFilter(format!(
                    "Operator '{}' must be applied to a field",
                    field
                )),
            });
        }
        validate_field_name(field)?;
        let column = quote_ident(field);

        match condition {
            JsonValue::Null => clauses.push(format!("{} IS NULL", column)),
            JsonValue::Array(_) => {
                return Err(DbError::InvalidFilter(format!(
                    "Array values are not supported for field '{}'",
                    field
                )));
            }
            JsonValue::Object(operators) => {
                if operators.is_empty() {
                    return Err(DbError::InvalidFilter(format!(
                        "Empty condition for field '{}'",
                        field
                    )));
                }

                for (key, operand) in operators {
                    if !FilterOperator::is_operator_key(key) {
                        return Err(DbError::InvalidFilter(format!(
                            "Nested documents are not supported for field '{}'",
                            field
                        )));
                    }

                    let symbol = FilterOperator::parse(key).sql_symbol()?;
                    if !is_comparable(operand) {
                        return Err(DbError::InvalidFilter(format!(
                            "Operator '{}' on field '{}' needs a string or number, got {}",
                            key, field, operand
                        )));
                    }

                    clauses.push(format!("{} {} ?", column, symbol));
                    params.push(JsonToValueConverter::convert(operand));
                }
            }
            literal => {
                clauses.push(format!("{} = ?", column));
                params.push(JsonToValueConverter::convert(literal));
            }
        }
    }

    Ok(Some(WhereClause {
        sql: clauses.join(" AND "),
        params,
    }))
}

fn is_comparable(operand: &JsonValue) -> bool {
    matches!(
        operand,
        JsonValue::Number(_) | JsonValue::String(_) | JsonValue::Bool(_)
    )
}
