//! Aggregation pipeline compiler
//!
//! Each stage wraps the statement built so far as a subquery, so stages
//! compose in order without a planner. Literals are bound; field references
//! (`"$field"`) are validated and quoted.

use super::converter::{SqlStatement, to_sql_int};
use super::filter::translate_filter;
use super::options::parse_sort;
use super::validator::{quote_ident, validate_field_name};
use crate::ID_FIELD;
use crate::core::{DbError, Result, Value};
use serde_json::{Map, Value as JsonValue};

/// Supported stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Match,
    Sort,
    Skip,
    Limit,
    Project,
    Count,
    Group,
}

impl Stage {
    pub fn parse(key: &str) -> Result<Self> {
        match key {
            "$match" => Ok(Self::Match),
            "$sort" => Ok(Self::Sort),
            "$skip" => Ok(Self::Skip),
            "$limit" => Ok(Self::Limit),
            "$project" => Ok(Self::Project),
            "$count" => Ok(Self::Count),
            "$group" => Ok(Self::Group),
            other => Err(DbError::UnsupportedOperator(other.to_string())),
        }
    }
}

/// Compile a pipeline over `table` into one statement.
pub fn compile_pipeline(table: &str, pipeline: &[JsonValue]) -> Result<SqlStatement> {
    let mut sql = format!("SELECT * FROM {}", quote_ident(table));
    let mut params: Vec<Value> = Vec::new();

    for stage in pipeline {
        let (key, spec) = single_entry(stage)?;
        let source = format!("({})", sql);

        sql = match Stage::parse(key)? {
            Stage::Match => {
                let filter = as_object(key, spec)?;
                match translate_filter(filter)? {
                    Some(clause) => {
                        params.extend(clause.params);
                        format!("SELECT * FROM {} WHERE {}", source, clause.sql)
                    }
                    None => sql,
                }
            }
            Stage::Sort => {
                let keys = parse_sort(spec)?;
                if keys.is_empty() {
                    return Err(DbError::InvalidOption("$sort needs at least one field".into()));
                }
                let order: Vec<String> = keys
                    .iter()
                    .map(|(field, order)| {
                        format!("{} {}", quote_ident(field), if order.is_ascending() { "ASC" } else { "DESC" })
                    })
                    .collect();
                format!("SELECT * FROM {} ORDER BY {}", source, order.join(", "))
            }
            Stage::Skip => {
                params.push(Value::Integer(to_sql_int(as_count(key, spec)?, key)?));
                format!("SELECT * FROM {} LIMIT -1 OFFSET ?", source)
            }
            Stage::Limit => {
                params.push(Value::Integer(to_sql_int(as_count(key, spec)?, key)?));
                format!("SELECT * FROM {} LIMIT ?", source)
            }
            Stage::Project => {
                let columns = projection_columns(as_object(key, spec)?)?;
                format!("SELECT {} FROM {}", columns.join(", "), source)
            }
            Stage::Count => {
                let name = spec.as_str().ok_or_else(|| {
                    DbError::InvalidOption(format!("$count needs a field name, got {}", spec))
                })?;
                validate_field_name(name)?;
                format!("SELECT COUNT(*) AS {} FROM {}", quote_ident(name), source)
            }
            Stage::Group => {
                // Accumulator literals precede the source in the SQL text.
                let mut select_params = Vec::new();
                let (select, group_by) = group_columns(as_object(key, spec)?, &mut select_params)?;
                select_params.append(&mut params);
                params = select_params;
                match group_by {
                    Some(column) => format!(
                        "SELECT {} FROM {} GROUP BY {}",
                        select.join(", "),
                        source,
                        column
                    ),
                    None => format!("SELECT {} FROM {}", select.join(", "), source),
                }
            }
        };
    }

    Ok(SqlStatement::new(sql, params))
}

fn single_entry(stage: &JsonValue) -> Result<(&str, &JsonValue)> {
    let object = stage
        .as_object()
        .ok_or_else(|| DbError::InvalidOption(format!("Pipeline stage must be an object, got {}", stage)))?;

    let mut entries = object.iter();
    match (entries.next(), entries.next()) {
        (Some((key, spec)), None) => Ok((key.as_str(), spec)),
        _ => Err(DbError::InvalidOption(format!(
            "Pipeline stage must have exactly one key, got {}",
            stage
        ))),
    }
}

fn as_object<'a>(stage: &str, spec: &'a JsonValue) -> Result<&'a Map<String, JsonValue>> {
    spec.as_object()
        .ok_or_else(|| DbError::InvalidOption(format!("{} needs an object, got {}", stage, spec)))
}

fn as_count(stage: &str, spec: &JsonValue) -> Result<u64> {
    spec.as_u64()
        .ok_or_else(|| DbError::InvalidOption(format!("{} needs a non-negative integer, got {}", stage, spec)))
}

/// `"$field"` → validated field name.
fn field_reference(value: &JsonValue) -> Option<Result<&str>> {
    let reference = value.as_str()?.strip_prefix('$')?;
    Some(validate_field_name(reference).map(|_| reference))
}

fn projection_columns(spec: &Map<String, JsonValue>) -> Result<Vec<String>> {
    let mut include_id = true;
    let mut columns = Vec::new();

    for (field, flag) in spec {
        validate_field_name(field)?;
        let included = match flag {
            JsonValue::Bool(b) => *b,
            JsonValue::Number(n) => n.as_i64() != Some(0),
            other => {
                return Err(DbError::InvalidOption(format!(
                    "$project value for '{}' must be 0 or 1, got {}",
                    field, other
                )));
            }
        };

        if field == ID_FIELD {
            include_id = included;
        } else if included {
            columns.push(quote_ident(field));
        } else {
            return Err(DbError::UnsupportedOperator(format!(
                "$project exclusion of '{}'",
                field
            )));
        }
    }

    if include_id {
        columns.insert(0, quote_ident(ID_FIELD));
    }

    if columns.is_empty() {
        return Err(DbError::InvalidOption("$project selects no fields".into()));
    }

    Ok(columns)
}

type GroupColumns = (Vec<String>, Option<String>);

fn group_columns(spec: &Map<String, JsonValue>, params: &mut Vec<Value>) -> Result<GroupColumns> {
    let key = spec
        .get(ID_FIELD)
        .ok_or_else(|| DbError::InvalidOption("$group needs an _id".into()))?;

    let id_alias = quote_ident(ID_FIELD);
    let (mut select, group_by) = match key {
        JsonValue::Null => (vec![format!("NULL AS {}", id_alias)], None),
        other => {
            let field = field_reference(other).ok_or_else(|| {
                DbError::InvalidOption(format!("$group _id must be \"$field\" or null, got {}", other))
            })??;
            let column = quote_ident(field);
            (vec![format!("{} AS {}", column, id_alias)], Some(column))
        }
    };

    for (name, accumulator) in spec {
        if name == ID_FIELD {
            continue;
        }
        validate_field_name(name)?;

        let (op, operand) = single_entry(accumulator)?;
        let function = match op {
            "$sum" => "SUM",
            "$avg" => "AVG",
            "$min" => "MIN",
            "$max" => "MAX",
            "$count" => {
                select.push(format!("COUNT(*) AS {}", quote_ident(name)));
                continue;
            }
            other => return Err(DbError::UnsupportedOperator(other.to_string())),
        };

        let argument = match field_reference(operand) {
            Some(field) => quote_ident(field?),
            None if operand.is_number() => {
                params.push(super::converter::JsonToValueConverter::convert(operand));
                "?".to_string()
            }
            None => {
                return Err(DbError::InvalidOption(format!(
                    "{} on '{}' needs \"$field\" or a number, got {}",
                    op, name, operand
                )));
            }
        };

        select.push(format!("{}({}) AS {}", function, argument, quote_ident(name)));
    }

    Ok((select, group_by))
}
