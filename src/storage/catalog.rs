//! Reads of the engine catalog
//!
//! The engine's own metadata is the source of truth for which collections
//! and fields exist. Every lookup binds the table name as a parameter.

use crate::core::{FieldDescriptor, FieldType, Result, Value};
use rusqlite::{OptionalExtension, params};
use serde::Serialize;

/// One row of `pragma_table_info`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnInfo {
    pub name: String,
    pub declared_type: String,
    pub not_null: bool,
    pub default: Option<String>,
    pub primary_key: bool,
}

/// One index of a table with its member columns.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexInfo {
    pub name: String,
    pub unique: bool,
    /// `c` for CREATE INDEX, `u` for UNIQUE constraints, `pk` for primary keys
    pub origin: String,
    pub partial: bool,
    pub columns: Vec<String>,
}

pub fn table_exists(conn: &rusqlite::Connection, name: &str) -> Result<bool> {
    let found = conn
        .query_row(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?1",
            params![name],
            |row| row.get::<_, String>(0),
        )
        .optional()?;
    Ok(found.is_some())
}

/// User tables, internal `sqlite_` tables excluded.
pub fn table_names(conn: &rusqlite::Connection) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite\\_%' ESCAPE '\\' ORDER BY name",
    )?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(names)
}

pub fn table_columns(conn: &rusqlite::Connection, table: &str) -> Result<Vec<ColumnInfo>> {
    let mut stmt = conn.prepare(
        "SELECT name, type, \"notnull\", dflt_value, pk FROM pragma_table_info(?1) ORDER BY cid",
    )?;
    let columns = stmt
        .query_map(params![table], |row| {
            Ok(ColumnInfo {
                name: row.get(0)?,
                declared_type: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                not_null: row.get::<_, i64>(2)? != 0,
                default: row.get(3)?,
                primary_key: row.get::<_, i64>(4)? > 0,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(columns)
}

pub fn index_list(conn: &rusqlite::Connection, table: &str) -> Result<Vec<IndexInfo>> {
    let mut stmt = conn.prepare(
        "SELECT name, \"unique\", origin, partial FROM pragma_index_list(?1) ORDER BY name",
    )?;
    let mut indexes = stmt
        .query_map(params![table], |row| {
            Ok(IndexInfo {
                name: row.get(0)?,
                unique: row.get::<_, i64>(1)? != 0,
                origin: row.get(2)?,
                partial: row.get::<_, i64>(3)? != 0,
                columns: Vec::new(),
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let mut members = conn.prepare("SELECT name FROM pragma_index_info(?1) ORDER BY seqno")?;
    for index in &mut indexes {
        index.columns = members
            .query_map(params![index.name], |row| row.get::<_, Option<String>>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?
            .into_iter()
            .flatten()
            .collect();
    }

    Ok(indexes)
}

/// Field descriptors for a table: declared type, nullability, default and
/// primary key from the column catalog; unique/index flags from
/// single-column indexes.
pub fn fields(conn: &rusqlite::Connection, table: &str) -> Result<Vec<FieldDescriptor>> {
    let columns = table_columns(conn, table)?;
    let indexes = index_list(conn, table)?;

    Ok(columns
        .into_iter()
        .map(|column| {
            let single: Vec<&IndexInfo> = indexes
                .iter()
                .filter(|i| !i.partial && i.columns.len() == 1 && i.columns[0] == column.name)
                .collect();

            let is_primary = column.primary_key;
            let is_unique = is_primary || single.iter().any(|i| i.unique);
            let is_index = is_unique || !single.is_empty();

            FieldDescriptor {
                field_type: FieldType::from_declared(&column.declared_type),
                is_optional: !column.not_null && !is_primary,
                is_unique,
                is_index,
                is_primary,
                default: column.default.as_deref().and_then(parse_default),
                name: column.name,
            }
        })
        .collect())
}

/// Parse the SQL text of a column default back into a value.
fn parse_default(raw: &str) -> Option<Value> {
    let raw = raw.trim();

    if raw.eq_ignore_ascii_case("NULL") {
        return None;
    }

    if raw.len() >= 2 && raw.starts_with('\'') && raw.ends_with('\'') {
        return Some(Value::Text(raw[1..raw.len() - 1].replace("''", "'")));
    }

    if let Ok(i) = raw.parse::<i64>() {
        return Some(Value::Integer(i));
    }

    if let Ok(f) = raw.parse::<f64>() {
        return Some(Value::Float(f));
    }

    Some(Value::Text(raw.to_string()))
}
