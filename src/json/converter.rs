//! JSON to SQL Converter
//!
//! Converts JSON values to engine values and back, and builds the SQL
//! statements issued by collections. Builders only ever splice validated,
//! quoted identifiers into SQL text; values travel in `params`.

use super::Document;
use super::filter::WhereClause;
use super::validator::quote_ident;
use crate::ID_FIELD;
use crate::core::{DbError, FieldDescriptor, Result, Value};
use serde_json::Value as JsonValue;

/// Converts JSON values to engine values
pub struct JsonToValueConverter;

impl JsonToValueConverter {
    /// Convert a JSON value into the value bound for it.
    ///
    /// Booleans become `0`/`1`, arrays and objects are stored as JSON text.
    /// Integral numbers, `25.0` included, become `INTEGER`; integers too
    /// large for `i64` fall back to `REAL`.
    pub fn convert(json_value: &JsonValue) -> Value {
        match json_value {
            JsonValue::Null => Value::Null,
            JsonValue::Bool(b) => Value::Integer(*b as i64),
            JsonValue::Number(n) => match integral_value(n) {
                Some(i) => Value::Integer(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            JsonValue::String(s) => Value::Text(s.clone()),
            JsonValue::Array(_) | JsonValue::Object(_) => Value::Text(json_value.to_string()),
        }
    }

    /// Convert a value destined for an existing field, failing when it does
    /// not fit the field's fixed type.
    pub fn convert_for_field(json_value: &JsonValue, field: &FieldDescriptor) -> Result<Value> {
        let value = Self::convert(json_value);
        if !field.field_type.accepts(&value) {
            return Err(DbError::SchemaConflict(format!(
                "Field '{}' is {} but the document holds {}",
                field.name, field.field_type, json_value
            )));
        }
        Ok(value)
    }
}

/// The `i64` a JSON number denotes, if it is integral.
///
/// Floats without a fractional part count, so `25.0` yields `Some(25)`.
pub fn integral_value(number: &serde_json::Number) -> Option<i64> {
    if let Some(i) = number.as_i64() {
        return Some(i);
    }
    let f = number.as_f64()?;
    if f.is_finite() && f.fract() == 0.0 && (i64::MIN as f64..i64::MAX as f64).contains(&f) {
        Some(f as i64)
    } else {
        None
    }
}

/// Convert an engine value into JSON.
pub fn value_to_json(value: &Value) -> JsonValue {
    match value {
        Value::Null => JsonValue::Null,
        Value::Integer(i) => JsonValue::Number((*i).into()),
        Value::Float(f) => serde_json::Number::from_f64(*f)
            .map(JsonValue::Number)
            .unwrap_or(JsonValue::Null),
        Value::Text(s) => JsonValue::String(s.clone()),
        Value::Blob(b) => JsonValue::Array(b.iter().map(|byte| JsonValue::from(*byte)).collect()),
    }
}

/// Zip column names with one result row into a document.
pub fn row_to_document(columns: &[String], row: &[Value]) -> Document {
    columns
        .iter()
        .zip(row)
        .map(|(column, value)| (column.clone(), value_to_json(value)))
        .collect()
}

/// A SQL statement with its positional (`?`) parameters, in order.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlStatement {
    pub sql: String,
    pub params: Vec<Value>,
}

impl SqlStatement {
    pub fn new(sql: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }
}

/// Builder for the CREATE TABLE statement backing a collection
pub struct CreateTableBuilder {
    table_name: String,
}

impl CreateTableBuilder {
    pub fn new(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
        }
    }

    pub fn build(self) -> String {
        format!(
            "CREATE TABLE IF NOT EXISTS {} ({} TEXT PRIMARY KEY)",
            quote_ident(&self.table_name),
            quote_ident(ID_FIELD)
        )
    }
}

/// Builder for `ALTER TABLE ... ADD COLUMN`
pub struct AddColumnBuilder<'a> {
    table_name: String,
    field: &'a FieldDescriptor,
}

impl<'a> AddColumnBuilder<'a> {
    pub fn new(table_name: impl Into<String>, field: &'a FieldDescriptor) -> Self {
        Self {
            table_name: table_name.into(),
            field,
        }
    }

    /// Unique and index flags are not part of the column definition; see
    /// [`CreateIndexBuilder::for_field`].
    pub fn build(self) -> String {
        let mut sql = format!(
            "ALTER TABLE {} ADD COLUMN {} {}",
            quote_ident(&self.table_name),
            quote_ident(&self.field.name),
            self.field.field_type
        );

        if !self.field.is_optional {
            sql.push_str(" NOT NULL");
        }

        if let Some(default) = &self.field.default {
            sql.push_str(" DEFAULT ");
            sql.push_str(&default.to_sql_literal());
        }

        sql
    }
}

/// Builder for `CREATE [UNIQUE] INDEX IF NOT EXISTS`
pub struct CreateIndexBuilder {
    table_name: String,
    columns: Vec<String>,
    unique: bool,
}

impl CreateIndexBuilder {
    pub fn new(table_name: impl Into<String>, columns: Vec<String>) -> Self {
        Self {
            table_name: table_name.into(),
            columns,
            unique: false,
        }
    }

    pub fn for_field(table_name: impl Into<String>, field: &FieldDescriptor) -> Self {
        Self::new(table_name, vec![field.name.clone()]).unique(field.is_unique)
    }

    pub fn unique(mut self, unique: bool) -> Self {
        self.unique = unique;
        self
    }

    /// Deterministic name: `idx_<table>_<col1>_<col2>...`.
    pub fn index_name(&self) -> String {
        format!("idx_{}_{}", self.table_name, self.columns.join("_"))
    }

    pub fn build(&self) -> String {
        let columns: Vec<String> = self.columns.iter().map(|c| quote_ident(c)).collect();

        format!(
            "CREATE {}INDEX IF NOT EXISTS {} ON {} ({})",
            if self.unique { "UNIQUE " } else { "" },
            quote_ident(&self.index_name()),
            quote_ident(&self.table_name),
            columns.join(", ")
        )
    }
}

/// Builder for parameterized INSERT statements
pub struct InsertStatementBuilder {
    table_name: String,
    columns: Vec<String>,
    values: Vec<Value>,
}

impl InsertStatementBuilder {
    pub fn new(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            columns: Vec::new(),
            values: Vec::new(),
        }
    }

    pub fn value(mut self, column: impl Into<String>, value: Value) -> Self {
        self.columns.push(column.into());
        self.values.push(value);
        self
    }

    pub fn build(self) -> SqlStatement {
        let columns: Vec<String> = self.columns.iter().map(|c| quote_ident(c)).collect();
        let placeholders = vec!["?"; self.values.len()].join(", ");

        SqlStatement::new(
            format!(
                "INSERT INTO {} ({}) VALUES ({})",
                quote_ident(&self.table_name),
                columns.join(", "),
                placeholders
            ),
            self.values,
        )
    }
}

/// Right-hand side of one `SET` assignment.
#[derive(Debug, Clone, PartialEq)]
pub enum Assignment {
    /// `col = ?`
    Set(Value),
    /// `col = COALESCE(col, 0) + ?`
    Increment(Value),
}

/// Restricts a statement's WHERE clause to the first matching row in `_id`
/// order. The engine is not built with `UPDATE ... LIMIT`, so the row is
/// picked by a subquery.
fn first_match_clause(table_name: &str, filter: Option<WhereClause>) -> WhereClause {
    let table = quote_ident(table_name);
    let id = quote_ident(ID_FIELD);
    let (inner_where, params) = match filter {
        Some(clause) => (format!(" WHERE {}", clause.sql), clause.params),
        None => (String::new(), Vec::new()),
    };

    WhereClause {
        sql: format!(
            "{id} IN (SELECT {id} FROM {table}{inner_where} ORDER BY {id} ASC LIMIT 1)"
        ),
        params,
    }
}

/// Builder for parameterized UPDATE statements
pub struct UpdateStatementBuilder {
    table_name: String,
    set_clause: Vec<(String, Assignment)>,
    where_clause: Option<WhereClause>,
    first_only: bool,
}

impl UpdateStatementBuilder {
    pub fn new(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            set_clause: Vec::new(),
            where_clause: None,
            first_only: false,
        }
    }

    pub fn assign(mut self, column: impl Into<String>, assignment: Assignment) -> Self {
        self.set_clause.push((column.into(), assignment));
        self
    }

    pub fn where_clause(mut self, clause: Option<WhereClause>) -> Self {
        self.where_clause = clause;
        self
    }

    pub fn first_only(mut self, first_only: bool) -> Self {
        self.first_only = first_only;
        self
    }

    pub fn build(self) -> SqlStatement {
        let mut params = Vec::new();
        let set_parts: Vec<String> = self
            .set_clause
            .into_iter()
            .map(|(column, assignment)| {
                let col = quote_ident(&column);
                match assignment {
                    Assignment::Set(value) => {
                        params.push(value);
                        format!("{} = ?", col)
                    }
                    Assignment::Increment(value) => {
                        params.push(value);
                        format!("{} = COALESCE({}, 0) + ?", col, col)
                    }
                }
            })
            .collect();

        let clause = if self.first_only {
            Some(first_match_clause(&self.table_name, self.where_clause))
        } else {
            self.where_clause
        };

        let where_part = match clause {
            Some(clause) => {
                params.extend(clause.params);
                format!(" WHERE {}", clause.sql)
            }
            None => String::new(),
        };

        SqlStatement::new(
            format!(
                "UPDATE {} SET {}{}",
                quote_ident(&self.table_name),
                set_parts.join(", "),
                where_part
            ),
            params,
        )
    }
}

/// Builder for parameterized DELETE statements
pub struct DeleteStatementBuilder {
    table_name: String,
    where_clause: Option<WhereClause>,
    first_only: bool,
}

impl DeleteStatementBuilder {
    pub fn new(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            where_clause: None,
            first_only: false,
        }
    }

    pub fn where_clause(mut self, clause: Option<WhereClause>) -> Self {
        self.where_clause = clause;
        self
    }

    pub fn first_only(mut self, first_only: bool) -> Self {
        self.first_only = first_only;
        self
    }

    pub fn build(self) -> SqlStatement {
        let clause = if self.first_only {
            Some(first_match_clause(&self.table_name, self.where_clause))
        } else {
            self.where_clause
        };

        let (where_part, params) = match clause {
            Some(clause) => (format!(" WHERE {}", clause.sql), clause.params),
            None => (String::new(), Vec::new()),
        };

        SqlStatement::new(
            format!("DELETE FROM {}{}", quote_ident(&self.table_name), where_part),
            params,
        )
    }
}

/// Builder for SELECT statements issued by `find`
pub struct SelectStatementBuilder {
    table_name: String,
    projection: String,
    where_clause: Option<WhereClause>,
    order_by: Vec<(String, bool)>,
    limit: Option<u64>,
    offset: u64,
}

impl SelectStatementBuilder {
    pub fn new(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            projection: "*".to_string(),
            where_clause: None,
            order_by: Vec::new(),
            limit: None,
            offset: 0,
        }
    }

    /// Select `COUNT(*)` instead of whole rows.
    pub fn count(mut self) -> Self {
        self.projection = "COUNT(*)".to_string();
        self
    }

    pub fn where_clause(mut self, clause: Option<WhereClause>) -> Self {
        self.where_clause = clause;
        self
    }

    pub fn order_by(mut self, column: impl Into<String>, ascending: bool) -> Self {
        self.order_by.push((column.into(), ascending));
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = offset;
        self
    }

    pub fn build(self) -> Result<SqlStatement> {
        let mut sql = format!(
            "SELECT {} FROM {}",
            self.projection,
            quote_ident(&self.table_name)
        );
        let mut params = Vec::new();

        if let Some(clause) = self.where_clause {
            sql.push_str(" WHERE ");
            sql.push_str(&clause.sql);
            params.extend(clause.params);
        }

        if !self.order_by.is_empty() {
            let order: Vec<String> = self
                .order_by
                .iter()
                .map(|(column, ascending)| {
                    format!("{} {}", quote_ident(column), if *ascending { "ASC" } else { "DESC" })
                })
                .collect();
            sql.push_str(" ORDER BY ");
            sql.push_str(&order.join(", "));
        }

        if let Some(limit) = self.limit {
            sql.push_str(" LIMIT ? OFFSET ?");
            params.push(Value::Integer(to_sql_int(limit, "limit")?));
            params.push(Value::Integer(to_sql_int(self.offset, "skip")?));
        }

        Ok(SqlStatement::new(sql, params))
    }
}

pub(crate) fn to_sql_int(value: u64, what: &str) -> Result<i64> {
    i64::try_from(value).map_err(|_| DbError::InvalidOption(format!("{} {} is too large", what, value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{FieldOptions, FieldType};
    use serde_json::json;

    #[test]
    fn test_json_to_value_converter() {
        assert_eq!(JsonToValueConverter::convert(&json!(42)), Value::Integer(42));
        assert_eq!(JsonToValueConverter::convert(&json!(3.25)), Value::Float(3.25));
        assert_eq!(JsonToValueConverter::convert(&json!("hello")), Value::Text("hello".into()));
        assert_eq!(JsonToValueConverter::convert(&json!(true)), Value::Integer(1));
        assert_eq!(JsonToValueConverter::convert(&json!(null)), Value::Null);
        assert_eq!(
            JsonToValueConverter::convert(&json!({"a": [1, 2]})),
            Value::Text("{\"a\":[1,2]}".into())
        );
    }

    #[test]
    fn test_integral_floats_bind_as_integers() {
        assert_eq!(JsonToValueConverter::convert(&json!(25.0)), Value::Integer(25));
        assert_eq!(JsonToValueConverter::convert(&json!(-3.0)), Value::Integer(-3));
        assert_eq!(JsonToValueConverter::convert(&json!(25.5)), Value::Float(25.5));
        assert_eq!(JsonToValueConverter::convert(&json!(1e300)), Value::Float(1e300));
        assert_eq!(
            JsonToValueConverter::convert(&json!(u64::MAX)),
            Value::Float(u64::MAX as f64)
        );
    }

    #[test]
    fn test_convert_for_field_conflict() {
        let age = FieldDescriptor::new("age", FieldType::Integer);
        assert!(JsonToValueConverter::convert_for_field(&json!(30), &age).is_ok());
        assert!(matches!(
            JsonToValueConverter::convert_for_field(&json!("thirty"), &age),
            Err(DbError::SchemaConflict(_))
        ));
    }

    #[test]
    fn test_value_to_json() {
        assert_eq!(value_to_json(&Value::Integer(25)), json!(25));
        assert_eq!(value_to_json(&Value::Float(3455.328)), json!(3455.328));
        assert_eq!(value_to_json(&Value::Float(f64::NAN)), JsonValue::Null);
        assert_eq!(value_to_json(&Value::Blob(vec![1, 2])), json!([1, 2]));
    }

    #[test]
    fn test_create_table_builder() {
        assert_eq!(
            CreateTableBuilder::new("users").build(),
            "CREATE TABLE IF NOT EXISTS \"users\" (\"_id\" TEXT PRIMARY KEY)"
        );
    }

    #[test]
    fn test_add_column_builder() {
        let field = FieldOptions::new()
            .field_type(FieldType::Integer)
            .required()
            .default_value(0)
            .resolve("age");
        assert_eq!(
            AddColumnBuilder::new("users", &field).build(),
            "ALTER TABLE \"users\" ADD COLUMN \"age\" INTEGER NOT NULL DEFAULT 0"
        );

        let field = FieldOptions::new().default_value("it's").resolve("note");
        assert_eq!(
            AddColumnBuilder::new("users", &field).build(),
            "ALTER TABLE \"users\" ADD COLUMN \"note\" TEXT DEFAULT 'it''s'"
        );
    }

    #[test]
    fn test_create_index_builder() {
        let builder = CreateIndexBuilder::new("users", vec!["name".into(), "age".into()]).unique(true);
        assert_eq!(builder.index_name(), "idx_users_name_age");
        assert_eq!(
            builder.build(),
            "CREATE UNIQUE INDEX IF NOT EXISTS \"idx_users_name_age\" ON \"users\" (\"name\", \"age\")"
        );
    }

    #[test]
    fn test_insert_statement_builder() {
        let stmt = InsertStatementBuilder::new("users")
            .value("_id", Value::from("a1"))
            .value("name", Value::from("O'Reilly"))
            .build();

        assert_eq!(stmt.sql, "INSERT INTO \"users\" (\"_id\", \"name\") VALUES (?, ?)");
        assert_eq!(stmt.params, vec![Value::from("a1"), Value::from("O'Reilly")]);
    }

    #[test]
    fn test_update_statement_builder() {
        let stmt = UpdateStatementBuilder::new("users")
            .assign("name", Assignment::Set(Value::from("Alice")))
            .assign("visits", Assignment::Increment(Value::Integer(1)))
            .where_clause(Some(WhereClause {
                sql: "\"age\" > ?".into(),
                params: vec![Value::Integer(30)],
            }))
            .build();

        assert_eq!(
            stmt.sql,
            "UPDATE \"users\" SET \"name\" = ?, \"visits\" = COALESCE(\"visits\", 0) + ? WHERE \"age\" > ?"
        );
        assert_eq!(
            stmt.params,
            vec![Value::from("Alice"), Value::Integer(1), Value::Integer(30)]
        );
    }

    #[test]
    fn test_delete_first_only() {
        let stmt = DeleteStatementBuilder::new("users").first_only(true).build();

        assert_eq!(
            stmt.sql,
            "DELETE FROM \"users\" WHERE \"_id\" IN (SELECT \"_id\" FROM \"users\" ORDER BY \"_id\" ASC LIMIT 1)"
        );
        assert!(stmt.params.is_empty());
    }

    #[test]
    fn test_select_statement_builder() {
        let stmt = SelectStatementBuilder::new("users")
            .order_by("age", false)
            .order_by("_id", true)
            .limit(100)
            .offset(20)
            .build()
            .unwrap();

        assert_eq!(
            stmt.sql,
            "SELECT * FROM \"users\" ORDER BY \"age\" DESC, \"_id\" ASC LIMIT ? OFFSET ?"
        );
        assert_eq!(stmt.params, vec![Value::Integer(100), Value::Integer(20)]);
    }
}
