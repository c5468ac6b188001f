use crate::core::{Row, Value};
use crate::json::Document;
use crate::json::converter::row_to_document;

/// Outcome of a raw statement.
///
/// Statements that produce columns fill `columns`/`rows`; the others report
/// `rows_affected`.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
    pub rows_affected: usize,
}

impl QueryResult {
    pub fn empty() -> Self {
        Self {
            columns: Vec::new(),
            rows: Vec::new(),
            rows_affected: 0,
        }
    }

    pub fn new(columns: Vec<String>, rows: Vec<Row>) -> Self {
        Self {
            columns,
            rows,
            rows_affected: 0,
        }
    }

    pub fn affected(rows_affected: usize) -> Self {
        Self {
            rows_affected,
            ..Self::empty()
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Value of `column` in row `row`, if both exist.
    pub fn get(&self, row: usize, column: &str) -> Option<&Value> {
        let index = self.columns.iter().position(|c| c == column)?;
        self.rows.get(row)?.get(index)
    }

    /// Rows as JSON documents keyed by column name.
    pub fn into_documents(self) -> Vec<Document> {
        self.rows
            .iter()
            .map(|row| row_to_document(&self.columns, row))
            .collect()
    }
}
