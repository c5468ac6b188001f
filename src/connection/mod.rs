pub mod config;

use crate::core::{DbError, Result, Value};
use crate::json::converter::SqlStatement;
use crate::result::QueryResult;
use config::ConnectionTarget;
use std::path::Path;
use tokio::sync::Mutex;
use tracing::debug;

/// Handle to the single engine connection.
///
/// Statements run one at a time behind an async mutex. After
/// [`close`](Connection::close) every call fails with
/// [`DbError::ConnectionClosed`].
pub struct Connection {
    inner: Mutex<Option<rusqlite::Connection>>,
    target: ConnectionTarget,
}

impl Connection {
    /// Open an in-memory database, or the file at `path`.
    pub fn open(path: Option<&Path>) -> Result<Self> {
        let (conn, target) = match path {
            Some(path) => (
                rusqlite::Connection::open(path)?,
                ConnectionTarget::File(path.to_path_buf()),
            ),
            None => (rusqlite::Connection::open_in_memory()?, ConnectionTarget::Memory),
        };

        Ok(Self {
            inner: Mutex::new(Some(conn)),
            target,
        })
    }

    pub fn target(&self) -> &ConnectionTarget {
        &self.target
    }

    /// Run `f` with exclusive access to the engine connection.
    pub async fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut rusqlite::Connection) -> Result<T>,
    {
        let mut guard = self.inner.lock().await;
        let conn = guard.as_mut().ok_or(DbError::ConnectionClosed)?;
        f(conn)
    }

    /// Run `f` inside a transaction. It commits when `f` succeeds and rolls
    /// back otherwise.
    pub async fn transaction<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&rusqlite::Transaction<'_>) -> Result<T>,
    {
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            let out = f(&tx)?;
            tx.commit()?;
            Ok(out)
        })
        .await
    }

    /// Execute a statement that returns no rows.
    pub async fn execute(&self, sql: &str, params: &[Value]) -> Result<usize> {
        self.with_conn(|conn| execute(conn, sql, params)).await
    }

    /// Execute a statement and collect its rows.
    pub async fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        self.with_conn(|conn| query(conn, sql, params)).await
    }

    /// Release the engine connection. Closing twice is a no-op.
    pub async fn close(&self) -> Result<()> {
        let mut guard = self.inner.lock().await;
        if let Some(conn) = guard.take() {
            conn.close().map_err(|(_, err)| DbError::Engine(err))?;
        }
        Ok(())
    }

    pub async fn is_closed(&self) -> bool {
        self.inner.lock().await.is_none()
    }
}

/// Execute one statement without collecting rows; returns the changed row
/// count.
pub fn execute(conn: &rusqlite::Connection, sql: &str, params: &[Value]) -> Result<usize> {
    debug!(sql, params = params.len(), "execute");
    let mut stmt = conn.prepare(sql)?;
    Ok(stmt.execute(rusqlite::params_from_iter(params.iter()))?)
}

pub fn execute_statement(conn: &rusqlite::Connection, statement: &SqlStatement) -> Result<usize> {
    execute(conn, &statement.sql, &statement.params)
}

/// Execute one statement and collect its rows. Statements without result
/// columns run to completion and report the affected row count.
pub fn query(conn: &rusqlite::Connection, sql: &str, params: &[Value]) -> Result<QueryResult> {
    debug!(sql, params = params.len(), "query");
    let mut stmt = conn.prepare(sql)?;

    if stmt.column_count() == 0 {
        let affected = stmt.execute(rusqlite::params_from_iter(params.iter()))?;
        return Ok(QueryResult::affected(affected));
    }

    let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
    let mut rows = stmt.query(rusqlite::params_from_iter(params.iter()))?;
    let mut collected = Vec::new();

    while let Some(row) = rows.next()? {
        let mut values = Vec::with_capacity(columns.len());
        for index in 0..columns.len() {
            values.push(Value::from(row.get_ref(index)?));
        }
        collected.push(values);
    }

    Ok(QueryResult::new(columns, collected))
}

pub fn query_statement(conn: &rusqlite::Connection, statement: &SqlStatement) -> Result<QueryResult> {
    query(conn, &statement.sql, &statement.params)
}
