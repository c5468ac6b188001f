use crate::core::{DbError, Result, Value};
use crate::facade::Database;
use crate::result::QueryResult;
use async_trait::async_trait;

/// A generic trait for SQL clients.
///
/// Code written against this trait runs unchanged on a [`Database`] or on a
/// wrapper around any other engine.
#[async_trait]
pub trait DatabaseClient: Send + Sync {
    /// Execute a statement expected to return rows.
    async fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult>;

    /// Execute a statement that modifies data or schema.
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<QueryResult>;

    /// Check that the connection is usable.
    async fn ping(&self) -> Result<()>;
}

#[async_trait]
impl DatabaseClient for Database {
    async fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        self.raw_query(sql, params).await
    }

    async fn execute(&self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        self.raw_query(sql, params).await
    }

    async fn ping(&self) -> Result<()> {
        if self.is_closed().await {
            return Err(DbError::ConnectionClosed);
        }
        self.raw_query("SELECT 1", &[]).await.map(|_| ())
    }
}
