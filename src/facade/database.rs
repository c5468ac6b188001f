use super::collection::Collection;
use crate::connection::config::DatabaseConfig;
use crate::connection::{Connection, execute, query};
use crate::core::{Result, Value};
use crate::json::converter::CreateTableBuilder;
use crate::json::validator::{quote_ident, validate_collection_name};
use crate::result::QueryResult;
use crate::storage::catalog;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::{error, info};

pub(crate) struct DatabaseInner {
    pub(crate) connection: Connection,
    config: DatabaseConfig,
    /// Opened proxies keyed by lowercased name, since table names are
    /// case-insensitive. The engine catalog stays authoritative.
    collections: RwLock<HashMap<String, Collection>>,
}

impl DatabaseInner {
    /// `<uuid>_<environment initial>`
    pub(crate) fn generate_id(&self) -> String {
        format!("{}_{}", uuid::Uuid::new_v4().simple(), self.config.environment_tag())
    }
}

/// Handle to a document database
///
/// Cloning is cheap and every clone talks to the same connection.
///
/// # Examples
///
/// ```no_run
/// use docshelf::Database;
/// use serde_json::json;
///
/// # async fn example() -> docshelf::Result<()> {
/// let db = Database::open_in_memory().await?;
/// let users = db.get_collection("users").await?;
/// users.insert_one(json!({"name": "John", "age": 25})).await?;
///
/// let john = users.find_one(&json!({"name": "John"})).await?;
/// assert!(john.is_some());
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Database {
    inner: Arc<DatabaseInner>,
}

impl Database {
    /// Open a database. The environment directory (and a file target's
    /// parent) is created first when `ensure_data_dir` is set.
    pub async fn open(config: DatabaseConfig) -> Result<Self> {
        let path = config.database_path();

        if config.ensure_data_dir {
            tokio::fs::create_dir_all(config.data_dir()).await?;
            if let Some(parent) = path
                .as_deref()
                .and_then(|file| file.parent())
                .filter(|p| !p.as_os_str().is_empty())
            {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let connection = Connection::open(path.as_deref())?;
        info!(
            target_db = ?connection.target(),
            environment = %config.environment,
            "database opened"
        );

        Ok(Self {
            inner: Arc::new(DatabaseInner {
                connection,
                config,
                collections: RwLock::new(HashMap::new()),
            }),
        })
    }

    pub async fn open_in_memory() -> Result<Self> {
        Self::open(DatabaseConfig::in_memory()).await
    }

    /// Open with configuration taken from the environment.
    pub async fn open_from_env() -> Result<Self> {
        Self::open(DatabaseConfig::from_env()).await
    }

    pub fn config(&self) -> &DatabaseConfig {
        &self.inner.config
    }

    /// A fresh document id: `<uuid>_<environment initial>`.
    pub fn generate_id(&self) -> String {
        self.inner.generate_id()
    }

    pub async fn collection_exists(&self, name: &str) -> Result<bool> {
        validate_collection_name(name)?;
        self.inner
            .connection
            .with_conn(|conn| catalog::table_exists(conn, name))
            .await
    }

    fn proxy(&self, name: &str) -> Result<Collection> {
        let key = name.to_ascii_lowercase();
        if let Some(collection) = self.inner.collections.read()?.get(&key) {
            return Ok(collection.clone());
        }

        let mut collections = self.inner.collections.write()?;
        let collection = collections
            .entry(key)
            .or_insert_with(|| Collection::new(name, Arc::downgrade(&self.inner)));
        Ok(collection.clone())
    }

    /// Return the collection, creating its table when missing.
    pub async fn get_collection(&self, name: &str) -> Result<Collection> {
        validate_collection_name(name)?;
        let collection = self.proxy(name)?;
        collection.ready().await?;
        Ok(collection)
    }

    /// Create the collection's table. Idempotent.
    pub async fn create_collection(&self, name: &str) -> Result<Collection> {
        validate_collection_name(name)?;
        self.inner
            .connection
            .with_conn(|conn| execute(conn, &CreateTableBuilder::new(name).build(), &[]))
            .await?;

        info!(collection = %name, "collection ensured");
        self.get_collection(name).await
    }

    /// Drop the collection's table and forget its proxy. Clones of the proxy
    /// still held elsewhere recreate the table on their next operation.
    pub async fn drop_collection(&self, name: &str) -> Result<()> {
        validate_collection_name(name)?;
        self.inner
            .connection
            .with_conn(|conn| {
                execute(conn, &format!("DROP TABLE IF EXISTS {}", quote_ident(name)), &[])
            })
            .await?;

        if let Some(collection) = self.inner.collections.write()?.remove(&name.to_ascii_lowercase()) {
            collection.reset();
        }
        info!(collection = %name, "collection dropped");
        Ok(())
    }

    /// Every user table, including tables not created through this crate.
    pub async fn list_collections(&self) -> Result<Vec<Collection>> {
        let names = self
            .inner
            .connection
            .with_conn(|conn| catalog::table_names(conn))
            .await?;

        names.iter().map(|name| self.proxy(name)).collect()
    }

    /// Run SQL directly against the engine.
    ///
    /// Statements without result columns report the affected row count in
    /// [`QueryResult::rows_affected`].
    pub async fn raw_query(&self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        let result = self
            .inner
            .connection
            .with_conn(|conn| query(conn, sql, params))
            .await;

        if let Err(err) = &result {
            error!(sql, error = %err, "raw query failed");
        }
        result
    }

    /// Release the connection. Later operations fail with
    /// `ConnectionClosed`; closing twice is a no-op.
    pub async fn close(&self) -> Result<()> {
        if self.inner.connection.is_closed().await {
            return Ok(());
        }

        self.inner.connection.close().await?;
        self.inner.collections.write()?.clear();
        info!("database closed");
        Ok(())
    }

    pub async fn is_closed(&self) -> bool {
        self.inner.connection.is_closed().await
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("target", self.inner.connection.target())
            .field("environment", &self.inner.config.environment)
            .finish()
    }
}
