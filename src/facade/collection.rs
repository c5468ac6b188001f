use super::database::DatabaseInner;
use crate::ID_FIELD;
use crate::connection::{execute, execute_statement, query_statement};
use crate::core::{DbError, FieldDescriptor, FieldOptions, Result, Value, validate_new_field};
use crate::json::converter::{
    AddColumnBuilder, Assignment, CreateIndexBuilder, CreateTableBuilder, DeleteStatementBuilder,
    InsertStatementBuilder, JsonToValueConverter, SelectStatementBuilder, UpdateStatementBuilder,
};
use crate::json::validator::{quote_ident, validate_field_name, validate_index_name};
use crate::json::{
    Document, FindOptions, IndexOptions, UpdateDocument, compile_pipeline, plan_new_fields,
    translate_filter,
};
use crate::storage::catalog::{self, IndexInfo};
use serde_json::Value as JsonValue;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

/// Readiness of a collection's backing table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionState {
    Uninitialized,
    Verifying,
    Ready,
}

impl CollectionState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => Self::Verifying,
            2 => Self::Ready,
            _ => Self::Uninitialized,
        }
    }
}

struct CollectionShared {
    name: String,
    database: Weak<DatabaseInner>,
    ready: Mutex<Arc<OnceCell<()>>>,
    state: AtomicU8,
    fields: RwLock<Option<Vec<FieldDescriptor>>>,
}

/// Proxy for one collection, backed by the table of the same name.
///
/// Cloning is cheap; clones share the readiness barrier and the field
/// cache. Every operation first waits until the backing table has been
/// verified (and created when missing).
#[derive(Clone)]
pub struct Collection {
    shared: Arc<CollectionShared>,
}

impl std::fmt::Debug for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collection")
            .field("name", &self.shared.name)
            .field("state", &self.state())
            .finish()
    }
}

impl Collection {
    pub(crate) fn new(name: impl Into<String>, database: Weak<DatabaseInner>) -> Self {
        Self {
            shared: Arc::new(CollectionShared {
                name: name.into(),
                database,
                ready: Mutex::new(Arc::new(OnceCell::new())),
                state: AtomicU8::new(CollectionState::Uninitialized as u8),
                fields: RwLock::new(None),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn state(&self) -> CollectionState {
        CollectionState::from_u8(self.shared.state.load(Ordering::Acquire))
    }

    /// Fields seen by the last catalog read, if still valid.
    pub fn cached_fields(&self) -> Option<Vec<FieldDescriptor>> {
        self.shared
            .fields
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn store_fields(&self, fields: Vec<FieldDescriptor>) {
        *self.shared.fields.write().unwrap_or_else(PoisonError::into_inner) = Some(fields);
    }

    fn invalidate_fields(&self) {
        *self.shared.fields.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    fn set_state(&self, state: CollectionState) {
        self.shared.state.store(state as u8, Ordering::Release);
    }

    /// Forget that the backing table was verified. The next operation
    /// recreates it when missing.
    pub(crate) fn reset(&self) {
        *self.shared.ready.lock().unwrap_or_else(PoisonError::into_inner) =
            Arc::new(OnceCell::new());
        self.set_state(CollectionState::Uninitialized);
        self.invalidate_fields();
    }

    fn database(&self) -> Result<Arc<DatabaseInner>> {
        self.shared.database.upgrade().ok_or(DbError::ConnectionClosed)
    }

    /// Wait for the readiness barrier. The first caller verifies the table
    /// and creates it when missing; a failed verification leaves the
    /// barrier open for the next call.
    pub(crate) async fn ready(&self) -> Result<Arc<DatabaseInner>> {
        let db = self.database()?;
        let barrier = self
            .shared
            .ready
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        barrier
            .get_or_try_init(|| async {
                self.set_state(CollectionState::Verifying);

                let verified = db
                    .connection
                    .with_conn(|conn| {
                        if catalog::table_exists(conn, self.name())? {
                            return Ok(false);
                        }
                        execute(conn, &CreateTableBuilder::new(self.name()).build(), &[])?;
                        Ok(true)
                    })
                    .await;

                match verified {
                    Ok(created) => {
                        if created {
                            info!(collection = %self.name(), "collection created");
                        }
                        self.set_state(CollectionState::Ready);
                        Ok(())
                    }
                    Err(err) => {
                        self.set_state(CollectionState::Uninitialized);
                        Err(err)
                    }
                }
            })
            .await?;

        Ok(db)
    }

    /// Drop the field cache when `result` failed and report schema
    /// conflicts.
    fn settle<T>(&self, result: Result<T>) -> Result<T> {
        if let Err(err) = &result {
            self.invalidate_fields();
            if let DbError::SchemaConflict(reason) = err {
                warn!(collection = %self.name(), %reason, "schema conflict");
            }
        }
        result
    }

    /// Fields of the collection, read from the catalog.
    pub async fn get_fields(&self) -> Result<Vec<FieldDescriptor>> {
        let db = self.ready().await?;
        let fields = db
            .connection
            .with_conn(|conn| catalog::fields(conn, self.name()))
            .await?;

        self.store_fields(fields.clone());
        Ok(fields)
    }

    pub async fn field_exists(&self, name: &str) -> Result<bool> {
        let db = self.ready().await?;
        let columns = db
            .connection
            .with_conn(|conn| catalog::table_columns(conn, self.name()))
            .await?;

        Ok(columns.iter().any(|column| column.name.eq_ignore_ascii_case(name)))
    }

    /// Add a field with explicit options.
    ///
    /// Unique and indexed fields get an index named `idx_<collection>_<field>`.
    pub async fn create_field(&self, name: &str, options: FieldOptions) -> Result<FieldDescriptor> {
        validate_field_name(name)?;
        let field = options.resolve(name);
        self.settle(validate_new_field(&field))?;

        let db = self.ready().await?;
        let result = db
            .connection
            .transaction(|tx| {
                if catalog::table_columns(tx, self.name())?
                    .iter()
                    .any(|column| column.name.eq_ignore_ascii_case(&field.name))
                {
                    return Err(DbError::SchemaConflict(format!(
                        "Field '{}' already exists in '{}'",
                        field.name,
                        self.name()
                    )));
                }

                execute(tx, &AddColumnBuilder::new(self.name(), &field).build(), &[])?;
                if field.is_index {
                    execute(tx, &CreateIndexBuilder::for_field(self.name(), &field).build(), &[])?;
                }
                Ok(())
            })
            .await;

        self.invalidate_fields();
        self.settle(result)?;

        info!(
            collection = %self.name(),
            field = %field.name,
            field_type = %field.field_type,
            unique = field.is_unique,
            "field created"
        );
        Ok(field)
    }

    /// Add the columns `documents` need. Runs inside the caller's
    /// transaction.
    fn evolve_schema(
        &self,
        conn: &rusqlite::Connection,
        documents: &[Document],
    ) -> Result<Vec<FieldDescriptor>> {
        if let Some(cached) = self.cached_fields() {
            if plan_new_fields(&cached, documents)?.is_empty() {
                return Ok(Vec::new());
            }
        }

        // The cache may be stale; new columns are planned against the catalog.
        let existing = catalog::fields(conn, self.name())?;
        let added = plan_new_fields(&existing, documents)?;

        for field in &added {
            debug!(
                collection = %self.name(),
                field = %field.name,
                field_type = %field.field_type,
                "adding field"
            );
            execute(conn, &AddColumnBuilder::new(self.name(), field).build(), &[])?;
        }

        if added.is_empty() {
            self.store_fields(existing);
        } else {
            self.invalidate_fields();
        }

        Ok(added)
    }

    /// Insert one document and return its `_id`.
    ///
    /// A missing `_id` is generated. New keys become columns with the
    /// inferred type in the same transaction as the insert.
    pub async fn insert_one(&self, document: JsonValue) -> Result<String> {
        let mut ids = self.insert_many(vec![document]).await?;
        ids.pop()
            .ok_or_else(|| DbError::InvalidDocument("Insert produced no id".into()))
    }

    /// Insert a batch of documents in one transaction.
    pub async fn insert_many(&self, documents: Vec<JsonValue>) -> Result<Vec<String>> {
        if documents.is_empty() {
            return Err(DbError::EmptyDocument);
        }

        let db = self.ready().await?;
        let documents = documents
            .into_iter()
            .map(|document| with_id(document, || db.generate_id()))
            .collect::<Result<Vec<Document>>>()?;

        let result = db
            .connection
            .transaction(|tx| {
                let added = self.evolve_schema(tx, &documents)?;

                let mut ids = Vec::with_capacity(documents.len());
                for document in &documents {
                    let statement = document
                        .iter()
                        .fold(InsertStatementBuilder::new(self.name()), |builder, (key, value)| {
                            builder.value(key.as_str(), JsonToValueConverter::convert(value))
                        })
                        .build();
                    execute_statement(tx, &statement)?;

                    if let Some(JsonValue::String(id)) = document.get(ID_FIELD) {
                        ids.push(id.clone());
                    }
                }

                Ok((ids, added.len()))
            })
            .await;

        let (ids, added) = self.settle(result)?;
        debug!(collection = %self.name(), inserted = ids.len(), added_fields = added, "insert");
        Ok(ids)
    }

    /// Update the first matching document in `_id` order.
    pub async fn update_one(&self, filter: &JsonValue, update: &JsonValue) -> Result<usize> {
        self.update(filter, update, true).await
    }

    /// Update every matching document.
    pub async fn update_many(&self, filter: &JsonValue, update: &JsonValue) -> Result<usize> {
        self.update(filter, update, false).await
    }

    async fn update(&self, filter: &JsonValue, update: &JsonValue, first_only: bool) -> Result<usize> {
        let clause = translate_filter(filter_document(filter)?)?;
        let update = UpdateDocument::try_from(update)?;
        let written = [update.written_fields()];

        let db = self.ready().await?;
        let result = db
            .connection
            .transaction(|tx| {
                self.evolve_schema(tx, &written)?;

                let mut assignments: Vec<(String, Assignment)> = Vec::new();
                for (field, value) in &update.set {
                    assignments.push((field.clone(), Assignment::Set(JsonToValueConverter::convert(value))));
                }
                for (field, amount) in &update.inc {
                    assignments.push((
                        field.clone(),
                        Assignment::Increment(JsonToValueConverter::convert(amount)),
                    ));
                }
                if !update.unset.is_empty() {
                    let columns = catalog::table_columns(tx, self.name())?;
                    for field in &update.unset {
                        if columns.iter().any(|column| column.name.eq_ignore_ascii_case(field)) {
                            assignments.push((field.clone(), Assignment::Set(Value::Null)));
                        }
                    }
                }

                if assignments.is_empty() {
                    return Ok(0);
                }

                let statement = assignments
                    .into_iter()
                    .fold(UpdateStatementBuilder::new(self.name()), |builder, (field, assignment)| {
                        builder.assign(field, assignment)
                    })
                    .where_clause(clause)
                    .first_only(first_only)
                    .build();
                execute_statement(tx, &statement)
            })
            .await;

        let modified = self.settle(result)?;
        debug!(collection = %self.name(), modified, first_only, "update");
        Ok(modified)
    }

    /// Delete the first matching document in `_id` order.
    pub async fn delete_one(&self, filter: &JsonValue) -> Result<usize> {
        self.delete(filter, true).await
    }

    /// Delete every matching document; an empty filter deletes all.
    pub async fn delete_many(&self, filter: &JsonValue) -> Result<usize> {
        self.delete(filter, false).await
    }

    async fn delete(&self, filter: &JsonValue, first_only: bool) -> Result<usize> {
        let clause = translate_filter(filter_document(filter)?)?;
        let statement = DeleteStatementBuilder::new(self.name())
            .where_clause(clause)
            .first_only(first_only)
            .build();

        let db = self.ready().await?;
        let deleted = db
            .connection
            .with_conn(|conn| execute_statement(conn, &statement))
            .await?;

        debug!(collection = %self.name(), deleted, first_only, "delete");
        Ok(deleted)
    }

    /// Find documents matching `filter`.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// # use docshelf::{Database, FindOptions, SortOrder};
    /// # use serde_json::json;
    /// # async fn example(db: Database) -> docshelf::Result<()> {
    /// let users = db.get_collection("users").await?;
    /// let adults = users
    ///     .find(&json!({"age": {"$gt": 17}}), FindOptions::new().sort("age", SortOrder::Desc))
    ///     .await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn find(&self, filter: &JsonValue, options: FindOptions) -> Result<Vec<Document>> {
        options.validate()?;
        let clause = translate_filter(filter_document(filter)?)?;

        let statement = options
            .sort
            .iter()
            .fold(
                SelectStatementBuilder::new(self.name()).where_clause(clause),
                |builder, (field, order)| builder.order_by(field.as_str(), order.is_ascending()),
            )
            .limit(options.limit)
            .offset(options.skip)
            .build()?;

        let db = self.ready().await?;
        let result = db
            .connection
            .with_conn(|conn| query_statement(conn, &statement))
            .await?;

        Ok(result.into_documents())
    }

    pub async fn find_one(&self, filter: &JsonValue) -> Result<Option<Document>> {
        let mut found = self.find(filter, FindOptions::new().limit(1)).await?;
        Ok(found.pop())
    }

    pub async fn count_documents(&self, filter: &JsonValue) -> Result<u64> {
        let clause = translate_filter(filter_document(filter)?)?;
        let statement = SelectStatementBuilder::new(self.name())
            .count()
            .where_clause(clause)
            .build()?;

        let db = self.ready().await?;
        let result = db
            .connection
            .with_conn(|conn| query_statement(conn, &statement))
            .await?;

        let count = result
            .rows()
            .first()
            .and_then(|row| row.first())
            .and_then(Value::as_i64)
            .unwrap_or(0);
        Ok(count.max(0) as u64)
    }

    /// Run an aggregation pipeline. There is no implicit limit.
    pub async fn aggregate(&self, pipeline: &[JsonValue]) -> Result<Vec<Document>> {
        let statement = compile_pipeline(self.name(), pipeline)?;

        let db = self.ready().await?;
        let result = db
            .connection
            .with_conn(|conn| query_statement(conn, &statement))
            .await?;

        Ok(result.into_documents())
    }

    /// Create an index over `fields` named `idx_<collection>_<f1>_<f2>...`
    /// and return its name. Idempotent.
    pub async fn ensure_index(&self, fields: &[&str], options: IndexOptions) -> Result<String> {
        if fields.is_empty() {
            return Err(DbError::InvalidOption("An index needs at least one field".into()));
        }
        for field in fields {
            validate_field_name(field)?;
        }

        let builder = CreateIndexBuilder::new(
            self.name(),
            fields.iter().map(|f| f.to_string()).collect(),
        )
        .unique(options.unique);
        let index_name = builder.index_name();

        let db = self.ready().await?;
        db.connection
            .with_conn(|conn| execute(conn, &builder.build(), &[]))
            .await?;
        self.invalidate_fields();

        info!(collection = %self.name(), index = %index_name, unique = options.unique, "index ensured");
        Ok(index_name)
    }

    pub async fn show_indexes(&self) -> Result<Vec<IndexInfo>> {
        let db = self.ready().await?;
        db.connection
            .with_conn(|conn| catalog::index_list(conn, self.name()))
            .await
    }

    pub async fn drop_index(&self, name: &str) -> Result<()> {
        validate_index_name(name)?;

        let db = self.ready().await?;
        let dropped = db
            .connection
            .with_conn(|conn| {
                // Only indexes on this collection's table.
                let owned = catalog::index_list(conn, self.name())?
                    .iter()
                    .any(|index| index.name.eq_ignore_ascii_case(name));
                if owned {
                    execute(conn, &format!("DROP INDEX IF EXISTS {}", quote_ident(name)), &[])?;
                }
                Ok(owned)
            })
            .await?;

        if dropped {
            self.invalidate_fields();
            info!(collection = %self.name(), index = %name, "index dropped");
        } else {
            debug!(collection = %self.name(), index = %name, "no such index");
        }
        Ok(())
    }
}

fn filter_document(filter: &JsonValue) -> Result<&Document> {
    filter
        .as_object()
        .ok_or_else(|| DbError::InvalidFilter(format!("Filter must be an object, got {}", filter)))
}

/// Make `_id` the first key, generating one when the document has none.
fn with_id<F>(document: JsonValue, generate: F) -> Result<Document>
where
    F: FnOnce() -> String,
{
    let JsonValue::Object(fields) = document else {
        return Err(DbError::InvalidDocument(format!(
            "Document must be an object, got {}",
            document
        )));
    };

    let mut id = None;
    let mut rest = Vec::with_capacity(fields.len());
    for (key, value) in fields {
        if key == ID_FIELD {
            id = Some(value);
        } else {
            rest.push((key, value));
        }
    }

    let id = match id {
        Some(JsonValue::String(id)) => id,
        Some(other) => {
            return Err(DbError::InvalidDocument(format!(
                "'{}' must be a string, got {}",
                ID_FIELD, other
            )));
        }
        None => generate(),
    };

    let mut document = Document::with_capacity(rest.len() + 1);
    document.insert(ID_FIELD.to_string(), JsonValue::String(id));
    document.extend(rest);
    Ok(document)
}
