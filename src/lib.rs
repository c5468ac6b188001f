// ============================================================================
// docshelf Library
// ============================================================================

//! Schema-free document collections stored in SQLite.
//!
//! Documents are JSON objects. Writing one creates the collection's table
//! and any missing columns, with column types inferred from the values.
//! Reads take Mongo-style filter documents (equality, `$gt`, `$lt`) that are
//! translated into parameterized SQL.

pub mod connection;
pub mod core;
pub mod facade;
pub mod interface;
pub mod json;
pub mod result;
pub mod storage;

/// Name of the primary key every collection is created with.
pub const ID_FIELD: &str = "_id";

// Re-export main types for convenience
pub use crate::connection::config::{ConnectionTarget, DatabaseConfig};
pub use crate::core::{DbError, FieldDescriptor, FieldOptions, FieldType, Result, Value};
pub use facade::{Collection, CollectionState, Database};
pub use interface::DatabaseClient;
pub use json::{Document, FindOptions, IndexOptions, SortOrder};
pub use result::QueryResult;
pub use storage::IndexInfo;
