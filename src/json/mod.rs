//! JSON document layer
//!
//! Everything between a JSON document and a parameterized SQL statement:
//!
//! - `validator.rs` - identifier grammar and quoting
//! - `schema_inference.rs` - field types from values, schema deltas
//! - `converter.rs` - JSON ⇄ engine values, statement builders
//! - `filter.rs` - filter documents to WHERE clauses
//! - `options.rs` - find and index options
//! - `pipeline.rs` - aggregation pipelines
//! - `update.rs` - update documents

pub mod converter;
pub mod filter;
pub mod options;
pub mod pipeline;
pub mod schema_inference;
pub mod update;
pub mod validator;

/// A JSON object; key order is preserved.
pub type Document = serde_json::Map<String, serde_json::Value>;

pub use converter::{JsonToValueConverter, SqlStatement, row_to_document, value_to_json};
pub use filter::{FilterOperator, WhereClause, translate_filter};
pub use options::{DEFAULT_LIMIT, FindOptions, IndexOptions, SortOrder};
pub use pipeline::compile_pipeline;
pub use schema_inference::{infer_field_type, plan_new_fields};
pub use update::UpdateDocument;
pub use validator::{quote_ident, validate_collection_name, validate_field_name};
