use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Engine error: {0}")]
    Engine(#[from] rusqlite::Error),

    #[error("Schema conflict: {0}")]
    SchemaConflict(String),

    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("Invalid filter: {0}")]
    InvalidFilter(String),

    #[error("Unsupported operator: {0}")]
    UnsupportedOperator(String),

    #[error("Invalid document: {0}")]
    InvalidDocument(String),

    #[error("Empty document batch")]
    EmptyDocument,

    #[error("Invalid option: {0}")]
    InvalidOption(String),

    #[error("Connection is closed")]
    ConnectionClosed,

    #[error("Lock error: {0}")]
    LockError(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, DbError>;

impl<T> From<std::sync::PoisonError<T>> for DbError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::LockError(err.to_string())
    }
}
