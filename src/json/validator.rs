//! Identifier validation
//!
//! Collection and field names end up inside SQL text (always double-quoted),
//! so every name coming from a caller is checked against a plain identifier
//! grammar first. Values never go through here; they are bound.

use crate::core::{DbError, Result};
use lazy_static::lazy_static;
use regex::Regex;

/// Longest accepted collection or field name.
pub const MAX_IDENTIFIER_LEN: usize = 64;

lazy_static! {
    static ref IDENTIFIER: Regex = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap();
}

fn validate_identifier(kind: &str, name: &str) -> Result<()> {
    if name.len() > MAX_IDENTIFIER_LEN {
        return Err(DbError::InvalidIdentifier(format!(
            "{} name '{}' is too long (max {} characters)",
            kind, name, MAX_IDENTIFIER_LEN
        )));
    }

    validate_grammar(kind, name)
}

fn validate_grammar(kind: &str, name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(DbError::InvalidIdentifier(format!("{} name cannot be empty", kind)));
    }

    if !IDENTIFIER.is_match(name) {
        return Err(DbError::InvalidIdentifier(format!(
            "{} name '{}' must start with a letter or underscore and contain only letters, digits and underscores",
            kind, name
        )));
    }

    Ok(())
}

/// Validates collection names. Names in the engine's reserved `sqlite_`
/// namespace are refused.
pub fn validate_collection_name(name: &str) -> Result<()> {
    validate_identifier("Collection", name)?;

    if name.to_ascii_lowercase().starts_with("sqlite_") {
        return Err(DbError::InvalidIdentifier(format!(
            "Collection name '{}' uses the reserved 'sqlite_' prefix",
            name
        )));
    }

    Ok(())
}

pub fn validate_field_name(name: &str) -> Result<()> {
    validate_identifier("Field", name)
}

/// Index names are derived from collection and field names, so only the
/// grammar applies, not the length limit.
pub fn validate_index_name(name: &str) -> Result<()> {
    validate_grammar("Index", name)
}

/// Double-quote an identifier for SQL text.
pub fn quote_ident(ident: &str) -> String {
    let escaped = ident.replace('"', "\"\"");
    format!("\"{}\"", escaped)
}
