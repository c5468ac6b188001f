//! Read and index options

use super::validator::validate_field_name;
use crate::ID_FIELD;
use crate::core::{DbError, Result};
use serde::Serialize;
use serde_json::Value as JsonValue;

/// Rows returned by `find` when the caller sets no limit. Unbounded scans are
/// not offered; callers paginate with `skip`.
pub const DEFAULT_LIMIT: u64 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    /// `1` is ascending, `-1` descending.
    pub fn from_direction(direction: i64) -> Result<Self> {
        match direction {
            1 => Ok(Self::Asc),
            -1 => Ok(Self::Desc),
            other => Err(DbError::InvalidOption(format!(
                "Sort direction must be 1 or -1, got {}",
                other
            ))),
        }
    }

    pub fn is_ascending(self) -> bool {
        matches!(self, Self::Asc)
    }
}

/// Parse a `{field: 1|-1, ...}` sort document, keeping key order.
pub fn parse_sort(spec: &JsonValue) -> Result<Vec<(String, SortOrder)>> {
    let object = spec
        .as_object()
        .ok_or_else(|| DbError::InvalidOption(format!("Sort must be an object, got {}", spec)))?;

    object
        .iter()
        .map(|(field, direction)| {
            validate_field_name(field)?;
            let direction = direction.as_i64().ok_or_else(|| {
                DbError::InvalidOption(format!("Sort direction for '{}' must be 1 or -1", field))
            })?;
            Ok((field.clone(), SortOrder::from_direction(direction)?))
        })
        .collect()
}

/// Options for `find`: `limit` 100, `skip` 0, sorted by `_id` ascending
/// unless set.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FindOptions {
    pub limit: u64,
    pub skip: u64,
    pub sort: Vec<(String, SortOrder)>,
    #[serde(skip)]
    custom_sort: bool,
}

impl Default for FindOptions {
    fn default() -> Self {
        Self {
            limit: DEFAULT_LIMIT,
            skip: 0,
            sort: vec![(ID_FIELD.to_string(), SortOrder::Asc)],
            custom_sort: false,
        }
    }
}

impl FindOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = limit;
        self
    }

    pub fn skip(mut self, skip: u64) -> Self {
        self.skip = skip;
        self
    }

    /// Add a sort key. The first call replaces the default `_id` ordering.
    pub fn sort(mut self, field: impl Into<String>, order: SortOrder) -> Self {
        if !self.custom_sort {
            self.sort.clear();
            self.custom_sort = true;
        }
        self.sort.push((field.into(), order));
        self
    }

    /// Build options from a `{limit, skip, sort}` JSON object. Missing keys
    /// keep their defaults.
    pub fn from_json(options: &JsonValue) -> Result<Self> {
        let object = options
            .as_object()
            .ok_or_else(|| DbError::InvalidOption(format!("Options must be an object, got {}", options)))?;

        let mut parsed = Self::default();
        for (key, value) in object {
            match key.as_str() {
                "limit" => parsed.limit = non_negative(key, value)?,
                "skip" => parsed.skip = non_negative(key, value)?,
                "sort" => {
                    parsed.sort = parse_sort(value)?;
                    parsed.custom_sort = true;
                }
                other => {
                    return Err(DbError::InvalidOption(format!("Unknown find option '{}'", other)));
                }
            }
        }

        Ok(parsed)
    }

    pub(crate) fn validate(&self) -> Result<()> {
        for (field, _) in &self.sort {
            validate_field_name(field)?;
        }
        Ok(())
    }
}

fn non_negative(key: &str, value: &JsonValue) -> Result<u64> {
    value
        .as_u64()
        .ok_or_else(|| DbError::InvalidOption(format!("'{}' must be a non-negative integer, got {}", key, value)))
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexOptions {
    pub unique: bool,
}

impl IndexOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn unique(mut self, unique: bool) -> Self {
        self.unique = unique;
        self
    }
}
