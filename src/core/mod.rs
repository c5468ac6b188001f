pub mod error;
pub mod types;
pub mod value;

pub use error::{DbError, Result};
pub use types::{FieldDescriptor, FieldOptions, FieldType, Row, validate_new_field};
pub use value::Value;
