pub mod catalog;

pub use catalog::{ColumnInfo, IndexInfo};
