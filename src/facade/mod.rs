mod collection;
mod database;

pub use collection::{Collection, CollectionState};
pub use database::Database;
