pub mod models;
pub mod queries;
pub mod sqlite;

pub use models::{DuplicateGroup, FileRecord, SizeCategory, StorageRoot};
pub use queries::{CatalogSnapshot, FileFilter, FileOrder};
pub use sqlite::Catalog;
