// Adapters layer: in-memory implementations of the external collaborators.

pub mod catalog_file;
pub mod memory;

pub use catalog_file::{CatalogEntry, CatalogFile};
pub use memory::{InMemoryCatalog, InMemoryRepositoryManager};
