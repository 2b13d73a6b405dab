pub mod adapters;
pub mod app;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::CliConfig;

pub use adapters::{CatalogFile, InMemoryCatalog, InMemoryRepositoryManager};
pub use app::{Notice, SelectionSession, SessionHandle, SessionSnapshot, SpawnedSession};
pub use config::SelectorConfig;
pub use core::selection::SelectionCascadeEngine;
pub use core::variant_filter::{VariantFilter, VariantFilterIndex, VariantTree};
pub use utils::error::{Result, SelectorError};
