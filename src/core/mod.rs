pub mod property;
pub mod refresh;
pub mod repositories;
pub mod selection;
pub mod variant_filter;

pub use crate::domain::model::{
    Mode, ModelDefinition, ModelPackage, ModelSelection, OpticsDefinition, PackageVariant,
    RangeDefinition, Repository, RepositoryStates, SelectionType, SequenceDefinition, Variant,
    VariantKind,
};
pub use crate::domain::ports::{ItemStream, PackageCatalog, RepositoryManager};
pub use crate::utils::error::Result;
