use crate::domain::model::{Mode, ModelDefinition, PackageVariant, Repository, RepositoryStates};
use crate::utils::error::Result;
use async_trait::async_trait;
use tokio::sync::{mpsc, watch};

/// Incremental results of a remote operation. The producer closes the channel
/// on completion and sends an `Err` to report a failure.
pub type ItemStream<T> = mpsc::Receiver<Result<T>>;

/// Source of model packages and their definitions.
#[async_trait]
pub trait PackageCatalog: Send + Sync {
    fn available_packages(&self) -> ItemStream<PackageVariant>;
    fn model_definitions_from(&self, variant: &PackageVariant) -> ItemStream<ModelDefinition>;
    async fn clear_cache(&self) -> Result<()>;
    fn mode(&self) -> Mode;
    fn set_mode(&self, mode: Mode);
}

/// Owner of the repository enable/disable configuration.
pub trait RepositoryManager: Send + Sync {
    /// Full snapshots; every change replaces the whole map.
    fn state(&self) -> watch::Receiver<RepositoryStates>;
    fn enable(&self, repository: &Repository);
    fn disable(&self, repository: &Repository);
}

/// Drains an item stream into a list, stopping at the first error.
pub async fn collect_items<T>(mut stream: ItemStream<T>) -> Result<Vec<T>> {
    let mut items = Vec::new();
    while let Some(item) = stream.recv().await {
        items.push(item?);
    }
    Ok(items)
}
