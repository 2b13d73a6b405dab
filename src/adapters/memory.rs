use crate::adapters::catalog_file::{CatalogEntry, CatalogFile};
use crate::domain::model::{Mode, ModelDefinition, PackageVariant, Repository, RepositoryStates};
use crate::domain::ports::{ItemStream, PackageCatalog, RepositoryManager};
use crate::utils::error::{Result, SelectorError};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};

const STREAM_BUFFER: usize = 16;

/// Repository manager that keeps its state in memory and republishes the full
/// map on every change.
#[derive(Debug)]
pub struct InMemoryRepositoryManager {
    tx: watch::Sender<RepositoryStates>,
}

impl InMemoryRepositoryManager {
    pub fn new(states: RepositoryStates) -> Self {
        let (tx, _rx) = watch::channel(states);
        Self { tx }
    }

    pub fn is_enabled(&self, repository: &Repository) -> bool {
        self.tx.borrow().get(repository).copied().unwrap_or(false)
    }

    pub fn snapshot(&self) -> RepositoryStates {
        self.tx.borrow().clone()
    }

    fn set(&self, repository: &Repository, enabled: bool) {
        self.tx.send_modify(|states| {
            states.insert(repository.clone(), enabled);
        });
    }
}

impl RepositoryManager for InMemoryRepositoryManager {
    fn state(&self) -> watch::Receiver<RepositoryStates> {
        self.tx.subscribe()
    }

    fn enable(&self, repository: &Repository) {
        self.set(repository, true);
    }

    fn disable(&self, repository: &Repository) {
        self.set(repository, false);
    }
}

/// Package catalog backed by a fixed list of entries.
///
/// Packages of repositories disabled in the attached manager are not served.
/// Every delivery waits for the configured latency first.
pub struct InMemoryCatalog {
    entries: Vec<CatalogEntry>,
    latency: Duration,
    repositories: Option<Arc<InMemoryRepositoryManager>>,
    online: AtomicBool,
    cache_clears: AtomicUsize,
    failure: Option<String>,
}

impl InMemoryCatalog {
    pub fn new(entries: Vec<CatalogEntry>) -> Self {
        Self {
            entries,
            latency: Duration::ZERO,
            repositories: None,
            online: AtomicBool::new(true),
            cache_clears: AtomicUsize::new(0),
            failure: None,
        }
    }

    pub fn from_catalog_file(file: &CatalogFile) -> Result<Self> {
        Ok(Self::new(file.entries()?).with_latency(file.latency()))
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn with_repositories(mut self, repositories: Arc<InMemoryRepositoryManager>) -> Self {
        self.repositories = Some(repositories);
        self
    }

    pub fn with_mode(self, mode: Mode) -> Self {
        self.online.store(mode.is_online(), Ordering::SeqCst);
        self
    }

    /// Makes every operation report `message` as a service failure.
    pub fn with_failure(mut self, message: impl Into<String>) -> Self {
        self.failure = Some(message.into());
        self
    }

    pub fn cache_clears(&self) -> usize {
        self.cache_clears.load(Ordering::SeqCst)
    }

    fn is_served(&self, variant: &PackageVariant) -> bool {
        self.repositories
            .as_ref()
            .map_or(true, |manager| manager.is_enabled(&variant.package.repository))
    }

    fn failure(&self, operation: &str) -> Option<SelectorError> {
        self.failure
            .as_ref()
            .map(|message| SelectorError::fetch_failure(operation, message.clone()))
    }
}

/// Streams `items` with `latency` before each one, then the optional error.
fn stream_items<T: Send + 'static>(
    items: Vec<T>,
    latency: Duration,
    error: Option<SelectorError>,
) -> ItemStream<T> {
    let (tx, rx) = mpsc::channel(STREAM_BUFFER);
    tokio::spawn(async move {
        for item in items {
            if !latency.is_zero() {
                tokio::time::sleep(latency).await;
            }
            if tx.send(Ok(item)).await.is_err() {
                tracing::debug!("Catalog consumer went away; stopping stream");
                return;
            }
        }
        if let Some(error) = error {
            let _ = tx.send(Err(error)).await;
        }
    });
    rx
}

#[async_trait]
impl PackageCatalog for InMemoryCatalog {
    fn available_packages(&self) -> ItemStream<PackageVariant> {
        let variants: Vec<PackageVariant> = self
            .entries
            .iter()
            .filter(|entry| self.is_served(&entry.variant))
            .map(|entry| entry.variant.clone())
            .collect();
        tracing::debug!("Serving {} package variants", variants.len());
        stream_items(variants, self.latency, self.failure("package refresh"))
    }

    fn model_definitions_from(&self, variant: &PackageVariant) -> ItemStream<ModelDefinition> {
        if let Some(error) = self.failure("model definitions") {
            return stream_items(Vec::new(), self.latency, Some(error));
        }
        if !self.is_served(variant) {
            let error = SelectorError::fetch_failure(
                "model definitions",
                format!("repository {} is disabled", variant.package.repository),
            );
            return stream_items(Vec::new(), self.latency, Some(error));
        }
        match self.entries.iter().find(|entry| &entry.variant == variant) {
            Some(entry) => stream_items(entry.definitions.clone(), self.latency, None),
            None => stream_items(
                Vec::new(),
                self.latency,
                Some(SelectorError::fetch_failure(
                    "model definitions",
                    format!("unknown package variant {}", variant),
                )),
            ),
        }
    }

    async fn clear_cache(&self) -> Result<()> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        if let Some(error) = self.failure("clear cache") {
            return Err(error);
        }
        self.cache_clears.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn mode(&self) -> Mode {
        Mode::from_online(self.online.load(Ordering::SeqCst))
    }

    fn set_mode(&self, mode: Mode) {
        self.online.store(mode.is_online(), Ordering::SeqCst);
    }
}
