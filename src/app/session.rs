use crate::config::SelectorConfig;
use crate::core::property::Property;
use crate::core::refresh::{Delivered, Delivery, Operation, RefreshCoordinator, RunReport, Sink};
use crate::core::repositories::{RepositoryEnablementRegistry, RepositoryLine};
use crate::core::selection::{SelectionCascadeEngine, SelectionSnapshot};
use crate::core::variant_filter::{VariantFilter, VariantFilterIndex, VariantTree};
use crate::domain::model::{
    Mode, ModelDefinition, ModelSelection, OpticsDefinition, PackageVariant, RangeDefinition,
    Repository, RepositoryStates, SelectionType, SequenceDefinition,
};
use crate::domain::ports::{PackageCatalog, RepositoryManager};
use crate::utils::error::{Result, SelectorError};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender, WeakUnboundedSender};
use tokio::sync::{broadcast, oneshot, watch};
use tokio::task::JoinHandle;

const NOTICE_CAPACITY: usize = 32;

/// A failure the user should hear about.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notice {
    pub operation: String,
    pub message: String,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub selection: SelectionSnapshot,
    pub filter: VariantFilter,
    pub variant_count: usize,
    pub tree: VariantTree,
    pub repositories: Vec<RepositoryLine>,
    pub refreshing: bool,
    pub clearing_cache: bool,
    pub last_refresh: Option<RunReport>,
    pub last_cache_clear: Option<RunReport>,
}

#[derive(Serialize)]
struct SelectionReport<'a> {
    repositories: &'a [RepositoryLine],
    packages: Vec<&'a PackageVariant>,
    selection: Option<&'a ModelSelection>,
}

impl SessionSnapshot {
    /// Repositories, visible package variants and the finished selection as
    /// pretty-printed JSON.
    pub fn to_json_report(&self, selection: Option<&ModelSelection>) -> Result<String> {
        let report = SelectionReport {
            repositories: &self.repositories,
            packages: self.tree.leaves().collect(),
            selection,
        };
        serde_json::to_string_pretty(&report).map_err(SelectorError::SerializationError)
    }
}

/// A freshly started session.
///
/// `notices` was subscribed before the session task started, so it also sees
/// failures of the initial refresh.
pub struct SpawnedSession {
    pub handle: SessionHandle,
    pub notices: broadcast::Receiver<Notice>,
    pub task: JoinHandle<()>,
}

/// Receivers for the values a view binds to.
#[derive(Debug)]
pub struct SessionObservers {
    pub refreshing: watch::Receiver<bool>,
    pub clearing_cache: watch::Receiver<bool>,
    pub definitions_loading: watch::Receiver<bool>,
    pub variant_tree: watch::Receiver<VariantTree>,
    pub repositories: watch::Receiver<Vec<RepositoryLine>>,
    pub selected_package: watch::Receiver<Option<PackageVariant>>,
    pub selected_definition: watch::Receiver<Option<ModelDefinition>>,
    pub selected_optics: watch::Receiver<Option<OpticsDefinition>>,
    pub selected_sequence: watch::Receiver<Option<SequenceDefinition>>,
    pub selected_range: watch::Receiver<Option<RangeDefinition>>,
    pub mode: watch::Receiver<Mode>,
}

enum Command {
    Refresh,
    ClearCache,
    SelectPackage(Option<PackageVariant>),
    SelectDefinition(Option<ModelDefinition>),
    SelectSequence(Option<SequenceDefinition>),
    SelectOptics(Option<OpticsDefinition>),
    SelectRange(Option<RangeDefinition>),
    SetOnlineMode(bool),
    SetVariantFilter(VariantFilter),
    ToggleRepository {
        repository: Repository,
        enabled: bool,
    },
    FindVariant {
        package: String,
        variant: String,
        reply: oneshot::Sender<Option<PackageVariant>>,
    },
    Snapshot(oneshot::Sender<SessionSnapshot>),
    Observe(oneshot::Sender<SessionObservers>),
    Finish {
        selection_type: SelectionType,
        reply: oneshot::Sender<Option<ModelSelection>>,
    },
    Shutdown,

    // Results marshalled back from background tasks.
    Packages(Delivery<PackageVariant>),
    Definitions(Delivery<Vec<ModelDefinition>>),
    CacheCleared(Delivery<()>),
    Repositories(RepositoryStates),
}

fn marshal<T: Send + 'static>(
    inbox: WeakUnboundedSender<Command>,
    wrap: fn(Delivery<T>) -> Command,
) -> Sink<T> {
    Arc::new(move |delivery: Delivery<T>| match inbox.upgrade() {
        Some(tx) => {
            let _ = tx.send(wrap(delivery));
        }
        None => tracing::debug!("Session closed; dropping delivery"),
    })
}

fn forward_repository_states(
    mut states: watch::Receiver<RepositoryStates>,
    inbox: WeakUnboundedSender<Command>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let snapshot = states.borrow_and_update().clone();
            let Some(tx) = inbox.upgrade() else {
                break;
            };
            if tx.send(Command::Repositories(snapshot)).is_err() {
                break;
            }
            drop(tx);
            if states.changed().await.is_err() {
                tracing::debug!("Repository manager stopped publishing");
                break;
            }
        }
    })
}

/// Owner of all selection state. Runs as one task; every mutation happens
/// there, in inbox order.
pub struct SelectionSession {
    catalog: Arc<dyn PackageCatalog>,
    engine: SelectionCascadeEngine,
    variants: VariantFilterIndex,
    tree: Property<VariantTree>,
    registry: RepositoryEnablementRegistry,
    packages: RefreshCoordinator,
    cache: RefreshCoordinator,
    inbox: WeakUnboundedSender<Command>,
    notices: broadcast::Sender<Notice>,
    forwarder: JoinHandle<()>,
}

impl SelectionSession {
    /// Starts a session on the current tokio runtime. The session refreshes
    /// the package list right away.
    pub fn spawn(
        catalog: Arc<dyn PackageCatalog>,
        repositories: Arc<dyn RepositoryManager>,
        config: &SelectorConfig,
    ) -> SpawnedSession {
        let (tx, rx) = mpsc::unbounded_channel();
        let (notices, first_notices) = broadcast::channel(NOTICE_CAPACITY);
        let inbox = tx.downgrade();

        let mut engine = SelectionCascadeEngine::new(
            Arc::clone(&catalog),
            config.definitions_timeout(),
            marshal(inbox.clone(), Command::Definitions),
        );
        if let Some(mode) = config.selection.mode {
            engine.set_online_mode(mode.is_online());
        }

        let session = SelectionSession {
            catalog,
            engine,
            variants: VariantFilterIndex::new(config.filter),
            tree: Property::default(),
            registry: RepositoryEnablementRegistry::new(Arc::clone(&repositories)),
            packages: RefreshCoordinator::new("package refresh", config.packages_timeout()),
            cache: RefreshCoordinator::new("clear cache", config.clear_cache_timeout()),
            inbox: inbox.clone(),
            notices: notices.clone(),
            forwarder: forward_repository_states(repositories.state(), inbox),
        };

        let task = tokio::spawn(session.run(rx));
        SpawnedSession {
            handle: SessionHandle { tx, notices },
            notices: first_notices,
            task,
        }
    }

    async fn run(mut self, mut inbox: UnboundedReceiver<Command>) {
        tracing::info!("🚀 Selection session started");
        self.refresh();
        while let Some(command) = inbox.recv().await {
            if !self.handle(command) {
                break;
            }
        }
        self.forwarder.abort();
        tracing::info!("Selection session stopped");
    }

    /// Returns false when the session should stop.
    fn handle(&mut self, command: Command) -> bool {
        match command {
            Command::Refresh => self.refresh(),
            Command::ClearCache => self.clear_cache(),
            Command::SelectPackage(variant) => {
                self.engine.select_package(variant);
            }
            Command::SelectDefinition(definition) => self.engine.select_definition(definition),
            Command::SelectSequence(sequence) => self.engine.select_sequence(sequence),
            Command::SelectOptics(optics) => self.engine.select_optics(optics),
            Command::SelectRange(range) => self.engine.select_range(range),
            Command::SetOnlineMode(online) => self.engine.set_online_mode(online),
            Command::SetVariantFilter(filter) => {
                if self.variants.set_filter(filter) {
                    self.update_tree();
                }
            }
            Command::ToggleRepository {
                repository,
                enabled,
            } => self.registry.toggle(&repository, enabled),
            Command::FindVariant {
                package,
                variant,
                reply,
            } => {
                let _ = reply.send(self.variants.find(&package, &variant).cloned());
            }
            Command::Snapshot(reply) => {
                let _ = reply.send(self.snapshot());
            }
            Command::Observe(reply) => {
                let _ = reply.send(self.observers());
            }
            Command::Finish {
                selection_type,
                reply,
            } => {
                let _ = reply.send(self.engine.selection(selection_type));
            }
            Command::Shutdown => return false,
            Command::Packages(delivery) => self.accept_package(delivery),
            Command::Definitions(delivery) => {
                if let Some(err) = self.engine.accept_definitions(delivery) {
                    self.notify("model definitions", &err);
                }
            }
            Command::CacheCleared(delivery) => match self.cache.deliver(delivery) {
                Delivered::Completed => tracing::info!("🧹 Package cache cleared"),
                Delivered::Failed(err) => self.notify(self.cache.operation(), &err),
                Delivered::Item(()) | Delivered::Stale => {}
            },
            Command::Repositories(states) => self.registry.apply_snapshot(&states),
        }
        true
    }

    fn refresh(&mut self) {
        tracing::info!("🔄 Refreshing available packages");
        self.variants.clear();
        self.update_tree();
        let packages = Operation::stream(self.catalog.available_packages());
        self.packages
            .run(packages, marshal(self.inbox.clone(), Command::Packages));
    }

    fn clear_cache(&mut self) {
        let catalog = Arc::clone(&self.catalog);
        let clear = Operation::single(async move { catalog.clear_cache().await });
        self.cache
            .run(clear, marshal(self.inbox.clone(), Command::CacheCleared));
    }

    fn accept_package(&mut self, delivery: Delivery<PackageVariant>) {
        match self.packages.deliver(delivery) {
            Delivered::Item(variant) => {
                if self.variants.add_variant(variant) {
                    self.update_tree();
                }
            }
            Delivered::Completed => tracing::info!(
                "✅ {} package variants in {} packages",
                self.variants.variant_count(),
                self.variants.package_count()
            ),
            Delivered::Failed(err) => self.notify(self.packages.operation(), &err),
            Delivered::Stale => {}
        }
    }

    fn update_tree(&mut self) {
        self.tree.set(self.variants.render_filtered());
    }

    fn notify(&self, operation: &str, err: &SelectorError) {
        tracing::warn!("⚠️ {}", err.user_friendly_message());
        let _ = self.notices.send(Notice {
            operation: operation.to_string(),
            message: err.to_string(),
            at: Utc::now(),
        });
    }

    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            selection: self.engine.snapshot(),
            filter: self.variants.filter().get(),
            variant_count: self.variants.variant_count(),
            tree: self.tree.get(),
            repositories: self.registry.lines().get(),
            refreshing: self.packages.is_loading(),
            clearing_cache: self.cache.is_loading(),
            last_refresh: self.packages.last_run().cloned(),
            last_cache_clear: self.cache.last_run().cloned(),
        }
    }

    fn observers(&self) -> SessionObservers {
        let state = self.engine.state();
        SessionObservers {
            refreshing: self.packages.loading().subscribe(),
            clearing_cache: self.cache.loading().subscribe(),
            definitions_loading: self.engine.loading().subscribe(),
            variant_tree: self.tree.subscribe(),
            repositories: self.registry.lines().subscribe(),
            selected_package: state.selected_package.subscribe(),
            selected_definition: state.selected_definition.subscribe(),
            selected_optics: state.selected_optics.subscribe(),
            selected_sequence: state.selected_sequence.subscribe(),
            selected_range: state.selected_range.subscribe(),
            mode: state.mode.subscribe(),
        }
    }
}

/// Cloneable front door of a running [`SelectionSession`].
#[derive(Clone)]
pub struct SessionHandle {
    tx: UnboundedSender<Command>,
    notices: broadcast::Sender<Notice>,
}

impl SessionHandle {
    fn send(&self, command: Command) -> Result<()> {
        self.tx.send(command).map_err(|_| SelectorError::SessionClosed)
    }

    async fn request<R>(&self, command: impl FnOnce(oneshot::Sender<R>) -> Command) -> Result<R> {
        let (reply, rx) = oneshot::channel();
        self.send(command(reply))?;
        rx.await.map_err(|_| SelectorError::SessionClosed)
    }

    pub fn refresh(&self) -> Result<()> {
        self.send(Command::Refresh)
    }

    pub fn clear_cache(&self) -> Result<()> {
        self.send(Command::ClearCache)
    }

    pub fn select_package(&self, variant: Option<PackageVariant>) -> Result<()> {
        self.send(Command::SelectPackage(variant))
    }

    pub fn select_definition(&self, definition: Option<ModelDefinition>) -> Result<()> {
        self.send(Command::SelectDefinition(definition))
    }

    pub fn select_sequence(&self, sequence: Option<SequenceDefinition>) -> Result<()> {
        self.send(Command::SelectSequence(sequence))
    }

    pub fn select_optics(&self, optics: Option<OpticsDefinition>) -> Result<()> {
        self.send(Command::SelectOptics(optics))
    }

    pub fn select_range(&self, range: Option<RangeDefinition>) -> Result<()> {
        self.send(Command::SelectRange(range))
    }

    pub fn set_online_mode(&self, online: bool) -> Result<()> {
        self.send(Command::SetOnlineMode(online))
    }

    pub fn set_variant_filter(&self, filter: VariantFilter) -> Result<()> {
        self.send(Command::SetVariantFilter(filter))
    }

    pub fn toggle_repository(&self, repository: Repository, enabled: bool) -> Result<()> {
        self.send(Command::ToggleRepository {
            repository,
            enabled,
        })
    }

    /// Looks a variant up among everything the last refresh found, ignoring
    /// the variant filter.
    pub async fn find_variant(&self, package: &str, variant: &str) -> Result<Option<PackageVariant>> {
        let package = package.to_string();
        let variant = variant.to_string();
        self.request(|reply| Command::FindVariant {
            package,
            variant,
            reply,
        })
        .await
    }

    pub async fn snapshot(&self) -> Result<SessionSnapshot> {
        self.request(Command::Snapshot).await
    }

    pub async fn variant_tree(&self) -> Result<VariantTree> {
        Ok(self.snapshot().await?.tree)
    }

    pub async fn observe(&self) -> Result<SessionObservers> {
        self.request(Command::Observe).await
    }

    pub async fn finish(&self, selection_type: SelectionType) -> Result<Option<ModelSelection>> {
        self.request(|reply| Command::Finish {
            selection_type,
            reply,
        })
        .await
    }

    /// Waits until no refresh, cache clear or definitions fetch started by
    /// earlier commands is still running.
    pub async fn wait_until_idle(&self) -> Result<()> {
        let mut observers = self.observe().await?;
        for loading in [
            &mut observers.refreshing,
            &mut observers.clearing_cache,
            &mut observers.definitions_loading,
        ] {
            loading
                .wait_for(|busy| !*busy)
                .await
                .map_err(|_| SelectorError::SessionClosed)?;
        }
        Ok(())
    }

    pub fn notices(&self) -> broadcast::Receiver<Notice> {
        self.notices.subscribe()
    }

    pub fn shutdown(&self) -> Result<()> {
        self.send(Command::Shutdown)
    }
}
