use crate::core::property::Property;
use crate::core::refresh::{Delivered, Delivery, Operation, RefreshCoordinator, Sink};
use crate::domain::model::{
    Mode, ModelDefinition, ModelSelection, OpticsDefinition, PackageVariant, RangeDefinition,
    SelectionType, SequenceDefinition, StartupConfiguration,
};
use crate::domain::ports::{collect_items, PackageCatalog};
use crate::utils::error::SelectorError;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// Everything the user has picked so far, plus the choices offered at each level.
#[derive(Debug)]
pub struct SelectionState {
    pub selected_package: Property<Option<PackageVariant>>,
    pub available_definitions: Property<Vec<ModelDefinition>>,
    pub selected_definition: Property<Option<ModelDefinition>>,
    pub available_optics: Property<Vec<OpticsDefinition>>,
    pub selected_optics: Property<Option<OpticsDefinition>>,
    pub available_sequences: Property<Vec<SequenceDefinition>>,
    pub selected_sequence: Property<Option<SequenceDefinition>>,
    pub available_ranges: Property<Vec<RangeDefinition>>,
    pub selected_range: Property<Option<RangeDefinition>>,
    pub mode: Property<Mode>,
}

impl SelectionState {
    fn new(mode: Mode) -> Self {
        Self {
            selected_package: Property::default(),
            available_definitions: Property::default(),
            selected_definition: Property::default(),
            available_optics: Property::default(),
            selected_optics: Property::default(),
            available_sequences: Property::default(),
            selected_sequence: Property::default(),
            available_ranges: Property::default(),
            selected_range: Property::default(),
            mode: Property::new(mode),
        }
    }
}

/// Point-in-time copy of [`SelectionState`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SelectionSnapshot {
    pub selected_package: Option<PackageVariant>,
    pub available_definitions: Vec<ModelDefinition>,
    pub selected_definition: Option<ModelDefinition>,
    pub available_optics: Vec<OpticsDefinition>,
    pub selected_optics: Option<OpticsDefinition>,
    pub available_sequences: Vec<SequenceDefinition>,
    pub selected_sequence: Option<SequenceDefinition>,
    pub available_ranges: Vec<RangeDefinition>,
    pub selected_range: Option<RangeDefinition>,
    pub mode: Mode,
    pub loading: bool,
}

/// Applies a top-level choice down the package -> definition -> sequence ->
/// range hierarchy, picking defaults on the way.
///
/// Selecting `None` at the definition or sequence level does not reset the
/// levels below it; they keep whatever the last cascade put there.
pub struct SelectionCascadeEngine {
    catalog: Arc<dyn PackageCatalog>,
    definitions: RefreshCoordinator,
    sink: Sink<Vec<ModelDefinition>>,
    state: SelectionState,
}

impl SelectionCascadeEngine {
    /// `sink` must hand definition deliveries back to whoever owns the engine,
    /// who then passes them to [`SelectionCascadeEngine::accept_definitions`].
    pub fn new(
        catalog: Arc<dyn PackageCatalog>,
        timeout: Duration,
        sink: Sink<Vec<ModelDefinition>>,
    ) -> Self {
        let mode = catalog.mode();
        Self {
            catalog,
            definitions: RefreshCoordinator::new("model definitions", timeout),
            sink,
            state: SelectionState::new(mode),
        }
    }

    pub fn state(&self) -> &SelectionState {
        &self.state
    }

    pub fn loading(&self) -> &Property<bool> {
        self.definitions.loading()
    }

    pub fn is_loading(&self) -> bool {
        self.definitions.is_loading()
    }

    /// Starts loading the definitions of `variant`. `None` leaves everything
    /// as it is.
    pub fn select_package(&mut self, variant: Option<PackageVariant>) -> Option<u64> {
        let Some(variant) = variant else {
            tracing::debug!("Package selection cleared; keeping current definitions");
            return None;
        };

        tracing::info!("📦 Loading model definitions of {}", variant);
        self.state.selected_package.set(Some(variant.clone()));
        let catalog = Arc::clone(&self.catalog);
        let fetch = Operation::single(async move {
            collect_items(catalog.model_definitions_from(&variant)).await
        });
        Some(self.definitions.run(fetch, self.sink.clone()))
    }

    /// Applies a marshalled definitions delivery. Returns the failure, if the
    /// fetch failed; the previous definitions stay in place in that case.
    pub fn accept_definitions(
        &mut self,
        delivery: Delivery<Vec<ModelDefinition>>,
    ) -> Option<SelectorError> {
        match self.definitions.deliver(delivery) {
            Delivered::Item(definitions) => {
                tracing::debug!("Received {} model definitions", definitions.len());
                let first = definitions.first().cloned();
                self.state.available_definitions.set(definitions);
                if first.is_some() {
                    self.select_definition(first);
                }
                None
            }
            Delivered::Failed(err) => Some(err),
            Delivered::Completed | Delivered::Stale => None,
        }
    }

    pub fn select_definition(&mut self, definition: Option<ModelDefinition>) {
        self.state.selected_definition.set(definition.clone());
        let Some(definition) = definition else {
            return;
        };
        tracing::debug!("Selected model definition {}", definition.name);

        self.state.available_optics.set(definition.optics.clone());
        self.select_optics(definition.default_optics().cloned());

        self.state.available_sequences.set(definition.sequences.clone());
        self.select_sequence(definition.default_sequence().cloned());
    }

    pub fn select_sequence(&mut self, sequence: Option<SequenceDefinition>) {
        self.state.selected_sequence.set(sequence.clone());
        if let Some(sequence) = sequence {
            self.state.available_ranges.set(sequence.ranges.clone());
            self.state.selected_range.set(sequence.default_range().cloned());
        }
    }

    pub fn select_optics(&mut self, optics: Option<OpticsDefinition>) {
        self.state.selected_optics.set(optics);
    }

    pub fn select_range(&mut self, range: Option<RangeDefinition>) {
        self.state.selected_range.set(range);
    }

    pub fn set_online_mode(&mut self, online: bool) {
        let mode = Mode::from_online(online);
        if self.state.mode.set(mode) {
            tracing::info!("Switching package service to {:?} mode", mode);
            self.catalog.set_mode(mode);
        }
    }

    /// The finished selection, or `None` while it is incomplete.
    pub fn selection(&self, selection_type: SelectionType) -> Option<ModelSelection> {
        let Some(definition) = self.state.selected_definition.get() else {
            tracing::debug!("Selection incomplete: no model definition");
            return None;
        };

        if selection_type == SelectionType::ModelDefinitionOnly {
            return Some(ModelSelection {
                definition,
                startup: None,
            });
        }

        match (self.state.selected_optics.get(), self.state.selected_range.get()) {
            (Some(optics), Some(range)) => Some(ModelSelection {
                definition,
                startup: Some(StartupConfiguration { optics, range }),
            }),
            (optics, range) => {
                tracing::debug!(
                    "Selection incomplete: optics selected = {}, range selected = {}",
                    optics.is_some(),
                    range.is_some()
                );
                None
            }
        }
    }

    pub fn snapshot(&self) -> SelectionSnapshot {
        let state = &self.state;
        SelectionSnapshot {
            selected_package: state.selected_package.get(),
            available_definitions: state.available_definitions.get(),
            selected_definition: state.selected_definition.get(),
            available_optics: state.available_optics.get(),
            selected_optics: state.selected_optics.get(),
            available_sequences: state.available_sequences.get(),
            selected_sequence: state.selected_sequence.get(),
            available_ranges: state.available_ranges.get(),
            selected_range: state.selected_range.get(),
            mode: state.mode.get(),
            loading: self.is_loading(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::{ModelPackage, Repository, Variant};
    use crate::domain::ports::ItemStream;
    use crate::utils::error::Result;
    use std::sync::Mutex;
    use tokio::sync::mpsc;

    enum Behaviour {
        Deliver,
        Fail,
        Hang,
        /// One definition named after the variant; the named variant answers
        /// only after five seconds.
        SlowFor(&'static str),
    }

    struct StubCatalog {
        definitions: Vec<ModelDefinition>,
        behaviour: Behaviour,
        mode: Mutex<Mode>,
        mode_changes: Mutex<Vec<Mode>>,
    }

    impl StubCatalog {
        fn new(definitions: Vec<ModelDefinition>, behaviour: Behaviour) -> Self {
            Self {
                definitions,
                behaviour,
                mode: Mutex::new(Mode::Offline),
                mode_changes: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait::async_trait]
    impl PackageCatalog for StubCatalog {
        fn available_packages(&self) -> ItemStream<PackageVariant> {
            mpsc::channel(1).1
        }

        fn model_definitions_from(&self, variant: &PackageVariant) -> ItemStream<ModelDefinition> {
            let (tx, rx) = mpsc::channel(16);
            match self.behaviour {
                Behaviour::Deliver => {
                    for definition in &self.definitions {
                        tx.try_send(Ok(definition.clone())).unwrap();
                    }
                }
                Behaviour::Fail => {
                    tx.try_send(Err(SelectorError::fetch_failure("model definitions", "unreachable")))
                        .unwrap();
                }
                Behaviour::Hang => {
                    tokio::spawn(async move {
                        let _tx = tx;
                        std::future::pending::<()>().await;
                    });
                }
                Behaviour::SlowFor(slow) => {
                    let name = variant.variant.name.clone();
                    let delay = if name == slow {
                        Duration::from_secs(5)
                    } else {
                        Duration::ZERO
                    };
                    tokio::spawn(async move {
                        tokio::time::sleep(delay).await;
                        let _ = tx.send(Ok(definition(&name))).await;
                    });
                }
            }
            rx
        }

        async fn clear_cache(&self) -> Result<()> {
            Ok(())
        }

        fn mode(&self) -> Mode {
            *self.mode.lock().unwrap()
        }

        fn set_mode(&self, mode: Mode) {
            *self.mode.lock().unwrap() = mode;
            self.mode_changes.lock().unwrap().push(mode);
        }
    }

    type Deliveries = mpsc::UnboundedReceiver<Delivery<Vec<ModelDefinition>>>;

    fn engine(catalog: Arc<StubCatalog>) -> (SelectionCascadeEngine, Deliveries) {
        let (tx, rx) = mpsc::unbounded_channel();
        let sink: Sink<Vec<ModelDefinition>> = Arc::new(move |delivery| {
            let _ = tx.send(delivery);
        });
        (
            SelectionCascadeEngine::new(catalog, Duration::from_secs(30), sink),
            rx,
        )
    }

    async fn settle(engine: &mut SelectionCascadeEngine, rx: &mut Deliveries) -> Option<SelectorError> {
        let mut error = None;
        while engine.is_loading() {
            let Some(delivery) = rx.recv().await else {
                break;
            };
            if let Some(err) = engine.accept_definitions(delivery) {
                error = Some(err);
            }
        }
        error
    }

    fn package() -> PackageVariant {
        package_release("2018.1")
    }

    fn package_release(name: &str) -> PackageVariant {
        let repository = Repository::parse("https://gitlab.example.org/modelpacks").unwrap();
        PackageVariant::new(ModelPackage::new("lhc", repository), Variant::release(name))
    }

    fn definition(name: &str) -> ModelDefinition {
        let ranges = vec![RangeDefinition::new("ALL"), RangeDefinition::new("IP5")];
        ModelDefinition::new(
            name,
            vec![OpticsDefinition::new("injection"), OpticsDefinition::new("collision")],
            vec![
                SequenceDefinition::new("lhcb1", ranges.clone()).with_default_range("IP5"),
                SequenceDefinition::new("lhcb2", ranges),
            ],
        )
        .with_default_optics("collision")
        .with_default_sequence("lhcb1")
    }

    #[tokio::test]
    async fn test_select_definition_cascades_defaults() {
        let (mut engine, _rx) = engine(Arc::new(StubCatalog::new(vec![], Behaviour::Deliver)));
        let def = definition("LHC 2018");
        engine.select_definition(Some(def.clone()));

        let snapshot = engine.snapshot();
        assert_eq!(snapshot.selected_optics.as_ref(), def.default_optics());
        assert_eq!(snapshot.selected_sequence.as_ref(), def.default_sequence());
        assert_eq!(
            snapshot.selected_range.as_ref(),
            def.default_sequence().and_then(SequenceDefinition::default_range)
        );
        assert_eq!(snapshot.available_optics, def.optics);
        assert_eq!(snapshot.available_sequences, def.sequences);
        assert_eq!(snapshot.selected_range.unwrap().name, "IP5");
    }

    #[tokio::test]
    async fn test_available_ranges_mirror_sequence() {
        let (mut engine, _rx) = engine(Arc::new(StubCatalog::new(vec![], Behaviour::Deliver)));
        let seq = SequenceDefinition::new(
            "ring",
            vec![RangeDefinition::new("B"), RangeDefinition::new("A")],
        );
        engine.select_sequence(Some(seq.clone()));
        assert_eq!(engine.state().available_ranges.get(), seq.ranges);
        assert_eq!(engine.state().selected_range.get().unwrap().name, "B");

        engine.select_sequence(None);
        assert!(engine.state().selected_sequence.get().is_none());
        assert_eq!(engine.state().available_ranges.get(), seq.ranges);
        assert_eq!(engine.state().selected_range.get().unwrap().name, "B");
    }

    #[tokio::test]
    async fn test_null_definition_leaves_downstream_untouched() {
        let (mut engine, _rx) = engine(Arc::new(StubCatalog::new(vec![], Behaviour::Deliver)));
        engine.select_definition(Some(definition("LHC 2018")));
        let before = engine.snapshot();

        engine.select_definition(None);
        let after = engine.snapshot();

        assert!(after.selected_definition.is_none());
        assert_eq!(after.available_optics, before.available_optics);
        assert_eq!(after.selected_optics, before.selected_optics);
        assert_eq!(after.available_sequences, before.available_sequences);
        assert_eq!(after.selected_sequence, before.selected_sequence);
        assert_eq!(after.available_ranges, before.available_ranges);
        assert_eq!(after.selected_range, before.selected_range);
    }

    #[tokio::test]
    async fn test_select_package_selects_first_definition() {
        let defs = vec![definition("D1"), definition("D2")];
        let catalog = Arc::new(StubCatalog::new(defs.clone(), Behaviour::Deliver));
        let (mut engine, mut rx) = engine(catalog);

        assert!(engine.select_package(Some(package())).is_some());
        assert!(engine.is_loading());
        assert!(settle(&mut engine, &mut rx).await.is_none());

        assert_eq!(engine.state().available_definitions.get(), defs);
        assert_eq!(engine.state().selected_definition.get(), Some(defs[0].clone()));
        assert_eq!(engine.state().selected_package.get(), Some(package()));
        assert!(!engine.is_loading());
    }

    #[tokio::test]
    async fn test_select_no_package_is_a_no_op() {
        let defs = vec![definition("D1")];
        let (mut engine, mut rx) = engine(Arc::new(StubCatalog::new(defs.clone(), Behaviour::Deliver)));
        engine.select_package(Some(package()));
        settle(&mut engine, &mut rx).await;

        assert!(engine.select_package(None).is_none());
        assert!(!engine.is_loading());
        assert_eq!(engine.state().selected_package.get(), Some(package()));
        assert_eq!(engine.state().available_definitions.get(), defs);
    }

    #[tokio::test]
    async fn test_empty_definition_list_selects_nothing() {
        let (mut engine, mut rx) = engine(Arc::new(StubCatalog::new(vec![], Behaviour::Deliver)));
        engine.select_definition(Some(definition("previous")));
        engine.select_package(Some(package()));
        settle(&mut engine, &mut rx).await;

        assert!(engine.state().available_definitions.get().is_empty());
        assert_eq!(engine.state().selected_definition.get().unwrap().name, "previous");
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_keeps_previous_definitions() {
        let catalog = Arc::new(StubCatalog::new(vec![], Behaviour::Hang));
        let (mut engine, mut rx) = engine(catalog);
        engine.state.available_definitions.set(vec![definition("cached")]);

        engine.select_package(Some(package()));
        let error = settle(&mut engine, &mut rx).await;

        assert!(matches!(error, Some(SelectorError::FetchTimeout { .. })));
        assert!(!engine.is_loading());
        assert_eq!(engine.state().available_definitions.get(), vec![definition("cached")]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_definitions_of_previous_package_are_ignored() {
        let catalog = Arc::new(StubCatalog::new(vec![], Behaviour::SlowFor("2017.1")));
        let (mut engine, mut rx) = engine(catalog);
        let slow = package_release("2017.1");
        let fast = package_release("2018.1");

        engine.select_package(Some(slow));
        engine.select_package(Some(fast.clone()));
        assert!(settle(&mut engine, &mut rx).await.is_none());
        assert_eq!(engine.state().selected_definition.get().unwrap().name, "2018.1");

        // Let the first fetch finish and hand over what it produced.
        tokio::time::sleep(Duration::from_secs(10)).await;
        let mut late = 0;
        while let Ok(delivery) = rx.try_recv() {
            assert!(engine.accept_definitions(delivery).is_none());
            late += 1;
        }
        assert_eq!(late, 2);

        assert!(!engine.is_loading());
        assert_eq!(engine.state().selected_package.get(), Some(fast));
        assert_eq!(engine.state().available_definitions.get(), vec![definition("2018.1")]);
        assert_eq!(engine.state().selected_definition.get().unwrap().name, "2018.1");
    }

    #[tokio::test]
    async fn test_failure_keeps_previous_definitions() {
        let (mut engine, mut rx) = engine(Arc::new(StubCatalog::new(vec![], Behaviour::Fail)));
        engine.state.available_definitions.set(vec![definition("cached")]);

        engine.select_package(Some(package()));
        let error = settle(&mut engine, &mut rx).await;

        assert!(matches!(error, Some(SelectorError::FetchFailure { .. })));
        assert_eq!(engine.state().available_definitions.get().len(), 1);
    }

    #[tokio::test]
    async fn test_mode_read_once_and_forwarded_on_change() {
        let catalog = Arc::new(StubCatalog::new(vec![], Behaviour::Deliver));
        let (mut engine, _rx) = engine(catalog.clone());
        assert_eq!(engine.state().mode.get(), Mode::Offline);

        engine.set_online_mode(false);
        engine.set_online_mode(true);
        assert_eq!(engine.state().mode.get(), Mode::Online);
        assert_eq!(*catalog.mode_changes.lock().unwrap(), vec![Mode::Online]);
    }

    #[tokio::test]
    async fn test_selection_finalisation() {
        let (mut engine, _rx) = engine(Arc::new(StubCatalog::new(vec![], Behaviour::Deliver)));
        assert!(engine.selection(SelectionType::All).is_none());
        assert!(engine.selection(SelectionType::ModelDefinitionOnly).is_none());

        let def = definition("LHC 2018");
        engine.select_definition(Some(def.clone()));
        let full = engine.selection(SelectionType::All).unwrap();
        assert_eq!(full.definition, def);
        let startup = full.startup.unwrap();
        assert_eq!(startup.optics.name, "collision");
        assert_eq!(startup.range.name, "IP5");

        engine.select_range(None);
        assert!(engine.selection(SelectionType::All).is_none());
        let only = engine.selection(SelectionType::ModelDefinitionOnly).unwrap();
        assert!(only.startup.is_none());
    }
}
