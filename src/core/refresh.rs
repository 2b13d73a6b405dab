use crate::core::property::Property;
use crate::domain::ports::ItemStream;
use crate::utils::error::{Result, SelectorError};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{timeout_at, Instant};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

pub type BoxedFetch<T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'static>>;

/// Work handed to a [`RefreshCoordinator`]: one result, or a stream of them.
pub enum Operation<T> {
    Single(BoxedFetch<T>),
    Stream(ItemStream<T>),
}

impl<T> Operation<T> {
    pub fn single<F>(fetch: F) -> Self
    where
        F: Future<Output = Result<T>> + Send + 'static,
    {
        Operation::Single(Box::pin(fetch))
    }

    pub fn stream(items: ItemStream<T>) -> Self {
        Operation::Stream(items)
    }
}

#[derive(Debug)]
pub enum Outcome {
    Completed,
    TimedOut,
    Failed(SelectorError),
}

/// A message from a running operation, tagged with the run that produced it.
#[derive(Debug)]
pub enum Delivery<T> {
    Item { generation: u64, item: T },
    Finished { generation: u64, outcome: Outcome },
}

impl<T> Delivery<T> {
    pub fn generation(&self) -> u64 {
        match self {
            Delivery::Item { generation, .. } | Delivery::Finished { generation, .. } => *generation,
        }
    }
}

/// Carries deliveries back onto the context that owns the coordinator.
pub type Sink<T> = Arc<dyn Fn(Delivery<T>) + Send + Sync>;

/// What the owner should do with a delivery after fencing.
#[derive(Debug)]
pub enum Delivered<T> {
    Item(T),
    Completed,
    Failed(SelectorError),
    /// From a superseded run; drop it.
    Stale,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunStatus {
    Completed,
    TimedOut,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub generation: u64,
    pub status: RunStatus,
    pub finished_at: DateTime<Utc>,
}

/// Runs one kind of remote operation at a time behind a loading flag.
///
/// `run` raises the flag synchronously and spawns the operation on the tokio
/// runtime. Everything the operation produces comes back through the sink as
/// [`Delivery`] values, which the owner feeds to [`RefreshCoordinator::deliver`]
/// on its own context. Each run gets a new generation; deliveries from older
/// generations are discarded there, so a superseded run can neither apply
/// late items nor clear the flag of the run that replaced it.
#[derive(Debug)]
pub struct RefreshCoordinator {
    operation: String,
    timeout: Duration,
    loading: Property<bool>,
    next_generation: u64,
    active: Option<u64>,
    last_run: Option<RunReport>,
}

impl RefreshCoordinator {
    pub fn new(operation: impl Into<String>, timeout: Duration) -> Self {
        Self {
            operation: operation.into(),
            timeout,
            loading: Property::new(false),
            next_generation: 0,
            active: None,
            last_run: None,
        }
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    pub fn loading(&self) -> &Property<bool> {
        &self.loading
    }

    pub fn is_loading(&self) -> bool {
        self.loading.get()
    }

    pub fn last_run(&self) -> Option<&RunReport> {
        self.last_run.as_ref()
    }

    /// Starts `operation` and returns its generation. Must be called inside a
    /// tokio runtime.
    pub fn run<T: Send + 'static>(&mut self, operation: Operation<T>, sink: Sink<T>) -> u64 {
        self.next_generation += 1;
        let generation = self.next_generation;
        if let Some(previous) = self.active.replace(generation) {
            tracing::debug!(
                "🔁 {}: run {} supersedes run {}",
                self.operation,
                generation,
                previous
            );
        }
        self.loading.set(true);
        tracing::debug!("{}: run {} started", self.operation, generation);

        let timeout = self.timeout;
        tokio::spawn(async move {
            let outcome = drive(operation, timeout, generation, &sink).await;
            sink(Delivery::Finished { generation, outcome });
        });
        generation
    }

    /// Fences a delivery against the current run and settles the loading flag
    /// on its terminal event.
    pub fn deliver<T>(&mut self, delivery: Delivery<T>) -> Delivered<T> {
        let generation = delivery.generation();
        if self.active != Some(generation) {
            tracing::debug!(
                "{}: discarding delivery from superseded run {}",
                self.operation,
                generation
            );
            return Delivered::Stale;
        }

        let outcome = match delivery {
            Delivery::Item { item, .. } => return Delivered::Item(item),
            Delivery::Finished { outcome, .. } => outcome,
        };

        self.active = None;
        self.loading.set(false);

        let (status, delivered) = match outcome {
            Outcome::Completed => {
                tracing::debug!("{}: run {} completed", self.operation, generation);
                (RunStatus::Completed, Delivered::Completed)
            }
            Outcome::TimedOut => {
                let err = SelectorError::FetchTimeout {
                    operation: self.operation.clone(),
                    timeout: self.timeout,
                };
                tracing::error!("❌ {}", err);
                (RunStatus::TimedOut, Delivered::Failed(err))
            }
            Outcome::Failed(err) => {
                tracing::error!("❌ Error during {}: {}", self.operation, err);
                (RunStatus::Failed, Delivered::Failed(err))
            }
        };
        self.last_run = Some(RunReport {
            generation,
            status,
            finished_at: Utc::now(),
        });
        delivered
    }
}

async fn drive<T>(
    operation: Operation<T>,
    timeout: Duration,
    generation: u64,
    sink: &Sink<T>,
) -> Outcome {
    let deadline = Instant::now() + timeout;
    match operation {
        Operation::Single(fetch) => match timeout_at(deadline, fetch).await {
            Ok(Ok(item)) => {
                sink(Delivery::Item { generation, item });
                Outcome::Completed
            }
            Ok(Err(err)) => Outcome::Failed(err),
            Err(_) => Outcome::TimedOut,
        },
        Operation::Stream(mut items) => loop {
            match timeout_at(deadline, items.recv()).await {
                Ok(Some(Ok(item))) => sink(Delivery::Item { generation, item }),
                Ok(Some(Err(err))) => break Outcome::Failed(err),
                Ok(None) => break Outcome::Completed,
                Err(_) => break Outcome::TimedOut,
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn channel_sink<T: Send + 'static>() -> (Sink<T>, mpsc::UnboundedReceiver<Delivery<T>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let sink: Sink<T> = Arc::new(move |delivery| {
            let _ = tx.send(delivery);
        });
        (sink, rx)
    }

    /// Feeds deliveries to the coordinator until `generation` finishes.
    async fn settle<T>(
        coordinator: &mut RefreshCoordinator,
        rx: &mut mpsc::UnboundedReceiver<Delivery<T>>,
        generation: u64,
    ) -> (Vec<T>, Option<SelectorError>) {
        let mut items = Vec::new();
        let mut error = None;
        while let Some(delivery) = rx.recv().await {
            let finished = matches!(
                &delivery,
                Delivery::Finished { generation: g, .. } if *g == generation
            );
            match coordinator.deliver(delivery) {
                Delivered::Item(item) => items.push(item),
                Delivered::Failed(err) => error = Some(err),
                Delivered::Completed | Delivered::Stale => {}
            }
            if finished {
                break;
            }
        }
        (items, error)
    }

    #[tokio::test]
    async fn test_stream_items_arrive_in_order() {
        let mut coordinator = RefreshCoordinator::new("package refresh", DEFAULT_TIMEOUT);
        let (sink, mut rx) = channel_sink();
        let (tx, items) = mpsc::channel(8);
        for i in 1..=3 {
            tx.send(Ok(i)).await.unwrap();
        }
        drop(tx);

        let generation = coordinator.run(Operation::stream(items), sink);
        assert!(coordinator.is_loading());

        let (items, error) = settle(&mut coordinator, &mut rx, generation).await;
        assert_eq!(items, vec![1, 2, 3]);
        assert!(error.is_none());
        assert!(!coordinator.is_loading());
        assert_eq!(coordinator.last_run().unwrap().status, RunStatus::Completed);
    }

    #[tokio::test]
    async fn test_single_result_and_failure() {
        let mut coordinator = RefreshCoordinator::new("clear cache", DEFAULT_TIMEOUT);
        let (sink, mut rx) = channel_sink::<&str>();

        let generation = coordinator.run(Operation::single(async { Ok("done") }), sink.clone());
        let (items, error) = settle(&mut coordinator, &mut rx, generation).await;
        assert_eq!(items, vec!["done"]);
        assert!(error.is_none());

        let generation = coordinator.run(
            Operation::single(async { Err(SelectorError::fetch_failure("clear cache", "offline")) }),
            sink,
        );
        let (items, error) = settle(&mut coordinator, &mut rx, generation).await;
        assert!(items.is_empty());
        assert!(matches!(error, Some(SelectorError::FetchFailure { .. })));
        assert!(!coordinator.is_loading());
        assert_eq!(coordinator.last_run().unwrap().status, RunStatus::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_keeps_delivered_items() {
        let mut coordinator = RefreshCoordinator::new("package refresh", Duration::from_secs(30));
        let (sink, mut rx) = channel_sink();
        let (tx, items) = mpsc::channel(8);
        tx.send(Ok("first")).await.unwrap();

        let generation = coordinator.run(Operation::stream(items), sink);
        let (items, error) = settle(&mut coordinator, &mut rx, generation).await;

        assert_eq!(items, vec!["first"]);
        assert!(matches!(error, Some(SelectorError::FetchTimeout { .. })));
        assert!(!coordinator.is_loading());
        assert_eq!(coordinator.last_run().unwrap().status, RunStatus::TimedOut);
        drop(tx);
    }

    #[tokio::test]
    async fn test_superseded_run_is_fenced() {
        let mut coordinator = RefreshCoordinator::new("package refresh", DEFAULT_TIMEOUT);
        let (sink, mut rx) = channel_sink();

        let (slow_tx, slow_items) = mpsc::channel(8);
        let old = coordinator.run(Operation::stream(slow_items), sink.clone());
        let new = coordinator.run(Operation::single(async { Ok("fresh") }), sink);
        assert_eq!(coordinator.active, Some(new));

        let (items, _) = settle(&mut coordinator, &mut rx, new).await;
        assert_eq!(items, vec!["fresh"]);
        assert!(!coordinator.is_loading());

        // The old run's stragglers arrive after the new run finished.
        slow_tx.send(Ok("late")).await.unwrap();
        drop(slow_tx);
        let (items, _) = settle(&mut coordinator, &mut rx, old).await;
        assert!(items.is_empty());
        assert!(!coordinator.is_loading());
    }

    #[tokio::test]
    async fn test_loading_clears_exactly_once() {
        let mut coordinator = RefreshCoordinator::new("model definitions", DEFAULT_TIMEOUT);
        let (sink, mut rx) = channel_sink::<u8>();
        let generation = coordinator.run(Operation::single(async { Ok(7) }), sink);

        let mut loading = coordinator.loading().subscribe();
        assert!(*loading.borrow_and_update());

        settle(&mut coordinator, &mut rx, generation).await;
        assert!(loading.has_changed().unwrap());
        assert!(!*loading.borrow_and_update());

        // A duplicate terminal event for the same run is ignored.
        let duplicate = Delivery::<u8>::Finished {
            generation,
            outcome: Outcome::Completed,
        };
        assert!(matches!(coordinator.deliver(duplicate), Delivered::Stale));
        assert!(!loading.has_changed().unwrap());
    }
}
