use tokio::sync::watch;

/// An observable value.
///
/// Observers call [`Property::subscribe`] and await `changed()` on the returned
/// receiver; dropping the receiver unsubscribes. Only actual changes notify.
#[derive(Debug)]
pub struct Property<T> {
    tx: watch::Sender<T>,
}

impl<T: Clone + PartialEq> Property<T> {
    pub fn new(value: T) -> Self {
        let (tx, _rx) = watch::channel(value);
        Self { tx }
    }

    pub fn get(&self) -> T {
        self.tx.borrow().clone()
    }

    /// Stores `value`. Returns true if it differed from the current value, in
    /// which case subscribers are notified.
    pub fn set(&self, value: T) -> bool {
        self.tx.send_if_modified(|current| {
            if *current == value {
                false
            } else {
                *current = value;
                true
            }
        })
    }

    pub fn subscribe(&self) -> watch::Receiver<T> {
        self.tx.subscribe()
    }
}

impl<T: Clone + PartialEq + Default> Default for Property<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}
