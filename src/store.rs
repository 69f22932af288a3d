use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard};

struct Inner<T> {
    value: T,
    subscribers: Vec<Sender<T>>,
}

/// Shared state with serialized updates and snapshot notifications.
///
/// Every `update` runs under one lock, so concurrent writers never interleave;
/// subscribers receive a clone of the value after each update.
pub struct StateStore<T> {
    inner: Arc<Mutex<Inner<T>>>,
}

impl<T> Clone for StateStore<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Clone> StateStore<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                value,
                subscribers: Vec::new(),
            })),
        }
    }

    pub fn snapshot(&self) -> T {
        self.lock().value.clone()
    }

    pub fn update<R>(&self, apply: impl FnOnce(&mut T) -> R) -> R {
        let mut inner = self.lock();
        let out = apply(&mut inner.value);
        let snapshot = inner.value.clone();
        inner
            .subscribers
            .retain(|subscriber| subscriber.send(snapshot.clone()).is_ok());
        out
    }

    pub fn subscribe(&self) -> Receiver<T> {
        let (tx, rx) = mpsc::channel();
        self.lock().subscribers.push(tx);
        rx
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().subscribers.len()
    }

    fn lock(&self) -> MutexGuard<'_, Inner<T>> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
