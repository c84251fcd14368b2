use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use tracing::error;

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Callback registry that isolates each observer from the others.
///
/// A callback that panics is logged and skipped; the remaining observers and
/// the notifier keep running.
pub struct ObserverSet<T> {
    next_id: AtomicU64,
    observers: Mutex<Vec<(u64, Callback<T>)>>,
}

impl<T: 'static> ObserverSet<T> {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            next_id: AtomicU64::new(1),
            observers: Mutex::new(Vec::new()),
        })
    }

    /// Register a callback. It stays registered until the returned handle is
    /// dropped or `unsubscribe`d.
    pub fn register<F>(self: &Arc<Self>, callback: F) -> ObserverHandle
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, Arc::new(callback)));

        let set: Weak<Self> = Arc::downgrade(self);
        ObserverHandle {
            release: Some(Box::new(move || {
                if let Some(set) = set.upgrade() {
                    set.remove(id);
                }
            })),
        }
    }

    fn remove(&self, id: u64) {
        self.observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|(observer_id, _)| *observer_id != id);
    }

    /// Deliver `value` to every observer. Returns how many of them panicked.
    pub fn notify(&self, value: &T) -> usize {
        // Snapshot so callbacks may (un)register without deadlocking.
        let snapshot: Vec<(u64, Callback<T>)> = self
            .observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        let mut failures = 0;
        for (id, callback) in snapshot {
            if panic::catch_unwind(AssertUnwindSafe(|| callback(value))).is_err() {
                failures += 1;
                error!(observer_id = id, "Observer panicked during notification");
            }
        }
        failures
    }

    pub fn len(&self) -> usize {
        self.observers.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Keeps an observer registered. Dropping it unregisters the callback.
#[must_use = "dropping the handle unregisters the observer"]
pub struct ObserverHandle {
    release: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl ObserverHandle {
    pub fn unsubscribe(mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }

    /// Keep the observer registered for the lifetime of the set.
    pub fn detach(mut self) {
        self.release = None;
    }
}

impl Drop for ObserverHandle {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_notify_reaches_all_observers() {
        let set = ObserverSet::<u32>::new();
        let total = Arc::new(AtomicUsize::new(0));

        let t1 = total.clone();
        let _a = set.register(move |v| { t1.fetch_add(*v as usize, Ordering::SeqCst); });
        let t2 = total.clone();
        let _b = set.register(move |v| { t2.fetch_add(*v as usize, Ordering::SeqCst); });

        assert_eq!(set.notify(&5), 0);
        assert_eq!(total.load(Ordering::SeqCst), 10);
    }

    #[test]
    fn test_panicking_observer_is_isolated() {
        let set = ObserverSet::<u32>::new();
        let seen = Arc::new(AtomicUsize::new(0));

        let _bad = set.register(|_| panic!("broken display adapter"));
        let s = seen.clone();
        let _good = set.register(move |_| { s.fetch_add(1, Ordering::SeqCst); });

        assert_eq!(set.notify(&1), 1);
        assert_eq!(set.notify(&2), 1);
        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_drop_handle_unregisters() {
        let set = ObserverSet::<u32>::new();
        let handle = set.register(|_| {});
        assert_eq!(set.len(), 1);
        drop(handle);
        assert!(set.is_empty());
    }

    #[test]
    fn test_unsubscribe_and_detach() {
        let set = ObserverSet::<u32>::new();
        set.register(|_| {}).unsubscribe();
        assert!(set.is_empty());

        set.register(|_| {}).detach();
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_handle_outliving_set_is_harmless() {
        let set = ObserverSet::<u32>::new();
        let handle = set.register(|_| {});
        drop(set);
        drop(handle);
    }
}
