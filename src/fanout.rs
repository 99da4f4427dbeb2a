//! Callback fan-out with per-callback isolation.
//!
//! A panicking subscriber is caught and logged; the remaining subscribers
//! still receive the item.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

pub type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

type Registry<T> = Mutex<Vec<(u64, Callback<T>)>>;

pub struct Subscribers<T> {
    registry: Arc<Registry<T>>,
    next_id: AtomicU64,
}

impl<T: 'static> Subscribers<T> {
    pub fn new() -> Self {
        Self {
            registry: Arc::new(Mutex::new(Vec::new())),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a callback. Keep the returned handle to unsubscribe later;
    /// dropping it leaves the callback registered.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.registry
            .lock()
            .expect("subscriber registry poisoned")
            .push((id, Arc::new(callback)));

        let registry: Weak<Registry<T>> = Arc::downgrade(&self.registry);
        Subscription {
            remove: Some(Box::new(move || {
                if let Some(registry) = registry.upgrade() {
                    registry
                        .lock()
                        .expect("subscriber registry poisoned")
                        .retain(|(existing, _)| *existing != id);
                }
            })),
        }
    }

    /// Deliver `item` to every subscriber. Returns how many panicked.
    pub fn notify(&self, item: &T) -> usize {
        let callbacks: Vec<Callback<T>> = self
            .registry
            .lock()
            .expect("subscriber registry poisoned")
            .iter()
            .map(|(_, cb)| Arc::clone(cb))
            .collect();

        let mut failures = 0;
        for callback in callbacks {
            if catch_unwind(AssertUnwindSafe(|| callback(item))).is_err() {
                failures += 1;
                tracing::warn!("Subscriber callback panicked, continuing with remaining subscribers");
            }
        }
        failures
    }

    pub fn len(&self) -> usize {
        self.registry.lock().expect("subscriber registry poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.registry.lock().expect("subscriber registry poisoned").clear();
    }
}

impl<T: 'static> Default for Subscribers<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle returned by [`Subscribers::subscribe`].
pub struct Subscription {
    remove: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    /// Stop delivery to this callback only.
    pub fn unsubscribe(mut self) {
        if let Some(remove) = self.remove.take() {
            remove();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("active", &self.remove.is_some()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_unsubscribe_only_removes_one() {
        let subs: Subscribers<u32> = Subscribers::new();
        let a = Arc::new(AtomicUsize::new(0));
        let b = Arc::new(AtomicUsize::new(0));
        let (a2, b2) = (a.clone(), b.clone());
        let sub_a = subs.subscribe(move |_| {
            a2.fetch_add(1, Ordering::SeqCst);
        });
        let _sub_b = subs.subscribe(move |_| {
            b2.fetch_add(1, Ordering::SeqCst);
        });

        subs.notify(&1);
        sub_a.unsubscribe();
        subs.notify(&2);

        assert_eq!(a.load(Ordering::SeqCst), 1);
        assert_eq!(b.load(Ordering::SeqCst), 2);
        assert_eq!(subs.len(), 1);
    }

    #[test]
    fn test_panicking_subscriber_is_isolated() {
        let subs: Subscribers<u32> = Subscribers::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        let _bad = subs.subscribe(|_| panic!("subscriber bug"));
        let _good = subs.subscribe(move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(subs.notify(&7), 1);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unsubscribe_after_registry_dropped() {
        let subs: Subscribers<u32> = Subscribers::new();
        let sub = subs.subscribe(|_| {});
        drop(subs);
        sub.unsubscribe();
    }
}
