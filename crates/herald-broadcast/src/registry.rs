//! Registry of suspended waiters

use std::collections::HashMap;
use std::task::Waker;

use herald_core::WaiterId;

/// Set of waiters parked on an unsettled broadcaster.
///
/// An entry exists from registration until it is either drained by a settle
/// call or removed by its cancelled waiter. Entries registered but not yet
/// polled have no waker.
#[derive(Debug, Default)]
pub(crate) struct WaiterRegistry {
    /// Next id to hand out
    next_id: WaiterId,
    /// Live entries, iteration order is irrelevant
    entries: HashMap<WaiterId, Option<Waker>>,
}

impl WaiterRegistry {
    pub fn with_capacity(capacity: usize) -> Self {
        WaiterRegistry {
            next_id: WaiterId::ZERO,
            entries: HashMap::with_capacity(capacity),
        }
    }

    /// Add an entry and return its key
    pub fn register(&mut self) -> WaiterId {
        let id = self.next_id;
        self.next_id = id.next();
        self.entries.insert(id, None);
        id
    }

    /// Store the waker to call on settlement.
    /// Returns false if the entry is gone.
    pub fn set_waker(&mut self, id: WaiterId, waker: &Waker) -> bool {
        match self.entries.get_mut(&id) {
            Some(slot) => {
                // Skip the clone when the task has not moved
                if !slot.as_ref().is_some_and(|w| w.will_wake(waker)) {
                    *slot = Some(waker.clone());
                }
                true
            }
            None => false,
        }
    }

    /// Remove an entry. Returns true if it was still present.
    pub fn remove(&mut self, id: WaiterId) -> bool {
        self.entries.remove(&id).is_some()
    }

    pub fn contains(&self, id: WaiterId) -> bool {
        self.entries.contains_key(&id)
    }

    /// Empty the registry.
    /// Returns the wakers to notify and the number of entries removed.
    pub fn drain(&mut self) -> (Vec<Waker>, usize) {
        let removed = self.entries.len();
        let wakers = self.entries.drain().filter_map(|(_, waker)| waker).collect();
        (wakers, removed)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::task::Wake;

    struct CountingWaker(AtomicUsize);

    impl Wake for CountingWaker {
        fn wake(self: Arc<Self>) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_register_assigns_distinct_ids() {
        let mut registry = WaiterRegistry::default();
        let a = registry.register();
        let b = registry.register();

        assert_ne!(a, b);
        assert_eq!(registry.len(), 2);
        assert!(registry.contains(a));
    }

    #[test]
    fn test_remove_is_exactly_once() {
        let mut registry = WaiterRegistry::with_capacity(4);
        let id = registry.register();

        assert!(registry.remove(id));
        assert!(!registry.remove(id));
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn test_set_waker_on_removed_entry() {
        let mut registry = WaiterRegistry::default();
        let counter = Arc::new(CountingWaker(AtomicUsize::new(0)));
        let waker = Waker::from(counter);

        let id = registry.register();
        registry.remove(id);
        assert!(!registry.set_waker(id, &waker));
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn test_drain_returns_only_polled_entries() {
        let mut registry = WaiterRegistry::default();
        let counter = Arc::new(CountingWaker(AtomicUsize::new(0)));
        let waker = Waker::from(counter.clone());

        let polled = registry.register();
        let _unpolled = registry.register();
        assert!(registry.set_waker(polled, &waker));
        // Same task polling twice keeps one waker
        assert!(registry.set_waker(polled, &waker));

        let (wakers, removed) = registry.drain();
        assert_eq!(removed, 2);
        assert_eq!(wakers.len(), 1);
        assert_eq!(registry.len(), 0);

        for waker in wakers {
            waker.wake();
        }
        assert_eq!(counter.0.load(Ordering::SeqCst), 1);
    }
}
