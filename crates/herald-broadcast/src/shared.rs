//! Settlement state shared by all handles of one broadcaster

use std::task::{Context, Poll};

use herald_core::{Outcome, WaiterId};
use parking_lot::Mutex;

use crate::config::BroadcastConfig;
use crate::registry::WaiterRegistry;

/// What `wait()` found when it took the lock
pub(crate) enum Registration<T> {
    /// Already settled, here is the outcome
    Settled(Outcome<T>),
    /// Parked under this id
    Registered(WaiterId),
}

struct State<T> {
    /// Write-once slot
    settlement: Option<Outcome<T>>,
    registry: WaiterRegistry,
}

/// Settlement plus registry behind one lock.
///
/// Every check-then-act on the pair happens under `state`, which is what makes
/// registration atomic with respect to a racing settle.
pub(crate) struct Shared<T> {
    state: Mutex<State<T>>,
    label: Option<String>,
}

impl<T> Shared<T> {
    pub fn new(config: BroadcastConfig) -> Self {
        Shared {
            state: Mutex::new(State {
                settlement: None,
                registry: WaiterRegistry::with_capacity(config.registry_capacity),
            }),
            label: config.label,
        }
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    fn log_label(&self) -> &str {
        self.label().unwrap_or("anonymous")
    }

    /// Record `outcome` if nothing is recorded yet and wake every parked waiter.
    /// Later calls are dropped without a trace beyond `trace!`.
    pub fn settle(&self, outcome: Outcome<T>) {
        let kind = outcome.kind();

        let (wakers, removed) = {
            let mut state = self.state.lock();
            if state.settlement.is_some() {
                tracing::trace!(
                    label = self.log_label(),
                    attempted = %kind,
                    "already settled, ignoring"
                );
                return;
            }
            state.settlement = Some(outcome);
            state.registry.drain()
        };

        tracing::debug!(
            label = self.log_label(),
            outcome = %kind,
            waiters = removed,
            "broadcaster settled"
        );

        // Woken outside the lock so resumed tasks never contend with us
        for waker in wakers {
            waker.wake();
        }
    }

    /// Remove a cancelled waiter. Returns false if settlement already took it.
    pub fn deregister(&self, id: WaiterId) -> bool {
        let removed = self.state.lock().registry.remove(id);
        if removed {
            tracing::trace!(label = self.log_label(), waiter = %id, "waiter cancelled");
        }
        removed
    }

    pub fn is_settled(&self) -> bool {
        self.state.lock().settlement.is_some()
    }

    pub fn waiter_count(&self) -> usize {
        self.state.lock().registry.len()
    }

    pub fn is_registered(&self, id: WaiterId) -> bool {
        self.state.lock().registry.contains(id)
    }
}

impl<T: Clone> Shared<T> {
    /// Check for a settlement and register if there is none, atomically.
    pub fn register(&self) -> Registration<T> {
        let mut state = self.state.lock();
        if let Some(outcome) = &state.settlement {
            return Registration::Settled(outcome.clone());
        }
        let id = state.registry.register();
        tracing::trace!(label = self.log_label(), waiter = %id, "waiter registered");
        Registration::Registered(id)
    }

    /// Poll a registered waiter.
    ///
    /// On settlement the entry is removed (it may already be gone if the
    /// settle call drained it) and the outcome is returned.
    pub fn poll_registered(&self, id: WaiterId, cx: &mut Context<'_>) -> Poll<Outcome<T>> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        if let Some(outcome) = &state.settlement {
            state.registry.remove(id);
            return Poll::Ready(outcome.clone());
        }
        state.registry.set_waker(id, cx.waker());
        Poll::Pending
    }

    pub fn peek(&self) -> Option<Outcome<T>> {
        self.state.lock().settlement.clone()
    }
}
