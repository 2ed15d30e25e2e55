//! Waiter future - one consumer's wait for the settlement

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use herald_core::{Outcome, WaiterId};

use crate::shared::{Registration, Shared};

/// Per-invocation state
///
/// `Pending -> Done` happens either through settlement (poll) or through
/// cancellation (drop); both go through a registry removal under the lock, so
/// only one of them ever applies.
enum WaiterState<T> {
    /// Settled before `wait()` was called; yields on first poll
    Ready(Outcome<T>),
    /// Holds a registry entry
    Pending(WaiterId),
    /// Outcome handed out
    Done,
}

/// Future returned by [`Operation::wait`](crate::Operation::wait).
///
/// Resolves to the broadcaster's [`Outcome`]. If the broadcaster was already
/// settled when the waiter was created it completes on its first poll.
///
/// Dropping a pending `Waiter` (including via task abort or unwinding) is
/// cancellation: its registry entry is removed and it is never resumed.
///
/// A broadcaster that is never settled leaves its waiters pending forever.
/// There is no timeout; wrap the waiter in one if the producer may vanish.
#[must_use = "futures do nothing unless you `.await` or poll them"]
pub struct Waiter<T> {
    shared: Arc<Shared<T>>,
    state: WaiterState<T>,
}

// The outcome is never pinned
impl<T> Unpin for Waiter<T> {}

impl<T: Clone> Waiter<T> {
    pub(crate) fn new(shared: Arc<Shared<T>>) -> Self {
        let state = match shared.register() {
            Registration::Settled(outcome) => WaiterState::Ready(outcome),
            Registration::Registered(id) => WaiterState::Pending(id),
        };
        Waiter { shared, state }
    }
}

impl<T> Waiter<T> {
    /// Registry id, if this waiter ever registered
    pub fn id(&self) -> Option<WaiterId> {
        match self.state {
            WaiterState::Pending(id) => Some(id),
            _ => None,
        }
    }

    /// True while this waiter holds a registry entry
    pub fn is_registered(&self) -> bool {
        match self.state {
            WaiterState::Pending(id) => self.shared.is_registered(id),
            _ => false,
        }
    }
}

impl<T: Clone> Future for Waiter<T> {
    type Output = Outcome<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match std::mem::replace(&mut this.state, WaiterState::Done) {
            WaiterState::Ready(outcome) => Poll::Ready(outcome),
            WaiterState::Pending(id) => match this.shared.poll_registered(id, cx) {
                Poll::Ready(outcome) => Poll::Ready(outcome),
                Poll::Pending => {
                    this.state = WaiterState::Pending(id);
                    Poll::Pending
                }
            },
            WaiterState::Done => panic!("Waiter polled after completion"),
        }
    }
}

impl<T> Drop for Waiter<T> {
    fn drop(&mut self) {
        if let WaiterState::Pending(id) = self.state {
            self.shared.deregister(id);
        }
    }
}

impl<T> fmt::Debug for Waiter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self.state {
            WaiterState::Ready(_) => "ready",
            WaiterState::Pending(_) => "pending",
            WaiterState::Done => "done",
        };
        f.debug_struct("Waiter")
            .field("id", &self.id())
            .field("state", &state)
            .finish()
    }
}
