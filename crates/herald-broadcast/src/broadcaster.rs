//! Broadcaster and its producer/consumer handles

use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

use herald_core::{Failure, Outcome};

use crate::config::BroadcastConfig;
use crate::shared::Shared;
use crate::waiter::Waiter;

/// Single-settlement deferred value shared by many waiters.
///
/// The first [`resolve`](Self::resolve) or [`reject`](Self::reject) decides
/// the outcome for good; every later call is silently ignored. All clones
/// refer to the same settlement.
pub struct Broadcaster<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Broadcaster<T> {
    pub fn new() -> Self {
        Self::with_config(BroadcastConfig::default())
    }

    pub fn with_config(config: BroadcastConfig) -> Self {
        Broadcaster {
            shared: Arc::new(Shared::new(config)),
        }
    }

    /// Settle with a value. No effect if already settled.
    pub fn resolve(&self, value: T) {
        self.shared.settle(Outcome::Success(value));
    }

    /// Settle with an error. No effect if already settled.
    pub fn reject(&self, error: impl Into<Failure>) {
        self.shared.settle(Outcome::Failure(error.into()));
    }

    /// Reject with an optional payload; `None` becomes "unknown error".
    pub fn reject_with<E>(&self, error: Option<E>)
    where
        E: StdError + Send + Sync + 'static,
    {
        self.shared.settle(Outcome::Failure(Failure::from_option(error)));
    }

    /// Settle with a prepared outcome. No effect if already settled.
    pub fn settle(&self, outcome: Outcome<T>) {
        self.shared.settle(outcome);
    }

    pub fn is_settled(&self) -> bool {
        self.shared.is_settled()
    }

    /// Number of waiters currently parked
    pub fn waiter_count(&self) -> usize {
        self.shared.waiter_count()
    }

    pub fn label(&self) -> Option<&str> {
        self.shared.label()
    }

    pub fn operation(&self) -> Operation<T> {
        Operation {
            shared: Arc::clone(&self.shared),
        }
    }

    pub fn resolver(&self) -> Resolver<T> {
        Resolver {
            shared: Arc::clone(&self.shared),
        }
    }

    pub fn rejecter(&self) -> Rejecter<T> {
        Rejecter {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Split into the consumer operation and the two producer entry points
    pub fn split(self) -> (Operation<T>, Resolver<T>, Rejecter<T>) {
        (self.operation(), self.resolver(), self.rejecter())
    }
}

impl<T: Clone> Broadcaster<T> {
    /// Start a new wait. See [`Operation::wait`].
    pub fn wait(&self) -> Waiter<T> {
        Waiter::new(Arc::clone(&self.shared))
    }

    /// The settlement, if any, without waiting
    pub fn peek(&self) -> Option<Outcome<T>> {
        self.shared.peek()
    }
}

impl<T> Default for Broadcaster<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for Broadcaster<T> {
    fn clone(&self) -> Self {
        Broadcaster {
            shared: Arc::clone(&self.shared),
        }
    }
}

/// Consumer side: each [`wait`](Self::wait) is one independent invocation.
pub struct Operation<T> {
    shared: Arc<Shared<T>>,
}

impl<T: Clone> Operation<T> {
    /// Start waiting for the settlement.
    ///
    /// If the broadcaster is already settled the returned future completes on
    /// its first poll without ever registering. Otherwise it registers right
    /// away, so any settle call made after `wait()` returns will wake it.
    pub fn wait(&self) -> Waiter<T> {
        Waiter::new(Arc::clone(&self.shared))
    }

    /// The settlement, if any, without waiting
    pub fn peek(&self) -> Option<Outcome<T>> {
        self.shared.peek()
    }
}

impl<T> Operation<T> {
    pub fn is_settled(&self) -> bool {
        self.shared.is_settled()
    }

    /// Number of waiters currently parked
    pub fn waiter_count(&self) -> usize {
        self.shared.waiter_count()
    }
}

impl<T> Clone for Operation<T> {
    fn clone(&self) -> Self {
        Operation {
            shared: Arc::clone(&self.shared),
        }
    }
}

/// Producer side, success arm
pub struct Resolver<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Resolver<T> {
    /// Settle with a value. No effect if already settled.
    pub fn resolve(&self, value: T) {
        self.shared.settle(Outcome::Success(value));
    }

    pub fn is_settled(&self) -> bool {
        self.shared.is_settled()
    }
}

impl<T> Clone for Resolver<T> {
    fn clone(&self) -> Self {
        Resolver {
            shared: Arc::clone(&self.shared),
        }
    }
}

/// Producer side, failure arm
pub struct Rejecter<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Rejecter<T> {
    /// Settle with an error. No effect if already settled.
    pub fn reject(&self, error: impl Into<Failure>) {
        self.shared.settle(Outcome::Failure(error.into()));
    }

    /// Reject with an optional payload; `None` becomes "unknown error".
    pub fn reject_with<E>(&self, error: Option<E>)
    where
        E: StdError + Send + Sync + 'static,
    {
        self.shared.settle(Outcome::Failure(Failure::from_option(error)));
    }

    pub fn is_settled(&self) -> bool {
        self.shared.is_settled()
    }
}

impl<T> Clone for Rejecter<T> {
    fn clone(&self) -> Self {
        Rejecter {
            shared: Arc::clone(&self.shared),
        }
    }
}

macro_rules! impl_debug {
    ($($ty:ident),*) => {$(
        impl<T> fmt::Debug for $ty<T> {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.debug_struct(stringify!($ty))
                    .field("label", &self.shared.label())
                    .field("settled", &self.shared.is_settled())
                    .field("waiters", &self.shared.waiter_count())
                    .finish()
            }
        }
    )*};
}

impl_debug!(Broadcaster, Operation, Resolver, Rejecter);

/// Create a broadcaster and return its three handles.
///
/// Dropping every `Resolver` and `Rejecter` without settling does not wake
/// anyone: pending waiters stay pending until they are dropped.
pub fn create<T>() -> (Operation<T>, Resolver<T>, Rejecter<T>) {
    Broadcaster::new().split()
}

pub fn create_with_config<T>(config: BroadcastConfig) -> (Operation<T>, Resolver<T>, Rejecter<T>) {
    Broadcaster::with_config(config).split()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::task::{Context, Poll, Wake, Waker};
    use std::time::Duration;

    use proptest::prelude::*;

    #[derive(Default)]
    struct CountingWaker(AtomicUsize);

    impl CountingWaker {
        fn count(&self) -> usize {
            self.0.load(Ordering::SeqCst)
        }
    }

    impl Wake for CountingWaker {
        fn wake(self: Arc<Self>) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn poll_once<T: Clone>(waiter: &mut Waiter<T>, waker: &Arc<CountingWaker>) -> Poll<Outcome<T>> {
        let waker = Waker::from(Arc::clone(waker));
        let mut cx = Context::from_waker(&waker);
        Pin::new(waiter).poll(&mut cx)
    }

    #[tokio::test]
    async fn test_three_waiters_then_late_subscriber() {
        let (op, resolve, reject) = create::<u32>();

        let handles: Vec<_> = (0..3).map(|_| tokio::spawn(op.wait())).collect();
        assert_eq!(op.waiter_count(), 3);

        resolve.resolve(42);
        assert_eq!(op.waiter_count(), 0);

        for handle in handles {
            assert_eq!(handle.await.unwrap().success(), Some(42));
        }

        let mut late = op.wait();
        assert!(late.id().is_none());
        let counter = Arc::new(CountingWaker::default());
        match poll_once(&mut late, &counter) {
            Poll::Ready(outcome) => assert_eq!(outcome.success(), Some(42)),
            Poll::Pending => panic!("late subscriber suspended"),
        }

        reject.reject("x");
        assert_eq!(op.peek().and_then(Outcome::success), Some(42));
        assert_eq!(op.wait().await.success(), Some(42));
    }

    #[tokio::test]
    async fn test_cancelled_waiter_then_reject() {
        let (op, _resolve, reject) = create::<u32>();

        let w1 = tokio::spawn(op.wait());
        tokio::task::yield_now().await;
        w1.abort();
        assert!(w1.await.unwrap_err().is_cancelled());
        assert_eq!(op.waiter_count(), 0);

        let error = Failure::msg("err");
        reject.reject(error.clone());

        let failure = op.wait().await.failure().unwrap();
        assert!(failure.same_instance(&error));
    }

    #[test]
    fn test_first_writer_wins() {
        let broadcaster = Broadcaster::<u32>::new();
        broadcaster.resolve(1);
        broadcaster.resolve(2);
        broadcaster.reject("late");

        assert_eq!(broadcaster.peek().and_then(Outcome::success), Some(1));
    }

    #[test]
    fn test_resolve_after_reject_is_ignored() {
        let broadcaster = Broadcaster::<u32>::new();
        broadcaster.reject("first");
        broadcaster.resolve(7);

        let failure = broadcaster.peek().and_then(Outcome::failure).unwrap();
        assert_eq!(failure.to_string(), "first");
    }

    #[test]
    fn test_reject_without_payload_is_unknown() {
        let (op, _resolve, reject) = create::<()>();
        reject.reject_with::<std::fmt::Error>(None);

        let failure = op.peek().and_then(Outcome::failure).unwrap();
        assert!(failure.is_unknown());
    }

    #[test]
    fn test_waiter_woken_exactly_once() {
        let (op, resolve, _reject) = create::<&'static str>();
        let counter = Arc::new(CountingWaker::default());

        let mut waiter = op.wait();
        assert!(waiter.is_registered());
        assert!(poll_once(&mut waiter, &counter).is_pending());
        assert!(poll_once(&mut waiter, &counter).is_pending());

        resolve.resolve("done");
        resolve.resolve("again");
        assert_eq!(counter.count(), 1);
        assert!(!waiter.is_registered());

        match poll_once(&mut waiter, &counter) {
            Poll::Ready(outcome) => assert_eq!(outcome.success(), Some("done")),
            Poll::Pending => panic!("waiter not ready after settlement"),
        }
    }

    #[test]
    fn test_unpolled_waiter_sees_settlement() {
        let (op, resolve, _reject) = create::<u8>();
        let mut waiter = op.wait();
        resolve.resolve(3);

        let counter = Arc::new(CountingWaker::default());
        assert!(matches!(
            poll_once(&mut waiter, &counter),
            Poll::Ready(Outcome::Success(3))
        ));
        assert_eq!(counter.count(), 0);
    }

    #[test]
    fn test_drop_deregisters() {
        let (op, resolve, _reject) = create::<u8>();
        let counter = Arc::new(CountingWaker::default());

        let mut kept = op.wait();
        let mut dropped = op.wait();
        assert!(poll_once(&mut kept, &counter).is_pending());
        assert!(poll_once(&mut dropped, &counter).is_pending());
        assert_eq!(op.waiter_count(), 2);

        drop(dropped);
        assert_eq!(op.waiter_count(), 1);

        resolve.resolve(9);
        assert_eq!(counter.count(), 1);
        assert!(poll_once(&mut kept, &counter).is_ready());
    }

    #[test]
    fn test_drop_after_notify_is_harmless() {
        let (op, resolve, _reject) = create::<u8>();
        let counter = Arc::new(CountingWaker::default());

        let mut waiter = op.wait();
        assert!(poll_once(&mut waiter, &counter).is_pending());
        resolve.resolve(1);
        drop(waiter);

        assert_eq!(op.waiter_count(), 0);
        assert!(op.is_settled());
    }

    #[test]
    #[should_panic(expected = "polled after completion")]
    fn test_poll_after_completion_panics() {
        let (op, resolve, _reject) = create::<u8>();
        resolve.resolve(1);

        let counter = Arc::new(CountingWaker::default());
        let mut waiter = op.wait();
        let _ = poll_once(&mut waiter, &counter);
        let _ = poll_once(&mut waiter, &counter);
    }

    #[test]
    fn test_labelled_broadcaster() {
        let config = BroadcastConfig::new().with_label("warmup").with_registry_capacity(8);
        let broadcaster = Broadcaster::<u8>::with_config(config);

        assert_eq!(broadcaster.label(), Some("warmup"));
        assert!(format!("{:?}", broadcaster).contains("warmup"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_register_and_settle() {
        for _ in 0..50 {
            let (op, resolve, _reject) = create::<u64>();

            let mut handles = Vec::new();
            for _ in 0..16 {
                let op = op.clone();
                handles.push(tokio::spawn(async move { op.wait().await }));
            }
            let settler = tokio::spawn(async move { resolve.resolve(5) });

            for handle in handles {
                let outcome = tokio::time::timeout(Duration::from_secs(5), handle)
                    .await
                    .expect("waiter lost its wakeup")
                    .unwrap();
                assert_eq!(outcome.success(), Some(5));
            }
            settler.await.unwrap();
            assert_eq!(op.waiter_count(), 0);
        }
    }

    #[derive(Clone, Debug)]
    enum Step {
        Wait,
        Poll(usize),
        Cancel(usize),
        Resolve(u8),
        Reject,
    }

    fn step() -> impl Strategy<Value = Step> {
        prop_oneof![
            3 => Just(Step::Wait),
            3 => (0usize..16).prop_map(Step::Poll),
            2 => (0usize..16).prop_map(Step::Cancel),
            1 => any::<u8>().prop_map(Step::Resolve),
            1 => Just(Step::Reject),
        ]
    }

    proptest! {
        #[test]
        fn prop_interleavings_respect_single_settlement(steps in prop::collection::vec(step(), 1..64)) {
            let (op, resolve, reject) = create::<u8>();
            let mut waiters: Vec<Option<(Waiter<u8>, Arc<CountingWaker>)>> = Vec::new();
            let mut first: Option<Option<u8>> = None;

            for step in steps {
                match step {
                    Step::Wait => {
                        waiters.push(Some((op.wait(), Arc::new(CountingWaker::default()))));
                    }
                    Step::Poll(i) => {
                        let polled = match waiters.get_mut(i) {
                            Some(Some((waiter, counter))) => Some(poll_once(waiter, counter)),
                            _ => None,
                        };
                        if let Some(Poll::Ready(outcome)) = polled {
                            let expected = first.expect("ready before settlement");
                            prop_assert_eq!(outcome.success(), expected);
                            waiters[i] = None;
                        }
                    }
                    Step::Cancel(i) => {
                        if let Some(slot) = waiters.get_mut(i) {
                            *slot = None;
                        }
                    }
                    Step::Resolve(v) => {
                        resolve.resolve(v);
                        first.get_or_insert(Some(v));
                    }
                    Step::Reject => {
                        reject.reject("rejected");
                        first.get_or_insert(None);
                    }
                }

                if first.is_some() {
                    prop_assert_eq!(op.waiter_count(), 0);
                }
            }

            let live = waiters.iter().flatten().count();
            if first.is_none() {
                prop_assert_eq!(op.waiter_count(), live);
            }

            // Everyone still around completes with the first outcome
            resolve.resolve(255);
            let expected = first.unwrap_or(Some(255));
            for (mut waiter, counter) in waiters.into_iter().flatten() {
                match poll_once(&mut waiter, &counter) {
                    Poll::Ready(outcome) => prop_assert_eq!(outcome.success(), expected),
                    Poll::Pending => prop_assert!(false, "waiter still pending after settlement"),
                }
            }
        }
    }
}
