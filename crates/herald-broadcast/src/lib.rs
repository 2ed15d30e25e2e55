//! Herald Broadcast - Single-settlement deferred value
//!
//! A broadcaster is settled at most once, by the first `resolve` or `reject`.
//! Any number of waiters may await it:
//! - waiters created before settlement park and are all woken by it
//! - waiters created after settlement complete on their first poll
//! - dropping a parked waiter removes it from the registry
//!
//! ```rust
//! # let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
//! # runtime.block_on(async {
//! let (operation, resolver, _rejecter) = herald_broadcast::create::<u32>();
//!
//! let waiter = operation.wait();
//! resolver.resolve(42);
//!
//! assert_eq!(waiter.await.success(), Some(42));
//! assert_eq!(operation.wait().await.success(), Some(42));
//! # });
//! ```

mod shared;
mod registry;
pub mod config;
pub mod waiter;
pub mod broadcaster;

pub use config::*;
pub use waiter::*;
pub use broadcaster::*;

pub use herald_core::{Failure, Outcome, OutcomeKind, UnknownError, WaiterId};
