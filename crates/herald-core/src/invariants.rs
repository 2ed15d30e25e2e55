//! Broadcast invariants
//!
//! Every broadcaster must uphold all of these, under any interleaving of
//! settle calls, registrations and cancellations.
//!
//! # The Five Invariants
//!
//! 1. **Single Settlement** - at most one settlement event ever happens
//! 2. **First Writer Wins** - the first resolve/reject decides the outcome
//! 3. **Late Subscriber Equivalence** - waiters created after settlement see
//!    the same outcome, without suspending
//! 4. **No Lost Wakeup** - a waiter registered before a settle call is woken
//!    by that call
//! 5. **Cancellation Cleanup** - a cancelled waiter leaves the registry and is
//!    never resumed
//!
//! # Usage
//!
//! Harnesses collect observations and run [`check_all_invariants`] over them.
//!
//! ```rust
//! use herald_core::invariants::{check_all_invariants, BroadcastInvariant};
//!
//! let (registered, woken) = (3, 3);
//! let violations = check_all_invariants(|invariant| match invariant {
//!     BroadcastInvariant::NoLostWakeup if woken != registered => {
//!         Err(format!("{} of {} waiters woken", woken, registered))
//!     }
//!     _ => Ok(()),
//! });
//! assert!(violations.is_empty());
//! ```

use std::fmt;

use thiserror::Error;

/// The invariants of a single-settlement broadcaster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum BroadcastInvariant {
    /// The settlement slot is written at most once and never changes after.
    SingleSettlement = 1,

    /// Later resolve/reject calls are silent no-ops; the earliest one is the
    /// outcome every waiter observes.
    FirstWriterWins = 2,

    /// A waiter created after settlement completes on its first poll with the
    /// same discriminant and payload as waiters created before it.
    LateSubscriberEquivalence = 3,

    /// Registration and the "already settled" check are atomic with respect
    /// to a racing settle call.
    NoLostWakeup = 4,

    /// Cancelling a pending waiter removes its registry entry exactly once;
    /// settlement never touches it afterwards.
    CancellationCleanup = 5,
}

impl BroadcastInvariant {
    /// Kebab-case identifier used in logs and reports
    pub fn slug(&self) -> &'static str {
        match self {
            BroadcastInvariant::SingleSettlement => "single-settlement",
            BroadcastInvariant::FirstWriterWins => "first-writer-wins",
            BroadcastInvariant::LateSubscriberEquivalence => "late-subscriber-equivalence",
            BroadcastInvariant::NoLostWakeup => "no-lost-wakeup",
            BroadcastInvariant::CancellationCleanup => "cancellation-cleanup",
        }
    }

    /// Human readable name
    pub fn name(&self) -> &'static str {
        match self {
            BroadcastInvariant::SingleSettlement => "Single Settlement",
            BroadcastInvariant::FirstWriterWins => "First Writer Wins",
            BroadcastInvariant::LateSubscriberEquivalence => "Late Subscriber Equivalence",
            BroadcastInvariant::NoLostWakeup => "No Lost Wakeup",
            BroadcastInvariant::CancellationCleanup => "Cancellation Cleanup",
        }
    }

    pub fn all() -> &'static [BroadcastInvariant] {
        &[
            BroadcastInvariant::SingleSettlement,
            BroadcastInvariant::FirstWriterWins,
            BroadcastInvariant::LateSubscriberEquivalence,
            BroadcastInvariant::NoLostWakeup,
            BroadcastInvariant::CancellationCleanup,
        ]
    }
}

impl fmt::Display for BroadcastInvariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name(), self.slug())
    }
}

/// A single observed violation
#[derive(Error, Debug, Clone)]
#[error("Broadcast invariant violated: {invariant} - {context}")]
pub struct InvariantViolation {
    pub invariant: BroadcastInvariant,
    pub context: String,
}

impl InvariantViolation {
    pub fn new(invariant: BroadcastInvariant, context: impl Into<String>) -> Self {
        InvariantViolation {
            invariant,
            context: context.into(),
        }
    }
}

/// Assert that an invariant holds, panicking if it does not.
///
/// # Panics
///
/// Panics if `check` returns `false`.
#[track_caller]
pub fn assert_invariant<F>(invariant: BroadcastInvariant, context: &str, check: F)
where
    F: FnOnce() -> bool,
{
    if !check() {
        panic!("{}", InvariantViolation::new(invariant, context));
    }
}

/// Run `checker` against every invariant and collect the failures.
pub fn check_all_invariants<F>(mut checker: F) -> Vec<InvariantViolation>
where
    F: FnMut(BroadcastInvariant) -> Result<(), String>,
{
    let mut violations = Vec::new();

    for &invariant in BroadcastInvariant::all() {
        if let Err(context) = checker(invariant) {
            violations.push(InvariantViolation { invariant, context });
        }
    }

    violations
}

/// Types that can audit themselves against the broadcast invariants.
pub trait InvariantCompliant {
    /// `Ok(())` if every invariant holds, the violations otherwise.
    fn verify_invariants(&self) -> Result<(), Vec<InvariantViolation>>;
}
