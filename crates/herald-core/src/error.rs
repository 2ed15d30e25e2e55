//! Error types for Herald tooling
//!
//! The broadcaster itself never fails: rejection travels as
//! [`Outcome::Failure`](crate::Outcome::Failure) and cancellation is silent.
//! These errors belong to the code that drives and audits broadcasters.

use thiserror::Error;

use crate::{InvariantViolation, WaiterId};

#[derive(Error, Debug)]
pub enum HeraldError {
    #[error("Invalid scenario: {0}")]
    InvalidScenario(String),

    #[error("Waiter {0} panicked")]
    WaiterPanicked(WaiterId),

    #[error(transparent)]
    InvariantViolation(#[from] InvariantViolation),

    #[error("{0} invariant violations")]
    InvariantViolations(usize),
}

/// Result type for Herald tooling
pub type HeraldResult<T> = Result<T, HeraldError>;
