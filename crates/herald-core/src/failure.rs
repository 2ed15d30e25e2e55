//! Failure payload carried by a rejected settlement
//!
//! A [`Failure`] is a shared pointer to an arbitrary error. Cloning it never
//! copies the error, so every waiter that observes one rejection holds the
//! very same error instance.

use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;

/// Stand-in error for a rejection that carried no payload
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[error("unknown error")]
pub struct UnknownError;

/// Plain text error produced by [`Failure::msg`]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct FailureMessage(pub String);

/// Error payload of [`Outcome::Failure`](crate::Outcome::Failure)
#[derive(Clone)]
pub struct Failure(Arc<dyn StdError + Send + Sync + 'static>);

impl Failure {
    /// Wrap an error
    pub fn new<E>(error: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Failure(Arc::new(error))
    }

    /// Build a failure from a message
    pub fn msg(message: impl Into<String>) -> Self {
        Failure::new(FailureMessage(message.into()))
    }

    /// The generic "unknown error" failure
    pub fn unknown() -> Self {
        Failure::new(UnknownError)
    }

    /// Normalize an optional payload; a missing error becomes [`UnknownError`]
    pub fn from_option<E>(error: Option<E>) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        match error {
            Some(error) => Failure::new(error),
            None => Failure::unknown(),
        }
    }

    /// True when both handles point at the same error allocation
    pub fn same_instance(&self, other: &Failure) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// True if this failure is the normalized [`UnknownError`]
    pub fn is_unknown(&self) -> bool {
        self.downcast_ref::<UnknownError>().is_some()
    }

    /// Try to view the wrapped error as a concrete type
    pub fn downcast_ref<E>(&self) -> Option<&E>
    where
        E: StdError + 'static,
    {
        self.0.downcast_ref::<E>()
    }

    /// Borrow the wrapped error
    pub fn as_error(&self) -> &(dyn StdError + Send + Sync + 'static) {
        &*self.0
    }
}

impl fmt::Debug for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Failure").field(&self.0).finish()
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&*self.0, f)
    }
}

impl StdError for Failure {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.0.source()
    }
}

impl From<Box<dyn StdError + Send + Sync + 'static>> for Failure {
    fn from(error: Box<dyn StdError + Send + Sync + 'static>) -> Self {
        Failure(Arc::from(error))
    }
}

impl From<String> for Failure {
    fn from(message: String) -> Self {
        Failure::msg(message)
    }
}

impl From<&str> for Failure {
    fn from(message: &str) -> Self {
        Failure::msg(message)
    }
}
