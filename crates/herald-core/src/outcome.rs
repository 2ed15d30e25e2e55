//! Two-armed settlement value

use std::fmt;

use crate::Failure;

/// Which arm an [`Outcome`] is on
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OutcomeKind {
    Success,
    Failure,
}

impl OutcomeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutcomeKind::Success => "success",
            OutcomeKind::Failure => "failure",
        }
    }
}

impl fmt::Display for OutcomeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a settlement: the resolved value or the rejection error
#[derive(Clone, Debug)]
pub enum Outcome<T> {
    Success(T),
    Failure(Failure),
}

impl<T> Outcome<T> {
    #[inline]
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }

    #[inline]
    pub fn is_failure(&self) -> bool {
        matches!(self, Outcome::Failure(_))
    }

    #[inline]
    pub fn kind(&self) -> OutcomeKind {
        match self {
            Outcome::Success(_) => OutcomeKind::Success,
            Outcome::Failure(_) => OutcomeKind::Failure,
        }
    }

    /// Take the success value, discarding a failure
    pub fn success(self) -> Option<T> {
        match self {
            Outcome::Success(value) => Some(value),
            Outcome::Failure(_) => None,
        }
    }

    /// Take the failure, discarding a success value
    pub fn failure(self) -> Option<Failure> {
        match self {
            Outcome::Success(_) => None,
            Outcome::Failure(failure) => Some(failure),
        }
    }

    pub fn as_ref(&self) -> Outcome<&T> {
        match self {
            Outcome::Success(value) => Outcome::Success(value),
            Outcome::Failure(failure) => Outcome::Failure(failure.clone()),
        }
    }

    pub fn map<U, F>(self, f: F) -> Outcome<U>
    where
        F: FnOnce(T) -> U,
    {
        match self {
            Outcome::Success(value) => Outcome::Success(f(value)),
            Outcome::Failure(failure) => Outcome::Failure(failure),
        }
    }

    pub fn into_result(self) -> Result<T, Failure> {
        match self {
            Outcome::Success(value) => Ok(value),
            Outcome::Failure(failure) => Err(failure),
        }
    }
}

impl<T> From<Result<T, Failure>> for Outcome<T> {
    fn from(result: Result<T, Failure>) -> Self {
        match result {
            Ok(value) => Outcome::Success(value),
            Err(failure) => Outcome::Failure(failure),
        }
    }
}

impl<T> From<Outcome<T>> for Result<T, Failure> {
    fn from(outcome: Outcome<T>) -> Self {
        outcome.into_result()
    }
}
