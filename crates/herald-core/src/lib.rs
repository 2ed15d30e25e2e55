//! Herald Core - Settlement values and shared primitives
//!
//! This crate defines the types shared by the broadcaster and its tooling:
//! - Outcome and failure payloads
//! - Waiter identifiers
//! - Broadcast invariants
//! - Tooling error types

pub mod id;
pub mod outcome;
pub mod failure;
pub mod invariants;
pub mod error;

pub use id::*;
pub use outcome::*;
pub use failure::*;
pub use invariants::{BroadcastInvariant, InvariantCompliant, InvariantViolation};
pub use error::*;
