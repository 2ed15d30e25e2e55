//! Herald Test Harness - Scenario testing and invariant auditing
//!
//! This crate provides:
//! - Seeded randomized scenarios over a single broadcaster
//! - Cancellation and settle-race injection
//! - Invariant verification of scenario reports
//! - Test logging setup

pub mod logging;
pub mod scenario;

pub use logging::*;
pub use scenario::*;
