//! Identity types for Herald
//!
//! Waiter ids are handed out per broadcaster from a monotonically increasing
//! counter and never reused within it.

use std::fmt;

/// Registry key of one suspended waiter
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct WaiterId(pub u64);

impl WaiterId {
    pub const ZERO: WaiterId = WaiterId(0);

    #[inline]
    pub fn new(id: u64) -> Self {
        WaiterId(id)
    }

    /// The id following this one
    #[inline]
    pub fn next(self) -> Self {
        WaiterId(self.0.wrapping_add(1))
    }

    #[inline]
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for WaiterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Waiter({})", self.0)
    }
}

impl fmt::Display for WaiterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "w{}", self.0)
    }
}
