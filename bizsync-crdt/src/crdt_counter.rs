//! Simplified max counter.
//!
//! A `CrdtCounter` is a single integer whose merge keeps the larger value.
//! Concurrent increments on two replicas are not summed, so the merged
//! value undercounts. That is acceptable for read-mostly display counters
//! (view counts, reminder counts) and never for financial totals; use
//! [`crate::PNCounter`] for those.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// An integer counter whose merge is `max`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CrdtCounter {
    #[serde(default)]
    value: i64,
}

impl CrdtCounter {
    #[must_use]
    pub const fn new(value: i64) -> Self {
        Self { value }
    }

    #[must_use]
    pub const fn value(&self) -> i64 {
        self.value
    }

    #[must_use]
    pub const fn increment(&self, amount: i64) -> Self {
        Self::new(self.value.saturating_add(amount))
    }

    #[must_use]
    pub const fn decrement(&self, amount: i64) -> Self {
        Self::new(self.value.saturating_sub(amount))
    }

    /// Keeps the larger value.
    #[must_use]
    pub fn merged(&self, other: &Self) -> Self {
        Self::new(self.value.max(other.value))
    }

    /// Orders two counters by value; the only ordering this type can offer.
    #[must_use]
    pub fn compare(&self, other: &Self) -> Ordering {
        self.value.cmp(&other.value)
    }
}
