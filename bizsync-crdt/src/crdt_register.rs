//! Simplified timestamp register.
//!
//! A `CrdtRegister` has the same merge rule as [`crate::LWWRegister`] and
//! no write-validation API: [`CrdtRegister::set`] always succeeds, stamping
//! the new value past the stored timestamp so that the register never
//! moves backwards. Use it for read-mostly display fields.

use bizsync_types::{HlcTimestamp, HybridClock};
use serde::{Deserialize, Serialize};

/// A register ordered purely by hybrid timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrdtRegister<T> {
    value: T,
    timestamp: HlcTimestamp,
}

impl<T> CrdtRegister<T> {
    #[must_use]
    pub fn new(value: T, timestamp: HlcTimestamp) -> Self {
        Self { value, timestamp }
    }

    #[must_use]
    pub fn value(&self) -> &T {
        &self.value
    }

    #[must_use]
    pub fn timestamp(&self) -> &HlcTimestamp {
        &self.timestamp
    }

    /// Replaces the value. The new timestamp is issued by `clock` after
    /// observing the stored one, so it is always greater.
    #[must_use]
    pub fn set(&self, value: T, clock: &mut HybridClock) -> Self {
        Self::new(value, clock.observe(&self.timestamp))
    }
}

impl<T: Clone> CrdtRegister<T> {
    /// The higher timestamp wins.
    #[must_use]
    pub fn merged(&self, other: &Self) -> Self {
        if other.timestamp > self.timestamp {
            other.clone()
        } else {
            self.clone()
        }
    }
}
