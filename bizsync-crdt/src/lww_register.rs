//! Last-Writer-Wins Register (LWW-Register).
//!
//! A CRDT that stores a single value. Concurrent writes are resolved by
//! comparing hybrid timestamps; the write with the highest timestamp wins.
//! Timestamps embed the issuing node, so two writes never compare equal
//! unless they are the same write.
//!
//! Use cases:
//! - Single-value business fields (invoice status, customer name, due date)
//! - Any field where "last write wins" semantics are acceptable

use bizsync_types::{HlcTimestamp, HybridClock};
use serde::{Deserialize, Serialize};

/// A Last-Writer-Wins Register.
///
/// Stores a value of type `T` along with the timestamp of the write that
/// produced it. The pair is only ever replaced wholesale, and only by a
/// strictly greater timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LWWRegister<T> {
    /// The current value.
    value: T,
    /// Timestamp of the last accepted write.
    timestamp: HlcTimestamp,
}

impl<T> LWWRegister<T> {
    /// Creates a register holding `value` written at `timestamp`.
    #[must_use]
    pub fn new(value: T, timestamp: HlcTimestamp) -> Self {
        Self { value, timestamp }
    }

    /// Creates a register by issuing a fresh timestamp from `clock`.
    #[must_use]
    pub fn with_clock(value: T, clock: &mut HybridClock) -> Self {
        Self::new(value, clock.now())
    }

    /// Returns a reference to the current value.
    #[must_use]
    pub fn value(&self) -> &T {
        &self.value
    }

    /// Consumes the register, returning the value.
    #[must_use]
    pub fn into_value(self) -> T {
        self.value
    }

    /// Returns the timestamp of the last accepted write.
    #[must_use]
    pub fn timestamp(&self) -> &HlcTimestamp {
        &self.timestamp
    }

    /// Returns true if a write at `timestamp` would replace the current value.
    #[must_use]
    pub fn accepts(&self, timestamp: &HlcTimestamp) -> bool {
        timestamp > &self.timestamp
    }
}

impl<T: Clone> LWWRegister<T> {
    /// Returns a register holding `value` if `timestamp` is strictly greater
    /// than the current one; otherwise an unchanged copy.
    ///
    /// Stale and duplicate writes are dropped silently.
    #[must_use]
    pub fn set_value(&self, value: T, timestamp: HlcTimestamp) -> Self {
        if self.accepts(&timestamp) {
            Self::new(value, timestamp)
        } else {
            self.clone()
        }
    }

    /// Performs a local write.
    ///
    /// The clock first observes the current timestamp, so the write wins
    /// even if the stored value came from a node whose clock runs ahead.
    #[must_use]
    pub fn write(&self, value: T, clock: &mut HybridClock) -> Self {
        let timestamp = clock.observe(&self.timestamp);
        Self::new(value, timestamp)
    }

    /// Returns the merge of this register and another.
    ///
    /// The value with the higher timestamp wins. This operation is:
    /// - Commutative: merge(a, b) == merge(b, a)
    /// - Associative: merge(merge(a, b), c) == merge(a, merge(b, c))
    /// - Idempotent: merge(a, a) == a
    #[must_use]
    pub fn merged(&self, other: &Self) -> Self {
        if self.accepts(&other.timestamp) {
            other.clone()
        } else {
            self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bizsync_types::NodeId;

    fn ts(physical: u64, logical: u32, node: &str) -> HlcTimestamp {
        HlcTimestamp::new(physical, logical, NodeId::new(node))
    }

    #[test]
    fn set_value_with_greater_timestamp_replaces() {
        let reg = LWWRegister::new("draft", ts(100, 0, "a"));
        let next = reg.set_value("sent", ts(200, 0, "a"));
        assert_eq!(*next.value(), "sent");
        assert_eq!(*reg.value(), "draft");
    }

    #[test]
    fn set_value_with_equal_or_lower_timestamp_is_noop() {
        let reg = LWWRegister::new("sent", ts(200, 0, "a"));
        assert_eq!(reg.set_value("draft", ts(100, 0, "a")), reg);
        assert_eq!(reg.set_value("paid", ts(200, 0, "a")), reg);
    }

    #[test]
    fn node_id_breaks_ties() {
        let a = LWWRegister::new(1, ts(100, 5, "node-a"));
        let b = LWWRegister::new(2, ts(100, 5, "node-b"));
        assert_eq!(*a.merged(&b).value(), 2);
        assert_eq!(*b.merged(&a).value(), 2);
    }
}
