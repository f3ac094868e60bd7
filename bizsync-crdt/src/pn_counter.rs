//! Positive-Negative Counter CRDT.
//!
//! A PN-Counter supports both increment and decrement operations across
//! distributed nodes. It pairs two grow-only counters (positive and
//! negative) keyed by node ID. The value is `sum(positive) - sum(negative)`.
//!
//! Each node only ever raises its own entries, so merge can take the
//! per-node maximum and count every increment exactly once, however many
//! times the same remote state is delivered.

use crate::{CrdtError, CrdtResult, VectorClock};
use bizsync_types::NodeId;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::{BTreeMap, BTreeSet};

/// A Positive-Negative Counter CRDT owned by one node.
#[derive(Debug, Clone)]
pub struct PNCounter {
    node_id: NodeId,
    positive: BTreeMap<NodeId, u64>,
    negative: BTreeMap<NodeId, u64>,
    clock: VectorClock,
}

impl PNCounter {
    /// Creates a new counter with value 0.
    #[must_use]
    pub fn new(node_id: NodeId) -> Self {
        Self {
            clock: VectorClock::new(node_id.clone()),
            node_id,
            positive: BTreeMap::new(),
            negative: BTreeMap::new(),
        }
    }

    /// Returns the owning node.
    #[must_use]
    pub fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    /// Returns the causal history of this replica.
    #[must_use]
    pub fn clock(&self) -> &VectorClock {
        &self.clock
    }

    /// Returns a counter with the owner's increments raised by `amount`.
    ///
    /// Fails with [`CrdtError::InvalidArgument`] for a negative amount;
    /// use [`PNCounter::decrement`] instead.
    pub fn increment(&self, amount: i64) -> CrdtResult<Self> {
        let amount = non_negative("increment", amount)?;
        let mut next = self.clone();
        bump(&mut next.positive, &self.node_id, amount);
        next.clock = self.clock.tick();
        Ok(next)
    }

    /// Returns a counter with the owner's decrements raised by `amount`.
    ///
    /// Fails with [`CrdtError::InvalidArgument`] for a negative amount.
    pub fn decrement(&self, amount: i64) -> CrdtResult<Self> {
        let amount = non_negative("decrement", amount)?;
        let mut next = self.clone();
        bump(&mut next.negative, &self.node_id, amount);
        next.clock = self.clock.tick();
        Ok(next)
    }

    /// Returns the current counter value (may be negative).
    ///
    /// Recomputed from the per-node entries on every call.
    #[must_use]
    pub fn value(&self) -> i64 {
        let pos: i128 = self.positive.values().map(|&v| i128::from(v)).sum();
        let neg: i128 = self.negative.values().map(|&v| i128::from(v)).sum();
        (pos - neg).clamp(i128::from(i64::MIN), i128::from(i64::MAX)) as i64
    }

    /// Returns the total increments recorded for a node.
    #[must_use]
    pub fn positive_for(&self, node_id: &NodeId) -> u64 {
        self.positive.get(node_id).copied().unwrap_or(0)
    }

    /// Returns the total decrements recorded for a node.
    #[must_use]
    pub fn negative_for(&self, node_id: &NodeId) -> u64 {
        self.negative.get(node_id).copied().unwrap_or(0)
    }

    /// Returns the merge of this counter and another (per-node max in each map).
    ///
    /// The owner is kept from `self`.
    #[must_use]
    pub fn merged(&self, other: &Self) -> Self {
        let mut result = self.clone();
        for (node_id, &count) in &other.positive {
            let entry = result.positive.entry(node_id.clone()).or_insert(0);
            *entry = (*entry).max(count);
        }
        for (node_id, &count) in &other.negative {
            let entry = result.negative.entry(node_id.clone()).or_insert(0);
            *entry = (*entry).max(count);
        }
        result.clock = self.clock.merged(&other.clock);
        result
    }

    /// Returns the same state owned by a different node.
    #[must_use]
    pub fn with_node(&self, node_id: NodeId) -> Self {
        Self {
            clock: self.clock.with_node(node_id.clone()),
            node_id,
            positive: self.positive.clone(),
            negative: self.negative.clone(),
        }
    }
}

fn non_negative(op: &str, amount: i64) -> CrdtResult<u64> {
    u64::try_from(amount).map_err(|_| {
        CrdtError::InvalidArgument(format!("{op} amount must be non-negative, got {amount}"))
    })
}

fn bump(map: &mut BTreeMap<NodeId, u64>, node_id: &NodeId, amount: u64) {
    let entry = map.entry(node_id.clone()).or_insert(0);
    *entry = entry.saturating_add(amount);
}

fn same_counts(a: &BTreeMap<NodeId, u64>, b: &BTreeMap<NodeId, u64>) -> bool {
    let all_nodes: BTreeSet<_> = a.keys().chain(b.keys()).collect();
    all_nodes.into_iter().all(|node| {
        a.get(node).copied().unwrap_or(0) == b.get(node).copied().unwrap_or(0)
    })
}

impl PartialEq for PNCounter {
    fn eq(&self, other: &Self) -> bool {
        // Replicated state only; the owner is local context.
        same_counts(&self.positive, &other.positive)
            && same_counts(&self.negative, &other.negative)
            && self.clock == other.clock
    }
}

impl Eq for PNCounter {}

/// Canonical serialized form.
#[derive(Serialize, Deserialize)]
struct PNCounterState {
    node_id: NodeId,
    #[serde(default)]
    positive_counters: BTreeMap<NodeId, u64>,
    #[serde(default)]
    negative_counters: BTreeMap<NodeId, u64>,
    #[serde(default)]
    vector_clock: BTreeMap<NodeId, u64>,
    /// Written for readers that do not recompute; ignored on load.
    #[serde(default)]
    current_value: i64,
}

impl Serialize for PNCounter {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        PNCounterState {
            node_id: self.node_id.clone(),
            positive_counters: self.positive.clone(),
            negative_counters: self.negative.clone(),
            vector_clock: self.clock.to_map(),
            current_value: self.value(),
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for PNCounter {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let state = PNCounterState::deserialize(deserializer)?;
        Ok(Self {
            clock: VectorClock::from_entries(state.node_id.clone(), state.vector_clock),
            node_id: state.node_id,
            positive: state.positive_counters,
            negative: state.negative_counters,
        })
    }
}
