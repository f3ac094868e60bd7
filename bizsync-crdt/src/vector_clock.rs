//! Vector Clock for causality tracking.
//!
//! A vector clock tracks one logical counter per known node, enabling
//! determination of causality (happens-before relationships) between
//! replica states.
//!
//! Use cases:
//! - Detecting concurrent updates (the signal that a real conflict exists)
//! - Skipping merges when the local replica already dominates the remote one
//! - Ordering counter and set operations for CRDT merge
//!
//! The serialized form is a flat `{ "<node>": <counter> }` map. Entries for
//! nodes this replica has never heard of are kept verbatim.

use crate::{CrdtError, CrdtResult};
use bizsync_types::NodeId;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::{BTreeMap, BTreeSet};
use tracing::warn;

/// Causality relationship between two vector clocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CausalOrder {
    /// First clock happened before second.
    Before,
    /// First clock happened after second.
    After,
    /// Clocks are concurrent (neither happened before the other).
    Concurrent,
    /// Clocks are identical.
    Equal,
}

impl CausalOrder {
    /// The same relationship seen from the other side.
    #[must_use]
    pub const fn reverse(self) -> Self {
        match self {
            Self::Before => Self::After,
            Self::After => Self::Before,
            other => other,
        }
    }
}

/// A Vector Clock owned by one node.
///
/// Every entry only ever grows. `tick` advances the owner's own entry;
/// `update` folds in an observed remote clock and then ticks.
#[derive(Debug, Clone)]
pub struct VectorClock {
    /// The node whose events advance this clock.
    node_id: NodeId,
    /// Map from node ID to logical time at that node.
    clocks: BTreeMap<NodeId, u64>,
}

impl VectorClock {
    /// Creates a clock for `node_id` with its own entry at 0.
    #[must_use]
    pub fn new(node_id: NodeId) -> Self {
        Self::from_entries(node_id, BTreeMap::new())
    }

    /// Rebuilds a clock from a serialized map.
    ///
    /// The owner's entry is inserted at 0 if absent; unknown nodes are kept.
    #[must_use]
    pub fn from_entries(node_id: NodeId, mut clocks: BTreeMap<NodeId, u64>) -> Self {
        clocks.entry(node_id.clone()).or_insert(0);
        Self { node_id, clocks }
    }

    /// Parses the flat JSON map form.
    pub fn parse(node_id: NodeId, json: &str) -> CrdtResult<Self> {
        let clocks: BTreeMap<NodeId, u64> = serde_json::from_str(json)
            .map_err(|e| CrdtError::MalformedState(format!("vector clock: {e}")))?;
        Ok(Self::from_entries(node_id, clocks))
    }

    /// Parses the flat JSON map form, falling back to a fresh clock.
    ///
    /// The fallback discards whatever causal history the input held. Prefer
    /// [`VectorClock::parse`] wherever the caller can surface the error.
    #[must_use]
    pub fn parse_lossy(node_id: NodeId, json: &str) -> Self {
        match Self::parse(node_id.clone(), json) {
            Ok(clock) => clock,
            Err(e) => {
                warn!(node = %node_id, error = %e, "resetting unreadable vector clock");
                Self::new(node_id)
            }
        }
    }

    /// Returns the owning node.
    #[must_use]
    pub fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    /// Returns the logical time for a node (0 if not present).
    #[must_use]
    pub fn get(&self, node_id: &NodeId) -> u64 {
        self.clocks.get(node_id).copied().unwrap_or(0)
    }

    /// Returns the owner's own counter.
    #[must_use]
    pub fn local_time(&self) -> u64 {
        self.get(&self.node_id)
    }

    /// Returns all nodes and their times, ordered by node id.
    pub fn entries(&self) -> impl Iterator<Item = (&NodeId, u64)> {
        self.clocks.iter().map(|(node, &time)| (node, time))
    }

    /// Returns a copy of the underlying map, the serialized form.
    #[must_use]
    pub fn to_map(&self) -> BTreeMap<NodeId, u64> {
        self.clocks.clone()
    }

    /// Returns the number of nodes in the clock.
    #[must_use]
    pub fn len(&self) -> usize {
        self.clocks.len()
    }

    /// Returns true if the clock has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.clocks.is_empty()
    }

    /// Returns a clock with the owner's counter advanced by one.
    ///
    /// Called whenever the owner performs a local event.
    #[must_use]
    pub fn tick(&self) -> Self {
        let mut next = self.clone();
        let entry = next.clocks.entry(next.node_id.clone()).or_insert(0);
        *entry = entry.saturating_add(1);
        next
    }

    /// Folds in an observed remote clock, then ticks.
    ///
    /// Used when the owner observes a remote state before acting on it.
    #[must_use]
    pub fn update(&self, remote: &Self) -> Self {
        self.merged(remote).tick()
    }

    /// Returns the component-wise maximum of both clocks, without ticking.
    ///
    /// This is the join used by CRDT merges; it is commutative,
    /// associative, and idempotent. The owner is kept from `self`.
    #[must_use]
    pub fn merged(&self, other: &Self) -> Self {
        let mut result = self.clone();
        for (node_id, &time) in &other.clocks {
            let entry = result.clocks.entry(node_id.clone()).or_insert(0);
            if time > *entry {
                *entry = time;
            }
        }
        result
    }

    /// Returns the same history owned by a different node.
    #[must_use]
    pub fn with_node(&self, node_id: NodeId) -> Self {
        Self::from_entries(node_id, self.clocks.clone())
    }

    /// Compares this clock with another to determine causal ordering.
    ///
    /// Missing entries count as 0 on either side.
    #[must_use]
    pub fn compare(&self, other: &Self) -> CausalOrder {
        let mut self_ge = true; // self >= other for all nodes
        let mut other_ge = true; // other >= self for all nodes

        let all_nodes: BTreeSet<&NodeId> =
            self.clocks.keys().chain(other.clocks.keys()).collect();

        for node_id in all_nodes {
            let self_time = self.get(node_id);
            let other_time = other.get(node_id);

            if self_time < other_time {
                self_ge = false;
            }
            if other_time < self_time {
                other_ge = false;
            }
        }

        match (self_ge, other_ge) {
            (true, true) => CausalOrder::Equal,
            (true, false) => CausalOrder::After,
            (false, true) => CausalOrder::Before,
            (false, false) => CausalOrder::Concurrent,
        }
    }

    /// Returns true if every entry is <= the other's and at least one is <.
    #[must_use]
    pub fn happens_before(&self, other: &Self) -> bool {
        self.compare(other) == CausalOrder::Before
    }

    /// Returns true if the other clock happens before this one.
    #[must_use]
    pub fn happens_after(&self, other: &Self) -> bool {
        other.happens_before(self)
    }

    /// Returns true if neither clock happened before the other and they differ.
    #[must_use]
    pub fn is_concurrent_with(&self, other: &Self) -> bool {
        self.compare(other) == CausalOrder::Concurrent
    }

    /// Returns true if this clock has seen everything the other has (>= for all nodes).
    #[must_use]
    pub fn dominates(&self, other: &Self) -> bool {
        matches!(self.compare(other), CausalOrder::After | CausalOrder::Equal)
    }
}

impl PartialEq for VectorClock {
    fn eq(&self, other: &Self) -> bool {
        self.compare(other) == CausalOrder::Equal
    }
}

impl Eq for VectorClock {}

impl Serialize for VectorClock {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.clocks.serialize(serializer)
    }
}
