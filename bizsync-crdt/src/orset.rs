//! Observed-Remove Set (OR-Set / Add-Wins Set).
//!
//! A CRDT set that supports both add and remove operations. Each add mints
//! a unique tag; a remove retires exactly the tags the remover has seen.
//! An element is in the set while at least one of its tags is not retired,
//! so an add that the remover never observed survives the remove
//! (add-wins), while an observed add stays removed after any merge.
//!
//! Use cases:
//! - Line items attached to an invoice
//! - Labels on a customer record
//! - Payment ids allocated against an invoice
//!
//! Elements are keyed by their [`ElementCodec`] string so that the
//! serialized form can carry any supported element type.

use crate::{CrdtError, CrdtResult, ElementCodec, VectorClock};
use bizsync_types::{NodeId, wall_clock_millis};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::{BTreeMap, BTreeSet};

/// A unique tag identifying a specific add operation.
///
/// Uniqueness comes from `(node_id, counter)`: the counter is local to the
/// node and never reused. `timestamp` (wall-clock ms) is informational.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Tag {
    node_id: NodeId,
    counter: u64,
    #[serde(default)]
    timestamp: u64,
}

impl Tag {
    #[must_use]
    pub fn new(node_id: NodeId, counter: u64, timestamp: u64) -> Self {
        Self {
            node_id,
            counter,
            timestamp,
        }
    }

    #[must_use]
    pub fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    #[must_use]
    pub const fn counter(&self) -> u64 {
        self.counter
    }

    #[must_use]
    pub const fn timestamp(&self) -> u64 {
        self.timestamp
    }
}

#[derive(Debug, Clone)]
struct Entry<T> {
    value: T,
    tags: BTreeSet<Tag>,
}

/// An Observed-Remove Set (OR-Set) owned by one node.
#[derive(Debug, Clone)]
pub struct ORSet<T> {
    node_id: NodeId,
    /// Map from encoded element to its value and every add-tag seen for it.
    entries: BTreeMap<String, Entry<T>>,
    /// Tags retired by a remove (tombstones).
    removed: BTreeSet<Tag>,
    clock: VectorClock,
    /// Highest tag counter issued or seen; the next add uses counter + 1.
    tag_counter: u64,
}

impl<T> ORSet<T> {
    /// Creates a new empty set.
    #[must_use]
    pub fn new(node_id: NodeId) -> Self {
        Self {
            clock: VectorClock::new(node_id.clone()),
            node_id,
            entries: BTreeMap::new(),
            removed: BTreeSet::new(),
            tag_counter: 0,
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

    #[must_use]
    pub const fn tag_counter(&self) -> u64 {
        self.tag_counter
    }

    /// Returns all retired tags.
    #[must_use]
    pub fn removed_tags(&self) -> &BTreeSet<Tag> {
        &self.removed
    }

    fn is_live(&self, entry: &Entry<T>) -> bool {
        entry.tags.iter().any(|tag| !self.removed.contains(tag))
    }

    /// Highest counter among the owner's tags anywhere in the state.
    ///
    /// The tag counter must never fall below it, or the next add would
    /// reissue an existing tag.
    fn own_max_counter(&self) -> u64 {
        self.entries
            .values()
            .flat_map(|entry| entry.tags.iter())
            .chain(self.removed.iter())
            .filter(|tag| tag.node_id == self.node_id)
            .map(|tag| tag.counter)
            .max()
            .unwrap_or(0)
    }

    /// Returns an iterator over the live elements, ordered by encoded key.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.entries
            .values()
            .filter(|entry| self.is_live(entry))
            .map(|entry| &entry.value)
    }

    /// Returns the number of live elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    /// Returns true if no element is live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }
}

impl<T: ElementCodec + Clone> ORSet<T> {
    /// Builds a set owned by `node_id` from an iterator, one tag per element.
    pub fn from_elements(node_id: NodeId, elements: impl IntoIterator<Item = T>) -> Self {
        elements
            .into_iter()
            .fold(Self::new(node_id), |set, element| set.add(element))
    }

    /// Returns true if the set contains the element.
    #[must_use]
    pub fn contains(&self, element: &T) -> bool {
        self.entries
            .get(&element.encode_element())
            .is_some_and(|entry| self.is_live(entry))
    }

    /// Returns the live elements, cloned.
    #[must_use]
    pub fn elements(&self) -> Vec<T> {
        self.iter().cloned().collect()
    }

    /// Returns every tag seen for an element, retired or not.
    #[must_use]
    pub fn tags_for(&self, element: &T) -> Option<&BTreeSet<Tag>> {
        self.entries
            .get(&element.encode_element())
            .map(|entry| &entry.tags)
    }

    /// Returns a set with `element` added under a freshly minted tag.
    ///
    /// Adding an element that is already present adds another tag.
    #[must_use]
    pub fn add(&self, element: T) -> Self {
        self.add_tagged(element).0
    }

    /// Like [`ORSet::add`], also returning the minted tag.
    #[must_use]
    pub fn add_tagged(&self, element: T) -> (Self, Tag) {
        let counter = self.tag_counter.saturating_add(1);
        let tag = Tag::new(self.node_id.clone(), counter, wall_clock_millis());

        let mut next = self.clone();
        next.tag_counter = counter;
        next.clock = self.clock.tick();
        next.insert_tag(element, tag.clone());
        (next, tag)
    }

    /// Returns a set with `element` attached to an existing tag, for
    /// replaying an add performed elsewhere.
    #[must_use]
    pub fn add_with_tag(&self, element: T, tag: Tag) -> Self {
        let mut next = self.clone();
        if tag.node_id == self.node_id {
            next.tag_counter = next.tag_counter.max(tag.counter);
        }
        next.insert_tag(element, tag);
        next
    }

    fn insert_tag(&mut self, element: T, tag: Tag) {
        self.entries
            .entry(element.encode_element())
            .or_insert_with(|| Entry {
                value: element,
                tags: BTreeSet::new(),
            })
            .tags
            .insert(tag);
    }

    /// Returns a set with every currently known tag of `element` retired.
    ///
    /// Tags added concurrently on other replicas are unaffected and keep
    /// the element alive once merged.
    #[must_use]
    pub fn remove(&self, element: &T) -> Self {
        let Some(entry) = self.entries.get(&element.encode_element()) else {
            return self.clone();
        };
        let fresh: Vec<Tag> = entry
            .tags
            .iter()
            .filter(|tag| !self.removed.contains(tag))
            .cloned()
            .collect();
        if fresh.is_empty() {
            return self.clone();
        }

        let mut next = self.clone();
        next.removed.extend(fresh);
        next.clock = self.clock.tick();
        next
    }

    /// Returns a set with specific tags retired, for replaying a remove
    /// performed elsewhere.
    #[must_use]
    pub fn remove_tags(&self, tags: &[Tag]) -> Self {
        let mut next = self.clone();
        next.removed.extend(tags.iter().cloned());
        next.tag_counter = next.tag_counter.max(next.own_max_counter());
        next
    }

    /// Returns the merge of this set and another.
    ///
    /// Unions the tags per element and the retired tags, joins the clocks
    /// and keeps the larger tag counter. The owner is kept from `self`.
    #[must_use]
    pub fn merged(&self, other: &Self) -> Self {
        let mut result = self.clone();
        for (key, other_entry) in &other.entries {
            result
                .entries
                .entry(key.clone())
                .or_insert_with(|| Entry {
                    value: other_entry.value.clone(),
                    tags: BTreeSet::new(),
                })
                .tags
                .extend(other_entry.tags.iter().cloned());
        }
        result.removed.extend(other.removed.iter().cloned());
        result.clock = self.clock.merged(&other.clock);
        result.tag_counter = self.tag_counter.max(other.tag_counter);
        result
    }

    /// Returns the same state owned by a different node.
    #[must_use]
    pub fn with_node(&self, node_id: NodeId) -> Self {
        let mut next = self.clone();
        next.clock = self.clock.with_node(node_id.clone());
        next.node_id = node_id;
        next.tag_counter = next.tag_counter.max(next.own_max_counter());
        next
    }
}

impl<T> PartialEq for ORSet<T> {
    fn eq(&self, other: &Self) -> bool {
        // Replicated state only; the owner is local context.
        self.removed == other.removed
            && self.tag_counter == other.tag_counter
            && self.clock == other.clock
            && self.entries.len() == other.entries.len()
            && self
                .entries
                .iter()
                .zip(&other.entries)
                .all(|((ka, a), (kb, b))| ka == kb && a.tags == b.tags)
    }
}

impl<T> Eq for ORSet<T> {}

/// Canonical serialized form.
#[derive(Serialize, Deserialize)]
struct ORSetState {
    node_id: NodeId,
    #[serde(default)]
    elements: BTreeMap<String, BTreeSet<Tag>>,
    #[serde(default)]
    removed_tags: BTreeSet<Tag>,
    #[serde(default)]
    vector_clock: BTreeMap<NodeId, u64>,
    #[serde(default)]
    tag_counter: u64,
    /// Written for readers that do not evaluate tags; ignored on load.
    #[serde(default)]
    current_elements: Vec<String>,
}

impl<T: ElementCodec + Clone> From<&ORSet<T>> for ORSetState {
    fn from(set: &ORSet<T>) -> Self {
        Self {
            node_id: set.node_id.clone(),
            elements: set
                .entries
                .iter()
                .map(|(key, entry)| (key.clone(), entry.tags.clone()))
                .collect(),
            removed_tags: set.removed.clone(),
            vector_clock: set.clock.to_map(),
            tag_counter: set.tag_counter,
            current_elements: set.iter().map(ElementCodec::encode_element).collect(),
        }
    }
}

impl<T: ElementCodec + Clone> TryFrom<ORSetState> for ORSet<T> {
    type Error = CrdtError;

    fn try_from(state: ORSetState) -> CrdtResult<Self> {
        let mut entries = BTreeMap::new();
        for (key, tags) in state.elements {
            if tags.is_empty() {
                continue;
            }
            let value = T::decode_element(&key)?;
            entries.insert(key, Entry { value, tags });
        }

        let mut set = Self {
            clock: VectorClock::from_entries(state.node_id.clone(), state.vector_clock),
            node_id: state.node_id,
            entries,
            removed: state.removed_tags,
            tag_counter: state.tag_counter,
        };
        set.tag_counter = set.tag_counter.max(set.own_max_counter());
        Ok(set)
    }
}

impl<T: ElementCodec + Clone> Serialize for ORSet<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        ORSetState::from(self).serialize(serializer)
    }
}

impl<'de, T: ElementCodec + Clone> Deserialize<'de> for ORSet<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let state = ORSetState::deserialize(deserializer)?;
        Self::try_from(state).map_err(serde::de::Error::custom)
    }
}
