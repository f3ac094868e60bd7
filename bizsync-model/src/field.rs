//! Per-field merge dispatch.
//!
//! An entity is merged one field at a time, each field through the merge
//! of its own CRDT. [`FieldMerger`] runs those merges and remembers how the
//! two versions of every field were ordered, which is what the resolver
//! later classifies.

use bizsync_crdt::{
    CausalOrder, CrdtCounter, CrdtRegister, ElementCodec, LWWRegister, ORSet, PNCounter,
};
use bizsync_types::HlcTimestamp;
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// A CRDT value that can back an entity field.
pub trait CrdtField {
    /// Merges the remote version into this one. Must be commutative,
    /// associative and idempotent.
    fn merge_field(&self, remote: &Self) -> Self;

    /// How this version relates to `remote`.
    fn causal_order(&self, remote: &Self) -> CausalOrder;
}

fn timestamp_order(local: &HlcTimestamp, remote: &HlcTimestamp) -> CausalOrder {
    match local.cmp(remote) {
        Ordering::Less => CausalOrder::Before,
        Ordering::Greater => CausalOrder::After,
        Ordering::Equal => CausalOrder::Equal,
    }
}

// Registers are totally ordered by timestamp, so two register versions are
// never reported as concurrent.
impl<T: Clone> CrdtField for LWWRegister<T> {
    fn merge_field(&self, remote: &Self) -> Self {
        self.merged(remote)
    }

    fn causal_order(&self, remote: &Self) -> CausalOrder {
        timestamp_order(self.timestamp(), remote.timestamp())
    }
}

impl<T: Clone> CrdtField for CrdtRegister<T> {
    fn merge_field(&self, remote: &Self) -> Self {
        self.merged(remote)
    }

    fn causal_order(&self, remote: &Self) -> CausalOrder {
        timestamp_order(self.timestamp(), remote.timestamp())
    }
}

impl CrdtField for PNCounter {
    fn merge_field(&self, remote: &Self) -> Self {
        self.merged(remote)
    }

    fn causal_order(&self, remote: &Self) -> CausalOrder {
        self.clock().compare(remote.clock())
    }
}

impl<T: ElementCodec + Clone> CrdtField for ORSet<T> {
    fn merge_field(&self, remote: &Self) -> Self {
        self.merged(remote)
    }

    fn causal_order(&self, remote: &Self) -> CausalOrder {
        self.clock().compare(remote.clock())
    }
}

impl CrdtField for CrdtCounter {
    fn merge_field(&self, remote: &Self) -> Self {
        self.merged(remote)
    }

    fn causal_order(&self, remote: &Self) -> CausalOrder {
        match self.compare(remote) {
            Ordering::Less => CausalOrder::Before,
            Ordering::Greater => CausalOrder::After,
            Ordering::Equal => CausalOrder::Equal,
        }
    }
}

/// Runs field merges for one entity and records each field's order.
#[derive(Debug, Clone, Default)]
pub struct FieldMerger {
    orders: BTreeMap<String, CausalOrder>,
}

impl FieldMerger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Merges one named field and records how the versions were ordered.
    pub fn merge<F: CrdtField>(&mut self, name: &str, local: &F, remote: &F) -> F {
        self.record(name, local.causal_order(remote));
        local.merge_field(remote)
    }

    /// Merges an optional field. A field present on one side is kept as is
    /// and counts as newer on that side.
    pub fn merge_optional<F: CrdtField + Clone>(
        &mut self,
        name: &str,
        local: Option<&F>,
        remote: Option<&F>,
    ) -> Option<F> {
        match (local, remote) {
            (Some(l), Some(r)) => Some(self.merge(name, l, r)),
            (Some(l), None) => {
                self.record(name, CausalOrder::After);
                Some(l.clone())
            }
            (None, Some(r)) => {
                self.record(name, CausalOrder::Before);
                Some(r.clone())
            }
            (None, None) => None,
        }
    }

    /// Records an order for a field merged outside [`FieldMerger::merge`].
    pub fn record(&mut self, name: &str, order: CausalOrder) {
        self.orders.insert(name.to_string(), order);
    }

    /// Per-field orders recorded so far, by field name.
    #[must_use]
    pub fn orders(&self) -> &BTreeMap<String, CausalOrder> {
        &self.orders
    }

    #[must_use]
    pub fn into_orders(self) -> BTreeMap<String, CausalOrder> {
        self.orders
    }

    /// Names of the fields whose versions were concurrent.
    #[must_use]
    pub fn concurrent_fields(&self) -> Vec<String> {
        self.orders
            .iter()
            .filter(|(_, order)| **order == CausalOrder::Concurrent)
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Combines the field orders into an order for the whole entity.
    ///
    /// Any concurrent field makes the entity concurrent, and so do fields
    /// that are newer on different sides. Equal fields are neutral.
    #[must_use]
    pub fn overall(&self) -> CausalOrder {
        self.orders
            .values()
            .fold(CausalOrder::Equal, |acc, &order| match (acc, order) {
                (CausalOrder::Concurrent, _) | (_, CausalOrder::Concurrent) => {
                    CausalOrder::Concurrent
                }
                (CausalOrder::Equal, other) => other,
                (acc, CausalOrder::Equal) => acc,
                (acc, other) if acc == other => acc,
                _ => CausalOrder::Concurrent,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bizsync_types::NodeId;

    fn node(name: &str) -> NodeId {
        NodeId::new(name)
    }

    #[test]
    fn register_orders_by_timestamp() {
        let older = LWWRegister::new(1, HlcTimestamp::new(10, 0, node("a")));
        let newer = LWWRegister::new(2, HlcTimestamp::new(10, 1, node("a")));
        assert_eq!(older.causal_order(&newer), CausalOrder::Before);
        assert_eq!(newer.causal_order(&older), CausalOrder::After);
        assert_eq!(newer.causal_order(&newer), CausalOrder::Equal);
    }

    #[test]
    fn counter_orders_by_clock() {
        let a = PNCounter::new(node("a")).increment(1).unwrap();
        let b = PNCounter::new(node("b")).increment(1).unwrap();
        assert_eq!(a.causal_order(&b), CausalOrder::Concurrent);
        let ab = a.merged(&b);
        assert_eq!(a.causal_order(&ab), CausalOrder::Before);
    }

    #[test]
    fn merger_records_each_field() {
        let mut merger = FieldMerger::new();
        let a = CrdtCounter::new(3);
        let b = CrdtCounter::new(5);
        let merged = merger.merge("views", &a, &b);
        assert_eq!(merged.value(), 5);
        assert_eq!(merger.orders()["views"], CausalOrder::Before);
    }

    #[test]
    fn overall_of_nothing_is_equal() {
        assert_eq!(FieldMerger::new().overall(), CausalOrder::Equal);
    }

    #[test]
    fn overall_ignores_equal_fields() {
        let mut merger = FieldMerger::new();
        merger.record("a", CausalOrder::Equal);
        merger.record("b", CausalOrder::After);
        merger.record("c", CausalOrder::Equal);
        assert_eq!(merger.overall(), CausalOrder::After);
    }

    #[test]
    fn overall_is_concurrent_when_sides_disagree() {
        let mut merger = FieldMerger::new();
        merger.record("title", CausalOrder::After);
        merger.record("amount", CausalOrder::Before);
        assert_eq!(merger.overall(), CausalOrder::Concurrent);
        assert!(merger.concurrent_fields().is_empty());
    }

    #[test]
    fn overall_is_concurrent_when_any_field_is() {
        let mut merger = FieldMerger::new();
        merger.record("a", CausalOrder::Before);
        merger.record("b", CausalOrder::Concurrent);
        assert_eq!(merger.overall(), CausalOrder::Concurrent);
        assert_eq!(merger.concurrent_fields(), vec!["b".to_string()]);
    }

    #[test]
    fn optional_field_on_one_side_is_kept() {
        let mut merger = FieldMerger::new();
        let only_remote = CrdtCounter::new(4);
        let merged = merger.merge_optional("reminders", None, Some(&only_remote));
        assert_eq!(merged, Some(only_remote));
        assert_eq!(merger.orders()["reminders"], CausalOrder::Before);
    }
}
