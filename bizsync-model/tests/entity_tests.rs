//! A typed business entity built from CRDT fields.

use bizsync_crdt::{CausalOrder, CrdtCounter, LWWRegister, ORSet, PNCounter};
use bizsync_model::{ConflictResolver, ConflictType, FieldMerger, MergeableEntity};
use bizsync_types::{EntityId, HybridClock, ManualClock, NodeId};
use pretty_assertions::assert_eq;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Invoice {
    id: EntityId,
    status: LWWRegister<String>,
    customer: LWWRegister<String>,
    amount_paid: PNCounter,
    line_items: ORSet<String>,
    reminders_sent: CrdtCounter,
}

impl MergeableEntity for Invoice {
    fn entity_id(&self) -> EntityId {
        self.id
    }

    fn entity_type(&self) -> &str {
        "invoice"
    }

    fn merge_with(&self, remote: &Self, merger: &mut FieldMerger) -> Self {
        Self {
            id: self.id,
            status: merger.merge("status", &self.status, &remote.status),
            customer: merger.merge("customer", &self.customer, &remote.customer),
            amount_paid: merger.merge("amount_paid", &self.amount_paid, &remote.amount_paid),
            line_items: merger.merge("line_items", &self.line_items, &remote.line_items),
            reminders_sent: merger.merge(
                "reminders_sent",
                &self.reminders_sent,
                &remote.reminders_sent,
            ),
        }
    }
}

struct Device {
    node: NodeId,
    clock: HybridClock,
}

impl Device {
    fn new(name: &str, source: &ManualClock) -> Self {
        let node = NodeId::new(name);
        let clock = HybridClock::with_source(node.clone(), Arc::new(source.clone()));
        Self { node, clock }
    }

    /// This device's copy of a shared invoice.
    fn adopt(&self, invoice: &Invoice) -> Invoice {
        Invoice {
            amount_paid: invoice.amount_paid.with_node(self.node.clone()),
            line_items: invoice.line_items.with_node(self.node.clone()),
            ..invoice.clone()
        }
    }
}

fn new_invoice(device: &mut Device) -> Invoice {
    Invoice {
        id: EntityId::new(),
        status: LWWRegister::with_clock("draft".to_string(), &mut device.clock),
        customer: LWWRegister::with_clock("Acme Ltd".to_string(), &mut device.clock),
        amount_paid: PNCounter::new(device.node.clone()),
        line_items: ORSet::new(device.node.clone()).add("consulting".to_string()),
        reminders_sent: CrdtCounter::default(),
    }
}

#[test]
fn offline_edits_on_two_devices_reconcile() {
    let wall = ManualClock::new(1_700_000_000_000);
    let mut laptop = Device::new("laptop", &wall);
    let mut phone = Device::new("phone", &wall);

    let shared = new_invoice(&mut laptop);
    let mut on_laptop = shared.clone();
    let mut on_phone = phone.adopt(&shared);

    // Laptop: records a partial payment and adds a line item.
    wall.advance(1_000);
    on_laptop.amount_paid = on_laptop.amount_paid.increment(400).unwrap();
    on_laptop.line_items = on_laptop.line_items.add("hardware".to_string());

    // Phone: marks the invoice sent, records another payment, drops consulting.
    wall.advance(1_000);
    on_phone.status = on_phone.status.write("sent".to_string(), &mut phone.clock);
    on_phone.amount_paid = on_phone.amount_paid.increment(100).unwrap();
    on_phone.line_items = on_phone.line_items.remove(&"consulting".to_string());
    on_phone.reminders_sent = on_phone.reminders_sent.increment(1);

    let resolver = ConflictResolver::default();
    let on_laptop_after = resolver.resolve(&on_laptop, &on_phone).unwrap();
    let on_phone_after = resolver.resolve(&on_phone, &on_laptop).unwrap();

    let merged = on_laptop_after.merged();
    assert_eq!(merged.status.value(), "sent");
    assert_eq!(merged.amount_paid.value(), 500);
    assert_eq!(merged.line_items.elements(), vec!["hardware".to_string()]);
    assert_eq!(merged.reminders_sent.value(), 1);

    // Same state on both devices, owners aside.
    assert_eq!(merged.status, on_phone_after.merged().status);
    assert_eq!(merged.amount_paid, on_phone_after.merged().amount_paid);
    assert_eq!(merged.line_items, on_phone_after.merged().line_items);
    assert_eq!(merged.amount_paid.node_id(), &laptop.node);

    let conflict = on_laptop_after.conflict().unwrap();
    assert_eq!(conflict.conflict_type, ConflictType::Concurrent);
    assert_eq!(conflict.entity_type, "invoice");
    assert_eq!(
        conflict.concurrent_fields,
        vec!["amount_paid".to_string(), "line_items".to_string()]
    );
    assert_eq!(on_laptop_after.field_orders()["status"], CausalOrder::Before);
    assert_eq!(on_laptop_after.field_orders()["customer"], CausalOrder::Equal);
}

#[test]
fn stale_copy_is_a_causal_conflict() {
    let wall = ManualClock::new(5_000);
    let mut laptop = Device::new("laptop", &wall);

    let old = new_invoice(&mut laptop);
    let mut new = old.clone();
    wall.advance(10);
    new.status = new.status.write("paid".to_string(), &mut laptop.clock);
    new.amount_paid = new.amount_paid.increment(250).unwrap();

    let resolution = ConflictResolver::default().resolve(&new, &old).unwrap();
    assert_eq!(resolution.order(), CausalOrder::After);
    assert_eq!(resolution.merged(), &new);

    let conflict = resolution.conflict().unwrap();
    assert_eq!(conflict.conflict_type, ConflictType::Causal);
    assert!(conflict.concurrent_fields.is_empty());
    assert_eq!(conflict.resolved_value, serde_json::to_value(&new).unwrap());
}

#[test]
fn merge_with_self_is_identity_without_record() {
    let wall = ManualClock::new(5_000);
    let mut laptop = Device::new("laptop", &wall);
    let invoice = new_invoice(&mut laptop);

    let resolution = ConflictResolver::default().resolve(&invoice, &invoice).unwrap();
    assert_eq!(resolution.order(), CausalOrder::Equal);
    assert!(resolution.conflict().is_none());
    assert_eq!(resolution.into_merged(), invoice);
}

#[test]
fn invoice_snapshot_round_trips() {
    let wall = ManualClock::new(5_000);
    let mut laptop = Device::new("laptop", &wall);
    let invoice = new_invoice(&mut laptop);
    let invoice = Invoice {
        amount_paid: invoice.amount_paid.increment(10).unwrap().decrement(3).unwrap(),
        ..invoice
    };

    let json = serde_json::to_string(&invoice).unwrap();
    let back: Invoice = serde_json::from_str(&json).unwrap();
    assert_eq!(back, invoice);
    assert_eq!(back.amount_paid.value(), 7);
}

/// An entity whose snapshot cannot be encoded.
#[derive(Debug, Clone, PartialEq)]
struct Sealed {
    id: EntityId,
    paid: PNCounter,
}

impl Serialize for Sealed {
    fn serialize<S: serde::Serializer>(&self, _: S) -> Result<S::Ok, S::Error> {
        Err(serde::ser::Error::custom("sealed entity"))
    }
}

impl MergeableEntity for Sealed {
    fn entity_id(&self) -> EntityId {
        self.id
    }

    fn entity_type(&self) -> &str {
        "sealed"
    }

    fn merge_with(&self, remote: &Self, merger: &mut FieldMerger) -> Self {
        Self {
            id: self.id,
            paid: merger.merge("paid", &self.paid, &remote.paid),
        }
    }
}

#[test]
fn unencodable_snapshot_still_yields_merge() {
    let id = EntityId::new();
    let a = Sealed {
        id,
        paid: PNCounter::new(NodeId::new("a")).increment(30).unwrap(),
    };
    let b = Sealed {
        id,
        paid: PNCounter::new(NodeId::new("b")).increment(12).unwrap(),
    };

    let resolution = ConflictResolver::default().resolve(&a, &b).unwrap();
    assert_eq!(resolution.merged().paid.value(), 42);

    let conflict = resolution.conflict().unwrap();
    assert_eq!(conflict.conflict_type, ConflictType::Concurrent);
    assert_eq!(conflict.local_version, serde_json::Value::Null);
    assert_eq!(conflict.resolved_value, serde_json::Value::Null);
    assert!(conflict.snapshot_error.as_deref().unwrap().contains("sealed entity"));
}
