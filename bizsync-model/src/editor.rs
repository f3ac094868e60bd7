//! Mutable editing façade over a [`CrdtRecord`].
//!
//! The CRDT types are values: every operation returns a new instance. UI
//! code would rather say "set the status" on a record it holds, so the
//! editor owns the record and the node's [`HybridClock`], runs the pure
//! operation and stores the returned value back into the field.
//!
//! Counters and sets loaded from another device are owned by that device.
//! Before a local change the editor re-homes them to this node, so the
//! change lands in this node's own entries.

use crate::{CrdtRecord, FieldKind, FieldValue, ModelError, ModelResult};
use bizsync_crdt::{CrdtCounter, CrdtRegister, LWWRegister, ORSet, PNCounter};
use bizsync_types::{EntityId, HybridClock, NodeId};
use serde_json::Value;

/// Edits one record on behalf of one node.
#[derive(Debug, Clone)]
pub struct RecordEditor {
    record: CrdtRecord,
    clock: HybridClock,
}

impl RecordEditor {
    /// Edits an existing record.
    #[must_use]
    pub fn new(record: CrdtRecord, clock: HybridClock) -> Self {
        Self { record, clock }
    }

    /// Starts a new record of `entity_type` with a fresh id.
    #[must_use]
    pub fn create(entity_type: impl Into<String>, clock: HybridClock) -> Self {
        Self::new(CrdtRecord::new(EntityId::new(), entity_type), clock)
    }

    #[must_use]
    pub fn node_id(&self) -> &NodeId {
        self.clock.node_id()
    }

    #[must_use]
    pub fn record(&self) -> &CrdtRecord {
        &self.record
    }

    #[must_use]
    pub fn into_record(self) -> CrdtRecord {
        self.record
    }

    /// Sets a last-writer-wins field.
    ///
    /// The new timestamp is issued after observing the stored one, so the
    /// write wins over it even when this node's wall clock lags.
    pub fn set(&mut self, field: &str, value: impl Into<Value>) -> ModelResult<()> {
        let value = value.into();
        let next = match self.record.field(field) {
            None => LWWRegister::with_clock(value, &mut self.clock),
            Some(FieldValue::Lww(reg)) => reg.write(value, &mut self.clock),
            Some(other) => return Err(kind_error(field, FieldKind::Lww, other)),
        };
        self.record.put_field(field, FieldValue::Lww(next));
        Ok(())
    }

    /// Sets a display register field.
    pub fn set_display(&mut self, field: &str, value: impl Into<Value>) -> ModelResult<()> {
        let value = value.into();
        let next = match self.record.field(field) {
            None => CrdtRegister::new(value, self.clock.now()),
            Some(FieldValue::Register(reg)) => reg.set(value, &mut self.clock),
            Some(other) => return Err(kind_error(field, FieldKind::Register, other)),
        };
        self.record.put_field(field, FieldValue::Register(next));
        Ok(())
    }

    /// Adds `amount` to a counter field and returns the new value.
    ///
    /// Fails with [`bizsync_crdt::CrdtError::InvalidArgument`] for a
    /// negative amount, leaving the record untouched.
    pub fn increment(&mut self, field: &str, amount: i64) -> ModelResult<i64> {
        let counter = self.local_counter(field)?.increment(amount)?;
        let value = counter.value();
        self.record.put_field(field, FieldValue::Counter(counter));
        Ok(value)
    }

    /// Subtracts `amount` from a counter field and returns the new value.
    pub fn decrement(&mut self, field: &str, amount: i64) -> ModelResult<i64> {
        let counter = self.local_counter(field)?.decrement(amount)?;
        let value = counter.value();
        self.record.put_field(field, FieldValue::Counter(counter));
        Ok(value)
    }

    /// Adds `amount` to a display counter and returns the new value.
    pub fn bump(&mut self, field: &str, amount: i64) -> ModelResult<i64> {
        let counter = match self.record.field(field) {
            None => CrdtCounter::default(),
            Some(FieldValue::SimpleCounter(counter)) => *counter,
            Some(other) => return Err(kind_error(field, FieldKind::SimpleCounter, other)),
        }
        .increment(amount);
        self.record.put_field(field, FieldValue::SimpleCounter(counter));
        Ok(counter.value())
    }

    /// Adds an element to a set field.
    pub fn insert(&mut self, field: &str, element: impl Into<String>) -> ModelResult<()> {
        let set = self.local_set(field)?.add(element.into());
        self.record.put_field(field, FieldValue::Set(set));
        Ok(())
    }

    /// Removes an element from a set field. Returns whether it was present.
    pub fn remove(&mut self, field: &str, element: &str) -> ModelResult<bool> {
        let set = self.local_set(field)?;
        let element = element.to_string();
        if !set.contains(&element) {
            return Ok(false);
        }
        self.record.put_field(field, FieldValue::Set(set.remove(&element)));
        Ok(true)
    }

    fn local_counter(&self, field: &str) -> ModelResult<PNCounter> {
        let node = self.node_id().clone();
        match self.record.field(field) {
            None => Ok(PNCounter::new(node)),
            Some(FieldValue::Counter(counter)) if counter.node_id() == &node => Ok(counter.clone()),
            Some(FieldValue::Counter(counter)) => Ok(counter.with_node(node)),
            Some(other) => Err(kind_error(field, FieldKind::Counter, other)),
        }
    }

    fn local_set(&self, field: &str) -> ModelResult<ORSet<String>> {
        let node = self.node_id().clone();
        match self.record.field(field) {
            None => Ok(ORSet::new(node)),
            Some(FieldValue::Set(set)) if set.node_id() == &node => Ok(set.clone()),
            Some(FieldValue::Set(set)) => Ok(set.with_node(node)),
            Some(other) => Err(kind_error(field, FieldKind::Set, other)),
        }
    }
}

fn kind_error(field: &str, expected: FieldKind, actual: &FieldValue) -> ModelError {
    ModelError::FieldKind {
        field: field.to_string(),
        expected: expected.as_str(),
        actual: actual.kind().as_str(),
    }
}
