//! Schema-free records: an entity as a map of named CRDT fields.
//!
//! [`CrdtRecord`] is the form in which the persistence layer and the CLI
//! handle entities whose Rust type they do not know. Each field carries its
//! CRDT kind in the serialized form:
//!
//! ```json
//! { "id": "…", "entity_type": "invoice",
//!   "fields": { "status": { "kind": "lww", "value": "sent", "timestamp": "…" } } }
//! ```

use crate::{CrdtField, FieldMerger, MergeableEntity, ModelResult};
use bizsync_crdt::{CausalOrder, CrdtCounter, CrdtRegister, LWWRegister, ORSet, PNCounter};
use bizsync_types::{EntityId, NodeId};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// The CRDT kind of a field, in merge precedence order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FieldKind {
    Lww,
    Register,
    Counter,
    SimpleCounter,
    Set,
}

impl FieldKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Lww => "lww",
            Self::Register => "register",
            Self::Counter => "counter",
            Self::SimpleCounter => "simple_counter",
            Self::Set => "set",
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One field of a [`CrdtRecord`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FieldValue {
    /// Last-writer-wins scalar (status, name, amounts set wholesale).
    Lww(LWWRegister<Value>),
    /// Reduced-fidelity register for display fields.
    Register(CrdtRegister<Value>),
    /// Counter summing every node's increments and decrements.
    Counter(PNCounter),
    /// Max counter for read-mostly display counts.
    SimpleCounter(CrdtCounter),
    /// Observed-remove set of strings.
    Set(ORSet<String>),
}

impl FieldValue {
    #[must_use]
    pub const fn kind(&self) -> FieldKind {
        match self {
            Self::Lww(_) => FieldKind::Lww,
            Self::Register(_) => FieldKind::Register,
            Self::Counter(_) => FieldKind::Counter,
            Self::SimpleCounter(_) => FieldKind::SimpleCounter,
            Self::Set(_) => FieldKind::Set,
        }
    }

    /// The field's current value without CRDT metadata.
    #[must_use]
    pub fn plain(&self) -> Value {
        match self {
            Self::Lww(reg) => reg.value().clone(),
            Self::Register(reg) => reg.value().clone(),
            Self::Counter(counter) => Value::from(counter.value()),
            Self::SimpleCounter(counter) => Value::from(counter.value()),
            Self::Set(set) => set.iter().cloned().map(Value::String).collect(),
        }
    }
}

impl CrdtField for FieldValue {
    /// Same-kind fields use their own merge. Fields whose kinds disagree
    /// keep the version of the higher [`FieldKind`].
    fn merge_field(&self, remote: &Self) -> Self {
        match (self, remote) {
            (Self::Lww(a), Self::Lww(b)) => Self::Lww(a.merge_field(b)),
            (Self::Register(a), Self::Register(b)) => Self::Register(a.merge_field(b)),
            (Self::Counter(a), Self::Counter(b)) => Self::Counter(a.merge_field(b)),
            (Self::SimpleCounter(a), Self::SimpleCounter(b)) => {
                Self::SimpleCounter(a.merge_field(b))
            }
            (Self::Set(a), Self::Set(b)) => Self::Set(a.merge_field(b)),
            _ if remote.kind() > self.kind() => remote.clone(),
            _ => self.clone(),
        }
    }

    fn causal_order(&self, remote: &Self) -> CausalOrder {
        match (self, remote) {
            (Self::Lww(a), Self::Lww(b)) => a.causal_order(b),
            (Self::Register(a), Self::Register(b)) => a.causal_order(b),
            (Self::Counter(a), Self::Counter(b)) => a.causal_order(b),
            (Self::SimpleCounter(a), Self::SimpleCounter(b)) => a.causal_order(b),
            (Self::Set(a), Self::Set(b)) => a.causal_order(b),
            _ => CausalOrder::Concurrent,
        }
    }
}

/// An entity stored as named CRDT fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrdtRecord {
    id: EntityId,
    entity_type: String,
    #[serde(default)]
    fields: BTreeMap<String, FieldValue>,
}

impl CrdtRecord {
    /// Creates a record with no fields.
    #[must_use]
    pub fn new(id: EntityId, entity_type: impl Into<String>) -> Self {
        Self {
            id,
            entity_type: entity_type.into(),
            fields: BTreeMap::new(),
        }
    }

    /// Parses a record snapshot.
    pub fn from_json(json: &str) -> ModelResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serializes the record snapshot.
    pub fn to_json(&self) -> ModelResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    #[must_use]
    pub const fn id(&self) -> EntityId {
        self.id
    }

    #[must_use]
    pub fn entity_type(&self) -> &str {
        &self.entity_type
    }

    #[must_use]
    pub fn fields(&self) -> &BTreeMap<String, FieldValue> {
        &self.fields
    }

    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    /// Returns the record with `name` set to `value`, replacing any
    /// previous value of the field.
    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, value: FieldValue) -> Self {
        self.fields.insert(name.into(), value);
        self
    }

    pub(crate) fn put_field(&mut self, name: &str, value: FieldValue) {
        self.fields.insert(name.to_string(), value);
    }

    /// Returns the record with every counter and set owned by `node_id`,
    /// for storing a received snapshot as this node's local copy.
    #[must_use]
    pub fn with_node(&self, node_id: &NodeId) -> Self {
        let fields = self
            .fields
            .iter()
            .map(|(name, field)| {
                let field = match field {
                    FieldValue::Counter(counter) => {
                        FieldValue::Counter(counter.with_node(node_id.clone()))
                    }
                    FieldValue::Set(set) => FieldValue::Set(set.with_node(node_id.clone())),
                    other => other.clone(),
                };
                (name.clone(), field)
            })
            .collect();
        Self {
            id: self.id,
            entity_type: self.entity_type.clone(),
            fields,
        }
    }

    /// The current values of all fields as one JSON object.
    #[must_use]
    pub fn plain(&self) -> Value {
        let map: Map<String, Value> = self
            .fields
            .iter()
            .map(|(name, field)| (name.clone(), field.plain()))
            .collect();
        Value::Object(map)
    }
}

impl MergeableEntity for CrdtRecord {
    fn entity_id(&self) -> EntityId {
        self.id
    }

    fn entity_type(&self) -> &str {
        &self.entity_type
    }

    fn merge_with(&self, remote: &Self, merger: &mut FieldMerger) -> Self {
        let names: BTreeSet<&String> = self.fields.keys().chain(remote.fields.keys()).collect();
        let fields = names
            .into_iter()
            .filter_map(|name| {
                merger
                    .merge_optional(name, self.fields.get(name), remote.fields.get(name))
                    .map(|value| (name.clone(), value))
            })
            .collect();

        Self {
            id: self.id,
            entity_type: self.entity_type.clone(),
            fields,
        }
    }
}
