//! Conflict resolution between two versions of one entity.
//!
//! The resolver never decides field values itself: every field is merged
//! by its own CRDT through [`FieldMerger`]. What it adds is classification
//! and an audit trail. Conflicts are never fatal; a merged value is always
//! produced.

use crate::{FieldMerger, MergeableEntity, ModelError, ModelResult};
use bizsync_crdt::CausalOrder;
use bizsync_types::{ConflictId, EntityId, PhysicalClock, SystemClock};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What to do when the locally stored snapshot cannot be decoded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MalformedStatePolicy {
    /// Surface the failure as [`ModelError::MalformedSnapshot`].
    #[default]
    Reject,
    /// Log a warning and treat the entity as not stored yet. The stored
    /// history is lost.
    Reset,
}

/// Resolver settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Produce an audit record when one version simply precedes the other.
    pub record_causal_conflicts: bool,
    /// Handling of unreadable local snapshots during reconciliation.
    pub malformed_local_state: MalformedStatePolicy,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            record_causal_conflicts: true,
            malformed_local_state: MalformedStatePolicy::Reject,
        }
    }
}

/// Classification of a reconciled conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictType {
    /// The versions were edited independently.
    Concurrent,
    /// One version already contained the other.
    Causal,
}

/// Audit record of one reconciliation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictRecord {
    pub id: ConflictId,
    pub entity_id: EntityId,
    pub entity_type: String,
    pub conflict_type: ConflictType,
    pub local_version: Value,
    pub remote_version: Value,
    /// Unix time in milliseconds.
    pub detected_at: u64,
    pub resolved_value: Value,
    /// Fields whose versions were concurrent.
    #[serde(default)]
    pub concurrent_fields: Vec<String>,
    /// Why a version snapshot above is `null`, if one could not be taken.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot_error: Option<String>,
}

/// Outcome of [`ConflictResolver::resolve`].
#[derive(Debug, Clone)]
pub struct Resolution<E> {
    merged: E,
    order: CausalOrder,
    field_orders: BTreeMap<String, CausalOrder>,
    conflict: Option<ConflictRecord>,
}

impl<E> Resolution<E> {
    /// The reconciled entity.
    #[must_use]
    pub fn merged(&self) -> &E {
        &self.merged
    }

    #[must_use]
    pub fn into_merged(self) -> E {
        self.merged
    }

    /// How the local version relates to the remote one as a whole.
    #[must_use]
    pub const fn order(&self) -> CausalOrder {
        self.order
    }

    #[must_use]
    pub fn field_orders(&self) -> &BTreeMap<String, CausalOrder> {
        &self.field_orders
    }

    /// The audit record, if one was produced.
    #[must_use]
    pub fn conflict(&self) -> Option<&ConflictRecord> {
        self.conflict.as_ref()
    }

    #[must_use]
    pub fn into_parts(self) -> (E, Option<ConflictRecord>) {
        (self.merged, self.conflict)
    }
}

/// Merges two versions of an entity and reports the conflict.
#[derive(Debug, Clone)]
pub struct ConflictResolver {
    config: ResolverConfig,
    clock: Arc<dyn PhysicalClock>,
}

impl Default for ConflictResolver {
    fn default() -> Self {
        Self::new(ResolverConfig::default())
    }
}

impl ConflictResolver {
    /// Creates a resolver stamping records with the system clock.
    #[must_use]
    pub fn new(config: ResolverConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Creates a resolver stamping records from an explicit clock.
    #[must_use]
    pub fn with_clock(config: ResolverConfig, clock: Arc<dyn PhysicalClock>) -> Self {
        Self { config, clock }
    }

    #[must_use]
    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Merges `remote` into `local`.
    ///
    /// Fails only if the two versions are not versions of the same entity.
    /// A version that cannot be snapshotted leaves `null` in the audit
    /// record and the reason in [`ConflictRecord::snapshot_error`].
    pub fn resolve<E: MergeableEntity>(&self, local: &E, remote: &E) -> ModelResult<Resolution<E>> {
        if local.entity_id() != remote.entity_id() || local.entity_type() != remote.entity_type() {
            return Err(ModelError::EntityMismatch {
                local: format!("{}/{}", local.entity_type(), local.entity_id()),
                remote: format!("{}/{}", remote.entity_type(), remote.entity_id()),
            });
        }

        let mut merger = FieldMerger::new();
        let merged = local.merge_with(remote, &mut merger);
        let order = merger.overall();

        let conflict_type = match order {
            CausalOrder::Equal => None,
            CausalOrder::Concurrent => Some(ConflictType::Concurrent),
            CausalOrder::Before | CausalOrder::After => {
                self.config.record_causal_conflicts.then_some(ConflictType::Causal)
            }
        };

        let conflict = match conflict_type {
            Some(conflict_type) => {
                let mut errors = Vec::new();
                let record = ConflictRecord {
                    id: ConflictId::new(),
                    entity_id: local.entity_id(),
                    entity_type: local.entity_type().to_string(),
                    conflict_type,
                    local_version: snapshot(local, &mut errors),
                    remote_version: snapshot(remote, &mut errors),
                    detected_at: self.clock.now_millis(),
                    resolved_value: snapshot(&merged, &mut errors),
                    concurrent_fields: merger.concurrent_fields(),
                    snapshot_error: (!errors.is_empty()).then(|| errors.join("; ")),
                };
                if let Some(error) = &record.snapshot_error {
                    warn!(entity = %record.entity_id, %error, "conflict recorded without snapshots");
                }
                if conflict_type == ConflictType::Concurrent {
                    info!(
                        entity = %record.entity_id,
                        fields = ?record.concurrent_fields,
                        "resolved concurrent edits"
                    );
                }
                Some(record)
            }
            None => None,
        };

        debug!(entity = %local.entity_id(), ?order, "merged versions");

        Ok(Resolution {
            merged,
            order,
            field_orders: merger.into_orders(),
            conflict,
        })
    }
}

fn snapshot<T: Serialize>(value: &T, errors: &mut Vec<String>) -> Value {
    serde_json::to_value(value).unwrap_or_else(|e| {
        errors.push(e.to_string());
        Value::Null
    })
}
