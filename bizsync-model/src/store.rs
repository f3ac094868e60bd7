//! Persistence seam: snapshot storage and atomic read-merge-write.
//!
//! The CRDT merges are pure functions over two inputs; they cannot stop two
//! merges of the same entity from racing at the storage layer. The
//! [`Reconciler`] provides that guarantee by serializing read-merge-write
//! per entity id, while merges of different entities run in parallel.

use crate::{
    ConflictRecord, ConflictResolver, MalformedStatePolicy, MergeableEntity, ModelError,
    ModelResult,
};
use bizsync_types::EntityId;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, warn};

/// Stores serialized entity snapshots by id.
pub trait SnapshotStore: Send + Sync {
    /// Returns the stored snapshot, or `None` if the entity is unknown.
    fn load_raw(&self, id: &EntityId) -> ModelResult<Option<String>>;

    /// Stores a snapshot, replacing any previous one.
    fn save_raw(&self, id: &EntityId, snapshot: &str) -> ModelResult<()>;
}

/// Receives the audit records produced during reconciliation.
pub trait ConflictLog: Send + Sync {
    fn append(&self, record: &ConflictRecord) -> ModelResult<()>;
}

fn lock<T>(mutex: &Mutex<T>) -> ModelResult<MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|_| ModelError::Storage("lock poisoned".to_string()))
}

/// An in-memory snapshot store.
#[derive(Debug, Default)]
pub struct MemorySnapshotStore {
    snapshots: Mutex<HashMap<EntityId, String>>,
}

impl MemorySnapshotStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored snapshots.
    pub fn len(&self) -> ModelResult<usize> {
        Ok(lock(&self.snapshots)?.len())
    }

    pub fn is_empty(&self) -> ModelResult<bool> {
        Ok(lock(&self.snapshots)?.is_empty())
    }
}

impl SnapshotStore for MemorySnapshotStore {
    fn load_raw(&self, id: &EntityId) -> ModelResult<Option<String>> {
        Ok(lock(&self.snapshots)?.get(id).cloned())
    }

    fn save_raw(&self, id: &EntityId, snapshot: &str) -> ModelResult<()> {
        lock(&self.snapshots)?.insert(*id, snapshot.to_string());
        Ok(())
    }
}

/// An in-memory conflict log.
#[derive(Debug, Default)]
pub struct MemoryConflictLog {
    records: Mutex<Vec<ConflictRecord>>,
}

impl MemoryConflictLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of every record appended so far, oldest first.
    pub fn records(&self) -> ModelResult<Vec<ConflictRecord>> {
        Ok(lock(&self.records)?.clone())
    }
}

impl ConflictLog for MemoryConflictLog {
    fn append(&self, record: &ConflictRecord) -> ModelResult<()> {
        lock(&self.records)?.push(record.clone());
        Ok(())
    }
}

/// What [`Reconciler::apply`] did with an incoming version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// Nothing was stored for the entity; the incoming version was saved.
    Inserted,
    /// The stored version already contained the incoming one.
    Unchanged,
    /// The merged version replaced the stored one.
    Merged,
}

/// Applies incoming entity versions to a [`SnapshotStore`].
pub struct Reconciler<S, L> {
    store: S,
    log: L,
    resolver: ConflictResolver,
    /// One lock per entity id seen so far.
    locks: Mutex<HashMap<EntityId, Arc<Mutex<()>>>>,
}

impl<S: SnapshotStore, L: ConflictLog> Reconciler<S, L> {
    #[must_use]
    pub fn new(store: S, log: L, resolver: ConflictResolver) -> Self {
        Self {
            store,
            log,
            resolver,
            locks: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    #[must_use]
    pub fn log(&self) -> &L {
        &self.log
    }

    #[must_use]
    pub fn resolver(&self) -> &ConflictResolver {
        &self.resolver
    }

    /// Loads and decodes the stored version of an entity.
    ///
    /// An unreadable snapshot is handled per
    /// [`crate::ResolverConfig::malformed_local_state`].
    pub fn load<E: DeserializeOwned>(&self, id: &EntityId) -> ModelResult<Option<E>> {
        let Some(raw) = self.store.load_raw(id)? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(entity) => Ok(Some(entity)),
            Err(e) => match self.resolver.config().malformed_local_state {
                MalformedStatePolicy::Reject => Err(ModelError::MalformedSnapshot {
                    entity_id: *id,
                    reason: e.to_string(),
                }),
                MalformedStatePolicy::Reset => {
                    warn!(entity = %id, error = %e, "discarding unreadable stored snapshot");
                    Ok(None)
                }
            },
        }
    }

    /// Merges `incoming` into the stored version of the same entity and
    /// saves the result, atomically with respect to other calls for the
    /// same id on this reconciler.
    pub fn apply<E: MergeableEntity + DeserializeOwned>(
        &self,
        incoming: &E,
    ) -> ModelResult<ApplyOutcome> {
        let id = incoming.entity_id();
        let entity_lock = self.lock_for(&id)?;
        let outcome = lock(&entity_lock).and_then(|_guard| self.apply_locked(&id, incoming));
        self.release(&id, &entity_lock)?;
        outcome
    }

    fn apply_locked<E: MergeableEntity + DeserializeOwned>(
        &self,
        id: &EntityId,
        incoming: &E,
    ) -> ModelResult<ApplyOutcome> {
        let Some(local) = self.load::<E>(id)? else {
            self.store.save_raw(id, &serde_json::to_string(incoming)?)?;
            debug!(entity = %id, "stored new entity");
            return Ok(ApplyOutcome::Inserted);
        };

        let (merged, conflict) = self.resolver.resolve(&local, incoming)?.into_parts();
        if let Some(record) = &conflict {
            self.log.append(record)?;
        }

        let before = serde_json::to_string(&local)?;
        let after = serde_json::to_string(&merged)?;
        if before == after {
            debug!(entity = %id, "incoming version already contained");
            return Ok(ApplyOutcome::Unchanged);
        }
        self.store.save_raw(id, &after)?;
        debug!(entity = %id, "stored merged entity");
        Ok(ApplyOutcome::Merged)
    }

    fn lock_for(&self, id: &EntityId) -> ModelResult<Arc<Mutex<()>>> {
        Ok(Arc::clone(lock(&self.locks)?.entry(*id).or_default()))
    }

    /// Drops the entity's lock once no other apply holds it. Handles are
    /// only cloned under the map lock, so the count cannot rise here.
    fn release(&self, id: &EntityId, entity_lock: &Arc<Mutex<()>>) -> ModelResult<()> {
        let mut locks = lock(&self.locks)?;
        if Arc::strong_count(entity_lock) == 2 {
            locks.remove(id);
        }
        Ok(())
    }
}
