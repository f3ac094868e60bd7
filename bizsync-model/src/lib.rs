//! Entity layer for BizSync.
//!
//! Sits between the CRDT value types and the application:
//! - [`CrdtField`] / [`FieldMerger`]: per-field merge dispatch
//! - [`MergeableEntity`]: a business entity made of CRDT fields
//! - [`CrdtRecord`]: schema-free entity used by storage and tooling
//! - [`RecordEditor`]: mutable editing façade over the value-typed CRDTs
//! - [`ConflictResolver`]: merges two versions and produces a [`ConflictRecord`]
//! - [`Reconciler`]: atomic read-merge-write against a [`SnapshotStore`]
//!
//! Transport, discovery and the storage engine itself live outside this
//! crate; they only need to move snapshots in and out of a [`SnapshotStore`].

mod editor;
mod entity;
mod error;
mod field;
mod record;
mod resolver;
mod store;

pub use editor::RecordEditor;
pub use entity::MergeableEntity;
pub use error::{ModelError, ModelResult};
pub use field::{CrdtField, FieldMerger};
pub use record::{CrdtRecord, FieldKind, FieldValue};
pub use resolver::{
    ConflictRecord, ConflictResolver, ConflictType, MalformedStatePolicy, Resolution,
    ResolverConfig,
};
pub use store::{
    ApplyOutcome, ConflictLog, MemoryConflictLog, MemorySnapshotStore, Reconciler, SnapshotStore,
};
