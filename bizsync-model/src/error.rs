//! Error types for the entity layer.

use bizsync_crdt::CrdtError;
use bizsync_types::EntityId;
use thiserror::Error;

/// Result type for entity-layer operations.
pub type ModelResult<T> = Result<T, ModelError>;

/// Errors that can occur while editing, resolving or reconciling entities.
///
/// A conflict between two versions is never an error; it is reported as a
/// [`crate::ConflictRecord`].
#[derive(Debug, Error)]
pub enum ModelError {
    /// A CRDT operation rejected its input.
    #[error("crdt error: {0}")]
    Crdt(#[from] CrdtError),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The two versions handed to the resolver describe different entities.
    #[error("cannot merge {local} with {remote}: different entities")]
    EntityMismatch { local: String, remote: String },

    /// A field exists but holds a different CRDT kind than the operation needs.
    #[error("field {field:?} is a {actual} field, expected {expected}")]
    FieldKind {
        field: String,
        expected: &'static str,
        actual: &'static str,
    },

    /// The stored snapshot of an entity could not be decoded.
    #[error("stored snapshot of {entity_id} is unreadable: {reason}")]
    MalformedSnapshot { entity_id: EntityId, reason: String },

    /// The snapshot store failed.
    #[error("storage error: {0}")]
    Storage(String),
}
