//! Error types for CRDT operations.

use thiserror::Error;

/// Result type for CRDT operations.
pub type CrdtResult<T> = Result<T, CrdtError>;

/// Errors that can occur in CRDT operations.
///
/// Concurrent updates are not errors; they are resolved by merge.
#[derive(Debug, Error)]
pub enum CrdtError {
    /// The caller passed an argument the operation cannot accept.
    /// No state was changed.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A persisted or received state could not be decoded.
    #[error("malformed serialized state: {0}")]
    MalformedState(String),

    /// An OR-Set element key did not decode with the element codec.
    #[error("cannot decode element {element:?}: {reason}")]
    ElementCodec { element: String, reason: String },

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
