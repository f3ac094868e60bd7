//! Core type definitions for BizSync.
//!
//! This crate defines the leaf primitives the replication engine is built on:
//! - Node, entity and conflict identifiers
//! - Hybrid Logical Clock timestamps ([`HlcTimestamp`])
//! - The per-node clock that issues them ([`HybridClock`])
//!
//! Business entities (invoices, customers, payments) live in the
//! application, not here.

mod clock;
mod ids;
mod timestamp;

pub use clock::{HybridClock, ManualClock, PhysicalClock, SystemClock, wall_clock_millis};
pub use ids::{ConflictId, EntityId, NodeId};
pub use timestamp::HlcTimestamp;

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in type operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid UUID: {0}")]
    InvalidUuid(#[from] uuid::Error),

    #[error("invalid node id: {0:?}")]
    InvalidNodeId(String),

    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),
}
