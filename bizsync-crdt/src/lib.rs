//! CRDT implementations for BizSync.
//!
//! This crate provides the clocks and Conflict-free Replicated Data Types
//! that business-record fields are built from:
//!
//! - [`VectorClock`] - Causality tracking across nodes
//! - [`LWWRegister<T>`] - Last-Writer-Wins Register ordered by hybrid timestamps
//! - [`PNCounter`] - Positive-Negative Counter for distributed inc/dec
//! - [`ORSet<T>`] - Observed-Remove Set for collections
//! - [`CrdtRegister<T>`] / [`CrdtCounter`] - reduced-fidelity siblings for
//!   display fields that do not need full causal tracking
//!
//! Every type is a value: operations that look like mutations return a new
//! instance and leave the receiver untouched, so replicas can be shared
//! across threads without locking.
//!
//! All merges in this crate satisfy the following properties:
//! - **Commutative**: merge(a, b) == merge(b, a)
//! - **Associative**: merge(merge(a, b), c) == merge(a, merge(b, c))
//! - **Idempotent**: merge(a, a) == a
//!
//! These properties ensure that replicas will converge to the same state
//! regardless of the order in which states are received, or how many
//! times the same state is delivered.

mod codec;
mod crdt_counter;
mod crdt_register;
mod error;
mod lww_register;
mod orset;
mod pn_counter;
mod vector_clock;

pub use codec::ElementCodec;
pub use crdt_counter::CrdtCounter;
pub use crdt_register::CrdtRegister;
pub use error::{CrdtError, CrdtResult};
pub use lww_register::LWWRegister;
pub use orset::{ORSet, Tag};
pub use pn_counter::PNCounter;
pub use vector_clock::{CausalOrder, VectorClock};
