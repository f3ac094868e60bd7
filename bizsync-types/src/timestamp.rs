//! Hybrid Logical Clock timestamps.
//!
//! Combines physical time with a logical counter and the issuing node to
//! give a total order across replicas:
//! - Monotonicity (a node never issues a timestamp twice)
//! - Causality (if A happens-before B, then ts(A) < ts(B))
//! - Bounded drift from physical time
//!
//! # String form
//!
//! `PPPPPPPPPPPPPPP-LLLLLLLLLL-node`: the physical component in milliseconds
//! zero-padded to 15 digits, the logical counter zero-padded to 10 digits,
//! then the node id verbatim. Because both numeric fields are fixed-width,
//! comparing two encoded strings byte-wise gives the same answer as
//! comparing the decoded timestamps (for physical times below 10^15 ms,
//! i.e. until the year 33658).

use crate::{Error, NodeId};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

const PHYSICAL_WIDTH: usize = 15;
const LOGICAL_WIDTH: usize = 10;

/// A Hybrid Logical Clock timestamp.
///
/// Consists of:
/// - `physical`: milliseconds since Unix epoch (physical component)
/// - `logical`: counter for events at the same physical time
/// - `node_id`: issuing node, the last-resort tie-break
///
/// Timestamps are values: they are created by [`crate::HybridClock::now`]
/// and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HlcTimestamp {
    physical: u64,
    logical: u32,
    node_id: NodeId,
}

impl HlcTimestamp {
    /// Creates a timestamp from components.
    #[must_use]
    pub fn new(physical: u64, logical: u32, node_id: NodeId) -> Self {
        Self {
            physical,
            logical,
            node_id,
        }
    }

    /// The smallest timestamp a node can hold; every issued timestamp is greater.
    #[must_use]
    pub fn zero(node_id: NodeId) -> Self {
        Self::new(0, 0, node_id)
    }

    /// Returns the physical component.
    #[must_use]
    pub const fn physical(&self) -> u64 {
        self.physical
    }

    /// Returns the logical counter.
    #[must_use]
    pub const fn logical(&self) -> u32 {
        self.logical
    }

    /// Returns the node that issued this timestamp.
    #[must_use]
    pub fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    /// Returns true if this timestamp orders before the other.
    #[must_use]
    pub fn is_before(&self, other: &Self) -> bool {
        self < other
    }

    /// Returns true if this timestamp orders after the other.
    #[must_use]
    pub fn is_after(&self, other: &Self) -> bool {
        self > other
    }

    /// Parses the string form produced by `Display`.
    pub fn parse(s: &str) -> crate::Result<Self> {
        let invalid = || Error::InvalidTimestamp(s.to_string());

        let mut parts = s.splitn(3, '-');
        let physical = parts.next().ok_or_else(invalid)?;
        let logical = parts.next().ok_or_else(invalid)?;
        let node = parts.next().ok_or_else(invalid)?;

        if !is_digits(physical) || !is_digits(logical) || node.is_empty() {
            return Err(invalid());
        }

        Ok(Self {
            physical: physical.parse().map_err(|_| invalid())?,
            logical: logical.parse().map_err(|_| invalid())?,
            node_id: NodeId::new(node),
        })
    }
}

fn is_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

impl PartialOrd for HlcTimestamp {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HlcTimestamp {
    fn cmp(&self, other: &Self) -> Ordering {
        self.physical
            .cmp(&other.physical)
            .then_with(|| self.logical.cmp(&other.logical))
            .then_with(|| self.node_id.cmp(&other.node_id))
    }
}

impl fmt::Display for HlcTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:0pw$}-{:0lw$}-{}",
            self.physical,
            self.logical,
            self.node_id,
            pw = PHYSICAL_WIDTH,
            lw = LOGICAL_WIDTH,
        )
    }
}

impl FromStr for HlcTimestamp {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for HlcTimestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for HlcTimestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}
