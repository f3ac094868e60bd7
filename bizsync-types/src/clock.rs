//! The per-node Hybrid Logical Clock.
//!
//! A [`HybridClock`] remembers the last `(physical, logical)` pair it issued
//! and never issues a timestamp at or below it, even when the wall clock
//! stalls or moves backward. Based on "Logical Physical Clocks"
//! (Kulkarni et al.).
//!
//! Each node owns exactly one clock and ticks it from a single logical
//! writer; callers that allow concurrent local writers must serialize them.

use crate::{HlcTimestamp, NodeId};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// A source of physical time in milliseconds since the Unix epoch.
pub trait PhysicalClock: Send + Sync + fmt::Debug {
    fn now_millis(&self) -> u64;
}

/// The operating system wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl PhysicalClock for SystemClock {
    fn now_millis(&self) -> u64 {
        wall_clock_millis()
    }
}

/// Current wall-clock time in milliseconds. A clock set before the epoch reads as 0.
#[must_use]
pub fn wall_clock_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// A physical clock whose reading is set explicitly.
///
/// Clones share the same reading, so a test can hand one copy to a
/// [`HybridClock`] and keep another to move time around.
#[derive(Debug, Clone, Default)]
pub struct ManualClock(Arc<AtomicU64>);

impl ManualClock {
    #[must_use]
    pub fn new(start_millis: u64) -> Self {
        Self(Arc::new(AtomicU64::new(start_millis)))
    }

    /// Sets the reading, which may move backward.
    pub fn set(&self, millis: u64) {
        self.0.store(millis, Ordering::SeqCst);
    }

    pub fn advance(&self, millis: u64) {
        self.0.fetch_add(millis, Ordering::SeqCst);
    }
}

impl PhysicalClock for ManualClock {
    fn now_millis(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }
}

/// Issues strictly increasing [`HlcTimestamp`]s for one node.
#[derive(Debug, Clone)]
pub struct HybridClock {
    node_id: NodeId,
    last_physical: u64,
    last_logical: u32,
    source: Arc<dyn PhysicalClock>,
}

impl HybridClock {
    /// Creates a clock for `node_id` reading the system wall clock.
    #[must_use]
    pub fn new(node_id: NodeId) -> Self {
        Self::with_source(node_id, Arc::new(SystemClock))
    }

    /// Creates a clock reading an explicit physical time source.
    #[must_use]
    pub fn with_source(node_id: NodeId, source: Arc<dyn PhysicalClock>) -> Self {
        Self {
            node_id,
            last_physical: 0,
            last_logical: 0,
            source,
        }
    }

    /// Returns the node this clock issues timestamps for.
    #[must_use]
    pub fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    /// Returns the last issued (or observed) state as a timestamp.
    #[must_use]
    pub fn last(&self) -> HlcTimestamp {
        HlcTimestamp::new(self.last_physical, self.last_logical, self.node_id.clone())
    }

    /// Issues the next timestamp for a local event.
    ///
    /// If the wall clock has moved past the stored physical component the
    /// logical counter resets to zero; otherwise the stored physical
    /// component is kept and the counter advances.
    pub fn now(&mut self) -> HlcTimestamp {
        let pt = self.source.now_millis();
        let (physical, logical) = if pt > self.last_physical {
            (pt, 0)
        } else {
            bump(self.last_physical, self.last_logical)
        };
        self.store(physical, logical)
    }

    /// Folds a timestamp received from another node into this clock.
    ///
    /// The returned timestamp is greater than both the previous local state
    /// and `remote`, so any write issued afterwards orders after the
    /// observed one.
    pub fn observe(&mut self, remote: &HlcTimestamp) -> HlcTimestamp {
        let pt = self.source.now_millis();
        let max_physical = pt.max(self.last_physical).max(remote.physical());

        let local_at_max = max_physical == self.last_physical;
        let remote_at_max = max_physical == remote.physical();

        let (physical, logical) = if local_at_max && remote_at_max {
            bump(max_physical, self.last_logical.max(remote.logical()))
        } else if local_at_max {
            bump(max_physical, self.last_logical)
        } else if remote_at_max {
            bump(max_physical, remote.logical())
        } else {
            (max_physical, 0)
        };
        self.store(physical, logical)
    }

    fn store(&mut self, physical: u64, logical: u32) -> HlcTimestamp {
        self.last_physical = physical;
        self.last_logical = logical;
        self.last()
    }
}

/// Advances the logical counter, spilling into the physical component on overflow.
fn bump(physical: u64, logical: u32) -> (u64, u32) {
    match logical.checked_add(1) {
        Some(next) => (physical, next),
        None => (physical.saturating_add(1), 0),
    }
}
