//! Bounded History Window for Point Snapshots
//!
//! ## Overview
//!
//! Each refresh cycle appends the full map of current points as one
//! snapshot. The window keeps only the most recent snapshots, discarding the
//! oldest when full (ring-buffer semantics), so arrows and evolution deltas
//! always span a bounded stretch of time.
//!
//! ## Capacity
//!
//! Capacity follows the configured arrow span and the scan interval:
//!
//! ```text
//! capacity = max(3, floor(delta_arrows_s / scan_interval_s))
//!
//! delta_arrows = 3600 s, scan_interval = 30 s  →  120 snapshots
//! delta_arrows =   60 s, scan_interval = 30 s  →    3 snapshots (floor)
//! ```
//!
//! When either setting changes the window is rebuilt with the new capacity,
//! keeping the newest snapshots that still fit.
//!
//! ## Layout
//!
//! ```text
//! capacity 3, after pushing A B C D:
//!
//!   oldest ─┐         ┌─ newest
//!           B    C    D          (A evicted)
//! ```
//!
//! The window is persisted whole in the shared cache after every append; no
//! reader ever observes a half-updated window.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::constants::MIN_HISTORY_CAPACITY;

/// Fixed-capacity FIFO of snapshots, oldest first
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryWindow<T> {
    capacity: usize,
    snapshots: VecDeque<T>,
}

impl<T> HistoryWindow<T> {
    /// Create an empty window; capacities below the floor are raised to it
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(MIN_HISTORY_CAPACITY);
        Self {
            capacity,
            snapshots: VecDeque::with_capacity(capacity),
        }
    }

    /// Capacity for an arrow span and a scan interval, both in seconds
    ///
    /// A zero scan interval cannot size anything and yields the floor.
    pub fn capacity_for(delta_arrows_s: f64, scan_interval_s: f64) -> usize {
        if scan_interval_s <= 0.0 || !delta_arrows_s.is_finite() {
            return MIN_HISTORY_CAPACITY;
        }
        let ratio = (delta_arrows_s / scan_interval_s).floor();
        if ratio <= 0.0 {
            return MIN_HISTORY_CAPACITY;
        }
        (ratio as usize).max(MIN_HISTORY_CAPACITY)
    }

    /// Append a snapshot, returning the evicted oldest one when full
    pub fn push(&mut self, snapshot: T) -> Option<T> {
        let evicted = if self.snapshots.len() >= self.capacity {
            self.snapshots.pop_front()
        } else {
            None
        };
        self.snapshots.push_back(snapshot);
        evicted
    }

    /// Re-size the window, keeping the newest snapshots that fit
    pub fn rebuild(mut self, capacity: usize) -> Self {
        let capacity = capacity.max(MIN_HISTORY_CAPACITY);
        while self.snapshots.len() > capacity {
            self.snapshots.pop_front();
        }
        self.capacity = capacity;
        self
    }

    /// Maximum number of snapshots kept
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of stored snapshots
    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    /// Check if the window is empty
    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    /// Check if the next push evicts
    pub fn is_full(&self) -> bool {
        self.snapshots.len() >= self.capacity
    }

    /// Oldest snapshot
    pub fn first(&self) -> Option<&T> {
        self.snapshots.front()
    }

    /// Most recent snapshot
    pub fn last(&self) -> Option<&T> {
        self.snapshots.back()
    }

    /// Snapshot by logical index (0 = oldest)
    pub fn get(&self, index: usize) -> Option<&T> {
        self.snapshots.get(index)
    }

    /// Iterate from oldest to newest
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> + ExactSizeIterator {
        self.snapshots.iter()
    }
}
