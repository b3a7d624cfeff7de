//! History Window Sizing
//!
//! The history window holds one snapshot per refresh cycle. Its capacity is
//! derived from the configured arrow span and the scan interval, with a floor
//! so that even very short spans keep first, middle and last references.

/// Smallest capacity a history window may have.
///
/// Three snapshots are the minimum for a first/middle/last comparison.
pub const MIN_HISTORY_CAPACITY: usize = 3;

/// Arrows need at least an oldest and a newest snapshot.
pub const MIN_SNAPSHOTS_FOR_ARROWS: usize = 2;

/// The evolution report is produced only above this many snapshots.
pub const MIN_SNAPSHOTS_FOR_EVOLUTION: usize = 3;

/// Default scan interval (seconds) when the history section omits it.
pub const DEFAULT_SCAN_INTERVAL_S: u64 = 30;
