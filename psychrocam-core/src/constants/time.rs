//! Time-Related Constants

// ===== TIME UNIT CONVERSIONS =====

/// Milliseconds per second.
pub const MS_PER_SECOND: u64 = 1000;

/// Seconds per minute.
pub const SECONDS_PER_MINUTE: f64 = 60.0;

/// Seconds per hour.
pub const SECONDS_PER_HOUR: f64 = 3600.0;

// ===== NOMINAL INTERVALS =====

/// Elapsed time substituted when two snapshots carry the same timestamp.
///
/// A zero interval comes from a clock anomaly or a sensor that did not
/// update; rates are computed over one nominal hour instead.
pub const NOMINAL_DELTA_SECONDS: f64 = 3600.0;

/// Default lifetime of the refresh run lease (seconds).
///
/// A crashed cycle releases the single-flight flag after this long.
pub const DEFAULT_LEASE_SECONDS: u64 = 300;
