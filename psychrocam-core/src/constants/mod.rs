//! Constants for Psychrocam Core
//!
//! Centralized names and numbers shared by the cache, the aggregator and the
//! worker. Cache key names are part of the interop contract with any other
//! process reading the same store, so they must never be renamed.
//!
//! ## Organization
//!
//! - **Keys**: logical cache keys and the type-tag shadow prefix
//! - **Buffers**: history window sizing
//! - **Time**: unit conversions and nominal intervals

/// Logical cache keys shared with the API surface and partner processes.
pub mod keys;

/// History window sizing.
pub mod buffers;

/// Time conversions and nominal intervals.
pub mod time;

pub use buffers::{MIN_HISTORY_CAPACITY, MIN_SNAPSHOTS_FOR_ARROWS, MIN_SNAPSHOTS_FOR_EVOLUTION};
pub use keys::TYPE_TAG_PREFIX;
pub use time::{NOMINAL_DELTA_SECONDS, SECONDS_PER_HOUR};

// ===== STYLING =====

/// Arrow color used when a point style carries no usable color (RGB).
pub const DEFAULT_ARROW_COLOR: [f64; 3] = [1.0, 0.8, 0.1];

/// Arrow alpha appended when a point style carries an RGB color and no alpha.
pub const DEFAULT_ARROW_ALPHA: f64 = 0.6;

/// Arrow shape understood by the rendering collaborator.
pub const ARROW_SHAPE: &str = "wedge";

/// Marker every point gets unless its style overrides it.
pub const DEFAULT_POINT_MARKER: &str = "o";

// ===== UNITS =====

/// Millibar readings are divided by this to obtain kilopascal.
pub const MILLIBAR_PER_KILOPASCAL: f64 = 10.0;
