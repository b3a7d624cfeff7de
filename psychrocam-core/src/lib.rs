//! Core cache and aggregation engine for Psychrocam
//!
//! Holds everything the refresh pipeline shares between processes:
//! a typed cache over a byte-oriented store, the sensor configuration
//! parser, and the aggregator that turns fetched states into chart points,
//! history, arrows and evolution deltas.
//!
//! Key constraints:
//! - No process-wide singleton: the store is handed to every component
//! - Nothing survives a cycle outside the cache
//! - A cache miss is never an error
//!
//! ```no_run
//! use std::sync::Arc;
//! use psychrocam_core::{MemoryStore, SensorAggregator, States, TypedCache};
//!
//! let cache = TypedCache::new(Arc::new(MemoryStore::new()));
//! let aggregator = SensorAggregator::new(cache.clone());
//!
//! // Feed the states fetched this cycle
//! match aggregator.aggregate(&States::new()) {
//!     Ok(outcome) => println!("{} points", outcome.points.len()),
//!     Err(e) => eprintln!("cache failure: {e}"),
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod aggregator;
pub mod buffer;
pub mod cache;
pub mod config;
pub mod constants;
pub mod errors;
pub mod model;
pub mod store;
pub mod style;
pub mod time;

// Public API
pub use aggregator::{AggregateOutcome, SensorAggregator, SnapshotWindow};
pub use buffer::HistoryWindow;
pub use cache::{CacheValue, TypeTag, TypedCache};
pub use config::{parse_sensor_config, HistoryConfig, RemoteConfig, SensorConfig, SensorGroups};
pub use errors::{CacheError, CacheResult, ConfigError, StoreError, StoreResult};
pub use model::{
    ArrowVector, Arrows, Coordinate, DeltaRecord, EntityState, EvolutionReport, RemoteHandle,
    SensorPoint, Snapshot, States,
};
pub use store::{KeyValueStore, MemoryStore};
pub use time::{ManualClock, SystemTime, TimeSource, Timestamp};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
