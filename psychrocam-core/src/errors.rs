//! Error Types for the Shared Cache and Aggregation Pipeline
//!
//! ## Error Categories
//!
//! Errors are layered the same way the data flows:
//!
//! ### Store Failures
//! - `StoreError`: the byte-oriented backend could not answer (connection
//!   dropped, lock poisoned, SQL error). These propagate up to the caller.
//!
//! ### Cache Failures
//! - `CacheError::Encode` / `CacheError::Decode`: a value could not be turned
//!   into bytes, or bytes found under a key do not match their type tag.
//!
//! ### Configuration Failures
//! - `ConfigError`: the sensor configuration is missing a mandatory section.
//!
//! A cache *miss* is never an error. Getters return `Ok(None)` so callers can
//! fall back to a default without matching on an error variant.
//!
//! ```rust
//! use std::sync::Arc;
//! use psychrocam_core::{MemoryStore, TypedCache};
//!
//! let cache = TypedCache::new(Arc::new(MemoryStore::new()));
//! let altitude = cache.get_f64("altitude").unwrap_or(None).unwrap_or(0.0);
//! assert_eq!(altitude, 0.0);
//! ```

use thiserror::Error;

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Result type for typed cache operations
pub type CacheResult<T> = Result<T, CacheError>;

/// Failures reported by a [`KeyValueStore`](crate::store::KeyValueStore) backend
#[derive(Debug, Error)]
pub enum StoreError {
    /// Backend-specific failure (I/O, SQL, network)
    #[error("Store backend error: {0}")]
    Backend(String),

    /// A lock guarding the in-process store was poisoned by a panicking writer
    #[error("Store lock poisoned")]
    Poisoned,
}

/// Failures reported by [`TypedCache`](crate::cache::TypedCache)
#[derive(Debug, Error)]
pub enum CacheError {
    /// The underlying store failed
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A value could not be serialized
    #[error("Cannot encode value for key '{key}': {reason}")]
    Encode {
        /// Logical cache key
        key: String,
        /// Serializer message
        reason: String,
    },

    /// Stored bytes do not decode as their type tag says
    #[error("Cannot decode value for key '{key}': {reason}")]
    Decode {
        /// Logical cache key
        key: String,
        /// Parser message
        reason: String,
    },
}

impl CacheError {
    pub(crate) fn encode(key: &str, reason: impl ToString) -> Self {
        Self::Encode {
            key: key.to_string(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn decode(key: &str, reason: impl ToString) -> Self {
        Self::Decode {
            key: key.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Sensor configuration problems
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A mandatory top-level section is absent
    #[error("Sensor config is missing the '{0}' section")]
    MissingSection(&'static str),

    /// The configuration does not have the expected shape
    #[error("Malformed sensor config: {0}")]
    Malformed(String),

    /// A point uses a name reserved by the evolution report
    #[error("Point name '{0}' is reserved")]
    ReservedName(String),

    /// Writing the derived keys failed
    #[error(transparent)]
    Cache(#[from] CacheError),
}
