//! Byte-Oriented Shared Store Seam
//!
//! ## Overview
//!
//! The cache sits on top of a store that only understands keys and byte
//! values, the same contract a Redis-like server offers. Every component
//! receives the store explicitly; there is no process-wide instance.
//!
//! ## Semantics Every Backend Must Honor
//!
//! - `set` replaces the value and clears any pending expiry (last write wins)
//! - `expire` schedules removal of an existing key and reports whether it existed
//! - expired keys are indistinguishable from absent keys
//! - `delete` is idempotent and returns how many keys were actually removed
//! - operations are single round trips; there are no multi-key transactions
//!
//! ## Backends
//!
//! - [`MemoryStore`]: in-process map, used by tests and single-process runs
//! - `SqliteStore` (worker crate): file-backed, shared by several processes

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::errors::{StoreError, StoreResult};
use crate::time::{SystemTime, TimeSource, Timestamp};

/// Byte-oriented key-value store shared by producers and consumers
pub trait KeyValueStore: Send + Sync {
    /// Read the bytes stored under `key`
    fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>>;

    /// Write `value` under `key`, dropping any expiry
    fn set(&self, key: &str, value: &[u8]) -> StoreResult<()>;

    /// Check whether `key` holds a live value
    fn exists(&self, key: &str) -> StoreResult<bool>;

    /// Remove every listed key, returning how many existed
    fn delete(&self, keys: &[&str]) -> StoreResult<usize>;

    /// Expire `key` after `ttl`; false when the key does not exist
    fn expire(&self, key: &str, ttl: Duration) -> StoreResult<bool>;

    /// List live keys starting with `prefix`
    fn keys_with_prefix(&self, prefix: &str) -> StoreResult<Vec<String>>;
}

#[derive(Debug, Clone)]
struct StoredValue {
    bytes: Vec<u8>,
    expires_at: Option<Timestamp>,
}

impl StoredValue {
    fn is_live(&self, now: Timestamp) -> bool {
        self.expires_at.map_or(true, |deadline| now < deadline)
    }
}

/// In-process store with TTL support
///
/// ## Example
///
/// ```rust
/// use psychrocam_core::store::{KeyValueStore, MemoryStore};
///
/// let store = MemoryStore::new();
/// store.set("svg_chart", b"<svg/>").unwrap();
/// assert_eq!(store.get("svg_chart").unwrap().as_deref(), Some(&b"<svg/>"[..]));
/// ```
pub struct MemoryStore {
    entries: Mutex<HashMap<String, StoredValue>>,
    clock: Arc<dyn TimeSource>,
}

impl MemoryStore {
    /// Create an empty store driven by the wall clock
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemTime))
    }

    /// Create an empty store whose expiries follow `clock`
    pub fn with_clock(clock: Arc<dyn TimeSource>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            clock,
        }
    }

    /// Number of live keys
    pub fn len(&self) -> usize {
        let now = self.clock.now();
        self.lock()
            .map(|entries| entries.values().filter(|v| v.is_live(now)).count())
            .unwrap_or(0)
    }

    /// True when no live key remains
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, HashMap<String, StoredValue>>> {
        self.entries.lock().map_err(|_| StoreError::Poisoned)
    }

    /// Fetch a live entry, purging it when it has expired
    fn live<'a>(
        entries: &'a mut HashMap<String, StoredValue>,
        key: &str,
        now: Timestamp,
    ) -> Option<&'a mut StoredValue> {
        let expired = entries.get(key).is_some_and(|v| !v.is_live(now));
        if expired {
            entries.remove(key);
            return None;
        }
        entries.get_mut(key)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        let now = self.clock.now();
        let mut entries = self.lock()?;
        Ok(Self::live(&mut entries, key, now).map(|v| v.bytes.clone()))
    }

    fn set(&self, key: &str, value: &[u8]) -> StoreResult<()> {
        self.lock()?.insert(
            key.to_string(),
            StoredValue {
                bytes: value.to_vec(),
                expires_at: None,
            },
        );
        Ok(())
    }

    fn exists(&self, key: &str) -> StoreResult<bool> {
        let now = self.clock.now();
        let mut entries = self.lock()?;
        Ok(Self::live(&mut entries, key, now).is_some())
    }

    fn delete(&self, keys: &[&str]) -> StoreResult<usize> {
        let now = self.clock.now();
        let mut entries = self.lock()?;
        let removed = keys
            .iter()
            .filter_map(|key| entries.remove(*key))
            .filter(|v| v.is_live(now))
            .count();
        Ok(removed)
    }

    fn expire(&self, key: &str, ttl: Duration) -> StoreResult<bool> {
        let now = self.clock.now();
        let mut entries = self.lock()?;
        match Self::live(&mut entries, key, now) {
            Some(entry) => {
                entry.expires_at = Some(now.saturating_add(ttl.as_millis() as u64));
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn keys_with_prefix(&self, prefix: &str) -> StoreResult<Vec<String>> {
        let now = self.clock.now();
        let entries = self.lock()?;
        let mut keys: Vec<String> = entries
            .iter()
            .filter(|(k, v)| k.starts_with(prefix) && v.is_live(now))
            .map(|(k, _)| k.clone())
            .collect();
        keys.sort();
        Ok(keys)
    }
}
