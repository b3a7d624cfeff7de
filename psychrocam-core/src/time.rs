//! Time sources for cache expiry and run leases
//!
//! Provides clock abstraction so the store and the orchestrator can be
//! driven by the wall clock in production and by a manual clock in tests:
//! - System clock (milliseconds since the Unix epoch)
//! - Manual clock (shared, advanced explicitly)

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Timestamp in milliseconds since the Unix epoch
pub type Timestamp = u64;

/// Source of time for the system
pub trait TimeSource: Send + Sync {
    /// Get current timestamp in milliseconds
    fn now(&self) -> Timestamp;

    /// Current time as fractional seconds, the unit used by point timestamps
    fn now_secs(&self) -> f64 {
        self.now() as f64 / 1000.0
    }
}

/// Wall clock time source
#[derive(Debug, Clone, Default)]
pub struct SystemTime;

impl TimeSource for SystemTime {
    fn now(&self) -> Timestamp {
        use std::time::{SystemTime as StdSystemTime, UNIX_EPOCH};

        StdSystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as Timestamp
    }
}

/// Manually driven clock for tests and replays
///
/// Clones share the same instant, so a test can hand one clone to a store
/// and keep another to advance time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    timestamp: Arc<AtomicU64>,
}

impl ManualClock {
    /// Create a clock frozen at `timestamp`
    pub fn new(timestamp: Timestamp) -> Self {
        Self {
            timestamp: Arc::new(AtomicU64::new(timestamp)),
        }
    }

    /// Jump to an absolute instant
    pub fn set(&self, timestamp: Timestamp) {
        self.timestamp.store(timestamp, Ordering::SeqCst);
    }

    /// Move forward by `ms` milliseconds
    pub fn advance(&self, ms: u64) {
        self.timestamp.fetch_add(ms, Ordering::SeqCst);
    }
}

impl TimeSource for ManualClock {
    fn now(&self) -> Timestamp {
        self.timestamp.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_advances_for_every_clone() {
        let clock = ManualClock::new(1000);
        let shared = clock.clone();

        clock.advance(500);
        assert_eq!(shared.now(), 1500);

        shared.set(10_000);
        assert_eq!(clock.now(), 10_000);
        assert_eq!(clock.now_secs(), 10.0);
    }

    #[test]
    fn system_time_is_after_2020() {
        // 2020-01-01T00:00:00Z
        assert!(SystemTime.now() > 1_577_836_800_000);
    }
}
