//! Common fixtures for core integration tests
//!
//! This module provides:
//! - A cache over a fresh in-memory store (optionally on a manual clock)
//! - Fetched-state builders
//! - A sensor configuration document with one interior and one exterior point

#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, Utc};
use psychrocam_core::{EntityState, ManualClock, MemoryStore, States, TypedCache};
use serde_json::{json, Value};

/// Epoch used by every fixture, 2023-11-14T22:13:20Z
pub const START_TS: i64 = 1_700_000_000;

/// Cache over an empty store on the wall clock
pub fn cache() -> (Arc<MemoryStore>, TypedCache) {
    let store = Arc::new(MemoryStore::new());
    let cache = TypedCache::new(store.clone());
    (store, cache)
}

/// Cache over an empty store driven by the returned clock
pub fn cache_with_clock() -> (ManualClock, TypedCache) {
    let clock = ManualClock::new(START_TS as u64 * 1000);
    let store = MemoryStore::with_clock(Arc::new(clock.clone()));
    (clock, TypedCache::new(Arc::new(store)))
}

/// One fetched state
pub fn state(entity: &str, value: &str, ts: i64) -> (String, EntityState) {
    let at = DateTime::<Utc>::from_timestamp(ts, 0).unwrap_or_default();
    (
        entity.to_string(),
        EntityState {
            entity_id: entity.to_string(),
            state: value.to_string(),
            last_changed: at,
            last_updated: at,
        },
    )
}

/// States for the living room and terrace points at `ts`
pub fn states(living: (f64, f64), terrace: (f64, f64), ts: i64) -> States {
    [
        state("sensor.t1", &living.0.to_string(), ts),
        state("sensor.h1", &living.1.to_string(), ts),
        state("sensor.t2", &terrace.0.to_string(), ts),
        state("sensor.h2", &terrace.1.to_string(), ts),
    ]
    .into_iter()
    .collect()
}

/// Sensor configuration with the given history section
pub fn sensor_document(history: Value) -> Value {
    json!({
        "homeassistant": {"host": "hass.local", "port": 8123},
        "history": history,
        "location": {"altitude": 650, "pressure_sensor": "sensor.p"},
        "interior": {
            "livingroom": {"temperature": "sensor.t1", "humidity": "sensor.h1", "style": {}}
        },
        "exterior": {
            "terrace": {"temperature": "sensor.t2", "humidity": "sensor.h2",
                        "style": {"color": "darkblue", "alpha": 0.9}}
        }
    })
}
