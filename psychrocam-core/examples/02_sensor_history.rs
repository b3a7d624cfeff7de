//! Sensor History Example
//!
//! Feeds a few cycles of fetched states through the aggregator and prints the
//! points, arrows and evolution report it leaves in the cache.
//!
//! ## Running the Example
//!
//! ```bash
//! cargo run --example 02_sensor_history
//! ```

use std::sync::Arc;

use chrono::{DateTime, Utc};
use psychrocam_core::{
    parse_sensor_config, EntityState, MemoryStore, SensorAggregator, States, TypedCache,
};
use serde_json::json;

fn state(entity: &str, value: f64, ts: i64) -> (String, EntityState) {
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

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("Psychrocam Sensor History Example");
    println!("=================================\n");

    let cache = TypedCache::new(Arc::new(MemoryStore::new()));
    parse_sensor_config(
        &cache,
        &json!({
            "homeassistant": {"host": "127.0.0.1"},
            "history": {"scan_interval": 600, "delta_arrows": 3600},
            "location": {"pressure_sensor": "sensor.pressure"},
            "interior": {
                "livingroom": {"temperature": "sensor.t_living", "humidity": "sensor.h_living",
                               "style": {"color": "darkorange"}}
            },
            "exterior": {
                "terrace": {"temperature": "sensor.t_out", "humidity": "sensor.h_out"}
            }
        }),
    )?;

    let aggregator = SensorAggregator::new(cache.clone());

    // One cycle every 10 minutes: the living room warms up, outside stays put
    let start = 1_700_000_000;
    for cycle in 0..5 {
        let ts = start + cycle * 600;
        let warming = cycle as f64 * 0.4;
        let states: States = [
            state("sensor.t_living", 20.0 + warming, ts),
            state("sensor.h_living", 50.0 - warming, ts),
            state("sensor.t_out", 12.0, ts),
            state("sensor.h_out", 80.0, ts),
            state("sensor.pressure", 1013.0 - cycle as f64, ts),
        ]
        .into_iter()
        .collect();

        let outcome = aggregator.aggregate(&states)?;
        println!(
            "cycle {cycle}: {} points, window {:?}, {} arrows",
            outcome.points.len(),
            outcome.window_len,
            outcome.arrows.as_ref().map_or(0, |a| a.len())
        );
    }

    println!("\npressure: {:?} kPa", cache.get_f64("pressure_kpa")?);
    println!("span: {:?} h", aggregator.history_span_hours()?);

    if let Some(report) = cache.get_json::<serde_json::Value>("ha_evolution")? {
        println!("\nevolution:\n{}", serde_json::to_string_pretty(&report)?);
    }

    Ok(())
}
