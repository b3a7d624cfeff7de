//! Integration tests for the aggregation pipeline
//!
//! Drives the aggregator through whole cycles against a shared cache, the way
//! the worker does, and checks the entities left behind.

mod common;

use psychrocam_core::{
    constants::keys, parse_sensor_config, Arrows, Coordinate, SensorAggregator, Snapshot,
    SnapshotWindow,
};
use serde_json::json;

use common::{cache, sensor_document, state, states, START_TS};

#[test]
fn test_livingroom_point_from_readings() {
    let (_, cache) = cache();
    parse_sensor_config(&cache, &sensor_document(json!({"scan_interval": 30}))).unwrap();
    let aggregator = SensorAggregator::new(cache.clone());

    let readings = [state("sensor.t1", "21.5", START_TS), state("sensor.h1", "45.0", START_TS)]
        .into_iter()
        .collect();
    let outcome = aggregator.aggregate(&readings).unwrap();

    assert_eq!(outcome.points["livingroom"].xy, Coordinate(21.5, 45.0));
    // terrace has no readings yet
    assert!(outcome.unknown.contains("terrace"));
    assert!(!outcome.points.contains_key("terrace"));
}

#[test]
fn test_pressure_millibar_to_kilopascal() {
    let (_, cache) = cache();
    parse_sensor_config(&cache, &sensor_document(json!({}))).unwrap();
    let aggregator = SensorAggregator::new(cache.clone());

    let mut readings = states((20.0, 50.0), (10.0, 80.0), START_TS);
    readings.extend([state("sensor.p", "1013", START_TS)]);
    aggregator.aggregate(&readings).unwrap();

    let kpa = cache.get_f64(keys::PRESSURE_KPA).unwrap().unwrap();
    assert!((kpa - 101.3).abs() < 1e-9);
}

#[test]
fn test_bad_pressure_keeps_previous_value() {
    let (_, cache) = cache();
    parse_sensor_config(&cache, &sensor_document(json!({}))).unwrap();
    let aggregator = SensorAggregator::new(cache.clone());

    let mut readings = states((20.0, 50.0), (10.0, 80.0), START_TS);
    readings.extend([state("sensor.p", "990", START_TS)]);
    aggregator.aggregate(&readings).unwrap();

    readings.extend([state("sensor.p", "unknown", START_TS + 30)]);
    aggregator.aggregate(&readings).unwrap();
    assert_eq!(cache.get_f64(keys::PRESSURE_KPA).unwrap(), Some(99.0));
}

#[test]
fn test_window_of_three_keeps_last_three_in_order() {
    let (_, cache) = cache();
    parse_sensor_config(
        &cache,
        &sensor_document(json!({"scan_interval": 30, "delta_arrows": 30})),
    )
    .unwrap();
    let aggregator = SensorAggregator::new(cache.clone());

    for i in 0..4 {
        let t = 20.0 + i as f64;
        aggregator
            .aggregate(&states((t, 50.0), (10.0, 80.0), START_TS + i * 30))
            .unwrap();
    }

    let window: SnapshotWindow = cache.get_json(keys::HISTORY_WINDOW).unwrap().unwrap();
    assert_eq!(window.capacity(), 3);
    let temps: Vec<f64> = window
        .iter()
        .map(|snapshot: &Snapshot| snapshot["livingroom"].xy.temperature())
        .collect();
    assert_eq!(temps, vec![21.0, 22.0, 23.0]);
}

#[test]
fn test_arrows_follow_moving_points_only() {
    let (_, cache) = cache();
    parse_sensor_config(
        &cache,
        &sensor_document(json!({"scan_interval": 600, "delta_arrows": 3600})),
    )
    .unwrap();
    let aggregator = SensorAggregator::new(cache.clone());

    aggregator.aggregate(&states((20.0, 50.0), (10.0, 80.0), START_TS)).unwrap();
    aggregator.aggregate(&states((20.5, 49.0), (10.0, 80.0), START_TS + 600)).unwrap();

    let arrows: Arrows = cache.get_json(keys::ARROWS).unwrap().unwrap();
    assert_eq!(arrows.len(), 1);
    assert_eq!(arrows["livingroom"].xy, [Coordinate(20.5, 49.0), Coordinate(20.0, 50.0)]);

    // terrace moves next; its arrow takes the configured color and alpha
    aggregator.aggregate(&states((20.5, 49.0), (11.0, 78.0), START_TS + 1200)).unwrap();
    let arrows: Arrows = cache.get_json(keys::ARROWS).unwrap().unwrap();
    assert_eq!(arrows.len(), 2);
    let terrace = &arrows["terrace"].style.color;
    assert_eq!(terrace.len(), 4);
    assert_eq!(terrace[3], 0.9);
}

#[test]
fn test_evolution_report_shape() {
    let (_, cache) = cache();
    parse_sensor_config(
        &cache,
        &sensor_document(json!({"scan_interval": 600, "delta_arrows": 3600})),
    )
    .unwrap();
    let aggregator = SensorAggregator::new(cache.clone());

    for i in 0..3 {
        let outcome = aggregator
            .aggregate(&states((20.0 + i as f64, 50.0), (10.0, 80.0), START_TS + i * 600))
            .unwrap();
        assert!(outcome.evolution.is_none());
    }
    aggregator
        .aggregate(&states((24.0, 50.0), (10.0, 80.0), START_TS + 1800))
        .unwrap();

    let report: serde_json::Value = cache.get_json(keys::EVOLUTION).unwrap().unwrap();
    assert_eq!(report["num_points"], 4);
    assert_eq!(report["livingroom"]["last"]["temperature"], 24.0);
    assert_eq!(report["livingroom"]["first"]["delta_temperature"], 4.0);
    assert_eq!(report["livingroom"]["first"]["rate_per_hour"], 8.0);
    // terrace never moved: zero deltas, not missing ones
    assert_eq!(report["terrace"]["mid"]["delta_temperature"], 0.0);
}
