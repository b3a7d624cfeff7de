//! API surface edits and their persistence after a successful render

mod common;

use std::sync::atomic::Ordering;

use common::{chart_zones, Harness, CHART};
use psychrocam_core::constants::keys;
use psychrocam_core::SnapshotWindow;
use psychrocam_worker::{ApiSurface, ConfigName, CycleOutcome, Persisted};
use serde_json::{json, Map, Value};

fn patch(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap_or_default()
}

#[tokio::test]
async fn sensor_edit_is_persisted_after_render() {
    let h = Harness::new();
    let surface = ApiSurface::new(h.orchestrator.clone());
    assert!(h.orchestrator.run_cycle().await.is_success());

    let merged = surface
        .update_sensor_config(&patch(json!({"history": {"delta_arrows": 7200}, "bogus": 1})))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(merged["history"], json!({"scan_interval": 30, "delta_arrows": 7200}));
    assert_eq!(merged["sun"], json!({"latitude": 40.4}));
    assert!(merged.get("bogus").is_none());

    assert_eq!(h.storage.saved_names(), vec![ConfigName::Sensors]);
    let stored = h.storage.current(ConfigName::Sensors).unwrap();
    assert_eq!(stored["history"]["delta_arrows"], json!(7200));
    assert!(!h.cache.is_flag_set(keys::SENSOR_CONFIG_DIRTY).unwrap());
    assert_eq!(surface.sensor_config().unwrap(), Some(stored));

    // Derived state was rebuilt from scratch
    let window: SnapshotWindow = h.cache.get_json(keys::HISTORY_WINDOW).unwrap().unwrap();
    assert_eq!(window.len(), 1);
    assert_eq!(h.script.validations.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn failed_render_keeps_sensor_edit_in_cache_only() {
    let h = Harness::new();
    let surface = ApiSurface::new(h.orchestrator.clone());
    h.renderer.fail.store(true, Ordering::SeqCst);

    surface
        .update_sensor_config(&patch(json!({"location": {"altitude": 900}})))
        .await
        .unwrap();

    assert!(h.storage.saved_names().is_empty());
    assert!(h.cache.is_flag_set(keys::SENSOR_CONFIG_DIRTY).unwrap());
    let cached = surface.sensor_config().unwrap().unwrap();
    assert_eq!(cached["location"], json!({"altitude": 900, "pressure_sensor": "sensor.p"}));

    // The next good cycle persists it
    h.renderer.fail.store(false, Ordering::SeqCst);
    match h.orchestrator.run_cycle().await {
        CycleOutcome::Succeeded { reconciled, .. } => assert_eq!(reconciled.sensors, Persisted::Saved),
        other => panic!("unexpected outcome {other:?}"),
    }
    assert_eq!(
        h.storage.current(ConfigName::Sensors).unwrap()["location"]["altitude"],
        json!(900)
    );
}

#[tokio::test]
async fn chart_edit_survives_failed_save() {
    let h = Harness::new();
    let surface = ApiSurface::new(h.orchestrator.clone());
    h.storage.fail_saves.store(true, Ordering::SeqCst);

    let zones = json!([{"label": "Winter", "points_x": [18, 23]}]);
    let merged = surface
        .update_chart_config(&patch(json!({"figure": {"title": "New"}, "zones": zones.clone()})))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(merged["figure"], json!({"title": "New", "dpi": 100}));
    assert_eq!(merged["zones"], zones);

    assert!(h.cache.is_flag_set(keys::CHART_CONFIG_DIRTY).unwrap());
    assert_eq!(h.cache.get_bytes(keys::RENDERED_CHART).unwrap(), Some(CHART.to_vec()));

    h.storage.fail_saves.store(false, Ordering::SeqCst);
    match h.orchestrator.run_cycle().await {
        CycleOutcome::Succeeded { reconciled, .. } => assert_eq!(reconciled.chart, Persisted::Saved),
        other => panic!("unexpected outcome {other:?}"),
    }
    assert!(!h.cache.is_flag_set(keys::CHART_CONFIG_DIRTY).unwrap());
    assert_eq!(
        h.storage.current(ConfigName::ChartStyle).unwrap()["figure"]["title"],
        json!("New")
    );
    assert_eq!(h.storage.current(ConfigName::ChartZones).unwrap(), json!({"zones": zones.clone()}));
    assert_eq!(surface.chart_config().unwrap().unwrap()["zones"], zones);
}

#[tokio::test]
async fn missing_chart_config_triggers_reset() {
    let h = Harness::new();
    let surface = ApiSurface::new(h.orchestrator.clone());
    h.cache.set_json("leftover", &json!(1)).unwrap();

    assert_eq!(surface.chart_config().unwrap(), None);
    assert!(!h.cache.has("leftover").unwrap());

    let config = surface.chart_config().unwrap().unwrap();
    assert_eq!(config["figure"]["title"], json!("Home"));
    assert_eq!(config["zones"], chart_zones()["zones"]);
}

#[tokio::test]
async fn empty_patch_changes_nothing() {
    let h = Harness::new();
    let surface = ApiSurface::new(h.orchestrator.clone());

    assert_eq!(surface.update_chart_config(&Map::new()).await.unwrap(), None);
    assert_eq!(surface.update_sensor_config(&Map::new()).await.unwrap(), None);
    assert!(h.dump().is_empty());
    assert_eq!(h.renderer.calls(), 0);
}

#[tokio::test]
async fn read_accessors_follow_cycles() {
    let h = Harness::new();
    let surface = ApiSurface::new(h.orchestrator.clone());

    assert!(surface.states().unwrap().is_none());
    assert!(surface.svg_chart().unwrap().is_none());
    assert!(surface.evolution().unwrap().is_none());

    assert!(h.orchestrator.run_cycle().await.is_success());
    assert_eq!(surface.states().unwrap().map(|s| s.len()), Some(5));
    assert_eq!(surface.svg_chart().unwrap(), Some(CHART.to_vec()));
    // Evolution needs more history than one cycle
    assert!(surface.evolution().unwrap().is_none());

    surface.force_full_reset().unwrap();
    assert!(surface.svg_chart().unwrap().is_none());
}
