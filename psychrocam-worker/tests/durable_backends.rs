//! File-backed config storage and the SQLite shared store

use std::fs;
use std::sync::Arc;
use std::time::Duration;

use psychrocam_core::constants::keys;
use psychrocam_core::{CacheValue, TypedCache};
use psychrocam_worker::{ConfigName, ConfigStorage, FileConfigStorage, SqliteStore, StorageError};
use serde_json::json;
use tempfile::tempdir;

#[test]
fn packaged_default_without_files() {
    let dir = tempdir().unwrap();
    let storage = FileConfigStorage::new(dir.path());

    assert!(storage.select(ConfigName::Sensors).is_none());
    let config = storage.load(ConfigName::Sensors).unwrap();
    assert!(config.get("homeassistant").is_some());
    assert!(storage.load(ConfigName::ChartZones).unwrap().get("zones").is_some());
}

#[test]
fn custom_file_wins_over_default() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("default_chart_style.yaml"), "figure:\n  title: Default\n").unwrap();
    let storage = FileConfigStorage::new(dir.path());
    assert_eq!(storage.load(ConfigName::ChartStyle).unwrap()["figure"]["title"], json!("Default"));

    fs::write(dir.path().join("_custom_chart_style.yaml"), "figure:\n  title: Mine\n").unwrap();
    assert_eq!(storage.load(ConfigName::ChartStyle).unwrap()["figure"]["title"], json!("Mine"));
}

#[test]
fn save_writes_custom_file_only() {
    let dir = tempdir().unwrap();
    let storage = FileConfigStorage::new(dir.path());
    let zones = json!({"zones": [{"label": "Summer", "points_x": [23, 28]}]});

    storage.save(ConfigName::ChartZones, &zones).unwrap();

    assert!(dir.path().join("_custom_zones_overlay.yaml").exists());
    assert!(!dir.path().join("default_zones_overlay.yaml").exists());
    assert_eq!(storage.load(ConfigName::ChartZones).unwrap(), zones);
}

#[test]
fn empty_config_is_not_saved() {
    let dir = tempdir().unwrap();
    let storage = FileConfigStorage::new(dir.path());

    let err = storage.save(ConfigName::Sensors, &json!({})).unwrap_err();
    assert!(matches!(err, StorageError::Rejected { name: "ha_sensors", .. }));
    assert!(storage.save(ConfigName::Sensors, &json!(["a"])).is_err());
    assert!(!dir.path().join("_custom_ha_sensors.yaml").exists());
}

#[test]
fn broken_yaml_is_reported() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("_custom_ha_sensors.yaml"), "interior: [unclosed\n").unwrap();
    let storage = FileConfigStorage::new(dir.path());

    assert!(matches!(
        storage.load(ConfigName::Sensors),
        Err(StorageError::Yaml { .. })
    ));
}

#[test]
fn two_handles_share_one_database() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("cache.sqlite");
    let writer = TypedCache::new(Arc::new(SqliteStore::open(&path).unwrap()));
    let reader = TypedCache::new(Arc::new(SqliteStore::open(&path).unwrap()));

    writer
        .set(keys::REFRESH_IN_FLIGHT, &CacheValue::Int(1), Some(Duration::from_secs(300)))
        .unwrap();
    writer.set_json(keys::CHART_STYLE, &json!({"figure": {}})).unwrap();
    writer.set(keys::RENDERED_CHART, &CacheValue::Bytes(b"<svg/>".to_vec()), None).unwrap();

    assert!(reader.is_flag_set(keys::REFRESH_IN_FLIGHT).unwrap());
    assert_eq!(
        reader.get_json::<serde_json::Value>(keys::CHART_STYLE).unwrap(),
        Some(json!({"figure": {}}))
    );
    assert_eq!(reader.get_bytes(keys::RENDERED_CHART).unwrap(), Some(b"<svg/>".to_vec()));

    assert_eq!(reader.clear().unwrap(), 3);
    assert!(!writer.has(keys::CHART_STYLE).unwrap());
    assert_eq!(writer.clear().unwrap(), 0);
}
