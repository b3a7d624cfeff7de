//! Common harness for worker integration tests
//!
//! This module provides:
//! - A scripted telemetry source whose answers and timing tests control
//! - A renderer that records every context it is given
//! - Config storage kept in memory
//! - A ready-wired orchestrator over an in-memory store on a manual clock

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use psychrocam_connectors::{ApiStatus, ConnectionStats, ConnectorError, SourceFactory, TelemetrySource};
use psychrocam_core::{
    EntityState, KeyValueStore, ManualClock, MemoryStore, RemoteHandle, States, TypedCache,
};
use psychrocam_worker::{
    ChartRenderer, ConfigName, ConfigStorage, RefreshOrchestrator, RenderContext, RenderError,
    StorageError,
};
use serde_json::{json, Value};
use tokio::sync::Notify;

/// Epoch used by every fixture, 2023-11-14T22:13:20Z
pub const START_TS: i64 = 1_700_000_000;

/// Bytes returned by [`RecordingRenderer`]
pub const CHART: &[u8] = b"<svg>chart</svg>";

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

/// States for the living room, the terrace and the barometer at `ts`
pub fn states(living: (f64, f64), terrace: (f64, f64), ts: i64) -> States {
    [
        state("sensor.p", "1013", ts),
        state("sensor.t1", &living.0.to_string(), ts),
        state("sensor.h1", &living.1.to_string(), ts),
        state("sensor.t2", &terrace.0.to_string(), ts),
        state("sensor.h2", &terrace.1.to_string(), ts),
    ]
    .into_iter()
    .collect()
}

/// Sensor configuration with one interior and one exterior point
pub fn sensor_document() -> Value {
    json!({
        "homeassistant": {"host": "hass.local", "port": 8123, "api_password": "secret"},
        "history": {"scan_interval": 30, "delta_arrows": 3600},
        "location": {"altitude": 650, "pressure_sensor": "sensor.p"},
        "sun": {"latitude": 40.4},
        "interior": {
            "livingroom": {"temperature": "sensor.t1", "humidity": "sensor.h1", "style": {}}
        },
        "exterior": {
            "terrace": {"temperature": "sensor.t2", "humidity": "sensor.h2",
                        "style": {"color": "darkblue"}}
        }
    })
}

/// Chart style fixture
pub fn chart_style() -> Value {
    json!({"figure": {"title": "Home", "dpi": 100}, "limits": {"range_temp_c": [0, 40]}})
}

/// Zones overlay fixture
pub fn chart_zones() -> Value {
    json!({"zones": [{"label": "Summer", "points_x": [23, 28]}]})
}

/// Controls what [`ScriptedSource`] answers
#[derive(Default)]
pub struct Script {
    status: Mutex<Option<ApiStatus>>,
    states: Mutex<States>,
    gated: AtomicBool,
    /// Signalled when a fetch starts
    pub entered: Notify,
    /// Lets a gated fetch finish
    pub release: Notify,
    /// Number of `validate` calls
    pub validations: AtomicUsize,
    /// Number of `fetch_states` calls
    pub fetches: AtomicUsize,
    /// Handles passed to the factory
    pub connected: Mutex<Vec<RemoteHandle>>,
}

impl Script {
    /// Answer `validate` with `status`
    pub fn set_status(&self, status: ApiStatus) {
        *self.status.lock().unwrap() = Some(status);
    }

    /// Answer `fetch_states` from `states`
    pub fn set_states(&self, states: States) {
        *self.states.lock().unwrap() = states;
    }

    /// Hold every fetch until [`Script::release`] is notified
    pub fn gate(&self) {
        self.gated.store(true, Ordering::SeqCst);
    }
}

/// Telemetry source answering from a [`Script`]
pub struct ScriptedSource {
    script: Arc<Script>,
}

#[async_trait]
impl TelemetrySource for ScriptedSource {
    async fn validate(&self) -> ApiStatus {
        self.script.validations.fetch_add(1, Ordering::SeqCst);
        self.script.status.lock().unwrap().unwrap_or(ApiStatus::Ok)
    }

    async fn fetch_states(&self, entity_ids: &[String]) -> States {
        self.script.fetches.fetch_add(1, Ordering::SeqCst);
        self.script.entered.notify_one();
        if self.script.gated.load(Ordering::SeqCst) {
            self.script.release.notified().await;
        }
        let states = self.script.states.lock().unwrap().clone();
        states
            .into_iter()
            .filter(|(id, _)| entity_ids.contains(id))
            .collect()
    }

    fn stats(&self) -> ConnectionStats {
        ConnectionStats::default()
    }
}

/// Factory handing out [`ScriptedSource`]s
pub struct ScriptedFactory {
    pub script: Arc<Script>,
}

impl SourceFactory for ScriptedFactory {
    fn connect(&self, handle: &RemoteHandle) -> Result<Box<dyn TelemetrySource>, ConnectorError> {
        self.script.connected.lock().unwrap().push(handle.clone());
        Ok(Box::new(ScriptedSource {
            script: self.script.clone(),
        }))
    }
}

/// Renderer that records contexts and returns [`CHART`]
#[derive(Default)]
pub struct RecordingRenderer {
    pub contexts: Mutex<Vec<RenderContext>>,
    pub fail: AtomicBool,
}

impl RecordingRenderer {
    pub fn calls(&self) -> usize {
        self.contexts.lock().unwrap().len()
    }
}

#[async_trait]
impl ChartRenderer for RecordingRenderer {
    async fn render(&self, context: &RenderContext) -> Result<Vec<u8>, RenderError> {
        self.contexts.lock().unwrap().push(context.clone());
        if self.fail.load(Ordering::SeqCst) {
            return Err(RenderError::Empty);
        }
        Ok(CHART.to_vec())
    }
}

/// Config storage held in memory
#[derive(Default)]
pub struct MemoryConfigStorage {
    configs: Mutex<HashMap<ConfigName, Value>>,
    pub saved: Mutex<Vec<(ConfigName, Value)>>,
    pub fail_saves: AtomicBool,
}

impl MemoryConfigStorage {
    /// Storage preloaded with the fixtures
    pub fn with_fixtures() -> Self {
        let storage = Self::default();
        {
            let mut configs = storage.configs.lock().unwrap();
            configs.insert(ConfigName::Sensors, sensor_document());
            configs.insert(ConfigName::ChartStyle, chart_style());
            configs.insert(ConfigName::ChartZones, chart_zones());
        }
        storage
    }

    pub fn current(&self, name: ConfigName) -> Option<Value> {
        self.configs.lock().unwrap().get(&name).cloned()
    }

    pub fn saved_names(&self) -> Vec<ConfigName> {
        self.saved.lock().unwrap().iter().map(|(name, _)| *name).collect()
    }
}

impl ConfigStorage for MemoryConfigStorage {
    fn load(&self, name: ConfigName) -> Result<Value, StorageError> {
        self.current(name).ok_or(StorageError::Rejected {
            name: name.as_str(),
            reason: "not in memory",
        })
    }

    fn save(&self, name: ConfigName, config: &Value) -> Result<(), StorageError> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(StorageError::Rejected {
                name: name.as_str(),
                reason: "saves disabled",
            });
        }
        psychrocam_worker::storage::check_saveable(name, config)?;
        self.configs.lock().unwrap().insert(name, config.clone());
        self.saved.lock().unwrap().push((name, config.clone()));
        Ok(())
    }
}

/// Everything a worker test needs, wired together
pub struct Harness {
    pub clock: ManualClock,
    pub store: Arc<MemoryStore>,
    pub cache: TypedCache,
    pub script: Arc<Script>,
    pub renderer: Arc<RecordingRenderer>,
    pub storage: Arc<MemoryConfigStorage>,
    pub orchestrator: Arc<RefreshOrchestrator>,
}

impl Harness {
    /// Fixtures loaded in storage, remote answering with states at START_TS
    pub fn new() -> Self {
        let clock = ManualClock::new(START_TS as u64 * 1000);
        let store = Arc::new(MemoryStore::with_clock(Arc::new(clock.clone())));
        let cache = TypedCache::new(store.clone());
        let script = Arc::new(Script::default());
        script.set_states(states((21.5, 45.0), (12.0, 80.0), START_TS));
        let renderer = Arc::new(RecordingRenderer::default());
        let storage = Arc::new(MemoryConfigStorage::with_fixtures());
        let orchestrator = Arc::new(RefreshOrchestrator::new(
            cache.clone(),
            storage.clone(),
            Arc::new(ScriptedFactory {
                script: script.clone(),
            }),
            renderer.clone(),
        ));
        Self {
            clock,
            store,
            cache,
            script,
            renderer,
            storage,
            orchestrator,
        }
    }

    /// Raw contents of the store
    pub fn dump(&self) -> BTreeMap<String, Vec<u8>> {
        self.store
            .keys_with_prefix("")
            .unwrap()
            .into_iter()
            .filter_map(|key| {
                let value = self.store.get(&key).unwrap()?;
                Some((key, value))
            })
            .collect()
    }
}
