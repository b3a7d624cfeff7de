//! Aggregated Entities Stored in the Shared Cache
//!
//! Every type here is read fully from the cache, transformed, and written
//! back fully. The JSON field names are the ones a partner process reads, so
//! renaming a field is a wire change.
//!
//! ```text
//! last_points   {"livingroom": {"xy": [21.5, 45.0], "style": {...}, "ts": 1.7e9, "label": "livingroom"}}
//! arrows        {"livingroom": {"xy": [[22.0, 44.0], [21.5, 45.0]], "style": {"color": [...], "arrowstyle": "wedge"}}}
//! ```

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::constants::{NOMINAL_DELTA_SECONDS, SECONDS_PER_HOUR};

/// Position of a point on the chart: (dry bulb °C, relative humidity %)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate(pub f64, pub f64);

impl Coordinate {
    /// Dry bulb temperature in °C
    pub fn temperature(&self) -> f64 {
        self.0
    }

    /// Relative humidity in %
    pub fn humidity(&self) -> f64 {
        self.1
    }
}

/// One sensor group's reading at one instant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorPoint {
    /// Chart position
    pub xy: Coordinate,
    /// Display style passed through to the renderer
    #[serde(default)]
    pub style: Map<String, Value>,
    /// Last update of the humidity reading, seconds since the epoch
    pub ts: f64,
    /// Legend label
    pub label: String,
}

/// Full map of points at one polling cycle, keyed by point id
pub type Snapshot = BTreeMap<String, SensorPoint>;

/// Timestamp used to date a whole snapshot (its first point)
pub fn snapshot_timestamp(snapshot: &Snapshot) -> Option<f64> {
    snapshot.values().next().map(|point| point.ts)
}

/// Ids whose last read failed
///
/// Behaves as a set: inserting a present id and removing an absent id are
/// both no-ops. Stored as a JSON list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UnknownPoints(Vec<String>);

impl UnknownPoints {
    /// Mark `id` as unknown
    pub fn insert(&mut self, id: &str) -> bool {
        if self.contains(id) {
            return false;
        }
        self.0.push(id.to_string());
        true
    }

    /// Clear the unknown mark of `id`
    pub fn remove(&mut self, id: &str) -> bool {
        let before = self.0.len();
        self.0.retain(|known| known != id);
        before != self.0.len()
    }

    /// Check if `id` is marked unknown
    pub fn contains(&self, id: &str) -> bool {
        self.0.iter().any(|known| known == id)
    }

    /// Number of unknown ids
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when every point was read
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Style attached to an arrow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArrowStyle {
    /// RGBA components in 0..=1
    pub color: Vec<f64>,
    /// Arrow head shape
    pub arrowstyle: String,
}

/// Movement of one point between the oldest and newest snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArrowVector {
    /// `[newest, oldest]` coordinates
    pub xy: [Coordinate; 2],
    /// Drawing style
    pub style: ArrowStyle,
}

impl ArrowVector {
    /// Newest coordinate
    pub fn head(&self) -> Coordinate {
        self.xy[0]
    }

    /// Oldest coordinate
    pub fn tail(&self) -> Coordinate {
        self.xy[1]
    }
}

/// Arrows keyed by point id
pub type Arrows = BTreeMap<String, ArrowVector>;

/// Change of one point between two snapshots
///
/// Derived on demand, never stored on its own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeltaRecord {
    /// Seconds between the two readings
    pub elapsed_seconds: f64,
    /// Temperature change in °C
    pub delta_temperature: f64,
    /// Relative humidity change in %
    pub delta_humidity: f64,
    /// Temperature rate in °C/h
    pub rate_per_hour: f64,
    /// Earlier temperature in °C
    pub temperature: f64,
    /// Earlier relative humidity in %
    pub humidity: f64,
    /// When the earlier reading was taken
    pub recorded_at: Option<DateTime<Utc>>,
}

impl DeltaRecord {
    /// Delta from `start` to `end`
    ///
    /// Equal timestamps substitute a nominal hour for the elapsed time, so
    /// the rate is always finite.
    pub fn between(start: &SensorPoint, end: &SensorPoint) -> Self {
        let mut elapsed = end.ts - start.ts;
        if elapsed == 0.0 {
            log::debug!("Zero elapsed time between readings at {}", start.ts);
            elapsed = NOMINAL_DELTA_SECONDS;
        }
        let delta_temperature = end.xy.temperature() - start.xy.temperature();
        Self {
            elapsed_seconds: elapsed,
            delta_temperature,
            delta_humidity: end.xy.humidity() - start.xy.humidity(),
            rate_per_hour: delta_temperature / (elapsed / SECONDS_PER_HOUR),
            temperature: start.xy.temperature(),
            humidity: start.xy.humidity(),
            recorded_at: epoch_to_utc(start.ts),
        }
    }
}

fn epoch_to_utc(ts: f64) -> Option<DateTime<Utc>> {
    if !ts.is_finite() {
        return None;
    }
    let secs = ts.floor();
    let nanos = ((ts - secs) * 1e9).round().min(999_999_999.0) as u32;
    DateTime::from_timestamp(secs as i64, nanos)
}

/// Latest reading of a point
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    /// Temperature in °C
    pub temperature: f64,
    /// Relative humidity in %
    pub humidity: f64,
}

impl From<Coordinate> for Reading {
    fn from(xy: Coordinate) -> Self {
        Self {
            temperature: xy.temperature(),
            humidity: xy.humidity(),
        }
    }
}

/// Evolution of one point across the history window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointEvolution {
    /// Newest reading
    pub last: Reading,
    /// Delta against the oldest snapshot
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first: Option<DeltaRecord>,
    /// Delta against the middle snapshot
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mid: Option<DeltaRecord>,
}

/// Evolution report stored under `ha_evolution`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvolutionReport {
    /// Snapshots in the window
    pub num_points: usize,
    /// Last pressure reading in kPa
    pub pressure_kpa: Option<f64>,
    /// Per point evolution, flattened into the top level
    #[serde(flatten)]
    pub points: BTreeMap<String, PointEvolution>,
}

/// State of one remote entity as fetched from the telemetry source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityState {
    /// Remote entity id, e.g. `sensor.livingroom_temperature`
    pub entity_id: String,
    /// Raw textual state
    pub state: String,
    /// Last change of the state value
    pub last_changed: DateTime<Utc>,
    /// Last update of the entity
    pub last_updated: DateTime<Utc>,
}

impl EntityState {
    /// Numeric view of the state
    pub fn value(&self) -> Option<f64> {
        self.state.trim().parse::<f64>().ok().filter(|v| v.is_finite())
    }

    /// `last_updated` in seconds since the epoch
    pub fn updated_ts(&self) -> f64 {
        self.last_updated.timestamp_millis() as f64 / 1000.0
    }
}

/// Fetched states keyed by entity id
pub type States = BTreeMap<String, EntityState>;

/// Cached connection parameters of a validated remote source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteHandle {
    /// Base URL including scheme and port
    pub base_url: String,
    /// Password sent with every request
    pub api_password: Option<String>,
}
