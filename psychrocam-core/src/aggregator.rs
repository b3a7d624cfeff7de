//! Sensor State Aggregation
//!
//! ## Overview
//!
//! Turns the raw states fetched in one cycle into chart entities:
//!
//! ```text
//! states ──▶ ingest_readings ──▶ last_points, points_unknown, pressure_kpa
//!                 │
//!                 ▼
//!          advance_window ──▶ deque_points          (only with delta_arrows > 0)
//!                 │
//!        ┌────────┴─────────┐
//!        ▼                  ▼
//!  compute_arrows     compute_evolution
//!   (≥ 2 snapshots)    (> 3 snapshots)
//!        │                  │
//!        ▼                  ▼
//!     arrows           ha_evolution
//! ```
//!
//! The aggregator keeps nothing between cycles. Every cross-cycle value is
//! read from the cache and written back whole, so any process can pick up
//! where another one stopped.
//!
//! ## Failure Policy
//!
//! One bad sensor never aborts the ingest. A missing entity or a non-numeric
//! state marks that point unknown and leaves its previous position in place.

use log::{debug, error, warn};

use crate::buffer::HistoryWindow;
use crate::cache::{CacheValue, TypedCache};
use crate::config::{HistoryConfig, SensorGroups, SensorPointConfig};
use crate::constants::{
    keys, DEFAULT_POINT_MARKER, MILLIBAR_PER_KILOPASCAL, MIN_SNAPSHOTS_FOR_ARROWS,
    MIN_SNAPSHOTS_FOR_EVOLUTION, SECONDS_PER_HOUR,
};
use crate::errors::{CacheError, CacheResult};
use crate::model::{
    snapshot_timestamp, ArrowVector, Arrows, Coordinate, DeltaRecord, EntityState, EvolutionReport,
    PointEvolution, SensorPoint, Snapshot, States, UnknownPoints,
};
use crate::style::arrow_style;

/// History window of snapshots as stored under `deque_points`
pub type SnapshotWindow = HistoryWindow<Snapshot>;

/// Why one point could not be read
#[derive(Debug, Clone, PartialEq)]
enum ReadingError {
    Missing(String),
    NotNumeric { entity: String, state: String },
}

impl std::fmt::Display for ReadingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Missing(entity) => write!(f, "no state for {entity}"),
            Self::NotNumeric { entity, state } => write!(f, "{entity} reads '{state}'"),
        }
    }
}

/// Summary of one aggregation pass
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateOutcome {
    /// Points after ingestion
    pub points: Snapshot,
    /// Ids that failed this pass
    pub unknown: UnknownPoints,
    /// Window length, when history tracking is enabled
    pub window_len: Option<usize>,
    /// Arrows written this pass
    pub arrows: Option<Arrows>,
    /// Evolution report written this pass
    pub evolution: Option<EvolutionReport>,
}

/// Builds points, history, arrows and evolution from fetched states
#[derive(Clone)]
pub struct SensorAggregator {
    cache: TypedCache,
}

impl SensorAggregator {
    /// Create an aggregator over `cache`
    pub fn new(cache: TypedCache) -> Self {
        Self { cache }
    }

    /// Run ingest, window advance, arrows and evolution in order
    pub fn aggregate(&self, states: &States) -> CacheResult<AggregateOutcome> {
        let (points, unknown) = self.ingest_readings(states)?;
        let mut outcome = AggregateOutcome {
            points,
            unknown,
            window_len: None,
            arrows: None,
            evolution: None,
        };

        let Some(window) = self.advance_window(&outcome.points)? else {
            return Ok(outcome);
        };
        outcome.window_len = Some(window.len());
        outcome.arrows = self.compute_arrows(&window)?;
        outcome.evolution = self.compute_evolution(&window)?;
        Ok(outcome)
    }

    /// Update current points and the pressure scalar from `states`
    ///
    /// Points not read this pass keep their previous position.
    pub fn ingest_readings(&self, states: &States) -> CacheResult<(Snapshot, UnknownPoints)> {
        let groups: SensorGroups = match self.cache.get_json(keys::SENSOR_GROUPS)? {
            Some(groups) => groups,
            None => {
                warn!("No sensor groups configured, nothing to ingest");
                SensorGroups::default()
            }
        };
        let mut points: Snapshot = self.cache.get_json(keys::LAST_POINTS)?.unwrap_or_default();
        let mut unknown: UnknownPoints = self.cache.get_json(keys::UNKNOWN_POINTS)?.unwrap_or_default();

        if let Some(sensor) = &groups.pressure_sensor {
            self.ingest_pressure(states, sensor)?;
        }

        for (id, config) in groups.points() {
            match read_point(states, id, config) {
                Ok(point) => {
                    points.insert(id.clone(), point);
                    unknown.remove(id);
                }
                Err(reason @ ReadingError::Missing(_)) => {
                    error!("Point {id}: {reason}");
                    unknown.insert(id);
                }
                Err(reason) => {
                    warn!("Point {id}: {reason}");
                    unknown.insert(id);
                }
            }
        }

        self.cache.set_json(keys::LAST_POINTS, &points)?;
        self.cache.set_json(keys::UNKNOWN_POINTS, &unknown)?;
        debug!("Ingested {} points ({} unknown)", points.len(), unknown.len());
        Ok((points, unknown))
    }

    fn ingest_pressure(&self, states: &States, sensor: &str) -> CacheResult<()> {
        let Some(state) = states.get(sensor) else {
            warn!("No state for pressure sensor {sensor}");
            return Ok(());
        };
        match state.value() {
            Some(millibar) => {
                let kpa = millibar / MILLIBAR_PER_KILOPASCAL;
                self.cache.set(keys::PRESSURE_KPA, &CacheValue::Float(kpa), None)
            }
            None => {
                error!("Bad pressure read from {sensor}: '{}'", state.state);
                Ok(())
            }
        }
    }

    /// Append `snapshot` to the history window
    ///
    /// Returns `None` without touching the cache when no positive arrow span
    /// is configured. A changed capacity rebuilds the window keeping the
    /// newest snapshots.
    pub fn advance_window(&self, snapshot: &Snapshot) -> CacheResult<Option<SnapshotWindow>> {
        let history: HistoryConfig = self.cache.get_json(keys::HISTORY_CONFIG)?.unwrap_or_default();
        let Some(span) = history.arrow_span() else {
            return Ok(None);
        };
        let capacity = SnapshotWindow::capacity_for(span, history.scan_interval);

        let mut window = match self.load_window()? {
            Some(window) if window.capacity() != capacity => {
                debug!("Resizing history window {} -> {}", window.capacity(), capacity);
                window.rebuild(capacity)
            }
            Some(window) => window,
            None => SnapshotWindow::new(capacity),
        };
        window.push(snapshot.clone());
        self.cache.set_json(keys::HISTORY_WINDOW, &window)?;
        Ok(Some(window))
    }

    /// Stored window; an undecodable one is dropped and started over
    pub fn load_window(&self) -> CacheResult<Option<SnapshotWindow>> {
        match self.cache.get_json(keys::HISTORY_WINDOW) {
            Ok(window) => Ok(window),
            Err(err @ CacheError::Decode { .. }) => {
                warn!("Discarding unreadable history window: {err}");
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    /// Arrows from the oldest to the newest position of every moved point
    pub fn compute_arrows(&self, window: &SnapshotWindow) -> CacheResult<Option<Arrows>> {
        if window.len() < MIN_SNAPSHOTS_FOR_ARROWS {
            return Ok(None);
        }
        let (Some(oldest), Some(newest)) = (window.first(), window.last()) else {
            return Ok(None);
        };

        let arrows: Arrows = newest
            .iter()
            .filter_map(|(id, point)| {
                let previous = oldest.get(id)?;
                (previous.xy != point.xy).then(|| {
                    let arrow = ArrowVector {
                        xy: [point.xy, previous.xy],
                        style: arrow_style(&point.style),
                    };
                    (id.clone(), arrow)
                })
            })
            .collect();

        self.cache.set_json(keys::ARROWS, &arrows)?;
        Ok(Some(arrows))
    }

    /// Evolution of every current point against the first and middle snapshots
    pub fn compute_evolution(&self, window: &SnapshotWindow) -> CacheResult<Option<EvolutionReport>> {
        let n = window.len();
        if n <= MIN_SNAPSHOTS_FOR_EVOLUTION {
            return Ok(None);
        }
        let (Some(first), Some(mid), Some(last)) = (window.first(), window.get(n / 2 - 1), window.last())
        else {
            return Ok(None);
        };

        let points = last
            .iter()
            .map(|(id, end)| {
                let evolution = PointEvolution {
                    last: end.xy.into(),
                    first: first.get(id).map(|start| DeltaRecord::between(start, end)),
                    mid: mid.get(id).map(|start| DeltaRecord::between(start, end)),
                };
                (id.clone(), evolution)
            })
            .collect();

        let report = EvolutionReport {
            num_points: n,
            pressure_kpa: self.cache.get_f64(keys::PRESSURE_KPA)?,
            points,
        };
        self.cache.set_json(keys::EVOLUTION, &report)?;
        Ok(Some(report))
    }

    /// Hours between the oldest and newest snapshot, once the window holds
    /// more than two
    pub fn history_span_hours(&self) -> CacheResult<Option<f64>> {
        let Some(window) = self.load_window()? else {
            return Ok(None);
        };
        if window.len() <= MIN_SNAPSHOTS_FOR_ARROWS {
            return Ok(None);
        }
        let start = window.first().and_then(snapshot_timestamp);
        let end = window.last().and_then(snapshot_timestamp);
        Ok(start
            .zip(end)
            .map(|(start, end)| (end - start) / SECONDS_PER_HOUR))
    }
}

fn reading<'a>(states: &'a States, entity: &str) -> Result<(&'a EntityState, f64), ReadingError> {
    let state = states
        .get(entity)
        .ok_or_else(|| ReadingError::Missing(entity.to_string()))?;
    let value = state.value().ok_or_else(|| ReadingError::NotNumeric {
        entity: entity.to_string(),
        state: state.state.clone(),
    })?;
    Ok((state, value))
}

fn read_point(states: &States, id: &str, config: &SensorPointConfig) -> Result<SensorPoint, ReadingError> {
    let (_, temperature) = reading(states, &config.temperature)?;
    let (humidity_state, humidity) = reading(states, &config.humidity)?;

    let mut style = serde_json::Map::new();
    style.insert("marker".into(), DEFAULT_POINT_MARKER.into());
    style.extend(config.style.clone());

    Ok(SensorPoint {
        xy: Coordinate(temperature, humidity),
        style,
        ts: humidity_state.updated_ts(),
        label: id.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use chrono::{DateTime, Utc};
    use serde_json::json;
    use std::sync::Arc;

    fn cache() -> TypedCache {
        TypedCache::new(Arc::new(MemoryStore::new()))
    }

    fn state(entity: &str, value: &str, ts: i64) -> (String, EntityState) {
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

    fn configure(cache: &TypedCache, history: serde_json::Value) {
        cache
            .set_json(
                keys::SENSOR_GROUPS,
                &json!({
                    "interior": {
                        "livingroom": {"temperature": "sensor.t1", "humidity": "sensor.h1", "style": {}}
                    },
                    "pressure_sensor": "sensor.p"
                }),
            )
            .unwrap();
        cache.set_json(keys::HISTORY_CONFIG, &history).unwrap();
    }

    fn reading_at(t: &str, h: &str, ts: i64) -> States {
        [state("sensor.t1", t, ts), state("sensor.h1", h, ts)].into_iter().collect()
    }

    #[test]
    fn point_from_readings() {
        let cache = cache();
        configure(&cache, json!({}));
        let aggregator = SensorAggregator::new(cache.clone());

        let (points, unknown) = aggregator.ingest_readings(&reading_at("21.5", "45.0", 100)).unwrap();
        let point = &points["livingroom"];
        assert_eq!(point.xy, Coordinate(21.5, 45.0));
        assert_eq!(point.label, "livingroom");
        assert_eq!(point.ts, 100.0);
        assert_eq!(point.style["marker"], "o");
        assert!(unknown.is_empty());

        let stored: Snapshot = cache.get_json(keys::LAST_POINTS).unwrap().unwrap();
        assert_eq!(stored, points);
    }

    #[test]
    fn pressure_is_converted_to_kpa() {
        let cache = cache();
        configure(&cache, json!({}));
        let aggregator = SensorAggregator::new(cache.clone());

        let mut states = reading_at("20", "50", 0);
        states.extend([state("sensor.p", "1013", 0)]);
        aggregator.ingest_readings(&states).unwrap();

        let kpa = cache.get_f64(keys::PRESSURE_KPA).unwrap().unwrap();
        assert!((kpa - 101.3).abs() < 1e-9);
    }

    #[test]
    fn failed_reads_mark_points_unknown_once() {
        let cache = cache();
        configure(&cache, json!({}));
        let aggregator = SensorAggregator::new(cache.clone());

        let (_, unknown) = aggregator.ingest_readings(&States::new()).unwrap();
        assert!(unknown.contains("livingroom"));
        let (_, unknown) = aggregator.ingest_readings(&reading_at("n/a", "40", 0)).unwrap();
        assert_eq!(unknown.len(), 1);

        let (points, unknown) = aggregator.ingest_readings(&reading_at("19", "40", 0)).unwrap();
        assert!(unknown.is_empty());
        assert_eq!(points["livingroom"].xy, Coordinate(19.0, 40.0));

        // a later failure keeps the previous position
        let (points, _) = aggregator.ingest_readings(&reading_at("unavailable", "40", 5)).unwrap();
        assert_eq!(points["livingroom"].xy, Coordinate(19.0, 40.0));
    }

    #[test]
    fn window_skipped_without_span() {
        let cache = cache();
        configure(&cache, json!({"scan_interval": 30, "delta_arrows": 0}));
        let aggregator = SensorAggregator::new(cache.clone());

        let outcome = aggregator.aggregate(&reading_at("20", "50", 0)).unwrap();
        assert_eq!(outcome.window_len, None);
        assert!(!cache.has(keys::HISTORY_WINDOW).unwrap());
        assert!(!cache.has(keys::ARROWS).unwrap());
    }

    #[test]
    fn window_keeps_last_three() {
        let cache = cache();
        configure(&cache, json!({"scan_interval": 30, "delta_arrows": 60}));
        let aggregator = SensorAggregator::new(cache.clone());

        for i in 0..4 {
            let t = format!("{}", 20 + i);
            aggregator.aggregate(&reading_at(&t, "50", i * 30)).unwrap();
        }
        let window = aggregator.load_window().unwrap().unwrap();
        assert_eq!(window.capacity(), 3);
        let temps: Vec<f64> = window.iter().map(|s| s["livingroom"].xy.temperature()).collect();
        assert_eq!(temps, vec![21.0, 22.0, 23.0]);
    }

    #[test]
    fn arrows_only_for_moved_points() {
        let cache = cache();
        configure(&cache, json!({"scan_interval": 30, "delta_arrows": 3600}));
        let aggregator = SensorAggregator::new(cache.clone());

        let first = aggregator.aggregate(&reading_at("20", "50", 0)).unwrap();
        assert_eq!(first.arrows, None);

        let still = aggregator.aggregate(&reading_at("20", "50", 30)).unwrap();
        assert_eq!(still.arrows.map(|a| a.len()), Some(0));

        let moved = aggregator.aggregate(&reading_at("21", "48", 60)).unwrap();
        let arrows = moved.arrows.unwrap();
        assert_eq!(arrows.len(), 1);
        let arrow = &arrows["livingroom"];
        assert_eq!(arrow.head(), Coordinate(21.0, 48.0));
        assert_eq!(arrow.tail(), Coordinate(20.0, 50.0));
        assert_eq!(arrow.style.color, vec![1.0, 0.8, 0.1, 0.6]);
    }

    #[test]
    fn evolution_after_four_snapshots() {
        let cache = cache();
        configure(&cache, json!({"scan_interval": 30, "delta_arrows": 3600}));
        cache.set(keys::PRESSURE_KPA, &CacheValue::Float(101.3), None).unwrap();
        let aggregator = SensorAggregator::new(cache.clone());

        let mut outcome = None;
        for (i, t) in ["20", "21", "22", "24"].iter().enumerate() {
            outcome = Some(aggregator.aggregate(&reading_at(t, "50", i as i64 * 1800)).unwrap());
        }
        let report = outcome.and_then(|o| o.evolution).unwrap();
        assert_eq!(report.num_points, 4);
        assert_eq!(report.pressure_kpa, Some(101.3));

        let point = &report.points["livingroom"];
        assert_eq!(point.last.temperature, 24.0);
        let first = point.first.as_ref().unwrap();
        assert_eq!(first.delta_temperature, 4.0);
        assert_eq!(first.elapsed_seconds, 5400.0);
        // mid is index 4/2 - 1 = 1
        let mid = point.mid.as_ref().unwrap();
        assert_eq!(mid.temperature, 21.0);
        assert_eq!(mid.rate_per_hour, 3.0);

        assert_eq!(aggregator.history_span_hours().unwrap(), Some(1.5));
        assert!(cache.has(keys::EVOLUTION).unwrap());
    }

    #[test]
    fn capacity_change_rebuilds_window() {
        let cache = cache();
        configure(&cache, json!({"scan_interval": 30, "delta_arrows": 180}));
        let aggregator = SensorAggregator::new(cache.clone());
        for i in 0..6 {
            aggregator.aggregate(&reading_at(&format!("{}", 20 + i), "50", i * 30)).unwrap();
        }
        assert_eq!(aggregator.load_window().unwrap().unwrap().len(), 6);

        cache
            .set_json(keys::HISTORY_CONFIG, &json!({"scan_interval": 30, "delta_arrows": 90}))
            .unwrap();
        aggregator.aggregate(&reading_at("30", "50", 200)).unwrap();
        let window = aggregator.load_window().unwrap().unwrap();
        assert_eq!(window.capacity(), 3);
        let temps: Vec<f64> = window.iter().map(|s| s["livingroom"].xy.temperature()).collect();
        assert_eq!(temps, vec![24.0, 25.0, 30.0]);
    }
}
