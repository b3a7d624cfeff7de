//! Operations exposed to the web layer
//!
//! Reads come straight from the cache. Writes update the cache, set the
//! matching dirty flag and force a refresh cycle; the new configuration is
//! persisted only once that cycle renders a chart.

use std::sync::Arc;

use log::{debug, warn};
use psychrocam_core::constants::keys;
use psychrocam_core::{EvolutionReport, States, TypedCache};
use serde_json::{Map, Value};

use crate::error::WorkerResult;
use crate::orchestrator::{CycleOutcome, RefreshOrchestrator};

/// Top-level chart keys accepted by [`ApiSurface::update_chart_config`]
pub const CHART_STYLE_KEYS: [&str; 11] = [
    "figure",
    "limits",
    "saturation",
    "constant_rh",
    "constant_v",
    "constant_h",
    "constant_wet_temp",
    "constant_dry_temp",
    "constant_humidity",
    "chart_params",
    "zones",
];

/// Top-level sensor keys accepted by [`ApiSurface::update_sensor_config`]
pub const SENSOR_CONFIG_KEYS: [&str; 6] =
    ["exterior", "history", "homeassistant", "interior", "location", "sun"];

/// Merge the allowed keys of `patch` into `target`
///
/// A mapping patched with a mapping is updated key by key; anything else is
/// replaced. Keys outside `allowed` are ignored.
pub fn merge_allowed(target: &mut Map<String, Value>, patch: &Map<String, Value>, allowed: &[&str]) {
    for (key, value) in patch.iter().filter(|(key, _)| allowed.contains(&key.as_str())) {
        match (target.get_mut(key), value) {
            (Some(Value::Object(current)), Value::Object(update)) => {
                current.extend(update.iter().map(|(k, v)| (k.clone(), v.clone())));
            }
            _ => {
                target.insert(key.clone(), value.clone());
            }
        }
    }
}

/// Cache-backed API operations
#[derive(Clone)]
pub struct ApiSurface {
    cache: TypedCache,
    orchestrator: Arc<RefreshOrchestrator>,
}

impl ApiSurface {
    /// Create the surface over an orchestrator and its cache
    pub fn new(orchestrator: Arc<RefreshOrchestrator>) -> Self {
        Self {
            cache: orchestrator.cache().clone(),
            orchestrator,
        }
    }

    fn zones_list(&self) -> WorkerResult<Option<Value>> {
        Ok(self
            .cache
            .get_json::<Value>(keys::CHART_ZONES)?
            .and_then(|mut zones| zones.get_mut("zones").map(Value::take)))
    }

    /// Chart style with the zones list merged in
    ///
    /// Without a cached style the whole cache is reset and `None` returned.
    pub fn chart_config(&self) -> WorkerResult<Option<Value>> {
        let Some(mut style) = self.cache.get_json::<Map<String, Value>>(keys::CHART_STYLE)? else {
            warn!("No chart config available, resetting all");
            self.orchestrator.force_full_reset()?;
            return Ok(None);
        };
        if let Some(zones) = self.zones_list()? {
            style.insert("zones".into(), zones);
        }
        Ok(Some(Value::Object(style)))
    }

    /// Apply `patch` to the chart style and zones, then refresh
    ///
    /// Returns the merged configuration, or `None` for an empty patch.
    pub async fn update_chart_config(&self, patch: &Map<String, Value>) -> WorkerResult<Option<Value>> {
        if patch.is_empty() {
            return Ok(None);
        }
        warn!("Set new chart style: {}", Value::Object(patch.clone()));
        self.orchestrator.reconciler().load_chart_config()?;
        let mut style: Map<String, Value> = self.cache.get_json(keys::CHART_STYLE)?.unwrap_or_default();
        let mut zones: Map<String, Value> = self.cache.get_json(keys::CHART_ZONES)?.unwrap_or_default();
        merge_allowed(&mut style, patch, &CHART_STYLE_KEYS);
        merge_allowed(&mut zones, patch, &CHART_STYLE_KEYS);
        self.cache.set_json(keys::CHART_STYLE, &style)?;
        self.cache.set_json(keys::CHART_ZONES, &zones)?;
        self.cache.set(keys::CHART_CONFIG_DIRTY, &true.into(), None)?;

        self.refresh().await;
        self.chart_config()
    }

    /// Cached sensor configuration
    pub fn sensor_config(&self) -> WorkerResult<Option<Value>> {
        Ok(self.cache.get_json(keys::SENSOR_CONFIG)?)
    }

    /// Apply `patch` to the sensor configuration, drop derived state and
    /// refresh
    ///
    /// Returns the merged configuration, or `None` for an empty patch.
    pub async fn update_sensor_config(&self, patch: &Map<String, Value>) -> WorkerResult<Option<Value>> {
        if patch.is_empty() {
            return Ok(None);
        }
        warn!("Set new sensor config: {}", Value::Object(patch.clone()));
        if !self.cache.has(keys::SENSOR_CONFIG)? {
            self.orchestrator.reconciler().load_sensor_config()?;
        }
        let mut config: Map<String, Value> = self.cache.get_json(keys::SENSOR_CONFIG)?.unwrap_or_default();
        merge_allowed(&mut config, patch, &SENSOR_CONFIG_KEYS);
        self.cache.set(keys::SENSOR_CONFIG_DIRTY, &true.into(), None)?;
        self.cache.set_json(keys::SENSOR_CONFIG, &config)?;

        for key in keys::SENSOR_DERIVED {
            self.cache.remove(key)?;
        }
        self.refresh().await;
        Ok(Some(Value::Object(config)))
    }

    async fn refresh(&self) {
        match self.orchestrator.force_refresh_cycle().await {
            CycleOutcome::Succeeded { points, .. } => debug!("Refreshed with {points} points"),
            outcome => debug!("Refresh after update: {outcome:?}"),
        }
    }

    /// States fetched by the last successful cycle
    pub fn states(&self) -> WorkerResult<Option<States>> {
        Ok(self.cache.get_opaque(keys::STATES)?)
    }

    /// Last rendered chart
    pub fn svg_chart(&self) -> WorkerResult<Option<Vec<u8>>> {
        Ok(self.cache.get_bytes(keys::RENDERED_CHART)?)
    }

    /// Last evolution report
    pub fn evolution(&self) -> WorkerResult<Option<EvolutionReport>> {
        Ok(self.cache.get_json(keys::EVOLUTION)?)
    }

    /// Clear the cache and reload configuration
    pub fn force_full_reset(&self) -> WorkerResult<()> {
        self.orchestrator.force_full_reset()
    }
}
