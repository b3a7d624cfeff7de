//! Configuration loading and dirty-flag reconciliation
//!
//! Edits from the web layer land in the cache first and set a dirty flag.
//! They reach durable storage only after a cycle has rendered a chart with
//! them, so a broken configuration is never written to disk.

use std::sync::Arc;

use log::{error, info, warn};
use psychrocam_core::constants::keys;
use psychrocam_core::{parse_sensor_config, SensorConfig, TypedCache};
use serde_json::Value;

use crate::error::WorkerResult;
use crate::storage::{ConfigName, ConfigStorage};

/// What happened to one kind of configuration during reconciliation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Persisted {
    /// Nothing was dirty
    #[default]
    Clean,
    /// Written to storage and reloaded
    Saved,
    /// Saving failed; the dirty flag is still set
    Failed,
}

/// Outcome of [`ConfigReconciler::reconcile`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReconcileReport {
    /// Sensor configuration
    pub sensors: Persisted,
    /// Chart style and zones
    pub chart: Persisted,
}

/// Moves configuration between the cache and durable storage
#[derive(Clone)]
pub struct ConfigReconciler {
    cache: TypedCache,
    storage: Arc<dyn ConfigStorage>,
}

impl ConfigReconciler {
    /// Create a reconciler
    pub fn new(cache: TypedCache, storage: Arc<dyn ConfigStorage>) -> Self {
        Self { cache, storage }
    }

    /// Load chart style and zones into the cache where absent
    pub fn load_chart_config(&self) -> WorkerResult<()> {
        for (key, name) in [
            (keys::CHART_STYLE, ConfigName::ChartStyle),
            (keys::CHART_ZONES, ConfigName::ChartZones),
        ] {
            if !self.cache.has(key)? {
                let config = self.storage.load(name)?;
                self.cache.set_json(key, &config)?;
            }
        }
        info!("Chart config loaded");
        Ok(())
    }

    /// Parse the cached sensor configuration, loading it from storage first
    /// when the cache has none
    pub fn load_sensor_config(&self) -> WorkerResult<SensorConfig> {
        let document = match self.cache.get_json::<Value>(keys::SENSOR_CONFIG)? {
            Some(document) => document,
            None => self.storage.load(ConfigName::Sensors)?,
        };
        Ok(parse_sensor_config(&self.cache, &document)?)
    }

    /// Persist every dirty configuration
    ///
    /// Only call after a successful render. Failures are logged and leave
    /// the dirty flag set so the next successful cycle retries.
    pub fn reconcile(&self) -> ReconcileReport {
        ReconcileReport {
            sensors: Self::settle("sensor", self.persist_sensor_config()),
            chart: Self::settle("chart", self.persist_chart_config()),
        }
    }

    fn settle(what: &str, result: WorkerResult<bool>) -> Persisted {
        match result {
            Ok(true) => Persisted::Saved,
            Ok(false) => Persisted::Clean,
            Err(e) => {
                error!("Could not persist the {what} config, will retry: {e}");
                Persisted::Failed
            }
        }
    }

    fn persist_sensor_config(&self) -> WorkerResult<bool> {
        if !self.cache.is_flag_set(keys::SENSOR_CONFIG_DIRTY)? {
            return Ok(false);
        }
        warn!("Saving sensor config after a successful chart");
        let document = self
            .cache
            .get_json::<Value>(keys::SENSOR_CONFIG)?
            .unwrap_or(Value::Null);
        self.storage.save(ConfigName::Sensors, &document)?;

        self.cache.remove(keys::SENSOR_CONFIG_DIRTY)?;
        self.cache.remove(keys::SENSOR_CONFIG)?;
        self.load_sensor_config()?;
        Ok(true)
    }

    fn persist_chart_config(&self) -> WorkerResult<bool> {
        if !self.cache.is_flag_set(keys::CHART_CONFIG_DIRTY)? {
            return Ok(false);
        }
        warn!("Saving chart config after a successful chart");
        let style = self.cache.get_json::<Value>(keys::CHART_STYLE)?.unwrap_or(Value::Null);
        let zones = self.cache.get_json::<Value>(keys::CHART_ZONES)?.unwrap_or(Value::Null);
        self.storage.save(ConfigName::ChartStyle, &style)?;
        self.storage.save(ConfigName::ChartZones, &zones)?;

        self.cache.remove(keys::CHART_CONFIG_DIRTY)?;
        self.cache.remove(keys::CHART_STYLE)?;
        self.cache.remove(keys::CHART_ZONES)?;
        self.load_chart_config()?;
        Ok(true)
    }
}
