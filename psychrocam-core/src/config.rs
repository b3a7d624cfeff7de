//! Sensor Configuration
//!
//! ## Layout
//!
//! The sensor configuration is one structured document, loaded from durable
//! storage or edited through the API surface:
//!
//! ```yaml
//! homeassistant:
//!   host: 192.168.1.10
//!   api_password: secret
//! history:
//!   scan_interval: 30      # seconds between refresh cycles
//!   delta_arrows: 3600     # arrow span in seconds; 0 or absent disables history
//! location:
//!   altitude: 650
//!   pressure_sensor: sensor.home_pressure
//! interior:
//!   livingroom:
//!     temperature: sensor.livingroom_temperature
//!     humidity: sensor.livingroom_humidity
//!     style: {color: darkorange, markersize: 12}
//! exterior:
//!   terrace: {temperature: sensor.t_out, humidity: sensor.h_out}
//! ```
//!
//! [`parse_sensor_config`] splits the document into the derived cache keys
//! every other component reads.

use std::collections::BTreeMap;

use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::cache::{CacheValue, TypedCache};
use crate::constants::buffers::DEFAULT_SCAN_INTERVAL_S;
use crate::constants::keys;
use crate::errors::ConfigError;
use crate::model::RemoteHandle;

/// Default remote host when the section omits it
pub const DEFAULT_REMOTE_HOST: &str = "127.0.0.1";

/// Default remote port when the section omits it
pub const DEFAULT_REMOTE_PORT: u16 = 8123;

/// Sections every sensor configuration must carry
pub const REQUIRED_SECTIONS: [&str; 5] = ["location", "history", "interior", "exterior", "homeassistant"];

/// Entity ids and style of one chart point
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorPointConfig {
    /// Temperature entity id
    pub temperature: String,
    /// Relative humidity entity id
    pub humidity: String,
    /// Display style
    #[serde(default)]
    pub style: Map<String, Value>,
}

/// Points of one group keyed by point id
pub type SensorGroup = BTreeMap<String, SensorPointConfig>;

/// Grouped sensors cached under `ha_sensors`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SensorGroups {
    /// Points inside the building
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interior: Option<SensorGroup>,
    /// Points outside the building
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exterior: Option<SensorGroup>,
    /// Lone pressure sensor, outside the point mechanism
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pressure_sensor: Option<String>,
}

impl SensorGroups {
    /// Every configured point, interior first
    pub fn points(&self) -> impl Iterator<Item = (&String, &SensorPointConfig)> {
        self.interior.iter().chain(self.exterior.iter()).flatten()
    }

    /// Entity ids to fetch each cycle: the pressure sensor, then every
    /// point's temperature and humidity
    pub fn entity_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.pressure_sensor.iter().cloned().collect();
        for (_, point) in self.points() {
            ids.push(point.temperature.clone());
            ids.push(point.humidity.clone());
        }
        ids
    }

    /// True when nothing is configured
    pub fn is_empty(&self) -> bool {
        self.points().next().is_none() && self.pressure_sensor.is_none()
    }
}

/// History parameters cached under `ha_history`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// Seconds between refresh cycles
    #[serde(default = "default_scan_interval")]
    pub scan_interval: f64,
    /// Arrow span in seconds
    #[serde(default)]
    pub delta_arrows: Option<f64>,
}

fn default_scan_interval() -> f64 {
    DEFAULT_SCAN_INTERVAL_S as f64
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            scan_interval: default_scan_interval(),
            delta_arrows: None,
        }
    }
}

impl HistoryConfig {
    /// Arrow span when history tracking is enabled
    pub fn arrow_span(&self) -> Option<f64> {
        self.delta_arrows.filter(|span| *span > 0.0)
    }
}

/// Location section
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LocationConfig {
    /// Altitude in metres
    #[serde(default)]
    pub altitude: Option<f64>,
    /// Pressure entity id
    #[serde(default)]
    pub pressure_sensor: Option<String>,
}

/// Remote source connection section cached under `ha_config`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Host name, optionally with an `http://`/`https://` scheme
    #[serde(default = "default_host")]
    pub host: String,
    /// Password sent with every request
    #[serde(default)]
    pub api_password: Option<String>,
    /// TCP port; `null` leaves it out of the URL
    #[serde(default = "default_port")]
    pub port: Option<u16>,
    /// Use https when the host carries no scheme
    #[serde(default)]
    pub use_ssl: bool,
}

fn default_host() -> String {
    DEFAULT_REMOTE_HOST.to_string()
}

fn default_port() -> Option<u16> {
    Some(DEFAULT_REMOTE_PORT)
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            api_password: None,
            port: default_port(),
            use_ssl: false,
        }
    }
}

impl RemoteConfig {
    /// Base URL of the remote API
    pub fn base_url(&self) -> String {
        let host = self.host.trim_end_matches('/');
        let mut url = if host.starts_with("http://") || host.starts_with("https://") {
            host.to_string()
        } else if self.use_ssl {
            format!("https://{host}")
        } else {
            format!("http://{host}")
        };
        if let Some(port) = self.port {
            url.push_str(&format!(":{port}"));
        }
        url
    }

    /// Connection parameters as cached once validated
    pub fn handle(&self) -> RemoteHandle {
        RemoteHandle {
            base_url: self.base_url(),
            api_password: self.api_password.clone(),
        }
    }
}

/// Line and fill style of a convex zone
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneStyle {
    /// Color name
    pub color: String,
    /// Line width
    pub lw: f64,
    /// Opacity
    pub alpha: f64,
    /// Line style
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ls: Option<String>,
}

/// Convex hull over a set of points: `(point ids, line style, fill style)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvexZone(pub Vec<String>, pub ZoneStyle, pub ZoneStyle);

fn zone(names: Vec<String>, color: &str, line_width: f64, line_style: &str) -> ConvexZone {
    ConvexZone(
        names,
        ZoneStyle {
            color: color.to_string(),
            lw: line_width,
            alpha: 0.5,
            ls: Some(line_style.to_string()),
        },
        ZoneStyle {
            color: color.to_string(),
            lw: 0.0,
            alpha: 0.3,
            ls: None,
        },
    )
}

/// Point names taken by the evolution report's own fields
pub const RESERVED_POINT_NAMES: [&str; 2] = ["num_points", "pressure_kpa"];

/// Parsed sensor configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorConfig {
    /// Remote source connection
    pub homeassistant: RemoteConfig,
    /// History parameters
    pub history: HistoryConfig,
    /// Location parameters
    pub location: LocationConfig,
    /// Interior points
    #[serde(default)]
    pub interior: Option<SensorGroup>,
    /// Exterior points
    #[serde(default)]
    pub exterior: Option<SensorGroup>,
}

impl SensorConfig {
    /// Parse a structured document, checking mandatory sections first
    pub fn from_value(document: &Value) -> Result<Self, ConfigError> {
        let sections = document
            .as_object()
            .ok_or_else(|| ConfigError::Malformed("sensor configuration is not a mapping".into()))?;
        if let Some(missing) = REQUIRED_SECTIONS.iter().find(|name| !sections.contains_key(**name)) {
            return Err(ConfigError::MissingSection(*missing));
        }
        let config: Self =
            serde_json::from_value(document.clone()).map_err(|e| ConfigError::Malformed(e.to_string()))?;
        let points = [&config.interior, &config.exterior]
            .into_iter()
            .flatten()
            .flat_map(|group| group.keys());
        for name in points {
            if RESERVED_POINT_NAMES.contains(&name.as_str()) {
                return Err(ConfigError::ReservedName(name.clone()));
            }
        }
        Ok(config)
    }

    /// Grouped sensors, omitting empty groups
    pub fn groups(&self) -> SensorGroups {
        let non_empty = |group: &Option<SensorGroup>| group.clone().filter(|g| !g.is_empty());
        SensorGroups {
            interior: non_empty(&self.interior),
            exterior: non_empty(&self.exterior),
            pressure_sensor: self.location.pressure_sensor.clone(),
        }
    }

    /// Interior/exterior hull zones; `None` without interior points
    pub fn interior_zones(&self) -> Option<Vec<ConvexZone>> {
        let names = |group: &Option<SensorGroup>| -> Vec<String> {
            group.iter().flat_map(|g| g.keys().cloned()).collect()
        };
        let interior = names(&self.interior);
        if interior.is_empty() {
            return None;
        }
        Some(vec![
            zone(interior, "darkgreen", 2.0, ":"),
            zone(names(&self.exterior), "darkblue", 1.0, "--"),
        ])
    }
}

/// Parse `document` and write the derived keys into the cache
///
/// Writes `altitude` and `pressure_sensor` when present, then `ha_history`,
/// `interior_zones` (only with interior points), `ha_sensors` (only when some
/// sensor is configured), `ha_config`, and finally the document itself under
/// `ha_yaml_config`.
pub fn parse_sensor_config(cache: &TypedCache, document: &Value) -> Result<SensorConfig, ConfigError> {
    let config = SensorConfig::from_value(document)?;

    if let Some(altitude) = config.location.altitude {
        cache.set(keys::ALTITUDE, &CacheValue::Float(altitude), None)?;
    }
    if let Some(sensor) = &config.location.pressure_sensor {
        cache.set_json(keys::PRESSURE_SENSOR, sensor)?;
    }
    cache.set_json(keys::HISTORY_CONFIG, &config.history)?;

    if let Some(zones) = config.interior_zones() {
        cache.set_json(keys::INTERIOR_ZONES, &zones)?;
    }

    let groups = config.groups();
    if !groups.is_empty() {
        cache.set_json(keys::SENSOR_GROUPS, &groups)?;
    }

    cache.set_json(keys::REMOTE_CONFIG, &config.homeassistant)?;
    cache.set_json(keys::SENSOR_CONFIG, document)?;

    debug!(
        "Sensor config parsed: {} points, pressure sensor {:?}",
        groups.points().count(),
        groups.pressure_sensor
    );
    Ok(config)
}
