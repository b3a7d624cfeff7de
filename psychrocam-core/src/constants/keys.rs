//! Cache Key Namespace
//!
//! Every logical key `k` is stored twice in the shared store: the value under
//! `k` and its type tag under `TYPE_TAG_PREFIX + k`. The names below are read
//! and written by the web-facing API process as well, so they are fixed.

/// Prefix of the shadow key holding a value's type tag.
pub const TYPE_TAG_PREFIX: &str = "_type_var__key_";

// ===== CONFIGURATION =====

/// Chart style mapping handed to the renderer.
pub const CHART_STYLE: &str = "chart_style";

/// Chart zones overlay handed to the renderer.
pub const CHART_ZONES: &str = "chart_zones";

/// Full sensor configuration as last loaded or edited.
pub const SENSOR_CONFIG: &str = "ha_yaml_config";

/// Remote connection section of the sensor configuration.
pub const REMOTE_CONFIG: &str = "ha_config";

/// Interior/exterior sensor groups plus the pressure sensor id.
pub const SENSOR_GROUPS: &str = "ha_sensors";

/// History section of the sensor configuration.
pub const HISTORY_CONFIG: &str = "ha_history";

/// Site altitude in metres.
pub const ALTITUDE: &str = "altitude";

/// Entity id of the barometric sensor.
pub const PRESSURE_SENSOR: &str = "pressure_sensor";

/// Convex-hull groups drawn behind interior and exterior points.
pub const INTERIOR_ZONES: &str = "interior_zones";

// ===== REMOTE SOURCE =====

/// Validated remote-source handle (opaque).
pub const REMOTE_HANDLE: &str = "ha_api";

/// Last fetched entity states (opaque).
pub const STATES: &str = "ha_states";

// ===== AGGREGATED STATE =====

/// Current point per sensor name.
pub const LAST_POINTS: &str = "last_points";

/// Point names whose last ingest failed.
pub const UNKNOWN_POINTS: &str = "points_unknown";

/// Bounded history of point snapshots.
pub const HISTORY_WINDOW: &str = "deque_points";

/// Arrow per point that moved across the window.
pub const ARROWS: &str = "arrows";

/// First/mid/last evolution report.
pub const EVOLUTION: &str = "ha_evolution";

/// Barometric pressure in kilopascal.
pub const PRESSURE_KPA: &str = "pressure_kpa";

/// Rendered chart artifact.
pub const RENDERED_CHART: &str = "svg_chart";

// ===== COORDINATION =====

/// Single-flight flag of the refresh cycle.
pub const REFRESH_IN_FLIGHT: &str = "making_chart_now";

/// Sensor configuration edited in cache, not yet persisted.
pub const SENSOR_CONFIG_DIRTY: &str = "ha_yaml_changed";

/// Chart style/zones edited in cache, not yet persisted.
pub const CHART_CONFIG_DIRTY: &str = "chart_config_changed";

/// Keys derived from the sensor configuration, dropped when it is edited.
pub const SENSOR_DERIVED: [&str; 8] = [
    REMOTE_CONFIG,
    REMOTE_HANDLE,
    SENSOR_GROUPS,
    STATES,
    LAST_POINTS,
    UNKNOWN_POINTS,
    HISTORY_WINDOW,
    ARROWS,
];
