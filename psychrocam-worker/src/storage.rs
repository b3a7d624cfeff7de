//! Durable configuration storage
//!
//! Each logical configuration lives in a config directory as a packaged
//! default plus an optional user customization:
//!
//! | Logical name  | Default file                 | Custom file                  |
//! |---------------|------------------------------|------------------------------|
//! | `ha_sensors`  | `default_ha_sensors.yaml`    | `_custom_ha_sensors.yaml`    |
//! | `chart_style` | `default_chart_style.yaml`   | `_custom_chart_style.yaml`   |
//! | `chart_zones` | `default_zones_overlay.yaml` | `_custom_zones_overlay.yaml` |
//!
//! Loading prefers the custom file. Saving always writes the custom file, so
//! the packaged defaults are never overwritten.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, error, info};
use serde_json::Value;

use crate::error::StorageError;

/// Logical configuration names handled by durable storage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigName {
    /// Sensor groups, history and remote connection
    Sensors,
    /// Chart style
    ChartStyle,
    /// Chart zones overlay
    ChartZones,
}

impl ConfigName {
    /// Every logical name
    pub const ALL: [ConfigName; 3] = [Self::Sensors, Self::ChartStyle, Self::ChartZones];

    /// Logical name as used by the web layer
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sensors => "ha_sensors",
            Self::ChartStyle => "chart_style",
            Self::ChartZones => "chart_zones",
        }
    }

    fn file_stem(self) -> &'static str {
        match self {
            Self::Sensors => "ha_sensors",
            Self::ChartStyle => "chart_style",
            Self::ChartZones => "zones_overlay",
        }
    }

    /// File name of the packaged default
    pub fn default_file(self) -> String {
        format!("default_{}.yaml", self.file_stem())
    }

    /// File name of the user customization
    pub fn custom_file(self) -> String {
        format!("_custom_{}.yaml", self.file_stem())
    }

    fn packaged(self) -> &'static str {
        match self {
            Self::Sensors => include_str!("../static/default_ha_sensors.yaml"),
            Self::ChartStyle => include_str!("../static/default_chart_style.yaml"),
            Self::ChartZones => include_str!("../static/default_zones_overlay.yaml"),
        }
    }
}

impl fmt::Display for ConfigName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Durable storage for structured configuration
pub trait ConfigStorage: Send + Sync {
    /// Load the current configuration for `name`
    fn load(&self, name: ConfigName) -> Result<Value, StorageError>;

    /// Persist `config` as the customization for `name`
    fn save(&self, name: ConfigName, config: &Value) -> Result<(), StorageError>;
}

/// Refuse to persist anything but a non-empty mapping
pub fn check_saveable(name: ConfigName, config: &Value) -> Result<(), StorageError> {
    match config.as_object() {
        Some(map) if !map.is_empty() => Ok(()),
        Some(_) => Err(StorageError::Rejected {
            name: name.as_str(),
            reason: "configuration is empty",
        }),
        None => Err(StorageError::Rejected {
            name: name.as_str(),
            reason: "configuration is not a mapping",
        }),
    }
}

/// YAML files in a config directory
///
/// When neither file exists the default compiled into the binary is used.
#[derive(Debug, Clone)]
pub struct FileConfigStorage {
    dir: PathBuf,
}

impl FileConfigStorage {
    /// Storage rooted at `dir`
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Config directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File `load` reads for `name`, if any exists on disk
    pub fn select(&self, name: ConfigName) -> Option<PathBuf> {
        [name.custom_file(), name.default_file()]
            .into_iter()
            .map(|file| self.dir.join(file))
            .find(|path| path.exists())
    }

    fn parse(path: &Path, text: &str) -> Result<Value, StorageError> {
        serde_yaml::from_str(text).map_err(|e| StorageError::Yaml {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }
}

impl ConfigStorage for FileConfigStorage {
    fn load(&self, name: ConfigName) -> Result<Value, StorageError> {
        let Some(path) = self.select(name) else {
            debug!("No {name} file in {}, using the packaged default", self.dir.display());
            return Self::parse(Path::new(&name.default_file()), name.packaged());
        };
        let text = fs::read_to_string(&path).map_err(|source| StorageError::Io {
            path: path.clone(),
            source,
        })?;
        let config = Self::parse(&path, &text)?;
        debug!("Loaded {name} from {}", path.display());
        Ok(config)
    }

    fn save(&self, name: ConfigName, config: &Value) -> Result<(), StorageError> {
        if let Err(e) = check_saveable(name, config) {
            error!("{e}");
            return Err(e);
        }
        let path = self.dir.join(name.custom_file());
        let text = serde_yaml::to_string(config).map_err(|e| StorageError::Yaml {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        fs::write(&path, text).map_err(|source| StorageError::Io {
            path: path.clone(),
            source,
        })?;
        info!("Saved {name} to {}", path.display());
        Ok(())
    }
}
