//! Application configuration.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::station::{builtin_stations, Station, StationList};

const CONFIG_DIR: &str = "chill";
const CONFIG_FILE: &str = "config.json";

#[derive(Error, Debug)]
pub enum ConfigError {
  #[error("Failed to read config {}: {}", .path.display(), .source)]
  Read {
    path: PathBuf,
    source: std::io::Error,
  },
  #[error("Failed to parse config: {0}")]
  Parse(#[from] serde_json::Error),
  #[error("Invalid config: {0}")]
  Invalid(String),
}

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
  /// Custom MPV executable path (None = auto-detect).
  #[serde(default)]
  pub mpv_path: Option<String>,

  /// Additional MPV arguments for background playback.
  #[serde(default)]
  pub mpv_args: Vec<String>,

  /// Station played when none is named.
  #[serde(default = "default_station")]
  pub default_station: String,

  /// Playable stations.
  #[serde(default = "builtin_stations")]
  pub stations: Vec<Station>,

  /// Client request deadline in seconds.
  #[serde(default = "default_request_timeout")]
  pub request_timeout_secs: u64,
}

fn default_station() -> String {
  "lofi-girl".to_string()
}

fn default_request_timeout() -> u64 {
  5
}

impl Default for AppConfig {
  fn default() -> Self {
    Self {
      mpv_path: None,
      mpv_args: Vec::new(),
      default_station: default_station(),
      stations: builtin_stations(),
      request_timeout_secs: default_request_timeout(),
    }
  }
}

impl AppConfig {
  /// Default config file location (`<config_dir>/chill/config.json`).
  pub fn default_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(CONFIG_DIR).join(CONFIG_FILE))
  }

  /// Load from `path`, or from the default location when `path` is None.
  /// A missing file yields the defaults.
  pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
    let path = match path {
      Some(p) => p.to_path_buf(),
      None => match Self::default_path() {
        Some(p) => p,
        None => return Ok(Self::default()),
      },
    };

    let contents = match std::fs::read_to_string(&path) {
      Ok(c) => c,
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
        log::debug!("No config at {}, using defaults", path.display());
        return Ok(Self::default());
      }
      Err(source) => return Err(ConfigError::Read { path, source }),
    };

    let config: AppConfig = serde_json::from_str(&contents)?;
    config.validate().map_err(ConfigError::Invalid)?;
    log::debug!("Loaded config from {}", path.display());
    Ok(config)
  }

  /// Validate configuration values.
  pub fn validate(&self) -> Result<(), String> {
    if self.stations.is_empty() {
      return Err("At least one station is required".to_string());
    }
    let mut seen = HashSet::new();
    for station in &self.stations {
      if station.name.is_empty() || station.name.chars().any(char::is_whitespace) {
        return Err(format!("Invalid station name: {:?}", station.name));
      }
      if !seen.insert(station.name.to_lowercase()) {
        return Err(format!("Duplicate station name: {}", station.name));
      }
    }
    if !seen.contains(&self.default_station.to_lowercase()) {
      return Err(format!("Unknown default station: {}", self.default_station));
    }
    if self.request_timeout_secs < 1 || self.request_timeout_secs > 60 {
      return Err("Request timeout must be between 1 and 60 seconds".to_string());
    }
    Ok(())
  }

  pub fn station_list(&self) -> StationList {
    StationList::new(self.stations.clone(), self.default_station.clone())
  }

  pub fn mpv_path(&self) -> Option<PathBuf> {
    self
      .mpv_path
      .as_ref()
      .filter(|s| !s.is_empty())
      .map(PathBuf::from)
  }

  pub fn request_timeout(&self) -> Duration {
    Duration::from_secs(self.request_timeout_secs)
  }
}
