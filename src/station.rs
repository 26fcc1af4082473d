//! Station table: named stream sources the player can be pointed at.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// A named stream source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Station {
  /// Short identifier (e.g. "lofi-girl").
  pub name: String,
  /// Stream URI handed to the player.
  pub source_uri: String,
  /// Human-readable description.
  pub description: String,
}

impl Station {
  pub fn new(name: &str, source_uri: &str, description: &str) -> Self {
    Self {
      name: name.to_string(),
      source_uri: source_uri.to_string(),
      description: description.to_string(),
    }
  }
}

/// The built-in 24/7 lofi streams.
pub fn builtin_stations() -> Vec<Station> {
  vec![
    Station::new(
      "lofi-girl",
      "https://www.youtube.com/watch?v=jfKfPfyJRdk",
      "Lofi Girl - beats to relax/study to",
    ),
    Station::new(
      "chillhop",
      "https://www.youtube.com/watch?v=5yx6BWlEVcY",
      "Chillhop Radio - jazzy & lofi hip hop",
    ),
    Station::new(
      "chillout",
      "https://www.youtube.com/watch?v=9UMxZofMNbA",
      "Chillout Lounge - calm & relaxing",
    ),
    Station::new(
      "code-radio",
      "https://www.youtube.com/watch?v=ByZGu229-yA",
      "Code Radio - beats to study & code to",
    ),
    Station::new(
      "sleep",
      "https://www.youtube.com/watch?v=rPjez8z61rI",
      "Lofi - beats to sleep/relax to",
    ),
    Station::new(
      "study",
      "https://www.youtube.com/watch?v=7NOSDKb0HlU",
      "Lofi - beats to study/relax to",
    ),
  ]
}

/// Immutable lookup table shared by the executor and the supervisor.
#[derive(Debug, Clone)]
pub struct StationList {
  stations: Vec<Arc<Station>>,
  default_name: String,
}

impl StationList {
  pub fn new(stations: Vec<Station>, default_name: impl Into<String>) -> Self {
    Self {
      stations: stations.into_iter().map(Arc::new).collect(),
      default_name: default_name.into(),
    }
  }

  /// Case-insensitive lookup by name.
  pub fn find(&self, name: &str) -> Option<Arc<Station>> {
    self
      .stations
      .iter()
      .find(|s| s.name.eq_ignore_ascii_case(name))
      .cloned()
  }

  /// Resolve a `play` argument; empty means the default station.
  pub fn resolve(&self, name: &str) -> Option<Arc<Station>> {
    if name.is_empty() {
      self.find(&self.default_name)
    } else {
      self.find(name)
    }
  }

  pub fn len(&self) -> usize {
    self.stations.len()
  }

  pub fn is_empty(&self) -> bool {
    self.stations.is_empty()
  }

  /// Space-joined station names, as sent in reply to `list`.
  pub fn names(&self) -> String {
    self
      .stations
      .iter()
      .map(|s| s.name.as_str())
      .collect::<Vec<_>>()
      .join(" ")
  }

  /// Stations other than `current`. Falls back to the whole table when
  /// excluding `current` would leave nothing to pick from.
  pub fn candidates_excluding(&self, current: Option<&str>) -> Vec<Arc<Station>> {
    let Some(current) = current else {
      return self.stations.clone();
    };
    let others: Vec<_> = self
      .stations
      .iter()
      .filter(|s| !s.name.eq_ignore_ascii_case(current))
      .cloned()
      .collect();
    if others.is_empty() {
      self.stations.clone()
    } else {
      others
    }
  }
}

impl Default for StationList {
  fn default() -> Self {
    Self::new(builtin_stations(), "lofi-girl")
  }
}
