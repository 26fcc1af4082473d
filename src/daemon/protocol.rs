//! Line protocol between clients and the service.
//!
//! Request: `<command>[ <argument>]\n`. Response: one line, `\n`-terminated.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::player::SessionSnapshot;

pub const REPLY_PAUSED: &str = "paused";
pub const REPLY_RESUMED: &str = "resumed";
pub const REPLY_NOTHING_PLAYING: &str = "nothing playing";
pub const REPLY_STOPPED: &str = "stopped";
pub const REPLY_UNKNOWN_COMMAND: &str = "unknown command";
pub const REPLY_NO_STATIONS: &str = "no stations";

/// A parsed request line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
  /// Station name, possibly empty (default station).
  Play(String),
  Pause,
  Resume,
  Toggle,
  Skip,
  Status,
  List,
  /// `stop` or `quit`: kill playback and shut the service down.
  Stop,
  Unknown(String),
}

impl Command {
  /// Parse a request line. Everything after the first space is the argument,
  /// passed through as-is.
  pub fn parse(line: &str) -> Self {
    let line = line.trim();
    let (action, arg) = match line.split_once(' ') {
      Some((action, arg)) => (action, arg),
      None => (line, ""),
    };

    match action {
      "play" => Command::Play(arg.to_string()),
      "pause" => Command::Pause,
      "resume" => Command::Resume,
      "toggle" => Command::Toggle,
      "skip" => Command::Skip,
      "status" => Command::Status,
      "list" => Command::List,
      "stop" | "quit" => Command::Stop,
      other => Command::Unknown(other.to_string()),
    }
  }

  /// Whether serving this command ends the service.
  pub fn is_terminal(&self) -> bool {
    matches!(self, Command::Stop)
  }

  /// Request line for this command, without the trailing newline.
  pub fn to_line(&self) -> String {
    match self {
      Command::Play(name) if name.is_empty() => "play".to_string(),
      Command::Play(name) => format!("play {}", name),
      Command::Pause => "pause".to_string(),
      Command::Resume => "resume".to_string(),
      Command::Toggle => "toggle".to_string(),
      Command::Skip => "skip".to_string(),
      Command::Status => "status".to_string(),
      Command::List => "list".to_string(),
      Command::Stop => "stop".to_string(),
      Command::Unknown(action) => action.clone(),
    }
  }
}

/// Reply to `status`. Optional fields are omitted while idle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
  pub playing: bool,
  pub paused: bool,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub station: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub uptime: Option<String>,
}

impl Status {
  pub fn to_line(&self) -> String {
    // A struct of bools and strings always serializes.
    serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
  }

  pub fn parse(line: &str) -> Result<Self, serde_json::Error> {
    serde_json::from_str(line)
  }
}

impl From<&SessionSnapshot> for Status {
  fn from(snapshot: &SessionSnapshot) -> Self {
    Self {
      playing: snapshot.playing,
      paused: snapshot.paused,
      station: snapshot.station.as_ref().map(|s| s.name.clone()),
      description: snapshot.station.as_ref().map(|s| s.description.clone()),
      uptime: snapshot.uptime.map(format_uptime),
    }
  }
}

/// Round to whole seconds and render as `1h2m3s` / `4m5s` / `6s`.
pub fn format_uptime(elapsed: Duration) -> String {
  let total = (elapsed.as_millis() + 500) / 1000;
  let (hours, minutes, seconds) = (total / 3600, (total / 60) % 60, total % 60);
  if hours > 0 {
    format!("{}h{}m{}s", hours, minutes, seconds)
  } else if minutes > 0 {
    format!("{}m{}s", minutes, seconds)
  } else {
    format!("{}s", seconds)
  }
}

/// Collapse anything that would break single-line framing.
pub fn single_line(reply: &str) -> String {
  reply.replace(['\r', '\n'], " ")
}
