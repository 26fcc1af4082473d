//! Command executor: one service-wide lock, one state transition per command.

use std::sync::Arc;

use rand::seq::SliceRandom;
use tokio::sync::Mutex;

use super::protocol::{
  single_line, Command, Status, REPLY_NOTHING_PLAYING, REPLY_NO_STATIONS, REPLY_PAUSED,
  REPLY_RESUMED, REPLY_STOPPED, REPLY_UNKNOWN_COMMAND,
};
use crate::player::{Ack, Supervisor, SupervisorError};
use crate::station::{Station, StationList};

/// Maps commands onto the supervisor.
///
/// The supervisor sits behind an async mutex that is held for the whole of
/// each command, kill-and-reap of a replaced child included, so no two
/// commands ever interleave.
pub struct Executor {
  stations: StationList,
  supervisor: Mutex<Supervisor>,
}

impl Executor {
  pub fn new(stations: StationList, supervisor: Supervisor) -> Self {
    Self {
      stations,
      supervisor: Mutex::new(supervisor),
    }
  }

  /// Run one command and return its single-line reply.
  pub async fn execute(&self, command: &Command) -> String {
    let mut supervisor = self.supervisor.lock().await;
    log::info!("Executing {:?}", command);

    let reply = match command {
      Command::Play(name) => match self.stations.resolve(name) {
        Some(station) => Self::play(&mut supervisor, station).await,
        None => format!("unknown station: {}", name),
      },
      Command::Pause => Self::ack(supervisor.pause()),
      Command::Resume => Self::ack(supervisor.resume()),
      Command::Toggle => Self::ack(supervisor.toggle()),
      Command::Skip => {
        let current = supervisor.current_station().map(|s| s.name.clone());
        match self.pick_other(current.as_deref()) {
          Some(station) => Self::play(&mut supervisor, station).await,
          None => REPLY_NO_STATIONS.to_string(),
        }
      }
      Command::Status => Status::from(&supervisor.snapshot()).to_line(),
      Command::List => self.stations.names(),
      Command::Stop => {
        supervisor.kill().await;
        REPLY_STOPPED.to_string()
      }
      Command::Unknown(action) => {
        log::debug!("Unknown command: {:?}", action);
        REPLY_UNKNOWN_COMMAND.to_string()
      }
    };

    single_line(&reply)
  }

  /// Kill any child. Used on service shutdown.
  pub async fn shutdown(&self) {
    self.supervisor.lock().await.kill().await;
  }

  /// Uniform choice among stations other than `current`; replays `current`
  /// when it is the only one.
  fn pick_other(&self, current: Option<&str>) -> Option<Arc<Station>> {
    let candidates = self.stations.candidates_excluding(current);
    candidates.choose(&mut rand::thread_rng()).cloned()
  }

  async fn play(supervisor: &mut Supervisor, station: Arc<Station>) -> String {
    let description = station.description.clone();
    match supervisor.start(station).await {
      Ok(_) => format!("playing: {}", description),
      Err(e) => {
        log::error!("Failed to start player: {}", e);
        format!("failed to start: {}", e)
      }
    }
  }

  fn ack(result: Result<Ack, SupervisorError>) -> String {
    match result {
      Ok(Ack::Paused) => REPLY_PAUSED.to_string(),
      Ok(Ack::Resumed) => REPLY_RESUMED.to_string(),
      Ok(Ack::NothingPlaying) => REPLY_NOTHING_PLAYING.to_string(),
      Err(e) => {
        log::error!("Player signal failed: {}", e);
        e.to_string()
      }
    }
  }
}

#[cfg(all(test, unix))]
pub(crate) mod tests {
  use super::*;
  use crate::player::{PlayerLauncher, RecordingControl};

  pub(crate) fn test_stations() -> StationList {
    // Source URIs are `sleep` arguments.
    StationList::new(
      vec![
        Station::new("lofi-girl", "30", "Lofi Girl - beats to relax/study to"),
        Station::new("chillhop", "30", "Chillhop Radio - jazzy & lofi hip hop"),
        Station::new("study", "30", "Lofi - beats to study/relax to"),
      ],
      "lofi-girl",
    )
  }

  pub(crate) fn test_executor(stations: StationList) -> Executor {
    let supervisor = Supervisor::new(
      PlayerLauncher::new("sleep", Vec::new()),
      Box::new(RecordingControl::default()),
    );
    Executor::new(stations, supervisor)
  }

  async fn status(exec: &Executor) -> Status {
    Status::parse(&exec.execute(&Command::Status).await).unwrap()
  }

  #[tokio::test]
  async fn test_scenario_play_pause_toggle_stop() {
    let exec = test_executor(test_stations());

    let reply = exec.execute(&Command::parse("play lofi-girl")).await;
    assert!(reply.starts_with("playing:"), "{}", reply);
    let s = status(&exec).await;
    assert!(s.playing && !s.paused);
    assert_eq!(s.station.as_deref(), Some("lofi-girl"));
    assert!(!s.description.unwrap().is_empty());
    assert_eq!(s.uptime.as_deref(), Some("0s"));

    assert_eq!(exec.execute(&Command::Pause).await, "paused");
    assert!(status(&exec).await.paused);

    assert_eq!(exec.execute(&Command::Toggle).await, "resumed");
    assert!(!status(&exec).await.paused);

    assert_eq!(exec.execute(&Command::Stop).await, "stopped");
    let s = status(&exec).await;
    assert!(!s.playing && !s.paused && s.station.is_none());
  }

  #[tokio::test]
  async fn test_unknown_station_creates_nothing() {
    let exec = test_executor(test_stations());
    let reply = exec.execute(&Command::parse("play unknown-station-xyz")).await;
    assert_eq!(reply, "unknown station: unknown-station-xyz");
    assert_eq!(status(&exec).await, Status::default());
  }

  #[tokio::test]
  async fn test_empty_play_uses_default_station() {
    let exec = test_executor(test_stations());
    let reply = exec.execute(&Command::parse("play")).await;
    assert_eq!(reply, "playing: Lofi Girl - beats to relax/study to");
    assert_eq!(status(&exec).await.station.as_deref(), Some("lofi-girl"));
    exec.shutdown().await;
  }

  #[tokio::test]
  async fn test_station_lookup_ignores_case() {
    let exec = test_executor(test_stations());
    let reply = exec.execute(&Command::parse("play CHILLHOP")).await;
    assert!(reply.starts_with("playing: Chillhop"));
    exec.shutdown().await;
  }

  #[tokio::test]
  async fn test_skip_never_repeats_with_many_stations() {
    let exec = test_executor(test_stations());
    exec.execute(&Command::parse("play study")).await;
    for _ in 0..10 {
      let before = status(&exec).await.station.unwrap();
      let reply = exec.execute(&Command::Skip).await;
      assert!(reply.starts_with("playing:"));
      let after = status(&exec).await.station.unwrap();
      assert_ne!(before, after);
    }
    exec.shutdown().await;
  }

  #[tokio::test]
  async fn test_skip_with_single_station_replays_it() {
    let exec = test_executor(StationList::new(
      vec![Station::new("only", "30", "The only one")],
      "only",
    ));
    exec.execute(&Command::parse("play")).await;
    assert_eq!(exec.execute(&Command::Skip).await, "playing: The only one");
    assert_eq!(status(&exec).await.station.as_deref(), Some("only"));
    exec.shutdown().await;
  }

  #[tokio::test]
  async fn test_skip_with_no_stations() {
    let exec = test_executor(StationList::new(Vec::new(), "none"));
    assert_eq!(exec.execute(&Command::Skip).await, "no stations");
  }

  #[tokio::test]
  async fn test_idle_commands() {
    let exec = test_executor(test_stations());
    assert_eq!(exec.execute(&Command::Pause).await, "nothing playing");
    assert_eq!(exec.execute(&Command::Resume).await, "nothing playing");
    assert_eq!(exec.execute(&Command::Toggle).await, "nothing playing");
    assert_eq!(exec.execute(&Command::List).await, "lofi-girl chillhop study");
    assert_eq!(exec.execute(&Command::parse("dance")).await, "unknown command");
    assert_eq!(
      exec.execute(&Command::Status).await,
      r#"{"playing":false,"paused":false}"#
    );
  }

  #[tokio::test]
  async fn test_failed_start_reports_reason() {
    let supervisor = Supervisor::new(
      PlayerLauncher::new("/nonexistent/player-binary", Vec::new()),
      Box::new(RecordingControl::default()),
    );
    let exec = Executor::new(test_stations(), supervisor);
    let reply = exec.execute(&Command::parse("play study")).await;
    assert!(reply.starts_with("failed to start: "), "{}", reply);
    assert!(reply.len() > "failed to start: ".len());
    assert_eq!(status(&exec).await, Status::default());
  }

  #[tokio::test]
  async fn test_concurrent_plays_leave_one_child() {
    let exec = Arc::new(test_executor(test_stations()));
    let mut tasks = Vec::new();
    for name in ["lofi-girl", "chillhop", "study", "lofi-girl"] {
      let exec = exec.clone();
      tasks.push(tokio::spawn(async move {
        exec.execute(&Command::Play(name.to_string())).await
      }));
    }
    for task in tasks {
      assert!(task.await.unwrap().starts_with("playing:"));
    }
    let s = status(&exec).await;
    assert!(s.playing && s.station.is_some());
    exec.shutdown().await;
    assert_eq!(status(&exec).await, Status::default());
  }
}
