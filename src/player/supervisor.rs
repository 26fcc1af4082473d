//! Supervisor for the single playback child.

use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;

use super::control::{ControlError, ProcessControl};
use super::process::{PlayerHandle, PlayerLauncher, ProcessError};
use crate::station::Station;

#[derive(Error, Debug)]
pub enum SupervisorError {
  #[error("{0}")]
  Spawn(#[from] ProcessError),
  #[error("{0}")]
  Control(#[from] ControlError),
}

/// Outcome of a pause/resume/toggle that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ack {
  Paused,
  Resumed,
  NothingPlaying,
}

/// A live child together with what it is playing.
#[derive(Debug)]
pub struct Playback {
  child: PlayerHandle,
  station: Arc<Station>,
  started_at: Instant,
}

/// What is playing. A child only ever exists inside `Playing` or `Paused`.
#[derive(Debug, Default)]
enum Session {
  #[default]
  Idle,
  Playing(Playback),
  Paused(Playback),
}

impl Session {
  fn playback(&self) -> Option<&Playback> {
    match self {
      Session::Idle => None,
      Session::Playing(p) | Session::Paused(p) => Some(p),
    }
  }
}

/// Consistent read of the session taken under the service lock.
#[derive(Debug, Clone, Default)]
pub struct SessionSnapshot {
  pub playing: bool,
  pub paused: bool,
  pub station: Option<Arc<Station>>,
  pub uptime: Option<Duration>,
}

enum Signal {
  Suspend,
  Resume,
}

/// Owns zero or one playback child.
pub struct Supervisor {
  launcher: PlayerLauncher,
  control: Box<dyn ProcessControl>,
  session: Session,
}

impl Supervisor {
  pub fn new(launcher: PlayerLauncher, control: Box<dyn ProcessControl>) -> Self {
    Self {
      launcher,
      control,
      session: Session::Idle,
    }
  }

  /// Replace whatever is playing with `station`.
  ///
  /// The previous child is killed and reaped before the new one is spawned.
  /// On spawn failure the session is left idle.
  pub async fn start(&mut self, station: Arc<Station>) -> Result<(), SupervisorError> {
    self.kill().await;

    let child = self.launcher.spawn(&station.source_uri)?;
    log::info!(
      "Playing {} (pid: {}, generation: {})",
      station.name,
      child.pid(),
      child.generation()
    );
    self.session = Session::Playing(Playback {
      child,
      station,
      started_at: Instant::now(),
    });
    Ok(())
  }

  /// Suspend the child. An already paused child is not signalled again, so
  /// the OS-level suspend count never exceeds one.
  pub fn pause(&mut self) -> Result<Ack, SupervisorError> {
    let playback = match &self.session {
      Session::Idle => return Ok(Ack::NothingPlaying),
      Session::Paused(_) => return Ok(Ack::Paused),
      Session::Playing(p) => p,
    };
    self.signal(playback, Signal::Suspend)?;
    self.session = match std::mem::take(&mut self.session) {
      Session::Playing(p) | Session::Paused(p) => Session::Paused(p),
      Session::Idle => Session::Idle,
    };
    Ok(Ack::Paused)
  }

  pub fn resume(&mut self) -> Result<Ack, SupervisorError> {
    let Some(playback) = self.session.playback() else {
      return Ok(Ack::NothingPlaying);
    };
    self.signal(playback, Signal::Resume)?;
    self.session = match std::mem::take(&mut self.session) {
      Session::Playing(p) | Session::Paused(p) => Session::Playing(p),
      Session::Idle => Session::Idle,
    };
    Ok(Ack::Resumed)
  }

  /// Pause if playing, otherwise resume.
  pub fn toggle(&mut self) -> Result<Ack, SupervisorError> {
    match self.session {
      Session::Playing(_) => self.pause(),
      _ => self.resume(),
    }
  }

  /// Hard-kill the child, if any, and wait for it to be reaped.
  pub async fn kill(&mut self) {
    if let Session::Playing(p) | Session::Paused(p) = std::mem::take(&mut self.session) {
      p.child.kill().await;
    }
  }

  pub fn current_station(&self) -> Option<&Arc<Station>> {
    self.session.playback().map(|p| &p.station)
  }

  pub fn snapshot(&self) -> SessionSnapshot {
    let playback = self.session.playback();
    SessionSnapshot {
      playing: matches!(self.session, Session::Playing(_)),
      paused: matches!(self.session, Session::Paused(_)),
      station: playback.map(|p| p.station.clone()),
      uptime: playback.map(|p| p.started_at.elapsed()),
    }
  }

  fn signal(&self, playback: &Playback, signal: Signal) -> Result<(), ControlError> {
    let pid = playback.child.pid();
    // The pid may already belong to someone else once the child is reaped.
    if playback.child.has_exited() {
      log::debug!("Player pid {} already exited, not signalling", pid);
      return Ok(());
    }
    match signal {
      Signal::Suspend => {
        log::info!("Suspending player pid {}", pid);
        self.control.suspend(pid)
      }
      Signal::Resume => {
        log::info!("Resuming player pid {}", pid);
        self.control.resume(pid)
      }
    }
  }
}

#[cfg(all(test, unix))]
pub(crate) mod tests {
  use super::*;
  use parking_lot::Mutex;

  /// Records signals instead of delivering them.
  #[derive(Clone, Default)]
  pub(crate) struct RecordingControl {
    pub calls: Arc<Mutex<Vec<(&'static str, u32)>>>,
  }

  impl ProcessControl for RecordingControl {
    fn suspend(&self, pid: u32) -> Result<(), ControlError> {
      self.calls.lock().push(("suspend", pid));
      Ok(())
    }

    fn resume(&self, pid: u32) -> Result<(), ControlError> {
      self.calls.lock().push(("resume", pid));
      Ok(())
    }
  }

  fn pid_alive(pid: u32) -> bool {
    nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid as i32), None).is_ok()
  }

  fn station(name: &str) -> Arc<Station> {
    // `sleep 30` stands in for a stream that never ends.
    Arc::new(Station::new(name, "30", name))
  }

  fn supervisor() -> (Supervisor, RecordingControl) {
    let control = RecordingControl::default();
    let sup = Supervisor::new(
      PlayerLauncher::new("sleep", Vec::new()),
      Box::new(control.clone()),
    );
    (sup, control)
  }

  fn current_pid(sup: &Supervisor) -> Option<u32> {
    sup.session.playback().map(|p| p.child.pid())
  }

  #[tokio::test]
  async fn test_idle_operations_are_noops() {
    let (mut sup, control) = supervisor();
    assert_eq!(sup.pause().unwrap(), Ack::NothingPlaying);
    assert_eq!(sup.resume().unwrap(), Ack::NothingPlaying);
    assert_eq!(sup.toggle().unwrap(), Ack::NothingPlaying);
    sup.kill().await;
    assert!(control.calls.lock().is_empty());
    let snap = sup.snapshot();
    assert!(!snap.playing && !snap.paused);
    assert!(snap.station.is_none() && snap.uptime.is_none());
  }

  #[tokio::test]
  async fn test_start_replaces_previous_child() {
    let (mut sup, _) = supervisor();
    sup.start(station("a")).await.unwrap();
    let first = current_pid(&sup).unwrap();

    sup.start(station("b")).await.unwrap();
    let second = current_pid(&sup).unwrap();

    assert_ne!(first, second);
    assert!(!pid_alive(first));
    assert!(pid_alive(second));
    assert_eq!(sup.current_station().unwrap().name, "b");

    sup.kill().await;
    assert!(!pid_alive(second));
    assert!(sup.current_station().is_none());
  }

  #[tokio::test]
  async fn test_pause_resume_toggle() {
    let (mut sup, control) = supervisor();
    sup.start(station("a")).await.unwrap();
    let pid = current_pid(&sup).unwrap();

    assert_eq!(sup.pause().unwrap(), Ack::Paused);
    assert!(sup.snapshot().paused);
    assert_eq!(sup.toggle().unwrap(), Ack::Resumed);
    assert!(sup.snapshot().playing);
    assert_eq!(sup.toggle().unwrap(), Ack::Paused);
    assert_eq!(sup.resume().unwrap(), Ack::Resumed);
    // Resuming a running child is fine.
    assert_eq!(sup.resume().unwrap(), Ack::Resumed);

    assert_eq!(
      *control.calls.lock(),
      vec![
        ("suspend", pid),
        ("resume", pid),
        ("suspend", pid),
        ("resume", pid),
        ("resume", pid),
      ]
    );
    sup.kill().await;
  }

  #[tokio::test]
  async fn test_repeated_pause_suspends_once() {
    let (mut sup, control) = supervisor();
    sup.start(station("a")).await.unwrap();
    let pid = current_pid(&sup).unwrap();

    assert_eq!(sup.pause().unwrap(), Ack::Paused);
    assert_eq!(sup.pause().unwrap(), Ack::Paused);
    assert!(sup.snapshot().paused);
    assert_eq!(sup.resume().unwrap(), Ack::Resumed);

    assert_eq!(
      *control.calls.lock(),
      vec![("suspend", pid), ("resume", pid)]
    );
    sup.kill().await;
  }

  #[tokio::test]
  async fn test_kill_reaps_a_stopped_child() {
    let mut sup = Supervisor::new(
      PlayerLauncher::new("sleep", Vec::new()),
      Box::new(crate::player::PlatformControl),
    );
    sup.start(station("a")).await.unwrap();
    let pid = current_pid(&sup).unwrap();

    assert_eq!(sup.pause().unwrap(), Ack::Paused);
    assert!(pid_alive(pid));

    sup.kill().await;
    assert!(!pid_alive(pid));
    let snap = sup.snapshot();
    assert!(!snap.playing && !snap.paused && snap.station.is_none());
  }

  #[tokio::test]
  async fn test_paused_implies_child_for_any_sequence() {
    let (mut sup, _) = supervisor();
    let ops = ["pause", "play", "toggle", "toggle", "resume", "pause", "play", "toggle"];
    for op in ops {
      match op {
        "play" => {
          sup.start(station("a")).await.unwrap();
        }
        "pause" => {
          sup.pause().unwrap();
        }
        "resume" => {
          sup.resume().unwrap();
        }
        _ => {
          sup.toggle().unwrap();
        }
      }
      let snap = sup.snapshot();
      if snap.paused {
        assert!(current_pid(&sup).is_some());
        assert!(snap.station.is_some());
      }
      assert!(!(snap.playing && snap.paused));
    }
    sup.kill().await;
  }

  #[tokio::test]
  async fn test_spawn_failure_leaves_session_idle() {
    let mut sup = Supervisor::new(
      PlayerLauncher::new("/nonexistent/player-binary", Vec::new()),
      Box::new(RecordingControl::default()),
    );
    let err = sup.start(station("a")).await.unwrap_err();
    assert!(matches!(err, SupervisorError::Spawn(_)));
    let snap = sup.snapshot();
    assert!(!snap.playing && !snap.paused && snap.station.is_none());
  }

  #[tokio::test]
  async fn test_exited_child_is_not_signalled() {
    let (mut sup, control) = supervisor();
    sup.start(Arc::new(Station::new("short", "0", "short"))).await.unwrap();
    for _ in 0..50 {
      if sup.session.playback().map(|p| p.child.has_exited()).unwrap_or(true) {
        break;
      }
      tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(sup.pause().unwrap(), Ack::Paused);
    assert!(control.calls.lock().is_empty());
    sup.kill().await;
  }
}
