//! Player executable detection, spawning and reaping.

use std::ffi::OsString;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::process::{Child, Command};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

#[derive(Error, Debug)]
pub enum ProcessError {
  #[error("MPV executable not found")]
  NotFound,
  #[error("{0}")]
  SpawnFailed(#[from] std::io::Error),
  #[error("MPV exited with {0}")]
  Exited(ExitStatus),
}

/// Spawn counter used to tag children in logs and reaper records.
static GENERATION: AtomicU64 = AtomicU64::new(1);

fn next_generation() -> u64 {
  GENERATION.fetch_add(1, Ordering::SeqCst)
}

#[cfg(windows)]
const COMMON_PATHS: &[&str] = &[
  r"C:\Program Files\mpv\mpv.exe",
  r"C:\Program Files (x86)\mpv\mpv.exe",
  r"C:\mpv\mpv.exe",
];

#[cfg(target_os = "macos")]
const COMMON_PATHS: &[&str] = &[
  "/usr/local/bin/mpv",
  "/opt/homebrew/bin/mpv",
  "/Applications/mpv.app/Contents/MacOS/mpv",
];

#[cfg(not(any(windows, target_os = "macos")))]
const COMMON_PATHS: &[&str] = &["/usr/bin/mpv", "/usr/local/bin/mpv"];

/// Find MPV on PATH or in the usual install locations.
pub fn find_mpv() -> Option<PathBuf> {
  if let Ok(path) = which::which("mpv") {
    return Some(path);
  }
  COMMON_PATHS
    .iter()
    .map(PathBuf::from)
    .find(|p| p.exists())
}

/// Program plus leading arguments; the stream URI is appended last.
#[derive(Debug, Clone)]
pub struct PlayerLauncher {
  program: PathBuf,
  args: Vec<OsString>,
}

impl PlayerLauncher {
  pub fn new(program: impl Into<PathBuf>, args: Vec<OsString>) -> Self {
    Self {
      program: program.into(),
      args,
    }
  }

  fn resolve(mpv_path: Option<PathBuf>) -> Result<PathBuf, ProcessError> {
    mpv_path.or_else(find_mpv).ok_or(ProcessError::NotFound)
  }

  /// Audio-only, quiet, no terminal: for children of the service.
  pub fn background(
    mpv_path: Option<PathBuf>,
    extra_args: &[String],
  ) -> Result<Self, ProcessError> {
    let program = Self::resolve(mpv_path)?;
    let mut args: Vec<OsString> = ["--no-video", "--no-terminal", "--really-quiet"]
      .iter()
      .map(OsString::from)
      .collect();
    args.extend(extra_args.iter().map(OsString::from));
    Ok(Self::new(program, args))
  }

  /// Interactive terminal UI with OSD bar and status line.
  pub fn foreground(mpv_path: Option<PathBuf>) -> Result<Self, ProcessError> {
    let program = Self::resolve(mpv_path)?;
    let args = [
      "--no-video",
      "--term-osd-bar",
      "--term-osd-bar-chars=╺━━╸",
      "--term-status-msg=  ${playback-time} │ ${audio-codec-name} ${audio-params/samplerate}Hz │ ${audio-bitrate}",
      "--msg-level=all=no,statusline=status",
      "--volume=70",
    ]
    .iter()
    .map(OsString::from)
    .collect();
    Ok(Self::new(program, args))
  }

  pub fn program(&self) -> &PathBuf {
    &self.program
  }

  /// Build the command for `uri` without spawning it.
  pub fn command(&self, uri: &str) -> Command {
    let mut cmd = Command::new(&self.program);
    cmd.args(&self.args).arg(uri);
    cmd
  }

  /// Spawn a detached player for `uri` and hand its exit to a reaper task.
  pub fn spawn(&self, uri: &str) -> Result<PlayerHandle, ProcessError> {
    log::info!("Spawning player: {:?} {:?} {}", self.program, self.args, uri);

    let child = self
      .command(uri)
      .stdin(Stdio::null())
      .stdout(Stdio::null())
      .stderr(Stdio::null())
      .kill_on_drop(true)
      .spawn()?;

    PlayerHandle::watch(child)
  }
}

/// Ownership of one running player.
///
/// The child itself lives in the reaper task; this handle can only ask the
/// reaper to kill it and wait for that to finish. Dropping the handle without
/// calling [`PlayerHandle::kill`] also kills the child.
pub struct PlayerHandle {
  generation: u64,
  pid: u32,
  kill_tx: Option<oneshot::Sender<()>>,
  reaper: JoinHandle<()>,
  exit: Arc<Mutex<Option<ExitStatus>>>,
}

impl PlayerHandle {
  fn watch(mut child: Child) -> Result<Self, ProcessError> {
    let pid = child.id().ok_or_else(|| {
      ProcessError::SpawnFailed(std::io::Error::other("player exited before it was tracked"))
    })?;
    let generation = next_generation();
    let (kill_tx, kill_rx) = oneshot::channel::<()>();
    let exit = Arc::new(Mutex::new(None));
    let exit_slot = exit.clone();

    let reaper = tokio::spawn(async move {
      let status = tokio::select! {
        status = child.wait() => status,
        _ = kill_rx => {
          if let Err(e) = child.start_kill() {
            log::warn!("kill() failed for pid {}: {}", pid, e);
          }
          child.wait().await
        }
      };
      match status {
        Ok(status) => {
          log::info!(
            "Player exited (pid: {}, generation: {}): {}",
            pid,
            generation,
            status
          );
          *exit_slot.lock() = Some(status);
        }
        Err(e) => log::error!("wait() failed for pid {}: {}", pid, e),
      }
    });

    log::debug!("Tracking player pid {} as generation {}", pid, generation);

    Ok(Self {
      generation,
      pid,
      kill_tx: Some(kill_tx),
      reaper,
      exit,
    })
  }

  pub fn pid(&self) -> u32 {
    self.pid
  }

  pub fn generation(&self) -> u64 {
    self.generation
  }

  /// True once the reaper has collected the child's exit status.
  pub fn has_exited(&self) -> bool {
    self.exit.lock().is_some() || self.reaper.is_finished()
  }

  pub fn exit_status(&self) -> Option<ExitStatus> {
    *self.exit.lock()
  }

  /// Hard-kill the child and wait until it has been reaped.
  pub async fn kill(self) {
    let PlayerHandle {
      pid,
      generation,
      kill_tx,
      reaper,
      ..
    } = self;

    log::info!("Killing player (pid: {}, generation: {})", pid, generation);
    if let Some(tx) = kill_tx {
      // Err means the child already exited on its own.
      let _ = tx.send(());
    }
    if let Err(e) = reaper.await {
      log::error!("Reaper task for pid {} failed: {}", pid, e);
    }
  }
}

impl std::fmt::Debug for PlayerHandle {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("PlayerHandle")
      .field("generation", &self.generation)
      .field("pid", &self.pid)
      .finish()
  }
}
