//! Foreground mode: run the player attached to this terminal, no service.

use std::process::Stdio;

use crate::daemon::shutdown_signal;
use crate::player::{PlayerLauncher, ProcessError};
use crate::station::Station;

/// Play `station` with the interactive terminal UI until the player exits or
/// an interrupt arrives. An interrupt kills the player and counts as success.
pub async fn play(launcher: &PlayerLauncher, station: &Station) -> Result<(), ProcessError> {
  let mut cmd = launcher.command(&station.source_uri);
  cmd
    .stdin(Stdio::inherit())
    .stdout(Stdio::inherit())
    .stderr(Stdio::inherit())
    .kill_on_drop(true);
  let mut child = cmd.spawn()?;
  log::debug!("Foreground player pid {:?} for {}", child.id(), station.name);

  tokio::select! {
    status = child.wait() => {
      let status = status?;
      if status.success() {
        Ok(())
      } else {
        Err(ProcessError::Exited(status))
      }
    }
    _ = shutdown_signal() => {
      log::debug!("Interrupted, killing foreground player");
      child.kill().await?;
      Ok(())
    }
  }
}

#[cfg(all(test, unix))]
mod tests {
  use super::*;

  #[tokio::test]
  async fn test_clean_exit() {
    let launcher = PlayerLauncher::new("sleep", Vec::new());
    play(&launcher, &Station::new("s", "0", "s")).await.unwrap();
  }

  #[tokio::test]
  async fn test_failing_player_is_error() {
    let launcher = PlayerLauncher::new("false", Vec::new());
    let err = play(&launcher, &Station::new("s", "ignored", "s")).await.unwrap_err();
    assert!(matches!(err, ProcessError::Exited(_)));
  }

  #[tokio::test]
  async fn test_missing_player_is_error() {
    let launcher = PlayerLauncher::new("/nonexistent/player-binary", Vec::new());
    let err = play(&launcher, &Station::new("s", "uri", "s")).await.unwrap_err();
    assert!(matches!(err, ProcessError::SpawnFailed(_)));
  }
}
