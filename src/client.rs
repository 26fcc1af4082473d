//! Client side: find or launch the service, then send one command.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use crate::daemon::{ChannelError, Command, Endpoint};

/// Interval between reachability probes while a fresh service starts.
pub const STARTUP_POLL_INTERVAL: Duration = Duration::from_millis(100);
/// Probes before giving up on a fresh service (about two seconds).
pub const STARTUP_POLL_ATTEMPTS: u32 = 20;

#[derive(Error, Debug)]
pub enum ClientError {
  #[error("{0}")]
  Channel(#[from] ChannelError),
  #[error("Request timed out after {0:?}")]
  Timeout(Duration),
  #[error("{0}")]
  Io(#[from] std::io::Error),
  #[error("Service closed the connection without replying")]
  Closed,
  #[error("service failed to start")]
  StartFailed,
  #[error("Failed to launch service: {0}")]
  Launch(std::io::Error),
}

/// Talks to the service at one endpoint.
#[derive(Debug, Clone)]
pub struct Client {
  endpoint: Endpoint,
  timeout: Duration,
  config_path: Option<PathBuf>,
}

impl Client {
  pub fn new(endpoint: Endpoint, timeout: Duration) -> Self {
    Self {
      endpoint,
      timeout,
      config_path: None,
    }
  }

  /// Config file handed to a service launched by this client.
  pub fn with_config_path(mut self, path: Option<PathBuf>) -> Self {
    self.config_path = path;
    self
  }

  pub fn endpoint(&self) -> &Endpoint {
    &self.endpoint
  }

  pub async fn is_running(&self) -> bool {
    self.endpoint.is_reachable().await
  }

  /// Send one command and return the trimmed reply line.
  pub async fn send(&self, command: &Command) -> Result<String, ClientError> {
    let request = format!("{}\n", command.to_line());
    log::debug!("Sending {:?}", request.trim_end());

    let exchange = async {
      let stream = self.endpoint.connect().await?;
      let (reader, mut writer) = tokio::io::split(stream);
      writer.write_all(request.as_bytes()).await?;
      writer.flush().await?;

      let mut reply = String::new();
      if BufReader::new(reader).read_line(&mut reply).await? == 0 {
        return Err(ClientError::Closed);
      }
      Ok::<_, ClientError>(reply.trim().to_string())
    };

    tokio::time::timeout(self.timeout, exchange)
      .await
      .map_err(|_| ClientError::Timeout(self.timeout))?
  }

  /// Make sure a service answers, launching one if needed.
  pub async fn ensure_running(&self) -> Result<(), ClientError> {
    self
      .ensure_running_with(|| self.launch_daemon(), STARTUP_POLL_ATTEMPTS, STARTUP_POLL_INTERVAL)
      .await
  }

  /// `ensure_running` with the launch step and polling budget supplied.
  ///
  /// Two clients racing here may both launch a service; the loser fails to
  /// claim the endpoint and exits, and both clients then reach the winner.
  pub async fn ensure_running_with<F>(
    &self,
    launch: F,
    attempts: u32,
    interval: Duration,
  ) -> Result<(), ClientError>
  where
    F: FnOnce() -> std::io::Result<()>,
  {
    if self.is_running().await {
      return Ok(());
    }

    log::info!("Service not running, launching it");
    launch().map_err(ClientError::Launch)?;

    for _ in 0..attempts {
      tokio::time::sleep(interval).await;
      if self.is_running().await {
        return Ok(());
      }
    }
    Err(ClientError::StartFailed)
  }

  /// Start `<current exe> --daemon` detached from this terminal.
  fn launch_daemon(&self) -> std::io::Result<()> {
    let exe = std::env::current_exe()?;
    let mut cmd = std::process::Command::new(exe);
    cmd.arg("--daemon");
    if let Some(path) = &self.config_path {
      cmd.arg("--config").arg(path);
    }
    cmd
      .stdin(Stdio::null())
      .stdout(Stdio::null())
      .stderr(Stdio::null());

    #[cfg(unix)]
    {
      use std::os::unix::process::CommandExt;
      // Own process group, so ctrl-c in this terminal does not reach it.
      cmd.process_group(0);
    }
    #[cfg(windows)]
    {
      use std::os::windows::process::CommandExt;
      const DETACHED_PROCESS: u32 = 0x0000_0008;
      const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;
      cmd.creation_flags(DETACHED_PROCESS | CREATE_NEW_PROCESS_GROUP);
    }

    let child = cmd.spawn()?;
    log::debug!("Launched service (pid: {})", child.id());
    Ok(())
  }
}
