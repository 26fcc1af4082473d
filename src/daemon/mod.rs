//! Background service that owns the player and answers clients.
//!
//! Architecture:
//! - `channel.rs` - Discovery endpoint (Unix socket, or loopback TCP + port file)
//! - `protocol.rs` - Request parsing, reply strings, status payload
//! - `executor.rs` - Command dispatch under the service-wide lock
//! - `server.rs` - Accept loop, per-connection handler, shutdown

mod channel;
mod executor;
mod protocol;
mod server;

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

pub use channel::{artifact_path, ChannelError, Endpoint, Listener, Stream};
pub use executor::Executor;
pub use protocol::{format_uptime, Command, Status};
pub use server::{handle_connection, shutdown_signal, Server};

#[cfg(all(test, unix))]
pub(crate) use executor::tests::{test_executor, test_stations};

use crate::config::AppConfig;
use crate::player::{PlatformControl, PlayerLauncher, ProcessError, Supervisor};

#[derive(Error, Debug)]
pub enum DaemonError {
  #[error("Failed to start daemon: {0}")]
  Channel(#[from] ChannelError),
  #[error("Failed to start daemon: {0}")]
  Process(#[from] ProcessError),
}

/// Build the executor for `config` with the platform suspend/resume control.
pub fn build_executor(config: &AppConfig) -> Result<Executor, ProcessError> {
  let launcher = match PlayerLauncher::background(config.mpv_path(), &config.mpv_args) {
    Ok(launcher) => launcher,
    Err(e) => {
      // Leave it to `play` to report the OS error to the client.
      log::warn!("{}; falling back to `mpv` on PATH", e);
      PlayerLauncher::background(Some(PathBuf::from("mpv")), &config.mpv_args)?
    }
  };
  log::info!("Player executable: {:?}", launcher.program());
  let supervisor = Supervisor::new(launcher, Box::new(PlatformControl));
  Ok(Executor::new(config.station_list(), supervisor))
}

/// Run the service on `endpoint` until `stop`/`quit` or a termination signal.
pub async fn run(config: &AppConfig, endpoint: Endpoint) -> Result<(), DaemonError> {
  let executor = Arc::new(build_executor(config)?);
  let server = Server::new(endpoint.clone(), executor);

  let token = server.shutdown_token();
  tokio::spawn(async move {
    shutdown_signal().await;
    log::info!("Termination signal received");
    token.cancel();
  });

  log::info!("chill daemon starting (artifact: {})", endpoint.path().display());
  server.run().await?;
  Ok(())
}
