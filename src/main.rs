//! chill - lofi radio in the terminal.
//!
//! ```text
//! chill              # play default station
//! chill chillhop     # play specific station
//! chill --status     # show what's playing
//! chill --stop       # stop playback and the background service
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use chill_lib::client::Client;
use chill_lib::daemon::{self, Command, DaemonError, Endpoint, Status};
use chill_lib::player::{PlayerLauncher, ProcessError};
use chill_lib::{foreground, init_logging, AppConfig, ClientError, ConfigError};
use clap::Parser;
use thiserror::Error;

/// Command-line arguments for chill
#[derive(Parser, Debug)]
#[command(name = "chill")]
#[command(about = "Lofi radio in the terminal")]
#[command(version)]
struct Cli {
  /// Station to play
  station: Option<String>,

  /// Station to play (same as the positional argument)
  #[arg(long = "station", value_name = "NAME")]
  station_opt: Option<String>,

  /// Run as the background service
  #[arg(long, group = "mode")]
  daemon: bool,

  /// List stations
  #[arg(long, group = "mode")]
  list: bool,

  /// Show current status
  #[arg(long, group = "mode")]
  status: bool,

  /// Toggle play/pause
  #[arg(long, group = "mode")]
  toggle: bool,

  /// Pause playback
  #[arg(long, group = "mode")]
  pause: bool,

  /// Resume playback
  #[arg(long, group = "mode")]
  resume: bool,

  /// Skip to a random other station
  #[arg(long, group = "mode")]
  skip: bool,

  /// Stop playback and the background service
  #[arg(long, group = "mode")]
  stop: bool,

  /// Play in the foreground with MPV's terminal UI (no service)
  #[arg(long, group = "mode")]
  fg: bool,

  /// Config file (default: <config dir>/chill/config.json)
  #[arg(long, env = "CHILL_CONFIG")]
  config: Option<PathBuf>,
}

impl Cli {
  fn station_name(&self) -> String {
    self
      .station_opt
      .clone()
      .or_else(|| self.station.clone())
      .unwrap_or_default()
  }
}

#[derive(Error, Debug)]
enum CliError {
  #[error(transparent)]
  Config(#[from] ConfigError),
  #[error(transparent)]
  Client(#[from] ClientError),
  #[error(transparent)]
  Daemon(#[from] DaemonError),
  #[error(transparent)]
  Process(#[from] ProcessError),
  #[error("{0}")]
  Reply(String),
}

#[tokio::main]
async fn main() -> ExitCode {
  let cli = Cli::parse();
  init_logging(if cli.daemon {
    "chill_lib=info,chill=info"
  } else {
    "chill_lib=warn,chill=warn"
  });

  match run(cli).await {
    Ok(()) => ExitCode::SUCCESS,
    Err(e) => {
      eprintln!("error: {}", e);
      ExitCode::FAILURE
    }
  }
}

async fn run(cli: Cli) -> Result<(), CliError> {
  let config = AppConfig::load(cli.config.as_deref())?;

  if cli.daemon {
    daemon::run(&config, Endpoint::for_current_user()).await?;
    return Ok(());
  }
  if cli.list {
    print_stations(&config);
    return Ok(());
  }
  if cli.fg {
    return play_foreground(&config, &cli.station_name()).await;
  }

  let client = Client::new(Endpoint::for_current_user(), config.request_timeout())
    .with_config_path(cli.config.clone());

  if cli.status {
    show_status(&client).await
  } else if cli.toggle {
    toggle(&client).await
  } else if cli.pause {
    send_if_running(&client, Command::Pause).await
  } else if cli.resume {
    send_if_running(&client, Command::Resume).await
  } else if cli.skip {
    play(&client, Command::Skip).await
  } else if cli.stop {
    stop(&client).await
  } else {
    play(&client, Command::Play(cli.station_name())).await
  }
}

fn print_stations(config: &AppConfig) {
  println!("available stations:");
  println!();
  for station in &config.stations {
    println!("  {:<16}  {}", station.name, station.description);
  }
}

/// Replies that mean the requested playback did not happen.
fn check_play_reply(reply: String) -> Result<String, CliError> {
  if reply.starts_with("unknown station:") || reply.starts_with("failed to start:") {
    Err(CliError::Reply(reply))
  } else {
    Ok(reply)
  }
}

async fn play(client: &Client, command: Command) -> Result<(), CliError> {
  client.ensure_running().await?;
  let reply = check_play_reply(client.send(&command).await?)?;
  println!("♪ {}", reply);
  Ok(())
}

async fn show_status(client: &Client) -> Result<(), CliError> {
  if !client.is_running().await {
    println!("not running");
    return Ok(());
  }

  let reply = client.send(&Command::Status).await?;
  let status = match Status::parse(&reply) {
    Ok(status) => status,
    Err(_) => {
      println!("{}", reply);
      return Ok(());
    }
  };

  if !status.playing && !status.paused {
    println!("idle");
    return Ok(());
  }

  let state = if status.paused { "⏸" } else { "▶" };
  println!("{} {}", state, status.description.unwrap_or_default());
  println!(
    "  {} │ {}",
    status.station.unwrap_or_default(),
    status.uptime.unwrap_or_default()
  );
  Ok(())
}

async fn toggle(client: &Client) -> Result<(), CliError> {
  if !client.is_running().await {
    return play(client, Command::Play(String::new())).await;
  }
  let reply = client.send(&Command::Toggle).await?;
  match reply.as_str() {
    "paused" => println!("⏸ paused"),
    "resumed" => println!("▶ resumed"),
    other => println!("{}", other),
  }
  Ok(())
}

async fn send_if_running(client: &Client, command: Command) -> Result<(), CliError> {
  if !client.is_running().await {
    println!("not running");
    return Ok(());
  }
  println!("{}", client.send(&command).await?);
  Ok(())
}

async fn stop(client: &Client) -> Result<(), CliError> {
  if !client.is_running().await {
    println!("not running");
    return Ok(());
  }
  // The service may exit before the reply is read.
  if let Err(e) = client.send(&Command::Stop).await {
    log::debug!("stop: {}", e);
  }
  println!("~ stay chill ~");
  Ok(())
}

async fn play_foreground(config: &AppConfig, name: &str) -> Result<(), CliError> {
  let stations = config.station_list();
  let station = stations
    .resolve(name)
    .ok_or_else(|| CliError::Reply(format!("unknown station: {}", name)))?;
  let launcher = PlayerLauncher::foreground(config.mpv_path())?;

  println!("♪ {}", station.description);
  println!("  [q]uit  [m]ute  [9/0] volume  [←/→] seek");
  println!();

  foreground::play(&launcher, &station).await?;
  println!("~ stay chill ~");
  Ok(())
}
