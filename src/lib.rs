//! chill: a terminal lofi radio.
//!
//! A background service supervises one MPV process; short-lived client
//! invocations find (or launch) the service over a per-user local channel
//! and send it one command each.

pub mod client;
pub mod config;
pub mod daemon;
pub mod foreground;
pub mod player;
pub mod station;

pub use client::{Client, ClientError};
pub use config::{AppConfig, ConfigError};
pub use station::{Station, StationList};

use tracing_subscriber::EnvFilter;

/// Route `log` records to stderr, filtered by `RUST_LOG` or `default_filter`.
pub fn init_logging(default_filter: &str) {
  let filter =
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
  let result = tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .with_target(false)
    .try_init();
  if let Err(e) = result {
    eprintln!("Failed to initialise logging: {}", e);
  }
}
