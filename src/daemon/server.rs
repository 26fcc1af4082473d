//! Connection listener and per-connection line protocol handler.

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio_util::sync::CancellationToken;

use super::channel::{ChannelError, Endpoint, Listener};
use super::executor::Executor;
use super::protocol::Command;

/// Longest request line accepted, newline included.
pub const MAX_LINE_BYTES: u64 = 4096;

/// Accept loop plus shutdown handling for one service instance.
pub struct Server {
  endpoint: Endpoint,
  executor: Arc<Executor>,
  shutdown: CancellationToken,
}

impl Server {
  pub fn new(endpoint: Endpoint, executor: Arc<Executor>) -> Self {
    Self {
      endpoint,
      executor,
      shutdown: CancellationToken::new(),
    }
  }

  /// Cancelling this token shuts the service down.
  pub fn shutdown_token(&self) -> CancellationToken {
    self.shutdown.clone()
  }

  /// Claim the endpoint and serve until shut down.
  pub async fn run(&self) -> Result<(), ChannelError> {
    let listener = self.endpoint.bind().await?;
    log::info!("Listening on {}", listener.describe());
    self.serve(listener).await;
    Ok(())
  }

  /// Serve on an already-bound listener until shut down, then kill playback
  /// and remove the discovery artifact.
  pub async fn serve(&self, listener: Listener) {
    loop {
      tokio::select! {
        _ = self.shutdown.cancelled() => break,
        accepted = listener.accept() => match accepted {
          Ok(stream) => {
            log::debug!("Accepted connection");
            let executor = self.executor.clone();
            let shutdown = self.shutdown.clone();
            tokio::spawn(async move {
              handle_connection(stream, executor, shutdown).await;
            });
          }
          Err(e) => log::warn!("Accept failed: {}", e),
        },
      }
    }

    listener.close();
    self.executor.shutdown().await;
    log::info!("Service stopped");
  }
}

/// Read newline-terminated commands and answer each with one line.
///
/// End of stream, a read error, a truncated final line, a line longer than
/// [`MAX_LINE_BYTES`] or invalid UTF-8 all close the connection quietly.
/// After a terminal command the reply is flushed before shutdown is
/// signalled.
pub async fn handle_connection<S>(stream: S, executor: Arc<Executor>, shutdown: CancellationToken)
where
  S: AsyncRead + AsyncWrite + Unpin,
{
  let (reader, mut writer) = tokio::io::split(stream);
  let mut reader = BufReader::new(reader);
  let mut line = String::new();

  loop {
    line.clear();
    let mut limited = (&mut reader).take(MAX_LINE_BYTES);
    let read = tokio::select! {
      _ = shutdown.cancelled() => break,
      read = limited.read_line(&mut line) => read,
    };
    match read {
      Ok(0) => break,
      Ok(_) if !line.ends_with('\n') => {
        log::debug!("Dropping truncated line: {:?}", line);
        break;
      }
      Ok(_) => {}
      Err(e) => {
        log::debug!("Connection read error: {}", e);
        break;
      }
    }

    let command = Command::parse(&line);
    let mut reply = executor.execute(&command).await;
    reply.push('\n');

    if let Err(e) = write_reply(&mut writer, &reply).await {
      log::debug!("Connection write error: {}", e);
      break;
    }

    if command.is_terminal() {
      log::info!("Stop requested, shutting down");
      shutdown.cancel();
      break;
    }
  }
}

async fn write_reply<W: AsyncWrite + Unpin>(writer: &mut W, reply: &str) -> std::io::Result<()> {
  writer.write_all(reply.as_bytes()).await?;
  writer.flush().await
}

/// Resolve on ctrl-c, or SIGTERM on unix.
pub async fn shutdown_signal() {
  #[cfg(unix)]
  {
    use tokio::signal::unix::{signal, SignalKind};
    match signal(SignalKind::terminate()) {
      Ok(mut term) => {
        tokio::select! {
          _ = tokio::signal::ctrl_c() => {}
          _ = term.recv() => {}
        }
      }
      Err(e) => {
        log::warn!("Failed to install SIGTERM handler: {}", e);
        let _ = tokio::signal::ctrl_c().await;
      }
    }
  }
  #[cfg(not(unix))]
  {
    let _ = tokio::signal::ctrl_c().await;
  }
}
