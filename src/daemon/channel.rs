//! Discovery endpoint: where the service listens and clients connect.
//!
//! Unix sockets on unix. Elsewhere a loopback TCP port, published through a
//! port file that clients read before connecting.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use thiserror::Error;

#[cfg(unix)]
pub type Stream = tokio::net::UnixStream;
#[cfg(not(unix))]
pub type Stream = tokio::net::TcpStream;

#[derive(Error, Debug)]
pub enum ChannelError {
  #[error("Another instance already owns {}", .0.display())]
  AlreadyRunning(PathBuf),
  #[error("Failed to lock endpoint: {0}")]
  Lock(std::io::Error),
  #[error("Bind failed: {0}")]
  Bind(std::io::Error),
  #[error("Connection failed: {0}")]
  Connect(std::io::Error),
  #[error("Discovery file error: {0}")]
  Artifact(std::io::Error),
  #[error("Invalid address in discovery file: {0}")]
  BadAddress(String),
}

/// Per-user location of the discovery artifact.
#[cfg(unix)]
pub fn artifact_path() -> PathBuf {
  let uid = nix::unistd::getuid().as_raw();
  std::env::temp_dir().join(format!("chill-{}.sock", uid))
}

/// Per-user location of the discovery artifact.
#[cfg(not(unix))]
pub fn artifact_path() -> PathBuf {
  let user = std::env::var("USERNAME").unwrap_or_else(|_| "default".to_string());
  std::env::temp_dir().join(format!("chill-{}.port", user))
}

/// Exclusive claim on an endpoint, released on drop.
#[cfg(unix)]
type EndpointLock = nix::fcntl::Flock<File>;
/// Exclusive claim on an endpoint: the lock file opened with no sharing.
#[cfg(not(unix))]
type EndpointLock = File;

/// Bound service side of the channel.
///
/// Holds the endpoint lock for as long as it lives, so only the owner of
/// the listener may remove the discovery artifact.
pub struct Listener {
  #[cfg(unix)]
  inner: tokio::net::UnixListener,
  #[cfg(not(unix))]
  inner: tokio::net::TcpListener,
  path: PathBuf,
  _lock: EndpointLock,
}

impl Listener {
  pub async fn accept(&self) -> std::io::Result<Stream> {
    let (stream, _) = self.inner.accept().await?;
    Ok(stream)
  }

  /// Human-readable bound address, for logs.
  pub fn describe(&self) -> String {
    match self.inner.local_addr() {
      Ok(addr) => format!("{:?}", addr),
      Err(e) => format!("<unknown: {}>", e),
    }
  }

  /// Stop accepting and remove the discovery artifact. The lock goes last,
  /// so no other service can claim the endpoint before the artifact is gone.
  pub fn close(self) {
    let Listener {
      inner,
      path,
      _lock: lock,
    } = self;
    drop(inner);
    match std::fs::remove_file(&path) {
      Ok(()) => log::info!("Removed {}", path.display()),
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
      Err(e) => log::warn!("Failed to remove {}: {}", path.display(), e),
    }
    drop(lock);
  }
}

/// The discovery artifact and the operations on it.
#[derive(Debug, Clone)]
pub struct Endpoint {
  path: PathBuf,
}

impl Endpoint {
  pub fn for_current_user() -> Self {
    Self::at(artifact_path())
  }

  pub fn at(path: impl Into<PathBuf>) -> Self {
    Self { path: path.into() }
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  /// Sibling file whose lock marks the endpoint as owned.
  pub fn lock_path(&self) -> PathBuf {
    self.path.with_extension("lock")
  }

  /// True if a service answers at this endpoint.
  pub async fn is_reachable(&self) -> bool {
    self.connect().await.is_ok()
  }

  #[cfg(unix)]
  fn lock(&self) -> Result<EndpointLock, ChannelError> {
    use nix::errno::Errno;
    use nix::fcntl::{Flock, FlockArg};

    let file = OpenOptions::new()
      .read(true)
      .write(true)
      .create(true)
      .truncate(false)
      .open(self.lock_path())
      .map_err(ChannelError::Lock)?;
    match Flock::lock(file, FlockArg::LockExclusiveNonblock) {
      Ok(lock) => Ok(lock),
      Err((_, e)) if e == Errno::EWOULDBLOCK => {
        Err(ChannelError::AlreadyRunning(self.path.clone()))
      }
      Err((_, e)) => Err(ChannelError::Lock(e.into())),
    }
  }

  #[cfg(not(unix))]
  fn lock(&self) -> Result<EndpointLock, ChannelError> {
    use std::os::windows::fs::OpenOptionsExt;
    const ERROR_SHARING_VIOLATION: i32 = 32;

    let opened = OpenOptions::new()
      .read(true)
      .write(true)
      .create(true)
      .truncate(false)
      .share_mode(0)
      .open(self.lock_path());
    match opened {
      Ok(file) => Ok(file),
      Err(e) if e.raw_os_error() == Some(ERROR_SHARING_VIOLATION) => {
        Err(ChannelError::AlreadyRunning(self.path.clone()))
      }
      Err(e) => Err(ChannelError::Lock(e)),
    }
  }

  /// Claim the endpoint for a new service.
  ///
  /// Fails with `AlreadyRunning` while another service holds the endpoint
  /// lock. Under the lock, a socket left by a dead service is stale and is
  /// removed before binding.
  #[cfg(unix)]
  pub async fn bind(&self) -> Result<Listener, ChannelError> {
    let lock = self.lock()?;
    match std::fs::remove_file(&self.path) {
      Ok(()) => log::info!("Removed stale socket {}", self.path.display()),
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
      Err(e) => return Err(ChannelError::Bind(e)),
    }
    let inner = tokio::net::UnixListener::bind(&self.path).map_err(ChannelError::Bind)?;
    Ok(Listener {
      inner,
      path: self.path.clone(),
      _lock: lock,
    })
  }

  /// Claim the endpoint for a new service.
  ///
  /// Fails with `AlreadyRunning` while another service holds the endpoint
  /// lock. Under the lock, a port file left by a dead service is overwritten.
  #[cfg(not(unix))]
  pub async fn bind(&self) -> Result<Listener, ChannelError> {
    let lock = self.lock()?;
    let inner = tokio::net::TcpListener::bind("127.0.0.1:0")
      .await
      .map_err(ChannelError::Bind)?;
    let addr = inner.local_addr().map_err(ChannelError::Bind)?;
    std::fs::write(&self.path, addr.to_string()).map_err(ChannelError::Artifact)?;
    Ok(Listener {
      inner,
      path: self.path.clone(),
      _lock: lock,
    })
  }

  #[cfg(unix)]
  pub async fn connect(&self) -> Result<Stream, ChannelError> {
    Stream::connect(&self.path).await.map_err(ChannelError::Connect)
  }

  #[cfg(not(unix))]
  pub async fn connect(&self) -> Result<Stream, ChannelError> {
    let contents = std::fs::read_to_string(&self.path).map_err(ChannelError::Artifact)?;
    let addr: std::net::SocketAddr = contents
      .trim()
      .parse()
      .map_err(|_| ChannelError::BadAddress(contents.trim().to_string()))?;
    Stream::connect(addr).await.map_err(ChannelError::Connect)
  }
}
